//! Decoded operation: a mnemonic plus its argument pattern.

use std::fmt::{self, Display};

use crate::csr::csr_name;
use crate::{Flag, FlagGroup, SpecialReg};

/// OTBN mnemonics understood by the checker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mnemonic {
    Add,
    Addi,
    Lui,
    Sub,
    Sll,
    Slli,
    Srl,
    Srli,
    Sra,
    Srai,
    And,
    Andi,
    Or,
    Ori,
    Xor,
    Xori,
    Lw,
    Sw,
    Beq,
    Bne,
    Jal,
    Jalr,
    Csrrs,
    Csrrw,
    Ecall,
    Loop,
    Loopi,
    BnAdd,
    BnAddc,
    BnAddi,
    BnAddm,
    BnSub,
    BnSubb,
    BnSubi,
    BnSubm,
    BnAnd,
    BnOr,
    BnNot,
    BnXor,
    BnRshi,
    BnSel,
    BnCmp,
    BnCmpb,
    BnMulqacc,
    BnMulqaccWo,
    BnMulqaccSo,
    BnLid,
    BnSid,
    BnMov,
    BnMovr,
    BnWsrr,
    BnWsrw,
}

impl Mnemonic {
    pub const ALL: [Self; 52] = [
        Self::Add,
        Self::Addi,
        Self::Lui,
        Self::Sub,
        Self::Sll,
        Self::Slli,
        Self::Srl,
        Self::Srli,
        Self::Sra,
        Self::Srai,
        Self::And,
        Self::Andi,
        Self::Or,
        Self::Ori,
        Self::Xor,
        Self::Xori,
        Self::Lw,
        Self::Sw,
        Self::Beq,
        Self::Bne,
        Self::Jal,
        Self::Jalr,
        Self::Csrrs,
        Self::Csrrw,
        Self::Ecall,
        Self::Loop,
        Self::Loopi,
        Self::BnAdd,
        Self::BnAddc,
        Self::BnAddi,
        Self::BnAddm,
        Self::BnSub,
        Self::BnSubb,
        Self::BnSubi,
        Self::BnSubm,
        Self::BnAnd,
        Self::BnOr,
        Self::BnNot,
        Self::BnXor,
        Self::BnRshi,
        Self::BnSel,
        Self::BnCmp,
        Self::BnCmpb,
        Self::BnMulqacc,
        Self::BnMulqaccWo,
        Self::BnMulqaccSo,
        Self::BnLid,
        Self::BnSid,
        Self::BnMov,
        Self::BnMovr,
        Self::BnWsrr,
        Self::BnWsrw,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Addi => "addi",
            Self::Lui => "lui",
            Self::Sub => "sub",
            Self::Sll => "sll",
            Self::Slli => "slli",
            Self::Srl => "srl",
            Self::Srli => "srli",
            Self::Sra => "sra",
            Self::Srai => "srai",
            Self::And => "and",
            Self::Andi => "andi",
            Self::Or => "or",
            Self::Ori => "ori",
            Self::Xor => "xor",
            Self::Xori => "xori",
            Self::Lw => "lw",
            Self::Sw => "sw",
            Self::Beq => "beq",
            Self::Bne => "bne",
            Self::Jal => "jal",
            Self::Jalr => "jalr",
            Self::Csrrs => "csrrs",
            Self::Csrrw => "csrrw",
            Self::Ecall => "ecall",
            Self::Loop => "loop",
            Self::Loopi => "loopi",
            Self::BnAdd => "bn.add",
            Self::BnAddc => "bn.addc",
            Self::BnAddi => "bn.addi",
            Self::BnAddm => "bn.addm",
            Self::BnSub => "bn.sub",
            Self::BnSubb => "bn.subb",
            Self::BnSubi => "bn.subi",
            Self::BnSubm => "bn.subm",
            Self::BnAnd => "bn.and",
            Self::BnOr => "bn.or",
            Self::BnNot => "bn.not",
            Self::BnXor => "bn.xor",
            Self::BnRshi => "bn.rshi",
            Self::BnSel => "bn.sel",
            Self::BnCmp => "bn.cmp",
            Self::BnCmpb => "bn.cmpb",
            Self::BnMulqacc => "bn.mulqacc",
            Self::BnMulqaccWo => "bn.mulqacc.wo",
            Self::BnMulqaccSo => "bn.mulqacc.so",
            Self::BnLid => "bn.lid",
            Self::BnSid => "bn.sid",
            Self::BnMov => "bn.mov",
            Self::BnMovr => "bn.movr",
            Self::BnWsrr => "bn.wsrr",
            Self::BnWsrw => "bn.wsrw",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        Self::ALL.iter().copied().find(|m| m.name() == name)
    }
}

impl Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Direction of the optional `wrs2` shift in bignum ALU ops.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ShiftKind {
    #[default]
    Left,
    Right,
}

/// Byte shift applied to the second bignum operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Shift {
    pub kind: ShiftKind,
    pub bytes: u8,
}

impl Shift {
    pub const NONE: Self = Self {
        kind: ShiftKind::Left,
        bytes: 0,
    };
}

/// Operand patterns (covers the base formats plus the OTBN extensions).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Args {
    /// R-type: rd, rs1, rs2
    R { rd: u8, rs1: u8, rs2: u8 },
    /// I-type: rd, rs1, imm
    I { rd: u8, rs1: u8, imm: i32 },
    /// S-type: rs1, rs2, imm
    S { rs1: u8, rs2: u8, imm: i32 },
    /// B-type: rs1, rs2, imm
    B { rs1: u8, rs2: u8, imm: i32 },
    /// U-type: rd, imm (already shifted into bits [31:12])
    U { rd: u8, imm: i32 },
    /// J-type: rd, imm
    J { rd: u8, imm: i32 },
    /// CSR access: rd, rs1, csr
    Csr { rd: u8, rs1: u8, csr: u16 },
    /// Hardware loop with the iteration count in a GPR.
    Loop { grs: u8, bodysize: u16 },
    /// Hardware loop with an immediate iteration count.
    LoopI { iterations: u16, bodysize: u16 },
    /// Three-operand bignum ALU op (`wrd` unused by comparisons).
    Bn {
        wrd: u8,
        wrs1: u8,
        wrs2: u8,
        shift: Shift,
        fg: FlagGroup,
    },
    /// `bn.not`
    BnNot {
        wrd: u8,
        wrs: u8,
        shift: Shift,
        fg: FlagGroup,
    },
    /// `bn.addi` / `bn.subi`
    BnImm {
        wrd: u8,
        wrs: u8,
        imm: u16,
        fg: FlagGroup,
    },
    /// `bn.rshi`
    BnRshi { wrd: u8, wrs1: u8, wrs2: u8, imm: u8 },
    /// `bn.sel`
    BnSel {
        wrd: u8,
        wrs1: u8,
        wrs2: u8,
        fg: FlagGroup,
        flag: Flag,
    },
    /// `bn.mulqacc` family. `wrd` is ignored by the plain form.
    BnMulqacc {
        wrd: u8,
        wrs1: u8,
        wrs1_qwsel: u8,
        wrs2: u8,
        wrs2_qwsel: u8,
        acc_shift: u8,
        zero_acc: bool,
        upper: bool,
        fg: FlagGroup,
    },
    /// `bn.lid`: load into the WDR indexed by `x[grd]`.
    BnLoad {
        grd: u8,
        grs1: u8,
        offset: i32,
        grd_inc: bool,
        grs1_inc: bool,
    },
    /// `bn.sid`: store the WDR indexed by `x[grs2]`.
    BnStore {
        grs1: u8,
        grs2: u8,
        offset: i32,
        grs1_inc: bool,
        grs2_inc: bool,
    },
    /// `bn.mov`
    BnMov { wrd: u8, wrs: u8 },
    /// `bn.movr`: WDR-to-WDR move with both indices in GPRs.
    BnMovr {
        grd: u8,
        grs: u8,
        grd_inc: bool,
        grs_inc: bool,
    },
    /// `bn.wsrr` / `bn.wsrw`: `wreg` is the destination or source WDR.
    Wsr { wreg: u8, wsr: SpecialReg },
    /// No arguments (ECALL)
    None,
}

/// A decoded operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Op {
    pub mnemonic: Mnemonic,
    pub args: Args,
}

impl Op {
    pub const fn new(mnemonic: Mnemonic, args: Args) -> Self {
        Self { mnemonic, args }
    }
}

fn inc(flag: bool) -> &'static str {
    if flag { "++" } else { "" }
}

fn fmt_shift(f: &mut fmt::Formatter<'_>, shift: Shift) -> fmt::Result {
    if shift.bytes == 0 {
        return Ok(());
    }
    let dir = match shift.kind {
        ShiftKind::Left => "<<",
        ShiftKind::Right => ">>",
    };
    write!(f, " {dir} {}", u32::from(shift.bytes) * 8)
}

impl Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.mnemonic;
        match &self.args {
            Args::R { rd, rs1, rs2 } => write!(f, "{m} x{rd}, x{rs1}, x{rs2}"),
            Args::I { rd, rs1, imm } => match m {
                Mnemonic::Lw | Mnemonic::Jalr => write!(f, "{m} x{rd}, {imm}(x{rs1})"),
                _ => write!(f, "{m} x{rd}, x{rs1}, {imm}"),
            },
            Args::S { rs1, rs2, imm } => write!(f, "{m} x{rs2}, {imm}(x{rs1})"),
            Args::B { rs1, rs2, imm } => write!(f, "{m} x{rs1}, x{rs2}, {imm:+}"),
            Args::U { rd, imm } => write!(f, "{m} x{rd}, {:#x}", (*imm as u32) >> 12),
            Args::J { rd, imm } => write!(f, "{m} x{rd}, {imm:+}"),
            Args::Csr { rd, rs1, csr } => match csr_name(*csr) {
                Some(name) => write!(f, "{m} x{rd}, {name}, x{rs1}"),
                None => write!(f, "{m} x{rd}, {csr:#x}, x{rs1}"),
            },
            Args::Loop { grs, bodysize } => write!(f, "{m} x{grs}, {bodysize}"),
            Args::LoopI {
                iterations,
                bodysize,
            } => write!(f, "{m} {iterations}, {bodysize}"),
            Args::Bn {
                wrd,
                wrs1,
                wrs2,
                shift,
                fg,
            } => {
                match m {
                    Mnemonic::BnCmp | Mnemonic::BnCmpb => write!(f, "{m} w{wrs1}, w{wrs2}")?,
                    Mnemonic::BnAddm | Mnemonic::BnSubm => {
                        return write!(f, "{m} w{wrd}, w{wrs1}, w{wrs2}");
                    }
                    _ => write!(f, "{m} w{wrd}, w{wrs1}, w{wrs2}")?,
                }
                fmt_shift(f, *shift)?;
                write!(f, ", {}", fg.to_string().to_ascii_uppercase())
            }
            Args::BnNot { wrd, wrs, shift, fg } => {
                write!(f, "{m} w{wrd}, w{wrs}")?;
                fmt_shift(f, *shift)?;
                write!(f, ", {}", fg.to_string().to_ascii_uppercase())
            }
            Args::BnImm { wrd, wrs, imm, fg } => write!(
                f,
                "{m} w{wrd}, w{wrs}, {imm}, {}",
                fg.to_string().to_ascii_uppercase()
            ),
            Args::BnRshi {
                wrd,
                wrs1,
                wrs2,
                imm,
            } => write!(f, "{m} w{wrd}, w{wrs1}, w{wrs2} >> {imm}"),
            Args::BnSel {
                wrd,
                wrs1,
                wrs2,
                fg,
                flag,
            } => write!(
                f,
                "{m} w{wrd}, w{wrs1}, w{wrs2}, {}",
                crate::Location::Flag(*fg, *flag).to_string().to_ascii_uppercase()
            ),
            Args::BnMulqacc {
                wrd,
                wrs1,
                wrs1_qwsel,
                wrs2,
                wrs2_qwsel,
                acc_shift,
                zero_acc,
                upper,
                ..
            } => {
                let z = if *zero_acc { ".z" } else { "" };
                let shift = u32::from(*acc_shift) * 64;
                match m {
                    Mnemonic::BnMulqacc => write!(
                        f,
                        "{m}{z} w{wrs1}.{wrs1_qwsel}, w{wrs2}.{wrs2_qwsel}, {shift}"
                    ),
                    Mnemonic::BnMulqaccSo => {
                        let half = if *upper { 'U' } else { 'L' };
                        write!(
                            f,
                            "{m}{z} w{wrd}.{half}, w{wrs1}.{wrs1_qwsel}, w{wrs2}.{wrs2_qwsel}, {shift}"
                        )
                    }
                    _ => write!(
                        f,
                        "{m}{z} w{wrd}, w{wrs1}.{wrs1_qwsel}, w{wrs2}.{wrs2_qwsel}, {shift}"
                    ),
                }
            }
            Args::BnLoad {
                grd,
                grs1,
                offset,
                grd_inc,
                grs1_inc,
            } => write!(
                f,
                "{m} x{grd}{}, {offset}(x{grs1}{})",
                inc(*grd_inc),
                inc(*grs1_inc)
            ),
            Args::BnStore {
                grs1,
                grs2,
                offset,
                grs1_inc,
                grs2_inc,
            } => write!(
                f,
                "{m} x{grs2}{}, {offset}(x{grs1}{})",
                inc(*grs2_inc),
                inc(*grs1_inc)
            ),
            Args::BnMov { wrd, wrs } => write!(f, "{m} w{wrd}, w{wrs}"),
            Args::BnMovr {
                grd,
                grs,
                grd_inc,
                grs_inc,
            } => write!(f, "{m} x{grd}{}, x{grs}{}", inc(*grd_inc), inc(*grs_inc)),
            Args::Wsr { wreg, wsr } => match m {
                Mnemonic::BnWsrw => write!(f, "{m} {}, w{wreg}", wsr.name().to_ascii_uppercase()),
                _ => write!(f, "{m} w{wreg}, {}", wsr.name().to_ascii_uppercase()),
            },
            Args::None => write!(f, "{m}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mnemonic_names_unique() {
        for (i, a) in Mnemonic::ALL.iter().enumerate() {
            for b in &Mnemonic::ALL[i + 1..] {
                assert_ne!(a.name(), b.name());
            }
            assert_eq!(Mnemonic::from_name(a.name()), Some(*a));
        }
    }

    #[test]
    fn test_disasm() {
        let op = Op::new(
            Mnemonic::Beq,
            Args::B {
                rs1: 5,
                rs2: 0,
                imm: 8,
            },
        );
        assert_eq!(op.to_string(), "beq x5, x0, +8");

        let op = Op::new(
            Mnemonic::BnLid,
            Args::BnLoad {
                grd: 2,
                grs1: 3,
                offset: 64,
                grd_inc: false,
                grs1_inc: true,
            },
        );
        assert_eq!(op.to_string(), "bn.lid x2, 64(x3++)");
    }
}
