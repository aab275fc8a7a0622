//! Binary decoder for the OTBN base and bignum instruction encodings.

use crate::csr::Csr;
use crate::encode::{
    bit, bits, decode_b_imm, decode_bn_mem_offset, decode_funct3, decode_funct7, decode_i_imm,
    decode_j_imm, decode_opcode, decode_rd, decode_rs1, decode_rs2, decode_s_imm, decode_u_imm,
};
use crate::op::{Args, Mnemonic, Op, Shift, ShiftKind};
use crate::{Flag, FlagGroup, SpecialReg};

const OPC_LOAD: u8 = 0x03;
const OPC_CUSTOM0: u8 = 0x0B;
const OPC_OP_IMM: u8 = 0x13;
const OPC_STORE: u8 = 0x23;
const OPC_CUSTOM1: u8 = 0x2B;
const OPC_OP: u8 = 0x33;
const OPC_LUI: u8 = 0x37;
const OPC_CUSTOM2: u8 = 0x5B;
const OPC_BRANCH: u8 = 0x63;
const OPC_JALR: u8 = 0x67;
const OPC_JAL: u8 = 0x6F;
const OPC_SYSTEM: u8 = 0x73;
const OPC_CUSTOM3: u8 = 0x7B;

/// Decode one 32-bit instruction word.
///
/// Returns `None` for anything OTBN does not implement, including unknown
/// CSR/WSR indices and hardware loops with an empty body.
pub fn decode(instr: u32) -> Option<Op> {
    let funct3 = decode_funct3(instr);
    let rd = decode_rd(instr);
    let rs1 = decode_rs1(instr);
    let rs2 = decode_rs2(instr);

    let (mnemonic, args) = match decode_opcode(instr) {
        OPC_LUI => (
            Mnemonic::Lui,
            Args::U {
                rd,
                imm: decode_u_imm(instr),
            },
        ),
        OPC_JAL => (
            Mnemonic::Jal,
            Args::J {
                rd,
                imm: decode_j_imm(instr),
            },
        ),
        OPC_JALR if funct3 == 0 => (
            Mnemonic::Jalr,
            Args::I {
                rd,
                rs1,
                imm: decode_i_imm(instr),
            },
        ),
        OPC_BRANCH => decode_branch(funct3, rs1, rs2, instr)?,
        OPC_LOAD if funct3 == 2 => (
            Mnemonic::Lw,
            Args::I {
                rd,
                rs1,
                imm: decode_i_imm(instr),
            },
        ),
        OPC_STORE if funct3 == 2 => (
            Mnemonic::Sw,
            Args::S {
                rs1,
                rs2,
                imm: decode_s_imm(instr),
            },
        ),
        OPC_OP_IMM => decode_op_imm(funct3, decode_funct7(instr), rd, rs1, instr)?,
        OPC_OP => decode_op(funct3, decode_funct7(instr), rd, rs1, rs2)?,
        OPC_SYSTEM => decode_system(funct3, rd, rs1, instr)?,
        OPC_CUSTOM0 => decode_custom0(funct3, instr)?,
        OPC_CUSTOM1 => decode_custom1(funct3, instr)?,
        OPC_CUSTOM2 => decode_custom2(instr),
        OPC_CUSTOM3 => decode_custom3(funct3, instr)?,
        _ => return None,
    };

    Some(Op::new(mnemonic, args))
}

const fn decode_branch(funct3: u8, rs1: u8, rs2: u8, instr: u32) -> Option<(Mnemonic, Args)> {
    let imm = decode_b_imm(instr);
    let op = match funct3 {
        0 => Mnemonic::Beq,
        1 => Mnemonic::Bne,
        _ => return None,
    };
    Some((op, Args::B { rs1, rs2, imm }))
}

const fn decode_op_imm(
    funct3: u8,
    funct7: u8,
    rd: u8,
    rs1: u8,
    instr: u32,
) -> Option<(Mnemonic, Args)> {
    let imm = decode_i_imm(instr);
    let shamt = imm & 0x1F;
    let (op, imm) = match (funct3, funct7) {
        (0, _) => (Mnemonic::Addi, imm),
        (4, _) => (Mnemonic::Xori, imm),
        (6, _) => (Mnemonic::Ori, imm),
        (7, _) => (Mnemonic::Andi, imm),
        (1, 0x00) => (Mnemonic::Slli, shamt),
        (5, 0x00) => (Mnemonic::Srli, shamt),
        (5, 0x20) => (Mnemonic::Srai, shamt),
        _ => return None,
    };
    Some((op, Args::I { rd, rs1, imm }))
}

const fn decode_op(funct3: u8, funct7: u8, rd: u8, rs1: u8, rs2: u8) -> Option<(Mnemonic, Args)> {
    let op = match (funct3, funct7) {
        (0, 0x00) => Mnemonic::Add,
        (0, 0x20) => Mnemonic::Sub,
        (1, 0x00) => Mnemonic::Sll,
        (4, 0x00) => Mnemonic::Xor,
        (5, 0x00) => Mnemonic::Srl,
        (5, 0x20) => Mnemonic::Sra,
        (6, 0x00) => Mnemonic::Or,
        (7, 0x00) => Mnemonic::And,
        _ => return None,
    };
    Some((op, Args::R { rd, rs1, rs2 }))
}

fn decode_system(funct3: u8, rd: u8, rs1: u8, instr: u32) -> Option<(Mnemonic, Args)> {
    if instr == 0x0000_0073 {
        return Some((Mnemonic::Ecall, Args::None));
    }
    let op = match funct3 {
        1 => Mnemonic::Csrrw,
        2 => Mnemonic::Csrrs,
        _ => return None,
    };
    let csr = bits(instr, 31, 20) as u16;
    Csr::from_addr(csr)?;
    Some((op, Args::Csr { rd, rs1, csr }))
}

const fn shift(instr: u32) -> Shift {
    Shift {
        kind: if bit(instr, 30) {
            ShiftKind::Right
        } else {
            ShiftKind::Left
        },
        bytes: bits(instr, 29, 25) as u8,
    }
}

const fn flag_group(instr: u32) -> FlagGroup {
    FlagGroup::from_bit(bits(instr, 31, 31))
}

fn decode_custom0(funct3: u8, instr: u32) -> Option<(Mnemonic, Args)> {
    let wrd = decode_rd(instr);
    let wrs1 = decode_rs1(instr);
    let wrs2 = decode_rs2(instr);
    let fg = flag_group(instr);

    let decoded = match funct3 {
        0b000 => (
            Mnemonic::BnSel,
            Args::BnSel {
                wrd,
                wrs1,
                wrs2,
                fg,
                flag: Flag::from_bits(bits(instr, 26, 25)),
            },
        ),
        0b001 | 0b011 => (
            if funct3 == 0b001 {
                Mnemonic::BnCmp
            } else {
                Mnemonic::BnCmpb
            },
            Args::Bn {
                wrd: 0,
                wrs1,
                wrs2,
                shift: shift(instr),
                fg,
            },
        ),
        0b100 => (
            Mnemonic::BnLid,
            Args::BnLoad {
                grd: wrs2,
                grs1: wrs1,
                offset: decode_bn_mem_offset(instr),
                grd_inc: bit(instr, 7),
                grs1_inc: bit(instr, 8),
            },
        ),
        0b101 => (
            Mnemonic::BnSid,
            Args::BnStore {
                grs1: wrs1,
                grs2: wrs2,
                offset: decode_bn_mem_offset(instr),
                grs1_inc: bit(instr, 8),
                grs2_inc: bit(instr, 7),
            },
        ),
        0b110 if !bit(instr, 31) => (Mnemonic::BnMov, Args::BnMov { wrd, wrs: wrs1 }),
        0b110 => (
            Mnemonic::BnMovr,
            Args::BnMovr {
                grd: wrs2,
                grs: wrs1,
                grd_inc: bit(instr, 7),
                grs_inc: bit(instr, 9),
            },
        ),
        0b111 => {
            let wsr = SpecialReg::from_wsr(bits(instr, 27, 20))?;
            if bit(instr, 31) {
                (Mnemonic::BnWsrw, Args::Wsr { wreg: wrs1, wsr })
            } else {
                (Mnemonic::BnWsrr, Args::Wsr { wreg: wrd, wsr })
            }
        }
        _ => return None,
    };
    Some(decoded)
}

fn decode_custom1(funct3: u8, instr: u32) -> Option<(Mnemonic, Args)> {
    let wrd = decode_rd(instr);
    let wrs1 = decode_rs1(instr);
    let wrs2 = decode_rs2(instr);
    let fg = flag_group(instr);
    let sub = bit(instr, 30);

    let three = |mnemonic| {
        (
            mnemonic,
            Args::Bn {
                wrd,
                wrs1,
                wrs2,
                shift: shift(instr),
                fg,
            },
        )
    };

    let decoded = match funct3 {
        0b000 => three(Mnemonic::BnAdd),
        0b001 => three(Mnemonic::BnSub),
        0b010 => three(Mnemonic::BnAddc),
        0b011 => three(Mnemonic::BnSubb),
        0b100 => (
            if sub { Mnemonic::BnSubi } else { Mnemonic::BnAddi },
            Args::BnImm {
                wrd,
                wrs: wrs1,
                imm: bits(instr, 29, 20) as u16,
                fg,
            },
        ),
        0b101 => (
            if sub { Mnemonic::BnSubm } else { Mnemonic::BnAddm },
            Args::Bn {
                wrd,
                wrs1,
                wrs2,
                shift: Shift::NONE,
                fg: FlagGroup::Fg0,
            },
        ),
        _ => return None,
    };
    Some(decoded)
}

const fn decode_custom2(instr: u32) -> (Mnemonic, Args) {
    let mnemonic = match bits(instr, 30, 29) {
        0b00 => Mnemonic::BnMulqacc,
        0b01 => Mnemonic::BnMulqaccWo,
        _ => Mnemonic::BnMulqaccSo,
    };
    (
        mnemonic,
        Args::BnMulqacc {
            wrd: decode_rd(instr),
            wrs1: decode_rs1(instr),
            wrs1_qwsel: bits(instr, 26, 25) as u8,
            wrs2: decode_rs2(instr),
            wrs2_qwsel: bits(instr, 28, 27) as u8,
            acc_shift: bits(instr, 14, 13) as u8,
            zero_acc: bit(instr, 12),
            upper: bits(instr, 30, 29) == 0b11,
            fg: flag_group(instr),
        },
    )
}

fn decode_custom3(funct3: u8, instr: u32) -> Option<(Mnemonic, Args)> {
    let wrd = decode_rd(instr);
    let wrs1 = decode_rs1(instr);
    let wrs2 = decode_rs2(instr);
    let fg = flag_group(instr);

    let logical = |mnemonic| {
        (
            mnemonic,
            Args::Bn {
                wrd,
                wrs1,
                wrs2,
                shift: shift(instr),
                fg,
            },
        )
    };

    let decoded = match funct3 {
        0b000 | 0b001 => {
            let bodysize = bits(instr, 31, 20) as u16;
            if bodysize == 0 {
                return None;
            }
            if funct3 == 0b000 {
                (
                    Mnemonic::Loop,
                    Args::Loop {
                        grs: wrs1,
                        bodysize,
                    },
                )
            } else {
                let iterations = ((bits(instr, 19, 15) << 5) | bits(instr, 11, 7)) as u16;
                (
                    Mnemonic::Loopi,
                    Args::LoopI {
                        iterations,
                        bodysize,
                    },
                )
            }
        }
        0b010 => logical(Mnemonic::BnAnd),
        0b100 => logical(Mnemonic::BnOr),
        0b110 => logical(Mnemonic::BnXor),
        0b101 => (
            Mnemonic::BnNot,
            Args::BnNot {
                wrd,
                wrs: wrs2,
                shift: shift(instr),
                fg,
            },
        ),
        _ => (
            // 0b011 and 0b111: bit 14 is the low bit of the shift amount.
            Mnemonic::BnRshi,
            Args::BnRshi {
                wrd,
                wrs1,
                wrs2,
                imm: ((bits(instr, 31, 25) << 1) | bits(instr, 14, 14)) as u8,
            },
        ),
    };
    Some(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_base() {
        // addi x1, x2, 100
        let op = decode(0x0641_0093).unwrap();
        assert_eq!(op.mnemonic, Mnemonic::Addi);
        assert_eq!(
            op.args,
            Args::I {
                rd: 1,
                rs1: 2,
                imm: 100
            }
        );

        // bne x5, x0, -4
        let op = decode(0xFE02_9EE3).unwrap();
        assert_eq!(op.mnemonic, Mnemonic::Bne);
        assert_eq!(
            op.args,
            Args::B {
                rs1: 5,
                rs2: 0,
                imm: -4
            }
        );

        assert_eq!(decode(0x0000_0073).unwrap().mnemonic, Mnemonic::Ecall);
        // jalr x0, 0(x1)
        assert_eq!(decode(0x0000_8067).unwrap().mnemonic, Mnemonic::Jalr);
    }

    #[test]
    fn test_decode_rejects_unsupported() {
        // blt x1, x2, 0 is not part of OTBN
        assert!(decode(0x0020_C063).is_none());
        // lb x1, 0(x2)
        assert!(decode(0x0001_0083).is_none());
        // csrrs x1, mstatus, x0
        assert!(decode(0x3000_20F3).is_none());
        assert!(decode(0xFFFF_FFFF).is_none());
    }

    #[test]
    fn test_decode_csr() {
        // csrrs x2, 0x7c0, x0
        let op = decode(0x7C00_2173).unwrap();
        assert_eq!(op.mnemonic, Mnemonic::Csrrs);
        assert_eq!(
            op.args,
            Args::Csr {
                rd: 2,
                rs1: 0,
                csr: 0x7C0
            }
        );
    }

    #[test]
    fn test_decode_loops() {
        // loop x5, 3
        let word = (3 << 20) | (5 << 15) | u32::from(OPC_CUSTOM3);
        let op = decode(word).unwrap();
        assert_eq!(op.mnemonic, Mnemonic::Loop);
        assert_eq!(op.args, Args::Loop { grs: 5, bodysize: 3 });

        // loopi 40, 2 -> iterations split as {[19:15], [11:7]}
        let word = (2 << 20) | (1 << 15) | (1 << 12) | (8 << 7) | u32::from(OPC_CUSTOM3);
        let op = decode(word).unwrap();
        assert_eq!(
            op.args,
            Args::LoopI {
                iterations: 40,
                bodysize: 2
            }
        );

        // empty body
        assert!(decode((5 << 15) | u32::from(OPC_CUSTOM3)).is_none());
    }

    #[test]
    fn test_decode_bignum() {
        // bn.add w1, w2, w3 >> 16, FG1
        let word = (1 << 31)
            | (1 << 30)
            | (2 << 25)
            | (3 << 20)
            | (2 << 15)
            | (1 << 7)
            | u32::from(OPC_CUSTOM1);
        let op = decode(word).unwrap();
        assert_eq!(op.mnemonic, Mnemonic::BnAdd);
        assert_eq!(
            op.args,
            Args::Bn {
                wrd: 1,
                wrs1: 2,
                wrs2: 3,
                shift: Shift {
                    kind: ShiftKind::Right,
                    bytes: 2
                },
                fg: FlagGroup::Fg1,
            }
        );

        // bn.wsrr w4, ACC
        let word = (3 << 20) | (0b111 << 12) | (4 << 7) | u32::from(OPC_CUSTOM0);
        let op = decode(word).unwrap();
        assert_eq!(op.mnemonic, Mnemonic::BnWsrr);
        assert_eq!(
            op.args,
            Args::Wsr {
                wreg: 4,
                wsr: SpecialReg::Acc
            }
        );

        // unknown WSR index
        let word = (9 << 20) | (0b111 << 12) | u32::from(OPC_CUSTOM0);
        assert!(decode(word).is_none());

        // bn.movr x2++, x3
        let word = (1 << 31) | (2 << 20) | (3 << 15) | (0b110 << 12) | (1 << 7) | u32::from(OPC_CUSTOM0);
        let op = decode(word).unwrap();
        assert_eq!(
            op.args,
            Args::BnMovr {
                grd: 2,
                grs: 3,
                grd_inc: true,
                grs_inc: false
            }
        );
    }
}
