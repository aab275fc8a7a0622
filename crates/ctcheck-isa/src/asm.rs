//! Assembler for textual OTBN listings.
//!
//! The accepted syntax is a small subset of the OTBN assembler: one
//! statement per line, `label:` definitions, `#` comments, decimal or hex
//! immediates and label operands for branch and jump targets. Statements
//! are laid out at consecutive 4-byte addresses starting from a base.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::csr::Csr;
use crate::location::parse_indexed;
use crate::op::{Args, Mnemonic, Op, Shift, ShiftKind};
use crate::semantics::INSN_BYTES;
use crate::{Flag, FlagGroup, SpecialReg};

/// Assembly failure, tagged with its 1-based source line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct AsmError {
    pub line: usize,
    pub message: String,
}

/// Output of the assembler: addressed ops plus every label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub instructions: Vec<(u32, Op)>,
    pub symbols: BTreeMap<String, u32>,
}

/// Assemble a listing starting at address 0.
pub fn assemble(source: &str) -> Result<Listing, AsmError> {
    assemble_at(source, 0)
}

/// Assemble a listing starting at `base`.
pub fn assemble_at(source: &str, base: u32) -> Result<Listing, AsmError> {
    let mut symbols = BTreeMap::new();
    let mut stmts = Vec::new();
    let mut pc = base;

    for (idx, raw) in source.lines().enumerate() {
        let line = idx + 1;
        let err = |message: String| AsmError { line, message };

        let mut text = raw.split('#').next().unwrap_or_default().trim();
        while let Some((label, rest)) = split_label(text) {
            if symbols.insert(label.to_string(), pc).is_some() {
                return Err(err(format!("duplicate label `{label}`")));
            }
            text = rest;
        }
        if text.is_empty() {
            continue;
        }

        let (mnemonic, operands) = match text.split_once(char::is_whitespace) {
            Some((m, rest)) => (m.to_ascii_lowercase(), split_operands(rest)),
            None => (text.to_ascii_lowercase(), Vec::new()),
        };

        if let Some(directive) = mnemonic.strip_prefix('.') {
            if directive == "org" {
                let [addr] = operands.as_slice() else {
                    return Err(err("`.org` takes one address".to_string()));
                };
                let addr = u32::try_from(parse_int(addr).map_err(err)?)
                    .map_err(|_| err(format!("address `{addr}` out of range")))?;
                if addr < pc {
                    return Err(err(format!("`.org {addr:#x}` moves backwards")));
                }
                pc = addr;
            }
            // Section and symbol directives carry no code.
            continue;
        }

        let count = statement_len(&mnemonic, &operands).map_err(err)?;
        stmts.push(Statement {
            line,
            pc,
            mnemonic,
            operands,
        });
        pc = pc.wrapping_add(count * INSN_BYTES);
    }

    let asm = Assembler { symbols };
    let mut instructions = Vec::with_capacity(stmts.len());
    for stmt in &stmts {
        let ops = asm.lower(stmt).map_err(|message| AsmError {
            line: stmt.line,
            message,
        })?;
        let mut pc = stmt.pc;
        for op in ops {
            instructions.push((pc, op));
            pc = pc.wrapping_add(INSN_BYTES);
        }
    }

    Ok(Listing {
        instructions,
        symbols: asm.symbols,
    })
}

type Res<T> = Result<T, String>;

struct Statement {
    line: usize,
    pc: u32,
    mnemonic: String,
    operands: Vec<String>,
}

fn split_label(text: &str) -> Option<(&str, &str)> {
    let (label, rest) = text.split_once(':')?;
    let label = label.trim();
    let valid = !label.is_empty()
        && !label.starts_with(|c: char| c.is_ascii_digit())
        && label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '$');
    valid.then(|| (label, rest.trim()))
}

fn split_operands(rest: &str) -> Vec<String> {
    rest.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Number of machine instructions a statement expands to.
fn statement_len(mnemonic: &str, operands: &[String]) -> Res<u32> {
    if mnemonic != "li" {
        return Ok(1);
    }
    let [_, value] = operands else {
        return Err("`li` takes a register and a value".to_string());
    };
    Ok(li_parts(parse_u32(value)?).len() as u32)
}

/// Split a 32-bit constant into `lui` upper bits and an `addi` low part.
fn li_parts(value: u32) -> Vec<(Mnemonic, i32)> {
    let signed = value as i32;
    if (-2048..2048).contains(&signed) {
        return vec![(Mnemonic::Addi, signed)];
    }
    let upper = value.wrapping_add(0x800) & 0xFFFF_F000;
    let lower = value.wrapping_sub(upper) as i32;
    let mut parts = vec![(Mnemonic::Lui, upper as i32)];
    if lower != 0 {
        parts.push((Mnemonic::Addi, lower));
    }
    parts
}

fn parse_int(s: &str) -> Res<i64> {
    let s = s.trim();
    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let value = match body
        .strip_prefix("0x")
        .or_else(|| body.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => body.parse::<i64>(),
    }
    .map_err(|_| format!("invalid number `{s}`"))?;
    Ok(if negative { -value } else { value })
}

/// Accepts both signed and unsigned spellings of a 32-bit value.
fn parse_u32(s: &str) -> Res<u32> {
    let value = parse_int(s)?;
    if (i64::from(i32::MIN)..=i64::from(u32::MAX)).contains(&value) {
        Ok(value as u32)
    } else {
        Err(format!("value `{s}` does not fit in 32 bits"))
    }
}

fn parse_ranged(s: &str, min: i64, max: i64) -> Res<i64> {
    let value = parse_int(s)?;
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(format!("immediate `{s}` out of range {min}..={max}"))
    }
}

const ABI_NAMES: [&str; 32] = [
    "zero", "ra", "sp", "gp", "tp", "t0", "t1", "t2", "s0", "s1", "a0", "a1", "a2", "a3", "a4",
    "a5", "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "t3", "t4",
    "t5", "t6",
];

fn parse_gpr(s: &str) -> Res<u8> {
    let name = s.trim().to_ascii_lowercase();
    if let Some(reg) = parse_indexed(&name, 'x') {
        return Ok(reg);
    }
    if name == "fp" {
        return Ok(8);
    }
    ABI_NAMES
        .iter()
        .position(|abi| *abi == name)
        .map(|idx| idx as u8)
        .ok_or_else(|| format!("expected a general-purpose register, found `{s}`"))
}

fn parse_wdr(s: &str) -> Res<u8> {
    parse_indexed(&s.trim().to_ascii_lowercase(), 'w')
        .ok_or_else(|| format!("expected a wide register, found `{s}`"))
}

/// `x2` or `x2++`
fn parse_gpr_inc(s: &str) -> Res<(u8, bool)> {
    let s = s.trim();
    match s.strip_suffix("++") {
        Some(reg) => Ok((parse_gpr(reg)?, true)),
        None => Ok((parse_gpr(s)?, false)),
    }
}

/// `offset(reg)`, with an optional `++` on the register.
fn parse_mem(s: &str) -> Res<(i64, &str)> {
    let s = s.trim();
    let open = s
        .find('(')
        .ok_or_else(|| format!("expected `offset(reg)`, found `{s}`"))?;
    let inner = s[open + 1..]
        .strip_suffix(')')
        .ok_or_else(|| format!("unterminated memory operand `{s}`"))?;
    let offset = match s[..open].trim() {
        "" => 0,
        off => parse_int(off)?,
    };
    Ok((offset, inner.trim()))
}

/// `w3`, `w3 >> 128` or `w3 << 8`
fn parse_shifted(s: &str) -> Res<(u8, Shift)> {
    let (reg, kind, amount) = if let Some((reg, bits)) = s.split_once(">>") {
        (reg, ShiftKind::Right, bits)
    } else if let Some((reg, bits)) = s.split_once("<<") {
        (reg, ShiftKind::Left, bits)
    } else {
        return Ok((parse_wdr(s)?, Shift::NONE));
    };
    let bits = parse_ranged(amount, 0, 248)?;
    if bits % 8 != 0 {
        return Err(format!("shift `{s}` is not a whole number of bytes"));
    }
    Ok((
        parse_wdr(reg)?,
        Shift {
            kind,
            bytes: (bits / 8) as u8,
        },
    ))
}

fn parse_fg(s: &str) -> Option<FlagGroup> {
    match s.trim().to_ascii_lowercase().as_str() {
        "fg0" => Some(FlagGroup::Fg0),
        "fg1" => Some(FlagGroup::Fg1),
        _ => None,
    }
}

/// `C`, `FG1.Z`, ...
fn parse_flag(s: &str) -> Res<(FlagGroup, Flag)> {
    let lower = s.trim().to_ascii_lowercase();
    let (fg, name) = match lower.split_once('.') {
        Some((fg, name)) => (
            parse_fg(fg).ok_or_else(|| format!("unknown flag group in `{s}`"))?,
            name.to_string(),
        ),
        None => (FlagGroup::Fg0, lower),
    };
    let flag = match name.as_str() {
        "c" => Flag::C,
        "m" => Flag::M,
        "l" => Flag::L,
        "z" => Flag::Z,
        _ => return Err(format!("unknown flag `{s}`")),
    };
    Ok((fg, flag))
}

fn parse_wsr(s: &str) -> Res<SpecialReg> {
    let name = s.trim().to_ascii_lowercase();
    if let Some(reg) = SpecialReg::ALL.iter().find(|reg| reg.name() == name) {
        return Ok(*reg);
    }
    let idx = parse_int(&name).map_err(|_| format!("unknown WSR `{s}`"))?;
    u32::try_from(idx)
        .ok()
        .and_then(SpecialReg::from_wsr)
        .ok_or_else(|| format!("unknown WSR `{s}`"))
}

fn parse_csr(s: &str) -> Res<u16> {
    if let Some(csr) = Csr::from_name(s.trim()) {
        return Ok(csr.addr());
    }
    let addr = parse_ranged(s, 0, 0xFFF).map_err(|_| format!("unknown CSR `{s}`"))? as u16;
    Csr::from_addr(addr)
        .map(Csr::addr)
        .ok_or_else(|| format!("unknown CSR `{s}`"))
}

/// `w3.2` for mulqacc operands.
fn parse_qw(s: &str) -> Res<(u8, u8)> {
    let (reg, sel) = s
        .split_once('.')
        .ok_or_else(|| format!("expected `wN.Q`, found `{s}`"))?;
    Ok((parse_wdr(reg)?, parse_ranged(sel, 0, 3)? as u8))
}

/// Drop a trailing flag-group operand.
fn take_fg(ops: &[String]) -> (&[String], FlagGroup) {
    match ops.split_last() {
        Some((last, rest)) => match parse_fg(last) {
            Some(fg) => (rest, fg),
            None => (ops, FlagGroup::Fg0),
        },
        None => (ops, FlagGroup::Fg0),
    }
}

fn arity(mnemonic: &str, ops: &[String], n: usize) -> Res<()> {
    if ops.len() == n {
        Ok(())
    } else {
        Err(format!(
            "`{mnemonic}` takes {n} operand(s), found {}",
            ops.len()
        ))
    }
}

struct Assembler {
    symbols: BTreeMap<String, u32>,
}

impl Assembler {
    /// PC-relative offset to a label or absolute address.
    fn offset(&self, s: &str, pc: u32) -> Res<i32> {
        let s = s.trim();
        let addr = match self.symbols.get(s) {
            Some(addr) => *addr,
            None => parse_u32(s).map_err(|_| format!("undefined label `{s}`"))?,
        };
        Ok(addr.wrapping_sub(pc) as i32)
    }

    fn lower(&self, stmt: &Statement) -> Res<Vec<Op>> {
        let m = stmt.mnemonic.as_str();
        let ops = stmt.operands.as_slice();
        let one = |mnemonic, args| Ok(vec![Op::new(mnemonic, args)]);

        // Pseudo-instructions first.
        match m {
            "nop" => {
                arity(m, ops, 0)?;
                return one(
                    Mnemonic::Addi,
                    Args::I {
                        rd: 0,
                        rs1: 0,
                        imm: 0,
                    },
                );
            }
            "li" => {
                arity(m, ops, 2)?;
                let rd = parse_gpr(&ops[0])?;
                let parts = li_parts(parse_u32(&ops[1])?);
                // The low part of a two-instruction `li` adds onto the `lui` result.
                let rs1 = if parts.len() > 1 { rd } else { 0 };
                return Ok(parts
                    .into_iter()
                    .map(|(mnemonic, imm)| match mnemonic {
                        Mnemonic::Lui => Op::new(mnemonic, Args::U { rd, imm }),
                        _ => Op::new(mnemonic, Args::I { rd, rs1, imm }),
                    })
                    .collect());
            }
            "mv" => {
                arity(m, ops, 2)?;
                return one(
                    Mnemonic::Addi,
                    Args::I {
                        rd: parse_gpr(&ops[0])?,
                        rs1: parse_gpr(&ops[1])?,
                        imm: 0,
                    },
                );
            }
            "ret" => {
                arity(m, ops, 0)?;
                return one(
                    Mnemonic::Jalr,
                    Args::I {
                        rd: 0,
                        rs1: 1,
                        imm: 0,
                    },
                );
            }
            "j" => {
                arity(m, ops, 1)?;
                return one(
                    Mnemonic::Jal,
                    Args::J {
                        rd: 0,
                        imm: self.offset(&ops[0], stmt.pc)?,
                    },
                );
            }
            "jr" => {
                arity(m, ops, 1)?;
                return one(
                    Mnemonic::Jalr,
                    Args::I {
                        rd: 0,
                        rs1: parse_gpr(&ops[0])?,
                        imm: 0,
                    },
                );
            }
            "beqz" | "bnez" => {
                arity(m, ops, 2)?;
                let mnemonic = if m == "beqz" {
                    Mnemonic::Beq
                } else {
                    Mnemonic::Bne
                };
                return one(
                    mnemonic,
                    Args::B {
                        rs1: parse_gpr(&ops[0])?,
                        rs2: 0,
                        imm: self.offset(&ops[1], stmt.pc)?,
                    },
                );
            }
            "csrr" => {
                arity(m, ops, 2)?;
                return one(
                    Mnemonic::Csrrs,
                    Args::Csr {
                        rd: parse_gpr(&ops[0])?,
                        rs1: 0,
                        csr: parse_csr(&ops[1])?,
                    },
                );
            }
            "csrw" => {
                arity(m, ops, 2)?;
                return one(
                    Mnemonic::Csrrw,
                    Args::Csr {
                        rd: 0,
                        rs1: parse_gpr(&ops[1])?,
                        csr: parse_csr(&ops[0])?,
                    },
                );
            }
            _ => {}
        }

        let (base, zero_acc) = match m.strip_suffix(".z") {
            Some(base) if base.starts_with("bn.mulqacc") => (base, true),
            _ => (m, false),
        };
        let mnemonic =
            Mnemonic::from_name(base).ok_or_else(|| format!("unknown instruction `{m}`"))?;
        let args = self.args(mnemonic, ops, stmt.pc, zero_acc)?;
        one(mnemonic, args)
    }

    #[allow(clippy::too_many_lines)]
    fn args(&self, mnemonic: Mnemonic, ops: &[String], pc: u32, zero_acc: bool) -> Res<Args> {
        use Mnemonic as M;

        let name = mnemonic.name();
        let args = match mnemonic {
            M::Add | M::Sub | M::Sll | M::Srl | M::Sra | M::And | M::Or | M::Xor => {
                arity(name, ops, 3)?;
                Args::R {
                    rd: parse_gpr(&ops[0])?,
                    rs1: parse_gpr(&ops[1])?,
                    rs2: parse_gpr(&ops[2])?,
                }
            }
            M::Addi | M::Andi | M::Ori | M::Xori => {
                arity(name, ops, 3)?;
                Args::I {
                    rd: parse_gpr(&ops[0])?,
                    rs1: parse_gpr(&ops[1])?,
                    imm: parse_ranged(&ops[2], -2048, 2047)? as i32,
                }
            }
            M::Slli | M::Srli | M::Srai => {
                arity(name, ops, 3)?;
                Args::I {
                    rd: parse_gpr(&ops[0])?,
                    rs1: parse_gpr(&ops[1])?,
                    imm: parse_ranged(&ops[2], 0, 31)? as i32,
                }
            }
            M::Lui => {
                arity(name, ops, 2)?;
                Args::U {
                    rd: parse_gpr(&ops[0])?,
                    imm: (parse_ranged(&ops[1], 0, 0xF_FFFF)? << 12) as u32 as i32,
                }
            }
            M::Lw => {
                arity(name, ops, 2)?;
                let (offset, base) = parse_mem(&ops[1])?;
                Args::I {
                    rd: parse_gpr(&ops[0])?,
                    rs1: parse_gpr(base)?,
                    imm: check_imm12(offset)?,
                }
            }
            M::Sw => {
                arity(name, ops, 2)?;
                let (offset, base) = parse_mem(&ops[1])?;
                Args::S {
                    rs1: parse_gpr(base)?,
                    rs2: parse_gpr(&ops[0])?,
                    imm: check_imm12(offset)?,
                }
            }
            M::Beq | M::Bne => {
                arity(name, ops, 3)?;
                Args::B {
                    rs1: parse_gpr(&ops[0])?,
                    rs2: parse_gpr(&ops[1])?,
                    imm: self.offset(&ops[2], pc)?,
                }
            }
            M::Jal => match ops {
                [target] => Args::J {
                    rd: 1,
                    imm: self.offset(target, pc)?,
                },
                [rd, target] => Args::J {
                    rd: parse_gpr(rd)?,
                    imm: self.offset(target, pc)?,
                },
                _ => return Err(format!("`{name}` takes 1 or 2 operands")),
            },
            M::Jalr => match ops {
                [rd, mem] if mem.contains('(') => {
                    let (offset, base) = parse_mem(mem)?;
                    Args::I {
                        rd: parse_gpr(rd)?,
                        rs1: parse_gpr(base)?,
                        imm: check_imm12(offset)?,
                    }
                }
                [rd, rs1, imm] => Args::I {
                    rd: parse_gpr(rd)?,
                    rs1: parse_gpr(rs1)?,
                    imm: parse_ranged(imm, -2048, 2047)? as i32,
                },
                _ => return Err(format!("`{name}` takes `rd, offset(rs1)`")),
            },
            M::Csrrs | M::Csrrw => {
                arity(name, ops, 3)?;
                Args::Csr {
                    rd: parse_gpr(&ops[0])?,
                    csr: parse_csr(&ops[1])?,
                    rs1: parse_gpr(&ops[2])?,
                }
            }
            M::Ecall => {
                arity(name, ops, 0)?;
                Args::None
            }
            M::Loop => {
                arity(name, ops, 2)?;
                Args::Loop {
                    grs: parse_gpr(&ops[0])?,
                    bodysize: parse_ranged(&ops[1], 1, 0xFFF)? as u16,
                }
            }
            M::Loopi => {
                arity(name, ops, 2)?;
                Args::LoopI {
                    iterations: parse_ranged(&ops[0], 0, 0x3FF)? as u16,
                    bodysize: parse_ranged(&ops[1], 1, 0xFFF)? as u16,
                }
            }
            M::BnAdd | M::BnAddc | M::BnSub | M::BnSubb | M::BnAnd | M::BnOr | M::BnXor => {
                let (ops, fg) = take_fg(ops);
                arity(name, ops, 3)?;
                let (wrs2, shift) = parse_shifted(&ops[2])?;
                Args::Bn {
                    wrd: parse_wdr(&ops[0])?,
                    wrs1: parse_wdr(&ops[1])?,
                    wrs2,
                    shift,
                    fg,
                }
            }
            M::BnAddm | M::BnSubm => {
                arity(name, ops, 3)?;
                Args::Bn {
                    wrd: parse_wdr(&ops[0])?,
                    wrs1: parse_wdr(&ops[1])?,
                    wrs2: parse_wdr(&ops[2])?,
                    shift: Shift::NONE,
                    fg: FlagGroup::Fg0,
                }
            }
            M::BnCmp | M::BnCmpb => {
                let (ops, fg) = take_fg(ops);
                arity(name, ops, 2)?;
                let (wrs2, shift) = parse_shifted(&ops[1])?;
                Args::Bn {
                    wrd: 0,
                    wrs1: parse_wdr(&ops[0])?,
                    wrs2,
                    shift,
                    fg,
                }
            }
            M::BnAddi | M::BnSubi => {
                let (ops, fg) = take_fg(ops);
                arity(name, ops, 3)?;
                Args::BnImm {
                    wrd: parse_wdr(&ops[0])?,
                    wrs: parse_wdr(&ops[1])?,
                    imm: parse_ranged(&ops[2], 0, 0x3FF)? as u16,
                    fg,
                }
            }
            M::BnNot => {
                let (ops, fg) = take_fg(ops);
                arity(name, ops, 2)?;
                let (wrs, shift) = parse_shifted(&ops[1])?;
                Args::BnNot {
                    wrd: parse_wdr(&ops[0])?,
                    wrs,
                    shift,
                    fg,
                }
            }
            M::BnRshi => {
                arity(name, ops, 3)?;
                let (wrs2, imm) = ops[2]
                    .split_once(">>")
                    .ok_or_else(|| format!("`{name}` needs `wrs2 >> imm`"))?;
                Args::BnRshi {
                    wrd: parse_wdr(&ops[0])?,
                    wrs1: parse_wdr(&ops[1])?,
                    wrs2: parse_wdr(wrs2)?,
                    imm: parse_ranged(imm, 0, 255)? as u8,
                }
            }
            M::BnSel => {
                arity(name, ops, 4)?;
                let (fg, flag) = parse_flag(&ops[3])?;
                Args::BnSel {
                    wrd: parse_wdr(&ops[0])?,
                    wrs1: parse_wdr(&ops[1])?,
                    wrs2: parse_wdr(&ops[2])?,
                    fg,
                    flag,
                }
            }
            M::BnMulqacc | M::BnMulqaccWo | M::BnMulqaccSo => {
                let (ops, fg) = take_fg(ops);
                let (wrd, upper, rest) = match mnemonic {
                    M::BnMulqacc => (0, false, ops),
                    _ => {
                        let (first, rest) = ops
                            .split_first()
                            .ok_or_else(|| format!("`{name}` needs a destination"))?;
                        if mnemonic == M::BnMulqaccSo {
                            let (reg, half) = first
                                .split_once('.')
                                .ok_or_else(|| format!("`{name}` needs `wrd.U` or `wrd.L`"))?;
                            let upper = match half.trim().to_ascii_lowercase().as_str() {
                                "u" => true,
                                "l" => false,
                                _ => return Err(format!("bad half selector in `{first}`")),
                            };
                            (parse_wdr(reg)?, upper, rest)
                        } else {
                            (parse_wdr(first)?, false, rest)
                        }
                    }
                };
                arity(name, rest, 3)?;
                let (wrs1, wrs1_qwsel) = parse_qw(&rest[0])?;
                let (wrs2, wrs2_qwsel) = parse_qw(&rest[1])?;
                let acc_shift = parse_ranged(&rest[2], 0, 192)?;
                if acc_shift % 64 != 0 {
                    return Err(format!("accumulator shift `{}` is not a multiple of 64", rest[2]));
                }
                Args::BnMulqacc {
                    wrd,
                    wrs1,
                    wrs1_qwsel,
                    wrs2,
                    wrs2_qwsel,
                    acc_shift: (acc_shift / 64) as u8,
                    zero_acc,
                    upper,
                    fg,
                }
            }
            M::BnLid => {
                arity(name, ops, 2)?;
                let (grd, grd_inc) = parse_gpr_inc(&ops[0])?;
                let (offset, base) = parse_mem(&ops[1])?;
                let (grs1, grs1_inc) = parse_gpr_inc(base)?;
                if grd_inc && grs1_inc {
                    return Err(format!("`{name}` can increment only one register"));
                }
                Args::BnLoad {
                    grd,
                    grs1,
                    offset: check_wide_offset(offset)?,
                    grd_inc,
                    grs1_inc,
                }
            }
            M::BnSid => {
                arity(name, ops, 2)?;
                let (grs2, grs2_inc) = parse_gpr_inc(&ops[0])?;
                let (offset, base) = parse_mem(&ops[1])?;
                let (grs1, grs1_inc) = parse_gpr_inc(base)?;
                if grs2_inc && grs1_inc {
                    return Err(format!("`{name}` can increment only one register"));
                }
                Args::BnStore {
                    grs1,
                    grs2,
                    offset: check_wide_offset(offset)?,
                    grs1_inc,
                    grs2_inc,
                }
            }
            M::BnMov => {
                arity(name, ops, 2)?;
                Args::BnMov {
                    wrd: parse_wdr(&ops[0])?,
                    wrs: parse_wdr(&ops[1])?,
                }
            }
            M::BnMovr => {
                arity(name, ops, 2)?;
                let (grd, grd_inc) = parse_gpr_inc(&ops[0])?;
                let (grs, grs_inc) = parse_gpr_inc(&ops[1])?;
                if grd_inc && grs_inc {
                    return Err(format!("`{name}` can increment only one register"));
                }
                Args::BnMovr {
                    grd,
                    grs,
                    grd_inc,
                    grs_inc,
                }
            }
            M::BnWsrr => {
                arity(name, ops, 2)?;
                Args::Wsr {
                    wreg: parse_wdr(&ops[0])?,
                    wsr: parse_wsr(&ops[1])?,
                }
            }
            M::BnWsrw => {
                arity(name, ops, 2)?;
                Args::Wsr {
                    wsr: parse_wsr(&ops[0])?,
                    wreg: parse_wdr(&ops[1])?,
                }
            }
        };
        Ok(args)
    }
}

fn check_imm12(offset: i64) -> Res<i32> {
    if (-2048..=2047).contains(&offset) {
        Ok(offset as i32)
    } else {
        Err(format!("offset {offset} out of range -2048..=2047"))
    }
}

fn check_wide_offset(offset: i64) -> Res<i32> {
    if offset % 32 != 0 || !(-16384..=16352).contains(&offset) {
        return Err(format!("offset {offset} is not a 32-byte aligned 10-bit word offset"));
    }
    Ok(offset as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops(listing: &Listing) -> Vec<(u32, String)> {
        listing
            .instructions
            .iter()
            .map(|(pc, op)| (*pc, op.to_string()))
            .collect()
    }

    #[test]
    fn test_labels_and_branches() {
        let src = "
            start:
                addi x5, x0, 3   # counter
            loop_top: addi x5, x5, -1
                bne x5, x0, loop_top
                ecall
        ";
        let listing = assemble(src).unwrap();
        assert_eq!(listing.symbols["start"], 0);
        assert_eq!(listing.symbols["loop_top"], 4);
        assert_eq!(
            ops(&listing),
            vec![
                (0, "addi x5, x0, 3".to_string()),
                (4, "addi x5, x5, -1".to_string()),
                (8, "bne x5, x0, -4".to_string()),
                (12, "ecall".to_string()),
            ]
        );
    }

    #[test]
    fn test_pseudos() {
        let src = "
            li x2, 0x12345678
            li x3, -1
            mv x4, x3
            beqz x4, done
            j done
            nop
        done:
            ret
        ";
        let listing = assemble(src).unwrap();
        let got = ops(&listing);
        assert_eq!(got[0], (0, "lui x2, 0x12345".to_string()));
        assert_eq!(got[1], (4, "addi x2, x2, 1656".to_string()));
        assert_eq!(got[2], (8, "addi x3, x0, -1".to_string()));
        assert_eq!(got[3], (12, "addi x4, x3, 0".to_string()));
        assert_eq!(got[4], (16, "beq x4, x0, +12".to_string()));
        assert_eq!(got[5], (20, "jal x0, +8".to_string()));
        assert_eq!(got[7], (28, "jalr x0, 0(x1)".to_string()));
        assert_eq!(listing.symbols["done"], 28);
    }

    #[test]
    fn test_bignum_syntax() {
        let src = "
            bn.add w1, w2, w3 >> 128, FG1
            bn.sel w4, w5, w6, FG0.Z
            bn.mulqacc.wo.z w7, w8.1, w9.2, 64
            bn.lid x2, 32(x3++)
            bn.movr x4++, x5
            bn.wsrr w10, ACC
            loopi 4, 2
        ";
        let listing = assemble(src).unwrap();
        let got: Vec<String> = ops(&listing).into_iter().map(|(_, s)| s).collect();
        assert_eq!(got[0], "bn.add w1, w2, w3 >> 128, FG1");
        assert_eq!(got[1], "bn.sel w4, w5, w6, FG0.Z");
        assert_eq!(got[2], "bn.mulqacc.wo.z w7, w8.1, w9.2, 64");
        assert_eq!(got[3], "bn.lid x2, 32(x3++)");
        assert_eq!(got[4], "bn.movr x4++, x5");
        assert_eq!(got[5], "bn.wsrr w10, ACC");
        assert_eq!(got[6], "loopi 4, 2");
    }

    #[test]
    fn test_errors_carry_line() {
        let err = assemble("addi x1, x0, 1\nfrobnicate x1\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("frobnicate"));

        let err = assemble("beq x1, x0, nowhere").unwrap_err();
        assert_eq!(err.line, 1);

        let err = assemble("loop x2, 0").unwrap_err();
        assert!(err.message.contains("out of range"));

        let err = assemble("a:\na:\n").unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_org_and_base() {
        let listing = assemble_at("nop\n.org 0x40\nf: ecall\n", 0x10).unwrap();
        assert_eq!(listing.instructions[0].0, 0x10);
        assert_eq!(listing.symbols["f"], 0x40);
    }
}
