//! Per-instruction dataflow semantics.
//!
//! Every decoded op is lowered to a list of [`Flow`]s, one per written
//! location, and a [`Control`] descriptor. All flows of an instruction read
//! the state from *before* the instruction; the analysis applies them as a
//! parallel assignment.

use std::collections::BTreeSet;
use std::fmt::{self, Display};

use crate::csr::Csr;
use crate::op::{Args, Mnemonic, Op};
use crate::{CALL_STACK_GPR, Flag, FlagGroup, Location, NUM_WDRS, SpecialReg};

/// Bytes per instruction.
pub const INSN_BYTES: u32 = 4;
/// Bytes per wide data word in DMEM.
const WLEN_BYTES: i32 = 32;

/// Destination or source of a flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Place {
    Loc(Location),
    /// The wide register whose index is held in GPR `x[n]`.
    IndirectWdr(u8),
}

impl From<Location> for Place {
    fn from(loc: Location) -> Self {
        Self::Loc(loc)
    }
}

impl Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loc(loc) => write!(f, "{loc}"),
            Self::IndirectWdr(gpr) => write!(f, "w[x{gpr}]"),
        }
    }
}

/// Constant value written by a GPR flow, as far as it is statically known.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Value {
    #[default]
    Unknown,
    Imm(u32),
    /// `x[src] + imm` (wrapping).
    AddImm { src: u8, imm: i32 },
}

/// `dest <- sources`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Flow {
    pub dest: Place,
    pub sources: Vec<Place>,
    pub value: Value,
}

impl Flow {
    fn new(dest: impl Into<Place>, sources: Vec<Place>) -> Self {
        Self {
            dest: dest.into(),
            sources,
            value: Value::Unknown,
        }
    }

    fn with_value(mut self, value: Value) -> Self {
        self.value = value;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CondKind {
    Eq,
    Ne,
    /// Remaining iteration count of a hardware loop.
    LoopCount,
}

/// Branch condition: an operator over modeled locations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Condition {
    pub kind: CondKind,
    pub operands: Vec<Location>,
}

impl Condition {
    fn new(kind: CondKind, operands: impl IntoIterator<Item = Location>) -> Self {
        Self {
            kind,
            operands: operands
                .into_iter()
                .filter(|loc| !loc.is_hardwired_zero())
                .collect(),
        }
    }
}

/// How control leaves an instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Control {
    Next,
    Branch { target: u32, condition: Condition },
    Jump { target: u32 },
    Call { target: u32 },
    Return,
    IndirectJump { targets: Vec<u32> },
    IndirectCall { targets: Vec<u32> },
    /// Hardware loop; `body_end` is the address of the last body instruction.
    Loop {
        body_start: u32,
        body_end: u32,
        condition: Condition,
    },
    Halt,
}

/// Coarse operation kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InsnClass {
    Arithmetic,
    Logical,
    Load,
    Store,
    Branch,
    Jump,
    Call,
    Return,
    Loop,
    Csr,
    Halt,
    Other,
}

/// An immutable decoded instruction with its dataflow semantics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub pc: u32,
    pub op: Op,
    pub class: InsnClass,
    pub flows: Vec<Flow>,
    pub control: Control,
}

impl Instruction {
    pub fn new(pc: u32, op: Op) -> Self {
        let mut lower = Lowering::default();
        let control = lower.op(pc, &op);
        let class = classify(&op, &control);
        let flows = lower
            .flows
            .into_iter()
            .filter(|flow| flow.dest != Place::Loc(Location::Gpr(0)))
            .collect();
        Self {
            pc,
            op,
            class,
            flows,
            control,
        }
    }

    /// Supply the target set of an indirect jump or call.
    #[must_use]
    pub fn with_indirect_targets(mut self, resolved: impl IntoIterator<Item = u32>) -> Self {
        if let Control::IndirectJump { targets } | Control::IndirectCall { targets } =
            &mut self.control
        {
            targets.extend(resolved);
            targets.sort_unstable();
            targets.dedup();
        }
        self
    }

    pub const fn next_pc(&self) -> u32 {
        self.pc.wrapping_add(INSN_BYTES)
    }

    /// Condition of a branch-class instruction.
    pub const fn condition(&self) -> Option<&Condition> {
        match &self.control {
            Control::Branch { condition, .. } | Control::Loop { condition, .. } => Some(condition),
            _ => None,
        }
    }

    /// Every location the instruction may read, sorted.
    pub fn reads(&self) -> Vec<Location> {
        let mut out = BTreeSet::new();
        for flow in &self.flows {
            for src in &flow.sources {
                expand(*src, &mut out);
            }
            // Indirect places also read their index register.
            for place in flow.sources.iter().chain([&flow.dest]) {
                if let Place::IndirectWdr(gpr) = place {
                    out.insert(Location::Gpr(*gpr));
                }
            }
        }
        if let Some(cond) = self.condition() {
            out.extend(cond.operands.iter().copied());
        }
        out.remove(&Location::Gpr(0));
        out.into_iter().collect()
    }

    /// Every location the instruction may write, sorted.
    pub fn writes(&self) -> Vec<Location> {
        let mut out = BTreeSet::new();
        for flow in &self.flows {
            expand(flow.dest, &mut out);
        }
        out.into_iter().collect()
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.op, f)
    }
}

fn expand(place: Place, out: &mut BTreeSet<Location>) {
    match place {
        Place::Loc(loc) => {
            out.insert(loc);
        }
        Place::IndirectWdr(_) => out.extend((0..NUM_WDRS as u8).map(Location::Wdr)),
    }
}

const fn gpr(r: u8) -> Place {
    Place::Loc(Location::Gpr(r))
}

const fn wdr(r: u8) -> Place {
    Place::Loc(Location::Wdr(r))
}

const fn flag(fg: FlagGroup, flag: Flag) -> Place {
    Place::Loc(Location::Flag(fg, flag))
}

const fn special(reg: SpecialReg) -> Place {
    Place::Loc(Location::Special(reg))
}

const DMEM: Place = Place::Loc(Location::Dmem);

/// Locations a CSR reads from or writes to.
fn csr_locations(csr: Csr) -> Vec<Location> {
    match csr {
        Csr::Fg(fg) => fg.flags().to_vec(),
        Csr::Flags => FlagGroup::Fg0
            .flags()
            .into_iter()
            .chain(FlagGroup::Fg1.flags())
            .collect(),
        Csr::Mod(_) => vec![Location::Special(SpecialReg::Mod)],
        Csr::RndPrefetch => Vec::new(),
        Csr::Rnd => vec![Location::Special(SpecialReg::Rnd)],
        Csr::Urnd => vec![Location::Special(SpecialReg::Urnd)],
    }
}

#[derive(Default)]
struct Lowering {
    flows: Vec<Flow>,
}

impl Lowering {
    fn push(&mut self, flow: Flow) {
        self.flows.push(flow);
    }

    fn to(&mut self, dest: impl Into<Place>, sources: &[Place]) {
        self.push(Flow::new(dest, sources.to_vec()));
    }

    fn flags(&mut self, fg: FlagGroup, which: &[Flag], sources: &[Place]) {
        for f in which {
            self.to(flag(fg, *f), sources);
        }
    }

    /// The return address pushed by a call is public; the entries below it
    /// stay on the stack.
    fn push_call_stack(&mut self) {
        self.push(Flow::new(gpr(CALL_STACK_GPR), Vec::new()));
    }

    /// Popping exposes the next entry, which only older pushes can have
    /// written.
    fn pop_call_stack(&mut self) {
        self.push(Flow::new(gpr(CALL_STACK_GPR), vec![gpr(CALL_STACK_GPR)]));
    }

    fn increment(&mut self, r: u8, by: i32) {
        self.push(Flow::new(gpr(r), vec![gpr(r)]).with_value(Value::AddImm { src: r, imm: by }));
    }

    fn op(&mut self, pc: u32, op: &Op) -> Control {
        use Mnemonic as M;

        let next = pc.wrapping_add(INSN_BYTES);
        match (op.mnemonic, &op.args) {
            (
                M::Add | M::Sub | M::Sll | M::Srl | M::Sra | M::And | M::Or | M::Xor,
                Args::R { rd, rs1, rs2 },
            ) => self.to(gpr(*rd), &[gpr(*rs1), gpr(*rs2)]),
            (M::Addi, Args::I { rd, rs1, imm }) => {
                let value = if *rs1 == 0 {
                    Value::Imm(*imm as u32)
                } else {
                    Value::AddImm {
                        src: *rs1,
                        imm: *imm,
                    }
                };
                self.push(Flow::new(gpr(*rd), vec![gpr(*rs1)]).with_value(value));
            }
            (M::Lui, Args::U { rd, imm }) => {
                self.push(Flow::new(gpr(*rd), Vec::new()).with_value(Value::Imm(*imm as u32)));
            }
            (_, Args::I { rd, rs1, .. }) if op.mnemonic == M::Lw => {
                self.to(gpr(*rd), &[DMEM, gpr(*rs1)]);
            }
            (M::Jalr, Args::I { rd, rs1, imm }) => {
                if *rd == 0 && *rs1 == CALL_STACK_GPR && *imm == 0 {
                    self.pop_call_stack();
                    return Control::Return;
                }
                if *rd == CALL_STACK_GPR {
                    self.push_call_stack();
                } else {
                    self.push(Flow::new(gpr(*rd), Vec::new()).with_value(Value::Imm(next)));
                }
                return if *rd == CALL_STACK_GPR {
                    Control::IndirectCall {
                        targets: Vec::new(),
                    }
                } else {
                    Control::IndirectJump {
                        targets: Vec::new(),
                    }
                };
            }
            (_, Args::I { rd, rs1, .. }) => self.to(gpr(*rd), &[gpr(*rs1)]),
            (_, Args::S { rs1, rs2, .. }) => self.to(DMEM, &[DMEM, gpr(*rs2), gpr(*rs1)]),
            (_, Args::B { rs1, rs2, imm }) => {
                let kind = if op.mnemonic == M::Beq {
                    CondKind::Eq
                } else {
                    CondKind::Ne
                };
                return Control::Branch {
                    target: pc.wrapping_add_signed(*imm),
                    condition: Condition::new(kind, [Location::Gpr(*rs1), Location::Gpr(*rs2)]),
                };
            }
            (_, Args::J { rd, imm }) => {
                let target = pc.wrapping_add_signed(*imm);
                if *rd == CALL_STACK_GPR {
                    self.push_call_stack();
                    return Control::Call { target };
                }
                self.push(Flow::new(gpr(*rd), Vec::new()).with_value(Value::Imm(next)));
                return Control::Jump { target };
            }
            (_, Args::Csr { rd, rs1, csr }) => self.csr(op.mnemonic, *rd, *rs1, *csr),
            (_, Args::Loop { grs, bodysize }) => {
                return Control::Loop {
                    body_start: next,
                    body_end: pc.wrapping_add(u32::from(*bodysize) * INSN_BYTES),
                    condition: Condition::new(CondKind::LoopCount, [Location::Gpr(*grs)]),
                };
            }
            (_, Args::LoopI { bodysize, .. }) => {
                return Control::Loop {
                    body_start: next,
                    body_end: pc.wrapping_add(u32::from(*bodysize) * INSN_BYTES),
                    condition: Condition::new(CondKind::LoopCount, []),
                };
            }
            (
                M::BnAddm | M::BnSubm,
                Args::Bn {
                    wrd, wrs1, wrs2, ..
                },
            ) => self.to(wdr(*wrd), &[wdr(*wrs1), wdr(*wrs2), special(SpecialReg::Mod)]),
            (
                M::BnCmp | M::BnCmpb,
                Args::Bn {
                    wrs1, wrs2, fg, ..
                },
            ) => {
                let mut sources = vec![wdr(*wrs1), wdr(*wrs2)];
                if op.mnemonic == M::BnCmpb {
                    sources.push(flag(*fg, Flag::C));
                }
                self.flags(*fg, &Flag::ALL, &sources);
            }
            (
                M::BnAnd | M::BnOr | M::BnXor,
                Args::Bn {
                    wrd, wrs1, wrs2, fg, ..
                },
            ) => {
                let sources = [wdr(*wrs1), wdr(*wrs2)];
                self.to(wdr(*wrd), &sources);
                self.flags(*fg, &[Flag::M, Flag::L, Flag::Z], &sources);
            }
            (
                _,
                Args::Bn {
                    wrd, wrs1, wrs2, fg, ..
                },
            ) => {
                // bn.add, bn.sub, bn.addc, bn.subb
                let mut sources = vec![wdr(*wrs1), wdr(*wrs2)];
                if matches!(op.mnemonic, M::BnAddc | M::BnSubb) {
                    sources.push(flag(*fg, Flag::C));
                }
                self.to(wdr(*wrd), &sources);
                self.flags(*fg, &Flag::ALL, &sources);
            }
            (_, Args::BnNot { wrd, wrs, fg, .. }) => {
                self.to(wdr(*wrd), &[wdr(*wrs)]);
                self.flags(*fg, &[Flag::M, Flag::L, Flag::Z], &[wdr(*wrs)]);
            }
            (_, Args::BnImm { wrd, wrs, fg, .. }) => {
                self.to(wdr(*wrd), &[wdr(*wrs)]);
                self.flags(*fg, &Flag::ALL, &[wdr(*wrs)]);
            }
            (
                _,
                Args::BnRshi {
                    wrd, wrs1, wrs2, ..
                },
            ) => self.to(wdr(*wrd), &[wdr(*wrs1), wdr(*wrs2)]),
            (
                _,
                Args::BnSel {
                    wrd,
                    wrs1,
                    wrs2,
                    fg,
                    flag: sel,
                },
            ) => self.to(wdr(*wrd), &[wdr(*wrs1), wdr(*wrs2), flag(*fg, *sel)]),
            (
                _,
                Args::BnMulqacc {
                    wrd,
                    wrs1,
                    wrs2,
                    zero_acc,
                    upper,
                    fg,
                    ..
                },
            ) => self.mulqacc(op.mnemonic, *wrd, *wrs1, *wrs2, *zero_acc, *upper, *fg),
            (
                _,
                Args::BnLoad {
                    grd,
                    grs1,
                    grd_inc,
                    grs1_inc,
                    ..
                },
            ) => {
                self.to(Place::IndirectWdr(*grd), &[DMEM, gpr(*grs1), gpr(*grd)]);
                if *grs1_inc {
                    self.increment(*grs1, WLEN_BYTES);
                }
                if *grd_inc {
                    self.increment(*grd, 1);
                }
            }
            (
                _,
                Args::BnStore {
                    grs1,
                    grs2,
                    grs1_inc,
                    grs2_inc,
                    ..
                },
            ) => {
                self.to(
                    DMEM,
                    &[DMEM, Place::IndirectWdr(*grs2), gpr(*grs1), gpr(*grs2)],
                );
                if *grs1_inc {
                    self.increment(*grs1, WLEN_BYTES);
                }
                if *grs2_inc {
                    self.increment(*grs2, 1);
                }
            }
            (_, Args::BnMov { wrd, wrs }) => self.to(wdr(*wrd), &[wdr(*wrs)]),
            (
                _,
                Args::BnMovr {
                    grd,
                    grs,
                    grd_inc,
                    grs_inc,
                },
            ) => {
                self.to(
                    Place::IndirectWdr(*grd),
                    &[Place::IndirectWdr(*grs), gpr(*grs), gpr(*grd)],
                );
                if *grd_inc {
                    self.increment(*grd, 1);
                }
                if *grs_inc {
                    self.increment(*grs, 1);
                }
            }
            (M::BnWsrr, Args::Wsr { wreg, wsr }) => self.to(wdr(*wreg), &[special(*wsr)]),
            (_, Args::Wsr { wreg, wsr }) => {
                if !wsr.is_read_only() {
                    self.to(special(*wsr), &[wdr(*wreg)]);
                }
            }
            (_, Args::U { .. } | Args::R { .. }) => {}
            (_, Args::None) => return Control::Halt,
        }
        Control::Next
    }

    fn csr(&mut self, mnemonic: Mnemonic, rd: u8, rs1: u8, addr: u16) {
        let Some(csr) = Csr::from_addr(addr) else {
            return;
        };
        let locs = csr_locations(csr);
        let current: Vec<Place> = locs.iter().copied().map(Place::Loc).collect();

        if rd != 0 {
            if csr == Csr::RndPrefetch {
                self.push(Flow::new(gpr(rd), Vec::new()).with_value(Value::Imm(0)));
            } else {
                self.to(gpr(rd), &current);
            }
        }

        let writable = matches!(csr, Csr::Fg(_) | Csr::Flags | Csr::Mod(_));
        match mnemonic {
            Mnemonic::Csrrs if writable && rs1 != 0 => {
                for loc in locs {
                    self.to(loc, &[Place::Loc(loc), gpr(rs1)]);
                }
            }
            Mnemonic::Csrrw if writable => {
                for loc in locs {
                    // A MODi write only replaces one limb.
                    if matches!(csr, Csr::Mod(_)) {
                        self.to(loc, &[Place::Loc(loc), gpr(rs1)]);
                    } else {
                        self.to(loc, &[gpr(rs1)]);
                    }
                }
            }
            _ => {}
        }
    }

    #[allow(clippy::too_many_arguments, clippy::fn_params_excessive_bools)]
    fn mulqacc(
        &mut self,
        mnemonic: Mnemonic,
        wrd: u8,
        wrs1: u8,
        wrs2: u8,
        zero_acc: bool,
        upper: bool,
        fg: FlagGroup,
    ) {
        let mut sources = vec![wdr(wrs1), wdr(wrs2)];
        if !zero_acc {
            sources.push(special(SpecialReg::Acc));
        }
        self.to(special(SpecialReg::Acc), &sources);
        match mnemonic {
            Mnemonic::BnMulqaccWo => {
                self.to(wdr(wrd), &sources);
                self.flags(fg, &[Flag::M, Flag::L, Flag::Z], &sources);
            }
            Mnemonic::BnMulqaccSo => {
                // Only one half of wrd is written.
                let mut partial = sources.clone();
                partial.push(wdr(wrd));
                self.to(wdr(wrd), &partial);
                if upper {
                    self.flags(fg, &[Flag::M], &sources);
                    let mut zero = sources;
                    zero.push(flag(fg, Flag::Z));
                    self.flags(fg, &[Flag::Z], &zero);
                } else {
                    self.flags(fg, &[Flag::L, Flag::Z], &sources);
                }
            }
            _ => {}
        }
    }
}

fn classify(op: &Op, control: &Control) -> InsnClass {
    use Mnemonic as M;

    match control {
        Control::Branch { .. } => return InsnClass::Branch,
        Control::Jump { .. } | Control::IndirectJump { .. } => return InsnClass::Jump,
        Control::Call { .. } | Control::IndirectCall { .. } => return InsnClass::Call,
        Control::Return => return InsnClass::Return,
        Control::Loop { .. } => return InsnClass::Loop,
        Control::Halt => return InsnClass::Halt,
        Control::Next => {}
    }
    match op.mnemonic {
        M::Add
        | M::Addi
        | M::Lui
        | M::Sub
        | M::Sll
        | M::Slli
        | M::Srl
        | M::Srli
        | M::Sra
        | M::Srai
        | M::BnAdd
        | M::BnAddc
        | M::BnAddi
        | M::BnAddm
        | M::BnSub
        | M::BnSubb
        | M::BnSubi
        | M::BnSubm
        | M::BnMulqacc
        | M::BnMulqaccWo
        | M::BnMulqaccSo => InsnClass::Arithmetic,
        M::And
        | M::Andi
        | M::Or
        | M::Ori
        | M::Xor
        | M::Xori
        | M::BnAnd
        | M::BnOr
        | M::BnNot
        | M::BnXor
        | M::BnRshi => InsnClass::Logical,
        M::Lw | M::BnLid => InsnClass::Load,
        M::Sw | M::BnSid => InsnClass::Store,
        M::Csrrs | M::Csrrw | M::BnWsrr | M::BnWsrw => InsnClass::Csr,
        _ => InsnClass::Other,
    }
}
