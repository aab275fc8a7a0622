//! Forward taint propagation to a fixed point, and control dependencies.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use ctcheck_cfg::{ControlGraph, ExitKind, GraphScope, NodeId};
use ctcheck_elf::Program;
use ctcheck_isa::{Instruction, Location, NUM_WDRS, Place, Value};
use rustc_hash::FxHashSet;
use tracing::{debug, trace, trace_span};

use crate::constants::RequiredConstants;
use crate::label::{LabelSet, TaintLabel};
use crate::state::TaintState;
use crate::value::{RegisterState, RegisterValue};
use crate::verdict::{Verdict, Warning};
use crate::{IflowError, Result};

/// Branch addresses whose outcome each label can influence.
pub type ControlDependencyMap = BTreeMap<TaintLabel, BTreeSet<u32>>;

/// Which entry-time locations are considered secret.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AnalysisMode {
    /// Every input is secret: the routine must have a single control-flow
    /// path regardless of input.
    AllInputsSecret,
    /// Only the named locations are secret.
    ExplicitSecrets(BTreeSet<Location>),
}

impl AnalysisMode {
    pub fn secrets(locs: impl IntoIterator<Item = Location>) -> Self {
        Self::ExplicitSecrets(locs.into_iter().collect())
    }

    /// Whether findings for `label` count against the routine.
    pub fn is_secret(&self, label: TaintLabel) -> bool {
        match self {
            Self::AllInputsSecret => true,
            Self::ExplicitSecrets(secrets) => secrets.contains(&label.location()),
        }
    }
}

/// Outcome of one information-flow run.
#[derive(Clone, Debug)]
pub struct IflowResult {
    /// What each location depends on when the routine exits, merged over
    /// every exit.
    pub exit_state: TaintState,
    pub control_deps: ControlDependencyMap,
    /// Worklist steps taken to reach the fixed point.
    pub iterations: usize,
    pub warnings: Vec<Warning>,
}

impl IflowResult {
    pub fn verdict(&self, mode: &AnalysisMode) -> Verdict {
        Verdict::evaluate(&self.control_deps, mode, &self.warnings)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct NodeState {
    taint: TaintState,
    regs: RegisterState,
}

impl NodeState {
    fn join(&mut self, other: &Self) {
        self.taint.join(&other.taint);
        self.regs.merge(&other.regs);
    }
}

/// Run the analysis over `graph`.
///
/// Constants may only be declared for subroutine graphs.
pub fn analyze(
    program: &Program,
    graph: &ControlGraph,
    mode: &AnalysisMode,
    constants: &RequiredConstants,
) -> Result<IflowResult> {
    if !constants.is_empty() && *graph.scope() == GraphScope::Program {
        return Err(IflowError::InvalidConstantSpec {
            spec: constants.to_string(),
            reason: "constants can only be required for a subroutine".into(),
        });
    }

    let _span = trace_span!("iflow", entry = format_args!("{:#x}", graph.entry_pc())).entered();

    let states = fixed_point(program, graph, entry_state(program, mode, constants));
    let control_deps = control_dependencies(program, graph, &states.states);
    let (exit_state, warnings) = exits(program, graph, &states.states);

    debug!(
        nodes = graph.len(),
        iterations = states.iterations,
        labels = control_deps.len(),
        branches = control_deps
            .values()
            .flatten()
            .collect::<BTreeSet<_>>()
            .len(),
        "information flow complete"
    );

    Ok(IflowResult {
        exit_state,
        control_deps,
        iterations: states.iterations,
        warnings,
    })
}

fn entry_state(program: &Program, mode: &AnalysisMode, constants: &RequiredConstants) -> NodeState {
    let mut taint = TaintState::new();
    match mode {
        AnalysisMode::AllInputsSecret => {
            // A constant x1 only pins the top of the call stack.
            for loc in program
                .locations()
                .filter(|loc| loc.is_call_stack() || !constants.contains(*loc))
            {
                taint.seed(loc);
            }
        }
        // Explicit secrets stay secret even when declared constant.
        AnalysisMode::ExplicitSecrets(secrets) => {
            for loc in secrets {
                taint.seed(*loc);
            }
        }
    }

    let mut regs = RegisterState::new();
    for (reg, value) in constants.iter() {
        regs.set(reg, RegisterValue::constant(value));
    }
    NodeState { taint, regs }
}

struct FixedPoint {
    /// IN state per node; `None` only for nodes never reached.
    states: Vec<Option<NodeState>>,
    iterations: usize,
}

/// Iterate to a fixed point, visiting nodes in reverse postorder first.
///
/// A node's IN state is the join of its predecessors' OUT states (plus the
/// entry state at the entry); successors are revisited whenever an OUT
/// state grows.
fn fixed_point(program: &Program, graph: &ControlGraph, entry: NodeState) -> FixedPoint {
    let mut states: Vec<Option<NodeState>> = vec![None; graph.len()];
    let mut outs: Vec<Option<NodeState>> = vec![None; graph.len()];

    let order = graph.reverse_postorder();
    let mut worklist: VecDeque<NodeId> = order.iter().copied().collect();
    let mut in_worklist: FxHashSet<NodeId> = order.into_iter().collect();

    let mut iterations = 0usize;
    while let Some(id) = worklist.pop_front() {
        in_worklist.remove(&id);
        iterations += 1;

        let mut input = (id == graph.entry()).then(|| entry.clone());
        for pred in graph.predecessors(id) {
            let Some(out) = &outs[pred.index()] else {
                continue;
            };
            match &mut input {
                Some(state) => state.join(out),
                None => input = Some(out.clone()),
            }
        }
        let Some(input) = input else {
            continue;
        };
        let Some(insn) = program.get(graph.pc(id)) else {
            continue;
        };

        let out = transfer(insn, &input);
        states[id.index()] = Some(input);
        if outs[id.index()].as_ref() == Some(&out) {
            continue;
        }
        outs[id.index()] = Some(out);

        for edge in graph.successors(id) {
            if in_worklist.insert(edge.to) {
                worklist.push_back(edge.to);
            }
        }
    }

    trace!(iterations, "worklist complete");
    FixedPoint { states, iterations }
}

#[derive(Clone, Copy)]
enum Update {
    Strong,
    Weak,
}

/// Apply an instruction's flows as one parallel assignment.
fn transfer(insn: &Instruction, input: &NodeState) -> NodeState {
    let mut writes: Vec<(Location, LabelSet, Update)> = Vec::with_capacity(insn.flows.len());
    let mut values: Vec<(u8, RegisterValue)> = Vec::new();

    for flow in &insn.flows {
        let labels = flow
            .sources
            .iter()
            .fold(LabelSet::EMPTY, |acc, src| acc.union(source_labels(*src, input)));

        match flow.dest {
            // DMEM is one location standing for many words, x1 for every
            // entry of the call stack.
            Place::Loc(loc) if loc == Location::Dmem || loc.is_call_stack() => {
                writes.push((loc, labels, Update::Weak));
            }
            Place::Loc(loc) => {
                writes.push((loc, labels, Update::Strong));
                if let Location::Gpr(reg) = loc {
                    values.push((reg, evaluate(flow.value, &input.regs)));
                }
            }
            Place::IndirectWdr(index) => {
                let labels = labels.union(input.taint.get(Location::Gpr(index)));
                let candidates = wdr_candidates(index, &input.regs);
                let update = if candidates.len() == 1 {
                    Update::Strong
                } else {
                    Update::Weak
                };
                for wdr in candidates {
                    writes.push((Location::Wdr(wdr), labels, update));
                }
            }
        }
    }

    let mut out = input.clone();
    for (loc, labels, update) in writes {
        match update {
            Update::Strong => out.taint.set(loc, labels),
            Update::Weak => out.taint.add(loc, labels),
        }
    }
    for (reg, value) in values {
        out.regs.set(reg, value);
    }
    out
}

fn source_labels(place: Place, state: &NodeState) -> LabelSet {
    match place {
        Place::Loc(loc) => state.taint.get(loc),
        Place::IndirectWdr(index) => state.taint.union_of(
            wdr_candidates(index, &state.regs)
                .into_iter()
                .map(Location::Wdr)
                .chain([Location::Gpr(index)]),
        ),
    }
}

/// Wide registers the GPR `x[index]` may name.
fn wdr_candidates(index: u8, regs: &RegisterState) -> Vec<u8> {
    match regs.get(index).values() {
        // Indices past the register file fault instead of writing.
        Some(values) => values
            .iter()
            .filter(|v| (**v as usize) < NUM_WDRS)
            .map(|v| *v as u8)
            .collect(),
        None => (0..NUM_WDRS as u8).collect(),
    }
}

fn evaluate(value: Value, regs: &RegisterState) -> RegisterValue {
    match value {
        Value::Unknown => RegisterValue::Unknown,
        Value::Imm(v) => RegisterValue::constant(v),
        Value::AddImm { src, imm } => regs.get(src).map(|v| v.wrapping_add_signed(imm)),
    }
}

fn control_dependencies(
    program: &Program,
    graph: &ControlGraph,
    states: &[Option<NodeState>],
) -> ControlDependencyMap {
    let mut deps = ControlDependencyMap::new();
    for id in graph.node_ids() {
        let pc = graph.pc(id);
        let (Some(state), Some(insn)) = (&states[id.index()], program.get(pc)) else {
            continue;
        };
        let Some(condition) = insn.condition() else {
            continue;
        };
        let labels = state.taint.union_of(condition.operands.iter().copied());
        if !labels.is_empty() {
            trace!(pc = format_args!("{pc:#x}"), %labels, "tainted branch");
        }
        for label in labels.iter() {
            deps.entry(label).or_default().insert(pc);
        }
    }
    deps
}

fn exits(
    program: &Program,
    graph: &ControlGraph,
    states: &[Option<NodeState>],
) -> (TaintState, Vec<Warning>) {
    let mut exit_state = TaintState::new();
    let mut warnings = Vec::new();

    for exit in graph.exits() {
        let pc = graph.pc(exit.node);
        if let ExitKind::FallOffEnd { target } = exit.kind {
            warnings.push(Warning::FallsOffEnd { pc, target });
        }
        if let (Some(state), Some(insn)) = (&states[exit.node.index()], program.get(pc)) {
            exit_state.join(&transfer(insn, state).taint);
        }
    }
    if graph.exits().is_empty() {
        warnings.push(Warning::NoExit);
    }
    (exit_state, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctcheck_cfg::build_subroutine_graph;

    fn run(src: &str, mode: &AnalysisMode, constants: &[&str]) -> IflowResult {
        let program = Program::from_listing(src).unwrap();
        let graph = build_subroutine_graph(&program, "f").unwrap();
        let constants = RequiredConstants::parse(constants).unwrap();
        analyze(&program, &graph, mode, &constants).unwrap()
    }

    fn label(s: &str) -> TaintLabel {
        TaintLabel(s.parse().unwrap())
    }

    fn deps(result: &IflowResult) -> Vec<(String, Vec<u32>)> {
        result
            .control_deps
            .iter()
            .map(|(l, pcs)| (l.to_string(), pcs.iter().copied().collect()))
            .collect()
    }

    #[test]
    fn test_direct_branch_on_secret() {
        let r = run(
            "
            f:
                beq x5, x0, done
                addi x2, x0, 1
            done:
                ret
            ",
            &AnalysisMode::secrets([Location::Gpr(5)]),
            &[],
        );
        assert_eq!(deps(&r), vec![("x5".to_string(), vec![0])]);
    }

    #[test]
    fn test_public_overwrite_clears_taint() {
        let r = run(
            "
            f:
                addi x5, x0, 3
                bne x5, x0, done
                nop
            done:
                ret
            ",
            &AnalysisMode::secrets([Location::Gpr(5)]),
            &[],
        );
        assert!(r.control_deps.is_empty());
        assert!(r.exit_state.get(Location::Gpr(5)).is_empty());
    }

    #[test]
    fn test_taint_through_arithmetic() {
        let r = run(
            "
            f:
                add x6, x5, x7
                xori x8, x6, 1
                bne x8, x0, done
                nop
            done:
                ret
            ",
            &AnalysisMode::secrets([Location::Gpr(5)]),
            &[],
        );
        assert_eq!(deps(&r), vec![("x5".to_string(), vec![8])]);
        assert!(r.exit_state.get(Location::Gpr(8)).contains(label("x5")));
    }

    #[test]
    fn test_unused_secret_is_not_a_dependency() {
        let r = run(
            "
            f:
                add x6, x5, x5
                beq x7, x0, done
                nop
            done:
                ret
            ",
            &AnalysisMode::secrets([Location::Gpr(5)]),
            &[],
        );
        assert!(r.control_deps.is_empty());
        assert!(r.exit_state.get(Location::Gpr(6)).contains(label("x5")));
    }

    #[test]
    fn test_merge_unions_paths() {
        // x9 is tainted on one path only; the join point still sees it.
        let r = run(
            "
            f:
                beq x7, x0, skip
                mv x9, x5
            skip:
                bne x9, x0, out
                nop
            out:
                ret
            ",
            &AnalysisMode::secrets([Location::Gpr(5)]),
            &[],
        );
        assert_eq!(deps(&r), vec![("x5".to_string(), vec![8])]);
    }

    #[test]
    fn test_flags_carry_wide_taint() {
        let r = run(
            "
            f:
                bn.cmp w1, w2
                csrrs x3, 0x7c0, x0
                andi x3, x3, 8
                beq x3, x0, out
                nop
            out:
                ret
            ",
            &AnalysisMode::secrets([Location::Wdr(1)]),
            &[],
        );
        assert_eq!(deps(&r), vec![("w1".to_string(), vec![12])]);
    }

    #[test]
    fn test_store_then_load_through_dmem() {
        let r = run(
            "
            f:
                sw x5, 0(x0)
                lw x6, 4(x0)
                beq x6, x0, out
                nop
            out:
                ret
            ",
            &AnalysisMode::secrets([Location::Gpr(5)]),
            &[],
        );
        // DMEM is one region: any secret store taints every load.
        assert_eq!(deps(&r), vec![("x5".to_string(), vec![8])]);
    }

    #[test]
    fn test_tainted_address_taints_load() {
        let r = run(
            "
            f:
                lw x6, 0(x5)
                beq x6, x0, out
                nop
            out:
                ret
            ",
            &AnalysisMode::secrets([Location::Gpr(5)]),
            &[],
        );
        assert_eq!(deps(&r), vec![("x5".to_string(), vec![4])]);
    }

    #[test]
    fn test_indirect_write_with_known_index() {
        // x2 = 3 selects w3, so w4 stays public.
        let r = run(
            "
            f:
                addi x2, x0, 3
                addi x3, x0, 0
                bn.lid x2, 0(x3)
                bn.cmp w4, w4
                csrrs x4, 0x7c0, x0
                beq x4, x0, out
                nop
            out:
                ret
            ",
            &AnalysisMode::secrets([Location::Dmem]),
            &[],
        );
        assert!(r.control_deps.is_empty());
        assert!(r.exit_state.get(Location::Wdr(3)).contains(label("dmem")));
        assert!(r.exit_state.get(Location::Wdr(4)).is_empty());
    }

    #[test]
    fn test_indirect_write_with_unknown_index() {
        let r = run(
            "
            f:
                addi x3, x0, 0
                bn.lid x2, 0(x3)
                ret
            ",
            &AnalysisMode::secrets([Location::Dmem]),
            &[],
        );
        // Every wide register may have been written.
        for w in 0..NUM_WDRS as u8 {
            assert!(r.exit_state.get(Location::Wdr(w)).contains(label("dmem")));
        }
    }

    #[test]
    fn test_required_constant_resolves_index() {
        let src = "
            f:
                bn.movr x2, x3
                bn.cmp w7, w7
                csrrs x4, 0x7c0, x0
                beq x4, x0, out
                nop
            out:
                ret
            ";
        // Without a known index w7 may have been overwritten from any w[x3].
        let r = run(src, &AnalysisMode::secrets([Location::Wdr(1)]), &[]);
        assert_eq!(deps(&r), vec![("w1".to_string(), vec![12])]);

        let r = run(
            src,
            &AnalysisMode::secrets([Location::Wdr(1)]),
            &["x2:5", "x3:9"],
        );
        assert!(r.control_deps.is_empty());
    }

    #[test]
    fn test_loop_count_dependency() {
        let r = run(
            "
            f:
                loop x5, 1
                addi x2, x2, 1
                ret
            ",
            &AnalysisMode::secrets([Location::Gpr(5)]),
            &[],
        );
        assert_eq!(deps(&r), vec![("x5".to_string(), vec![0])]);

        let r = run(
            "
            f:
                loopi 8, 1
                addi x2, x2, 1
                ret
            ",
            &AnalysisMode::AllInputsSecret,
            &[],
        );
        assert!(r.control_deps.is_empty());
    }

    #[test]
    fn test_loop_carried_taint_reaches_fixed_point() {
        // The secret reaches x3 only after going around the back edge.
        let r = run(
            "
            f:
                addi x3, x0, 0
                addi x4, x0, 0
            head:
                bne x3, x0, out
                mv x3, x4
                mv x4, x5
                j head
            out:
                ret
            ",
            &AnalysisMode::secrets([Location::Gpr(5)]),
            &[],
        );
        assert_eq!(deps(&r), vec![("x5".to_string(), vec![8])]);
        assert!(r.iterations <= 7 * Location::COUNT);
    }

    #[test]
    fn test_taint_flows_through_callee() {
        let r = run(
            "
            f:
                jal x1, copy
                beq x6, x0, out
                nop
            out:
                ret
            copy:
                mv x6, x5
                ret
            ",
            &AnalysisMode::secrets([Location::Gpr(5)]),
            &[],
        );
        assert_eq!(deps(&r), vec![("x5".to_string(), vec![4])]);
    }

    #[test]
    fn test_acyclic_graph_visits_each_node_once() {
        let src = "
            f:
                beq x5, x0, right
                mv x6, x5
                j join
            right:
                mv x6, x7
            join:
                bne x6, x0, out
                nop
            out:
                ret
            ";
        let program = Program::from_listing(src).unwrap();
        let graph = build_subroutine_graph(&program, "f").unwrap();
        let r = analyze(
            &program,
            &graph,
            &AnalysisMode::secrets([Location::Gpr(5)]),
            &RequiredConstants::new(),
        )
        .unwrap();

        // The join sees both predecessors before it is first visited.
        assert_eq!(r.iterations, graph.len());
        assert_eq!(
            deps(&r),
            vec![("x5".to_string(), vec![0, 16])]
        );
    }

    #[test]
    fn test_call_stack_index_is_unknown_in_callee() {
        // The call pushes a return address, so w[x1] in `g` is not w5.
        let r = run(
            "
            f:
                addi x1, x0, 5
                addi x2, x0, 9
                jal x1, g
                ret
            g:
                bn.movr x1, x2
                bn.cmp w12, w0
                csrrs x3, 0x7c0, x0
                beq x3, x0, out
                nop
            out:
                ret
            ",
            &AnalysisMode::secrets([Location::Wdr(9)]),
            &[],
        );
        assert_eq!(deps(&r), vec![("w9".to_string(), vec![28])]);
        assert!(r.exit_state.get(Location::Wdr(12)).contains(label("w9")));
    }

    #[test]
    fn test_call_stack_keeps_older_entries() {
        // Pushing 5 leaves the secret entry below it; the second read pops it.
        let r = run(
            "
            f:
                addi x1, x0, 5
                add x2, x1, x0
                beq x1, x0, out
                nop
            out:
                ret
            ",
            &AnalysisMode::secrets([Location::Gpr(1)]),
            &[],
        );
        assert_eq!(deps(&r), vec![("x1".to_string(), vec![8])]);
    }

    #[test]
    fn test_constant_call_stack_is_still_seeded() {
        let r = run(
            "
            f:
                beq x1, x0, out
                nop
            out:
                ret
            ",
            &AnalysisMode::AllInputsSecret,
            &["x1:0"],
        );
        assert_eq!(deps(&r), vec![("x1".to_string(), vec![0])]);
    }

    #[test]
    fn test_all_inputs_secret_skips_constants() {
        let src = "
            f:
                beq x5, x6, out
                nop
            out:
                ret
            ";
        let r = run(src, &AnalysisMode::AllInputsSecret, &[]);
        assert_eq!(
            deps(&r),
            vec![("x5".to_string(), vec![0]), ("x6".to_string(), vec![0])]
        );

        let r = run(src, &AnalysisMode::AllInputsSecret, &["x5:0"]);
        assert_eq!(deps(&r), vec![("x6".to_string(), vec![0])]);
    }

    #[test]
    fn test_constants_rejected_for_whole_program() {
        let program = Program::from_listing("_imem_start:\n ecall\n").unwrap();
        let graph = ctcheck_cfg::build_program_graph(&program).unwrap();
        let constants = RequiredConstants::parse(["x5:1"]).unwrap();
        let err = analyze(&program, &graph, &AnalysisMode::AllInputsSecret, &constants)
            .unwrap_err();
        assert!(matches!(err, IflowError::InvalidConstantSpec { .. }));
    }

    #[test]
    fn test_warnings() {
        let r = run(
            "f:\n addi x2, x0, 1\n",
            &AnalysisMode::AllInputsSecret,
            &[],
        );
        assert_eq!(r.warnings, vec![Warning::FallsOffEnd { pc: 0, target: 4 }]);

        let r = run("f:\n j f\n", &AnalysisMode::AllInputsSecret, &[]);
        assert_eq!(r.warnings, vec![Warning::NoExit]);
    }
}
