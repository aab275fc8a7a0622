//! Worklist construction of control flow graphs.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use ctcheck_elf::{PROGRAM_START_SYMBOL, Program};
use ctcheck_isa::Control;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace, trace_span};

use crate::graph::{ControlGraph, Edge, EdgeKind, Exit, ExitKind, GraphScope, Node, NodeId};
use crate::{CfgError, Result};

/// Build the graph of a whole program, starting at `_imem_start`.
pub fn build_program_graph(program: &Program) -> Result<ControlGraph> {
    let entry = program
        .symbol(PROGRAM_START_SYMBOL)
        .ok_or_else(|| CfgError::SymbolNotFound(PROGRAM_START_SYMBOL.to_string()))?;
    build_graph(program, entry, GraphScope::Program)
}

/// Build the graph of the subroutine named `name`.
pub fn build_subroutine_graph(program: &Program, name: &str) -> Result<ControlGraph> {
    let entry = program
        .symbol(name)
        .ok_or_else(|| CfgError::SubroutineNotFound(name.to_string()))?;
    build_graph(program, entry, GraphScope::Subroutine(name.to_string()))
}

/// Build the graph reachable from `entry`.
pub fn build_graph(program: &Program, entry: u32, scope: GraphScope) -> Result<ControlGraph> {
    let _span = trace_span!("build_cfg", entry = format_args!("{entry:#x}")).entered();

    if program.get(entry).is_none() {
        return Err(CfgError::NoInstruction { pc: entry });
    }

    let mut builder = Builder::new(program);
    let entry_id = builder.node(entry);

    // Returns can only be linked once a callee body is known, and linking
    // them can reveal more code, so alternate until nothing changes.
    let mut round = 0usize;
    loop {
        round += 1;
        builder.explore()?;
        builder.link_loops();
        let linked = {
            let _span = trace_span!("link_returns", round).entered();
            builder.link_returns()
        };
        trace!(round, nodes = builder.nodes.len(), linked, "CFG round");
        if !linked && builder.queue.is_empty() {
            break;
        }
    }

    let exits = builder.exits(entry_id);
    let graph = ControlGraph::new(entry_id, scope, builder.nodes, builder.index, exits);

    debug!(
        entry = format_args!("{entry:#x}"),
        nodes = graph.len(),
        edges = graph.edge_count(),
        exits = graph.exits().len(),
        rounds = round,
        "CFG built"
    );
    Ok(graph)
}

struct Builder<'a> {
    program: &'a Program,
    nodes: Vec<Node>,
    index: FxHashMap<u32, NodeId>,
    queue: VecDeque<NodeId>,
    /// callee entry -> addresses its calls return to
    return_sites: BTreeMap<u32, BTreeSet<u32>>,
    /// last body instruction -> body starts of hardware loops ending there
    loop_ends: BTreeMap<u32, BTreeSet<u32>>,
    halts: BTreeSet<NodeId>,
    fall_offs: BTreeSet<(NodeId, u32)>,
}

impl<'a> Builder<'a> {
    fn new(program: &'a Program) -> Self {
        Self {
            program,
            nodes: Vec::new(),
            index: FxHashMap::default(),
            queue: VecDeque::new(),
            return_sites: BTreeMap::new(),
            loop_ends: BTreeMap::new(),
            halts: BTreeSet::new(),
            fall_offs: BTreeSet::new(),
        }
    }

    /// Node for `pc`, created and queued on first sight.
    fn node(&mut self, pc: u32) -> NodeId {
        if let Some(id) = self.index.get(&pc) {
            return *id;
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            pc,
            edges: Vec::new(),
        });
        self.index.insert(pc, id);
        self.queue.push_back(id);
        id
    }

    /// Add an edge unless it exists. Returns whether the graph changed.
    fn edge(&mut self, from: NodeId, target: u32, kind: EdgeKind) -> bool {
        if self.program.get(target).is_none() {
            self.fall_offs.insert((from, target));
            return false;
        }
        let to = self.node(target);
        let edge = Edge { to, kind };
        let edges = &mut self.nodes[from.index()].edges;
        if edges.contains(&edge) {
            return false;
        }
        edges.push(edge);
        true
    }

    fn call(&mut self, from: NodeId, target: u32, return_site: u32) {
        self.edge(from, target, EdgeKind::Call);
        self.return_sites
            .entry(target)
            .or_default()
            .insert(return_site);
    }

    fn explore(&mut self) -> Result<()> {
        let program = self.program;
        while let Some(id) = self.queue.pop_front() {
            let pc = self.nodes[id.index()].pc;
            let Some(insn) = program.get(pc) else {
                continue;
            };
            let next = insn.next_pc();

            match &insn.control {
                Control::Next => {
                    self.edge(id, next, EdgeKind::FallThrough);
                }
                Control::Branch { target, .. } => {
                    self.edge(id, *target, EdgeKind::Taken);
                    self.edge(id, next, EdgeKind::NotTaken);
                }
                Control::Jump { target } => {
                    self.edge(id, *target, EdgeKind::Jump);
                }
                Control::Call { target } => self.call(id, *target, next),
                Control::IndirectJump { targets } => {
                    if targets.is_empty() {
                        return Err(CfgError::UnresolvedControlFlow { pc });
                    }
                    for target in targets {
                        self.edge(id, *target, EdgeKind::Jump);
                    }
                }
                Control::IndirectCall { targets } => {
                    if targets.is_empty() {
                        return Err(CfgError::UnresolvedControlFlow { pc });
                    }
                    for target in targets {
                        self.call(id, *target, next);
                    }
                }
                Control::Loop {
                    body_start,
                    body_end,
                    ..
                } => {
                    self.loop_ends
                        .entry(*body_end)
                        .or_default()
                        .insert(*body_start);
                    self.edge(id, next, EdgeKind::FallThrough);
                }
                Control::Return => {}
                Control::Halt => {
                    self.halts.insert(id);
                }
            }
        }
        Ok(())
    }

    /// Give every explored loop-body end its back edge.
    fn link_loops(&mut self) {
        let pairs: Vec<(u32, u32)> = self
            .loop_ends
            .iter()
            .flat_map(|(end, starts)| starts.iter().map(move |start| (*end, *start)))
            .collect();

        for (end, start) in pairs {
            let (Some(&from), Some(&to)) = (self.index.get(&end), self.index.get(&start)) else {
                continue;
            };
            let edges = &mut self.nodes[from.index()].edges;
            for edge in edges.iter_mut() {
                if edge.kind == EdgeKind::FallThrough {
                    edge.kind = EdgeKind::LoopExit;
                }
            }
            let back = Edge {
                to,
                kind: EdgeKind::LoopBack,
            };
            if !edges.contains(&back) {
                edges.push(back);
            }
        }
    }

    /// Connect the returns of every called routine to its return sites.
    fn link_returns(&mut self) -> bool {
        let callees: Vec<(u32, Vec<u32>)> = self
            .return_sites
            .iter()
            .map(|(callee, sites)| (*callee, sites.iter().copied().collect()))
            .collect();

        let mut changed = false;
        for (callee, sites) in callees {
            let Some(&entry) = self.index.get(&callee) else {
                continue;
            };
            for ret in self.returns_in_body(entry) {
                for &site in &sites {
                    changed |= self.edge(ret, site, EdgeKind::Return);
                }
            }
        }
        changed
    }

    /// Nodes reachable from `entry` without entering callees. Calls step
    /// over to their return site once it is part of the graph.
    fn body(&self, entry: NodeId) -> FxHashSet<NodeId> {
        let mut seen = FxHashSet::default();
        let mut stack = vec![entry];
        seen.insert(entry);

        while let Some(id) = stack.pop() {
            let node = &self.nodes[id.index()];
            let is_call = self.program.get(node.pc).is_some_and(|insn| {
                matches!(
                    insn.control,
                    Control::Call { .. } | Control::IndirectCall { .. }
                )
            });

            let mut push = |next: NodeId| {
                if seen.insert(next) {
                    stack.push(next);
                }
            };
            if is_call {
                if let Some(&site) = self.index.get(&node.pc.wrapping_add(4)) {
                    push(site);
                }
            } else {
                for edge in &node.edges {
                    if edge.kind != EdgeKind::Return {
                        push(edge.to);
                    }
                }
            }
        }
        seen
    }

    fn returns_in_body(&self, entry: NodeId) -> Vec<NodeId> {
        let mut rets: Vec<NodeId> = self
            .body(entry)
            .into_iter()
            .filter(|id| self.is_return(*id))
            .collect();
        rets.sort_unstable();
        rets
    }

    fn is_return(&self, id: NodeId) -> bool {
        self.program
            .get(self.nodes[id.index()].pc)
            .is_some_and(|insn| insn.control == Control::Return)
    }

    fn exits(&self, entry: NodeId) -> Vec<Exit> {
        let entry_body = self.body(entry);
        let mut exits: Vec<Exit> = self
            .halts
            .iter()
            .map(|node| Exit {
                node: *node,
                kind: ExitKind::Halt,
            })
            .collect();

        for id in (0..self.nodes.len() as u32).map(NodeId) {
            let unlinked = !self.nodes[id.index()]
                .edges
                .iter()
                .any(|e| e.kind == EdgeKind::Return);
            if self.is_return(id) && (entry_body.contains(&id) || unlinked) {
                exits.push(Exit {
                    node: id,
                    kind: ExitKind::Return,
                });
            }
        }

        exits.extend(self.fall_offs.iter().map(|(node, target)| Exit {
            node: *node,
            kind: ExitKind::FallOffEnd { target: *target },
        }));
        exits.sort_unstable();
        exits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(src: &str) -> Program {
        Program::from_listing(src).unwrap()
    }

    fn edges_of(graph: &ControlGraph, pc: u32) -> Vec<(u32, EdgeKind)> {
        let id = graph.id_of(pc).unwrap();
        let mut out: Vec<_> = graph
            .successors(id)
            .iter()
            .map(|e| (graph.pc(e.to), e.kind))
            .collect();
        out.sort_unstable();
        out
    }

    #[test]
    fn test_straight_line() {
        let p = program("_imem_start:\n addi x2, x0, 1\n addi x3, x2, 1\n ecall\n");
        let g = build_program_graph(&p).unwrap();
        assert_eq!(g.len(), 3);
        assert_eq!(g.entry_pc(), 0);
        assert_eq!(edges_of(&g, 0), vec![(4, EdgeKind::FallThrough)]);
        assert_eq!(
            g.exits(),
            &[Exit {
                node: g.id_of(8).unwrap(),
                kind: ExitKind::Halt
            }]
        );
    }

    #[test]
    fn test_branch_edges() {
        let p = program(
            "
            f:
                beq x5, x0, skip
                addi x2, x0, 1
            skip:
                ret
            ",
        );
        let g = build_subroutine_graph(&p, "f").unwrap();
        assert_eq!(
            edges_of(&g, 0),
            vec![(4, EdgeKind::NotTaken), (8, EdgeKind::Taken)]
        );
        assert_eq!(g.predecessors(g.id_of(8).unwrap()).len(), 2);
        // ret of the analyzed routine is an exit
        assert_eq!(g.exits().len(), 1);
        assert_eq!(g.exits()[0].kind, ExitKind::Return);
    }

    #[test]
    fn test_missing_symbols() {
        let p = program("f:\n ret\n");
        assert_eq!(
            build_program_graph(&p).unwrap_err(),
            CfgError::SymbolNotFound("_imem_start".to_string())
        );
        assert_eq!(
            build_subroutine_graph(&p, "g").unwrap_err(),
            CfgError::SubroutineNotFound("g".to_string())
        );
    }

    #[test]
    fn test_calls_link_returns() {
        let p = program(
            "
            main:
                jal x1, helper
                addi x2, x0, 1
                jal x1, helper
                ecall
            helper:
                addi x3, x0, 2
                ret
            ",
        );
        let g = build_subroutine_graph(&p, "main").unwrap();
        // The helper is shared by both call sites.
        assert_eq!(g.len(), 6);
        assert_eq!(edges_of(&g, 0), vec![(16, EdgeKind::Call)]);
        assert_eq!(
            edges_of(&g, 20),
            vec![(4, EdgeKind::Return), (12, EdgeKind::Return)]
        );
        // Only ecall ends the routine.
        assert_eq!(g.exits().len(), 1);
        assert_eq!(g.exits()[0].kind, ExitKind::Halt);
    }

    #[test]
    fn test_nested_calls() {
        let p = program(
            "
            main:
                jal x1, outer
                ecall
            outer:
                jal x1, inner
                ret
            inner:
                ret
            ",
        );
        let g = build_subroutine_graph(&p, "main").unwrap();
        assert_eq!(edges_of(&g, 16), vec![(12, EdgeKind::Return)]);
        assert_eq!(edges_of(&g, 12), vec![(4, EdgeKind::Return)]);
        assert!(g.contains(4));
    }

    #[test]
    fn test_recursion_terminates() {
        let p = program(
            "
            f:
                beq x2, x0, out
                addi x2, x2, -1
                jal x1, f
            out:
                ret
            ",
        );
        let g = build_subroutine_graph(&p, "f").unwrap();
        assert_eq!(g.len(), 4);
        // ret returns to the recursive call site and also leaves the routine.
        assert_eq!(edges_of(&g, 12), vec![(12, EdgeKind::Return)]);
        assert!(g
            .exits()
            .iter()
            .any(|e| e.kind == ExitKind::Return && g.pc(e.node) == 12));
    }

    #[test]
    fn test_hardware_loop() {
        let p = program(
            "
            f:
                loopi 4, 2
                addi x2, x2, 1
                addi x3, x3, 1
                ret
            ",
        );
        let g = build_subroutine_graph(&p, "f").unwrap();
        assert_eq!(
            edges_of(&g, 8),
            vec![(4, EdgeKind::LoopBack), (12, EdgeKind::LoopExit)]
        );
        let rpo = g.reverse_postorder();
        assert_eq!(rpo.len(), 4);
    }

    #[test]
    fn test_unresolved_indirect_jump() {
        let p = program("f:\n jr x5\n ret\n");
        assert_eq!(
            build_subroutine_graph(&p, "f").unwrap_err(),
            CfgError::UnresolvedControlFlow { pc: 0 }
        );

        let mut p = program("f:\n jr x5\n ret\n");
        p.set_indirect_targets(0, [4]);
        let g = build_subroutine_graph(&p, "f").unwrap();
        assert_eq!(edges_of(&g, 0), vec![(4, EdgeKind::Jump)]);
    }

    #[test]
    fn test_unresolved_indirect_call() {
        let src = "
            f:
                jalr x1, 0(x5)
                ecall
            g:
                addi x2, x0, 1
                ret
            h:
                ret
            ";
        assert_eq!(
            build_subroutine_graph(&program(src), "f").unwrap_err(),
            CfgError::UnresolvedControlFlow { pc: 0 }
        );

        let mut p = program(src);
        assert!(p.set_indirect_targets(0, [8, 16]));
        let g = build_subroutine_graph(&p, "f").unwrap();
        assert_eq!(
            edges_of(&g, 0),
            vec![(8, EdgeKind::Call), (16, EdgeKind::Call)]
        );
        // Both callees return to the instruction after the call.
        assert_eq!(edges_of(&g, 12), vec![(4, EdgeKind::Return)]);
        assert_eq!(edges_of(&g, 16), vec![(4, EdgeKind::Return)]);
        assert_eq!(g.exits().len(), 1);
        assert_eq!(g.exits()[0].kind, ExitKind::Halt);
    }

    #[test]
    fn test_fall_off_end() {
        let p = program("f:\n addi x2, x0, 1\n bne x2, x0, 0x100\n");
        let g = build_subroutine_graph(&p, "f").unwrap();
        let kinds: Vec<ExitKind> = g.exits().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ExitKind::FallOffEnd { target: 8 },
                ExitKind::FallOffEnd { target: 0x100 }
            ]
        );
    }
}
