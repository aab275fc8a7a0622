//! Arena control flow graph.

use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};

/// Index of a node in its graph's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Why control can move along an edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EdgeKind {
    FallThrough,
    Taken,
    NotTaken,
    Jump,
    Call,
    Return,
    /// From the last instruction of a hardware loop body back to its start.
    LoopBack,
    /// Leaving a hardware loop body after its last iteration.
    LoopExit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Edge {
    pub to: NodeId,
    pub kind: EdgeKind,
}

/// How execution can end at a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExitKind {
    /// `ecall`
    Halt,
    /// Return from the analyzed routine.
    Return,
    /// Control continues at an address holding no instruction.
    FallOffEnd { target: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Exit {
    pub node: NodeId,
    pub kind: ExitKind,
}

#[derive(Clone, Debug)]
pub struct Node {
    pub pc: u32,
    pub edges: Vec<Edge>,
}

/// What the graph was built for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GraphScope {
    Program,
    Subroutine(String),
}

/// A control flow graph: nodes in an arena, edges by index.
#[derive(Clone, Debug)]
pub struct ControlGraph {
    pub(crate) entry: NodeId,
    pub(crate) scope: GraphScope,
    pub(crate) nodes: Vec<Node>,
    pub(crate) index: FxHashMap<u32, NodeId>,
    pub(crate) predecessors: Vec<Vec<NodeId>>,
    pub(crate) exits: Vec<Exit>,
}

impl ControlGraph {
    pub(crate) fn new(
        entry: NodeId,
        scope: GraphScope,
        nodes: Vec<Node>,
        index: FxHashMap<u32, NodeId>,
        exits: Vec<Exit>,
    ) -> Self {
        let predecessors = build_predecessors(&nodes);
        Self {
            entry,
            scope,
            nodes,
            index,
            predecessors,
            exits,
        }
    }

    pub const fn entry(&self) -> NodeId {
        self.entry
    }

    pub fn entry_pc(&self) -> u32 {
        self.nodes[self.entry.index()].pc
    }

    pub const fn scope(&self) -> &GraphScope {
        &self.scope
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn pc(&self, id: NodeId) -> u32 {
        self.nodes[id.index()].pc
    }

    /// Node ids in creation (breadth-first) order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    pub fn id_of(&self, pc: u32) -> Option<NodeId> {
        self.index.get(&pc).copied()
    }

    pub fn contains(&self, pc: u32) -> bool {
        self.index.contains_key(&pc)
    }

    pub fn successors(&self, id: NodeId) -> &[Edge] {
        &self.nodes[id.index()].edges
    }

    pub fn predecessors(&self, id: NodeId) -> &[NodeId] {
        &self.predecessors[id.index()]
    }

    pub fn exits(&self) -> &[Exit] {
        &self.exits
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|n| n.edges.len()).sum()
    }

    /// Reverse postorder from the entry.
    pub fn reverse_postorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut visited = vec![false; self.nodes.len()];
        // (node, next edge to look at)
        let mut stack = vec![(self.entry, 0usize)];
        visited[self.entry.index()] = true;

        while let Some((id, next)) = stack.pop() {
            let edges = self.successors(id);
            if let Some(edge) = edges.get(next) {
                stack.push((id, next + 1));
                if !visited[edge.to.index()] {
                    visited[edge.to.index()] = true;
                    stack.push((edge.to, 0));
                }
            } else {
                order.push(id);
            }
        }

        order.reverse();
        order
    }
}

fn build_predecessors(nodes: &[Node]) -> Vec<Vec<NodeId>> {
    // Build partial maps in parallel, then merge
    let map = nodes
        .par_iter()
        .enumerate()
        .fold(
            FxHashMap::default,
            |mut partial: FxHashMap<NodeId, FxHashSet<NodeId>>, (idx, node)| {
                for edge in &node.edges {
                    partial.entry(edge.to).or_default().insert(NodeId(idx as u32));
                }
                partial
            },
        )
        .reduce(FxHashMap::default, |mut a, b| {
            for (to, preds) in b {
                a.entry(to).or_default().extend(preds);
            }
            a
        });

    let mut predecessors = vec![Vec::new(); nodes.len()];
    for (to, preds) in map {
        let mut preds: Vec<NodeId> = preds.into_iter().collect();
        preds.sort_unstable();
        predecessors[to.index()] = preds;
    }
    predecessors
}
