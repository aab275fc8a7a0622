//! Control flow graph construction for OTBN programs.
//!
//! Graphs are built either for a whole program (from `_imem_start`) or for
//! a single subroutine. Nodes are instructions; edges carry the reason
//! control can move between them.

mod builder;
mod graph;

pub use builder::{build_graph, build_program_graph, build_subroutine_graph};
pub use graph::*;

use thiserror::Error;

/// CFG construction errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CfgError {
    #[error("symbol `{0}` not found")]
    SymbolNotFound(String),
    #[error("subroutine `{0}` not found")]
    SubroutineNotFound(String),
    #[error("no instruction at entry address {pc:#x}")]
    NoInstruction { pc: u32 },
    #[error("indirect jump or call at {pc:#x} has no statically known targets")]
    UnresolvedControlFlow { pc: u32 },
}

pub type Result<T> = std::result::Result<T, CfgError>;
