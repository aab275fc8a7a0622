//! OTBN instruction set model for constant-time analysis.
//!
//! This crate provides the storage-location vocabulary, a binary decoder, a
//! listing assembler and the per-instruction dataflow semantics consumed by
//! the CFG builder and the information-flow analysis.

pub mod asm;
mod csr;
mod decode;
mod encode;
mod location;
mod op;
mod semantics;

pub use asm::{AsmError, Listing, assemble, assemble_at};
pub use csr::{Csr, csr_name};
pub use decode::decode;
pub use encode::*;
pub use location::*;
pub use op::*;
pub use semantics::*;
