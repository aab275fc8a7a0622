//! Information-flow analysis for OTBN code.
//!
//! Taint labels name the entry-time contents of storage locations. A forward
//! fixed point over a [`ctcheck_cfg::ControlGraph`] tracks which labels every
//! location may carry; a branch whose condition carries a label is a control
//! dependency of that label. [`Verdict`] decides whether any secret reaches
//! a branch.

mod analysis;
mod constants;
mod label;
mod state;
mod value;
mod verdict;

pub use analysis::{AnalysisMode, ControlDependencyMap, IflowResult, analyze};
pub use constants::RequiredConstants;
pub use label::{LabelSet, TaintLabel};
pub use state::TaintState;
pub use value::{RegisterState, RegisterValue};
pub use verdict::{Verdict, Warning};

use thiserror::Error;

/// Rejected analysis inputs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IflowError {
    #[error("invalid required constant `{spec}`: {reason}")]
    InvalidConstantSpec { spec: String, reason: String },
}

pub type Result<T> = std::result::Result<T, IflowError>;
