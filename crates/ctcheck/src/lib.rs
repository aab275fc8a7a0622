//! ctcheck - constant-time checker for OTBN programs
//!
//! Decides whether secret data can influence the control flow of an OTBN
//! program or subroutine. The pipeline is decode, build the control flow
//! graph, run the information-flow fixed point, then filter the control
//! dependencies against the secrets.
//!
//! # Example
//!
//! ```ignore
//! use ctcheck::{CheckConfig, check};
//!
//! let config = CheckConfig::new("modexp.elf")
//!     .with_subroutines(["modexp"])
//!     .with_secrets(["w2", "dmem"])?;
//! let outcomes = check(&config)?;
//! assert!(outcomes.iter().all(|o| o.verdict.passed));
//! ```

// Re-export from sub-crates
pub use ctcheck_cfg::{
    CfgError, ControlGraph, GraphScope, build_graph, build_program_graph, build_subroutine_graph,
};
pub use ctcheck_elf::{DecodeError, ElfError, PROGRAM_START_SYMBOL, Program};
pub use ctcheck_iflow::{
    AnalysisMode, ControlDependencyMap, IflowError, IflowResult, RequiredConstants, TaintLabel,
    TaintState, Verdict, Warning, analyze,
};
pub use ctcheck_isa::{Location, assemble};

mod config;
mod error;
pub mod report;

pub use config::{CheckConfig, InputFormat, Target};
pub use error::{Error, Result};
pub use report::{OutputFormat, Report};

use std::path::Path;

use rayon::prelude::*;
use tracing::{info, info_span};

/// Result of checking one target.
#[derive(Clone, Debug)]
pub struct CheckOutcome {
    pub target: Target,
    pub analysis: IflowResult,
    pub verdict: Verdict,
}

/// Decode `path` as ELF or as a textual listing.
pub fn load_program(path: &Path, format: InputFormat) -> Result<Program> {
    let program = match format {
        InputFormat::Elf => Program::from_elf(path)?,
        InputFormat::Listing => {
            let source = std::fs::read_to_string(path).map_err(|source| DecodeError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            Program::from_listing(&source)?
        }
    };
    Ok(program)
}

/// Build the graph for one target and run the analysis over it.
pub fn check_target(
    program: &Program,
    target: &Target,
    mode: &AnalysisMode,
    constants: &RequiredConstants,
) -> Result<CheckOutcome> {
    let _span = info_span!("check", %target).entered();

    let graph = match target {
        Target::Program => build_program_graph(program)?,
        Target::Subroutine(name) => build_subroutine_graph(program, name)?,
    };
    let analysis = analyze(program, &graph, mode, constants)?;
    let verdict = analysis.verdict(mode);

    info!(
        %target,
        passed = verdict.passed,
        findings = verdict.findings.len(),
        warnings = verdict.warnings.len(),
        "check complete"
    );
    Ok(CheckOutcome {
        target: target.clone(),
        analysis,
        verdict,
    })
}

/// Check every target of `config` against an already decoded program.
///
/// Targets run in parallel; outcomes come back in target order.
pub fn check_program(program: &Program, config: &CheckConfig) -> Result<Vec<CheckOutcome>> {
    config.validate()?;
    config
        .targets
        .par_iter()
        .map(|target| check_target(program, target, &config.mode, &config.constants))
        .collect()
}

/// Decode the configured input and check every target.
pub fn check(config: &CheckConfig) -> Result<Vec<CheckOutcome>> {
    config.validate()?;
    let program = load_program(&config.input, config.format)?;
    check_program(&program, config)
}
