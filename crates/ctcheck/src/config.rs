//! Typed check configuration.

use std::fmt::{self, Display};
use std::path::PathBuf;
use std::str::FromStr;

use ctcheck_iflow::{AnalysisMode, IflowError, RequiredConstants};
use ctcheck_isa::Location;

use crate::Result;

/// How the input file is read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InputFormat {
    /// ELF32 binary.
    #[default]
    Elf,
    /// Textual assembly listing.
    Listing,
}

/// What to analyze.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    /// The whole program, from `_imem_start`.
    Program,
    Subroutine(String),
}

impl Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Program => f.write_str("entire program"),
            Self::Subroutine(name) => write!(f, "subroutine {name}"),
        }
    }
}

/// Everything one checker invocation needs.
#[derive(Clone, Debug)]
pub struct CheckConfig {
    pub input: PathBuf,
    pub format: InputFormat,
    /// Checked independently, reported in this order.
    pub targets: Vec<Target>,
    pub mode: AnalysisMode,
    pub constants: RequiredConstants,
}

impl CheckConfig {
    /// Check the whole program with every input secret.
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            format: InputFormat::Elf,
            targets: vec![Target::Program],
            mode: AnalysisMode::AllInputsSecret,
            constants: RequiredConstants::new(),
        }
    }

    #[must_use]
    pub const fn with_format(mut self, format: InputFormat) -> Self {
        self.format = format;
        self
    }

    /// Check these subroutines instead of the whole program.
    #[must_use]
    pub fn with_subroutines<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        let targets: Vec<Target> = names
            .into_iter()
            .map(|name| Target::Subroutine(name.into()))
            .collect();
        if !targets.is_empty() {
            self.targets = targets;
        }
        self
    }

    /// Restrict findings to the named locations.
    pub fn with_secrets<S: AsRef<str>>(mut self, names: impl IntoIterator<Item = S>) -> Result<Self> {
        let secrets = names
            .into_iter()
            .map(|name| Location::from_str(name.as_ref()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        self.mode = AnalysisMode::secrets(secrets);
        Ok(self)
    }

    /// Declare `reg:value` entry constants.
    pub fn with_constants<S: AsRef<str>>(
        mut self,
        tokens: impl IntoIterator<Item = S>,
    ) -> Result<Self> {
        self.constants = RequiredConstants::parse(tokens)?;
        Ok(self)
    }

    /// Reject combinations no analysis can accept.
    pub fn validate(&self) -> Result<()> {
        if !self.constants.is_empty() && self.targets.contains(&Target::Program) {
            return Err(IflowError::InvalidConstantSpec {
                spec: self.constants.to_string(),
                reason: "cannot require initial constants for a whole program; \
                         use --subroutine to analyze a specific subroutine"
                    .into(),
            }
            .into());
        }
        Ok(())
    }
}
