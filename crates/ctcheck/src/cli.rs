//! CLI definitions and argument types.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use ctcheck::{CheckConfig, InputFormat, OutputFormat};

/// Exit code for success.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for findings, warnings or errors.
pub const EXIT_FAILURE: i32 = 1;

#[derive(Parser)]
#[command(name = "ctcheck")]
#[command(
    about = "Analyze whether secret data affects the control flow of an OTBN program or subroutine"
)]
#[command(version)]
pub struct Cli {
    /// The .elf file to check (or an assembly listing with --listing)
    #[arg(value_name = "ELF")]
    pub input: PathBuf,

    /// Treat the input as a textual assembly listing
    #[arg(long)]
    pub listing: bool,

    /// Subroutine to check; repeat to check several. Without it the start
    /// point is _imem_start (whole program)
    #[arg(long, value_name = "SYMBOL")]
    pub subroutine: Vec<String>,

    /// Registers required to be constant at subroutine entry, as reg:value
    /// (e.g. x3:5). Only GPRs are accepted and only with --subroutine
    #[arg(long, value_name = "REG:VAL", num_args = 1..)]
    pub constants: Vec<String>,

    /// Initial secret locations (x5, w3, fg0.c, acc, dmem, ...). If not
    /// provided, everything is secret: the code must have only one possible
    /// control-flow path regardless of input
    #[arg(long, value_name = "LOC", num_args = 1..)]
    pub secrets: Option<Vec<String>>,

    /// Report format
    #[arg(long, value_enum, default_value = "text")]
    pub format: FormatArg,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum FormatArg {
    Text,
    Json,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => Self::Text,
            FormatArg::Json => Self::Json,
        }
    }
}

impl Cli {
    /// Map the arguments into a validated check configuration.
    pub fn config(&self) -> ctcheck::Result<CheckConfig> {
        let format = if self.listing {
            InputFormat::Listing
        } else {
            InputFormat::Elf
        };
        let mut config = CheckConfig::new(&self.input)
            .with_format(format)
            .with_subroutines(self.subroutine.iter().cloned())
            .with_constants(&self.constants)?;
        if let Some(secrets) = &self.secrets {
            config = config.with_secrets(secrets)?;
        }
        config.validate()?;
        Ok(config)
    }
}
