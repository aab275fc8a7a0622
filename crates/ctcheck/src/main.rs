//! ctcheck CLI - OTBN constant-time checker

mod cli;
mod terminal;

use clap::Parser;
use ctcheck::Report;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use cli::{Cli, EXIT_FAILURE, EXIT_SUCCESS};

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        "ctcheck=info"
    } else {
        "ctcheck=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    std::process::exit(run(&cli));
}

fn run(cli: &Cli) -> i32 {
    match check(cli) {
        Ok(code) => code,
        Err(err) => {
            terminal::error(&err.to_string());
            EXIT_FAILURE
        }
    }
}

fn check(cli: &Cli) -> ctcheck::Result<i32> {
    let config = cli.config()?;
    if cli.verbose {
        terminal::info(&format!("Loading {}", config.input.display()));
    }

    let program = ctcheck::load_program(&config.input, config.format)?;
    if cli.verbose {
        let branches = program
            .instructions()
            .filter(|insn| insn.condition().is_some())
            .count();
        terminal::dim(&format!(
            "{} instructions ({branches} branches), {} symbols",
            program.len(),
            program.symbols().len()
        ));
    }

    let outcomes = ctcheck::check_program(&program, &config)?;
    let report = Report::new(&program, &outcomes, &config.mode, &config.constants);
    print!("{}", report.render(cli.format.into(), cli.verbose)?);

    Ok(if report.passed() {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    })
}
