//! Human and machine readable check reports.

use std::collections::BTreeMap;
use std::fmt::Write;

use console::style;
use ctcheck_elf::Program;
use ctcheck_iflow::{AnalysisMode, RequiredConstants, Warning};
use serde::Serialize;

use crate::{CheckOutcome, Result};

/// Report rendering format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Outcomes of one invocation, with the program for symbolizing addresses.
pub struct Report<'a> {
    program: &'a Program,
    outcomes: &'a [CheckOutcome],
    mode: &'a AnalysisMode,
    constants: &'a RequiredConstants,
}

#[derive(Serialize)]
struct JsonReport {
    passed: bool,
    results: Vec<JsonOutcome>,
}

#[derive(Serialize)]
struct JsonOutcome {
    target: String,
    passed: bool,
    /// Secret name to sorted branch addresses.
    findings: BTreeMap<String, Vec<u32>>,
    warnings: Vec<String>,
    iterations: usize,
}

impl<'a> Report<'a> {
    pub const fn new(
        program: &'a Program,
        outcomes: &'a [CheckOutcome],
        mode: &'a AnalysisMode,
        constants: &'a RequiredConstants,
    ) -> Self {
        Self {
            program,
            outcomes,
            mode,
            constants,
        }
    }

    /// Every target passed without warnings.
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(|o| o.verdict.is_clean())
    }

    pub fn render(&self, format: OutputFormat, verbose: bool) -> Result<String> {
        match format {
            OutputFormat::Text => Ok(self.text(verbose)),
            OutputFormat::Json => self.json(),
        }
    }

    /// Styled text, one block per target.
    pub fn text(&self, verbose: bool) -> String {
        let mut out = String::new();
        for outcome in self.outcomes {
            let target = &outcome.target;
            if verbose {
                let _ = match self.mode {
                    AnalysisMode::AllInputsSecret => writeln!(
                        out,
                        "{} No specific secrets provided; checking that {target} has only one control-flow path",
                        style("→").cyan()
                    ),
                    AnalysisMode::ExplicitSecrets(secrets) => writeln!(
                        out,
                        "{} Analyzing {target} with initial secrets [{}] and initial constants [{}]",
                        style("→").cyan(),
                        secrets
                            .iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                            .join(", "),
                        self.constants
                    ),
                };
            }

            let verdict = &outcome.verdict;
            if verdict.passed {
                let _ = writeln!(
                    out,
                    "{} {target}: no secret-dependent control flow",
                    style("✓").green().bold()
                );
            } else {
                let _ = writeln!(
                    out,
                    "{} {target}: the following secrets may influence control flow:",
                    style("✗").red().bold()
                );
                for (label, pcs) in &verdict.findings {
                    let pcs: Vec<String> = pcs.iter().map(|pc| self.program.describe(*pc)).collect();
                    let _ = writeln!(out, "  {}: {}", style(label).bold(), pcs.join(", "));
                }
            }

            for warning in &verdict.warnings {
                let _ = writeln!(
                    out,
                    "{} {target}: {}",
                    style("!").yellow().bold(),
                    self.warning(*warning)
                );
            }

            if verbose {
                let _ = writeln!(
                    out,
                    "  {}",
                    style(format!(
                        "{} worklist steps, {} tainted locations at exit",
                        outcome.analysis.iterations,
                        outcome.analysis.exit_state.tainted().count()
                    ))
                    .dim()
                );
            }
        }
        out
    }

    fn warning(&self, warning: Warning) -> String {
        match warning {
            Warning::FallsOffEnd { pc, target } => format!(
                "control falls off the end of the code at {} (to {target:#x})",
                self.program.describe(pc)
            ),
            Warning::NoExit => warning.to_string(),
        }
    }

    /// Pretty-printed JSON.
    pub fn json(&self) -> Result<String> {
        let results: Vec<JsonOutcome> = self
            .outcomes
            .iter()
            .map(|outcome| JsonOutcome {
                target: outcome.target.to_string(),
                passed: outcome.verdict.passed,
                findings: outcome
                    .verdict
                    .findings
                    .iter()
                    .map(|(label, pcs)| (label.to_string(), pcs.iter().copied().collect()))
                    .collect(),
                warnings: outcome
                    .verdict
                    .warnings
                    .iter()
                    .map(|w| self.warning(*w))
                    .collect(),
                iterations: outcome.analysis.iterations,
            })
            .collect();
        let report = JsonReport {
            passed: self.passed(),
            results,
        };
        let mut out = serde_json::to_string_pretty(&report)?;
        out.push('\n');
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CheckConfig, InputFormat, check_program};

    const SRC: &str = "
        _imem_start:
            jal x1, leaky
            jal x1, fixed
            ecall
        leaky:
            beq x5, x0, out
            nop
        out:
            ret
        fixed:
            add x6, x5, x7
            ret
    ";

    fn outcomes(subroutines: &[&str], secrets: &[&str]) -> (Program, CheckConfig, Vec<CheckOutcome>) {
        let program = Program::from_listing(SRC).unwrap();
        let config = CheckConfig::new("unused.s")
            .with_format(InputFormat::Listing)
            .with_subroutines(subroutines.iter().copied())
            .with_secrets(secrets.iter().copied())
            .unwrap();
        let outcomes = check_program(&program, &config).unwrap();
        (program, config, outcomes)
    }

    #[test]
    fn test_text_report() {
        let (program, config, outcomes) = outcomes(&["leaky", "fixed"], &["x5"]);
        let report = Report::new(&program, &outcomes, &config.mode, &config.constants);
        assert!(!report.passed());

        let text = console::strip_ansi_codes(&report.text(false)).into_owned();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "✗ subroutine leaky: the following secrets may influence control flow:",
                "  x5: 0x0000000c <leaky>",
                "✓ subroutine fixed: no secret-dependent control flow",
            ]
        );
    }

    #[test]
    fn test_verbose_text_mentions_mode() {
        let (program, config, outcomes) = outcomes(&["fixed"], &[]);
        let config = CheckConfig {
            mode: AnalysisMode::AllInputsSecret,
            ..config
        };
        let report = Report::new(&program, &outcomes, &config.mode, &config.constants);
        let text = console::strip_ansi_codes(&report.text(true)).into_owned();
        assert!(text.contains("checking that subroutine fixed has only one control-flow path"));
        assert!(text.contains("worklist steps"));
    }

    #[test]
    fn test_json_report() {
        let (program, config, outcomes) = outcomes(&["leaky", "fixed"], &["x5"]);
        let report = Report::new(&program, &outcomes, &config.mode, &config.constants);
        let json: serde_json::Value = serde_json::from_str(&report.json().unwrap()).unwrap();

        assert_eq!(json["passed"], false);
        assert_eq!(json["results"][0]["target"], "subroutine leaky");
        assert_eq!(json["results"][0]["findings"]["x5"], serde_json::json!([12]));
        assert_eq!(json["results"][1]["passed"], true);
        assert_eq!(json["results"][1]["findings"], serde_json::json!({}));
    }
}
