//! Pass/fail decision over control dependencies.

use std::fmt::{self, Display};

use crate::analysis::{AnalysisMode, ControlDependencyMap};

/// Non-fatal conditions found while analyzing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Warning {
    /// Control can continue from `pc` to `target`, which holds no instruction.
    FallsOffEnd { pc: u32, target: u32 },
    /// No path through the routine ever exits.
    NoExit,
}

impl Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FallsOffEnd { pc, target } => write!(
                f,
                "control falls off the end of the code at {pc:#x} (to {target:#x})"
            ),
            Self::NoExit => f.write_str("routine never exits"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Verdict {
    /// No secret influences control flow.
    pub passed: bool,
    /// Secrets that do, with the branches they reach.
    pub findings: ControlDependencyMap,
    pub warnings: Vec<Warning>,
}

impl Verdict {
    /// Keep the dependencies that count under `mode` and decide.
    ///
    /// With every input secret, any dependency at all means the routine has
    /// more than one control-flow path.
    pub fn evaluate(
        control_deps: &ControlDependencyMap,
        mode: &AnalysisMode,
        warnings: &[Warning],
    ) -> Self {
        let findings: ControlDependencyMap = control_deps
            .iter()
            .filter(|(label, pcs)| !pcs.is_empty() && mode.is_secret(**label))
            .map(|(label, pcs)| (*label, pcs.clone()))
            .collect();
        Self {
            passed: findings.is_empty(),
            findings,
            warnings: warnings.to_vec(),
        }
    }

    /// Passed without warnings.
    pub fn is_clean(&self) -> bool {
        self.passed && self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use ctcheck_isa::Location;

    use super::*;
    use crate::TaintLabel;

    fn deps() -> ControlDependencyMap {
        [
            (TaintLabel(Location::Gpr(5)), BTreeSet::from([0x100])),
            (TaintLabel(Location::Wdr(1)), BTreeSet::from([0x40, 0x80])),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_all_inputs_secret_keeps_everything() {
        let v = Verdict::evaluate(&deps(), &AnalysisMode::AllInputsSecret, &[]);
        assert!(!v.passed);
        assert_eq!(v.findings, deps());
    }

    #[test]
    fn test_explicit_secrets_filter() {
        let v = Verdict::evaluate(&deps(), &AnalysisMode::secrets([Location::Wdr(1)]), &[]);
        assert!(!v.passed);
        assert_eq!(v.findings.len(), 1);
        assert_eq!(
            v.findings[&TaintLabel(Location::Wdr(1))],
            BTreeSet::from([0x40, 0x80])
        );

        let v = Verdict::evaluate(&deps(), &AnalysisMode::secrets([Location::Gpr(6)]), &[]);
        assert!(v.passed);
        assert!(v.findings.is_empty());
    }

    #[test]
    fn test_warnings_do_not_fail() {
        let warnings = [Warning::NoExit];
        let v = Verdict::evaluate(
            &ControlDependencyMap::new(),
            &AnalysisMode::AllInputsSecret,
            &warnings,
        );
        assert!(v.passed);
        assert!(!v.is_clean());
        assert_eq!(v.warnings[0].to_string(), "routine never exits");
    }
}
