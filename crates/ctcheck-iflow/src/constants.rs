//! Caller-declared register values at subroutine entry.

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::str::FromStr;

use ctcheck_isa::Location;

use crate::{IflowError, Result};

/// GPRs known to hold a fixed value when the analyzed routine is entered.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequiredConstants {
    values: BTreeMap<u8, u32>,
}

impl RequiredConstants {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `reg:value` tokens such as `x5:0xfffffff` or `x22:0`.
    pub fn parse<S: AsRef<str>>(tokens: impl IntoIterator<Item = S>) -> Result<Self> {
        let mut out = Self::new();
        for token in tokens {
            let token = token.as_ref();
            let invalid = |reason: String| IflowError::InvalidConstantSpec {
                spec: token.to_string(),
                reason,
            };

            let Some((reg, value)) = token.split_once(':') else {
                return Err(invalid("expected the form <reg>:<value>, e.g. x5:3".into()));
            };
            if value.contains(':') {
                return Err(invalid("expected the form <reg>:<value>, e.g. x5:3".into()));
            }
            let loc = Location::from_str(reg)
                .map_err(|_| invalid(format!("`{reg}` is not a register name")))?;
            let value = parse_value(value)
                .ok_or_else(|| invalid(format!("`{value}` is not a recognized number")))?;
            out.insert(loc, value).map_err(|e| match e {
                IflowError::InvalidConstantSpec { reason, .. } => invalid(reason),
                other => other,
            })?;
        }
        Ok(out)
    }

    /// Declare that `loc` holds `value` at entry.
    pub fn insert(&mut self, loc: Location, value: u64) -> Result<()> {
        let invalid = |reason: String| IflowError::InvalidConstantSpec {
            spec: format!("{loc}:{value}"),
            reason,
        };
        let Location::Gpr(reg) = loc else {
            return Err(invalid(format!("`{loc}` is not a general-purpose register")));
        };
        let value = u32::try_from(value)
            .map_err(|_| invalid(format!("{value} is out of range [0, {}]", u32::MAX)))?;
        if reg == 0 && value != 0 {
            return Err(invalid("x0 is hard-wired to zero".into()));
        }
        self.values.insert(reg, value);
        Ok(())
    }

    pub fn get(&self, reg: u8) -> Option<u32> {
        self.values.get(&reg).copied()
    }

    pub fn contains(&self, loc: Location) -> bool {
        matches!(loc, Location::Gpr(reg) if self.values.contains_key(&reg))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// `(register, value)` pairs in register order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, u32)> + '_ {
        self.values.iter().map(|(reg, value)| (*reg, *value))
    }
}

impl Display for RequiredConstants {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (reg, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "x{reg}:{value:#x}")?;
        }
        Ok(())
    }
}

fn parse_value(s: &str) -> Option<u64> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}
