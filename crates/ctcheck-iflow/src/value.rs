//! GPR constant tracking, used to resolve indirectly named wide registers.

use ctcheck_isa::{CALL_STACK_GPR, NUM_GPRS};

const MAX_VALUES: usize = 16;

/// Tracked register value - either unknown or a set of possible constant values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum RegisterValue {
    /// Value is unknown (too many possibilities or computed from unknown).
    #[default]
    Unknown,
    /// Value is one of these constant values (sorted, deduplicated).
    Constant(Vec<u32>),
}

impl RegisterValue {
    /// Create a single constant value.
    pub fn constant(val: u32) -> Self {
        Self::Constant(vec![val])
    }

    /// Get constant values if known.
    pub fn values(&self) -> Option<&[u32]> {
        match self {
            Self::Constant(v) => Some(v),
            Self::Unknown => None,
        }
    }

    /// Apply `f` to every possible value.
    #[must_use]
    pub fn map(&self, f: impl Fn(u32) -> u32) -> Self {
        match self {
            Self::Unknown => Self::Unknown,
            Self::Constant(values) => {
                let mut out: Vec<u32> = values.iter().map(|v| f(*v)).collect();
                out.sort_unstable();
                out.dedup();
                Self::Constant(out)
            }
        }
    }

    /// Merge two values, returning the union.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Unknown, _) | (_, Self::Unknown) => Self::Unknown,
            (Self::Constant(a), Self::Constant(b)) => {
                let mut merged: Vec<u32> = a.iter().chain(b).copied().collect();
                merged.sort_unstable();
                merged.dedup();
                if merged.len() > MAX_VALUES {
                    Self::Unknown
                } else {
                    Self::Constant(merged)
                }
            }
        }
    }
}

/// Known GPR values at one program point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterState {
    regs: [RegisterValue; NUM_GPRS],
}

impl Default for RegisterState {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterState {
    /// Create new state with x0 = 0 and all others unknown.
    pub fn new() -> Self {
        let mut regs: [RegisterValue; NUM_GPRS] = Default::default();
        regs[0] = RegisterValue::constant(0);
        Self { regs }
    }

    pub fn get(&self, reg: u8) -> &RegisterValue {
        self.regs
            .get(usize::from(reg))
            .unwrap_or(&RegisterValue::Unknown)
    }

    /// Set register value. `x0` stays zero and the call stack `x1` stays
    /// unknown: every read pops it, so no write pins what the next read sees.
    pub fn set(&mut self, reg: u8, value: RegisterValue) {
        let idx = usize::from(reg);
        if reg == CALL_STACK_GPR {
            self.regs[idx] = RegisterValue::Unknown;
        } else if idx > 0 && idx < NUM_GPRS {
            self.regs[idx] = value;
        }
    }

    /// Merge another state into this one. Returns true if anything changed.
    pub fn merge(&mut self, other: &Self) -> bool {
        let mut changed = false;
        for i in 1..NUM_GPRS {
            let merged = self.regs[i].merge(&other.regs[i]);
            if merged != self.regs[i] {
                self.regs[i] = merged;
                changed = true;
            }
        }
        changed
    }
}
