//! Architectural storage locations tracked by the analysis.

use std::fmt::{self, Display};
use std::str::FromStr;

use thiserror::Error;

/// Number of general-purpose registers.
pub const NUM_GPRS: usize = 32;
/// Number of wide data registers.
pub const NUM_WDRS: usize = 32;
/// GPR backed by the hardware call stack.
pub const CALL_STACK_GPR: u8 = 1;

const NUM_FLAGS: usize = 8;
const NUM_SPECIALS: usize = 8;

// Dense index layout: GPRs, WDRs, flags, special registers, DMEM.
const WDR_BASE: usize = NUM_GPRS;
const FLAG_BASE: usize = WDR_BASE + NUM_WDRS;
const SPECIAL_BASE: usize = FLAG_BASE + NUM_FLAGS;
const DMEM_INDEX: usize = SPECIAL_BASE + NUM_SPECIALS;

/// Flag group selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum FlagGroup {
    #[default]
    Fg0,
    Fg1,
}

impl FlagGroup {
    pub const fn from_bit(bit: u32) -> Self {
        if bit & 1 == 0 { Self::Fg0 } else { Self::Fg1 }
    }

    const fn index(self) -> usize {
        match self {
            Self::Fg0 => 0,
            Self::Fg1 => 1,
        }
    }

    /// All four flags of this group.
    pub fn flags(self) -> [Location; 4] {
        Flag::ALL.map(|flag| Location::Flag(self, flag))
    }
}

impl Display for FlagGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fg0 => f.write_str("fg0"),
            Self::Fg1 => f.write_str("fg1"),
        }
    }
}

/// A single flag within a flag group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Flag {
    /// Carry.
    C,
    /// MSB of the result.
    M,
    /// LSB of the result.
    L,
    /// Zero.
    Z,
}

impl Flag {
    pub const ALL: [Self; 4] = [Self::C, Self::M, Self::L, Self::Z];

    pub const fn from_bits(bits: u32) -> Self {
        match bits & 0x3 {
            0 => Self::C,
            1 => Self::M,
            2 => Self::L,
            _ => Self::Z,
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::C => 0,
            Self::M => 1,
            Self::L => 2,
            Self::Z => 3,
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::C => "c",
            Self::M => "m",
            Self::L => "l",
            Self::Z => "z",
        }
    }
}

/// Wide special registers (WSRs).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SpecialReg {
    Mod,
    Rnd,
    Urnd,
    Acc,
    KeyS0L,
    KeyS0H,
    KeyS1L,
    KeyS1H,
}

impl SpecialReg {
    pub const ALL: [Self; NUM_SPECIALS] = [
        Self::Mod,
        Self::Rnd,
        Self::Urnd,
        Self::Acc,
        Self::KeyS0L,
        Self::KeyS0H,
        Self::KeyS1L,
        Self::KeyS1H,
    ];

    /// Look up a WSR by its index in the WSR address space.
    pub const fn from_wsr(wsr: u32) -> Option<Self> {
        match wsr {
            0 => Some(Self::Mod),
            1 => Some(Self::Rnd),
            2 => Some(Self::Urnd),
            3 => Some(Self::Acc),
            4 => Some(Self::KeyS0L),
            5 => Some(Self::KeyS0H),
            6 => Some(Self::KeyS1L),
            7 => Some(Self::KeyS1H),
            _ => None,
        }
    }

    /// WSR index of this register.
    pub const fn wsr(self) -> u8 {
        self.index() as u8
    }

    /// Reads return fresh values and writes are ignored.
    pub const fn is_read_only(self) -> bool {
        !matches!(self, Self::Mod | Self::Acc)
    }

    const fn index(self) -> usize {
        match self {
            Self::Mod => 0,
            Self::Rnd => 1,
            Self::Urnd => 2,
            Self::Acc => 3,
            Self::KeyS0L => 4,
            Self::KeyS0H => 5,
            Self::KeyS1L => 6,
            Self::KeyS1H => 7,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Mod => "mod",
            Self::Rnd => "rnd",
            Self::Urnd => "urnd",
            Self::Acc => "acc",
            Self::KeyS0L => "key_s0_l",
            Self::KeyS0H => "key_s0_h",
            Self::KeyS1L => "key_s1_l",
            Self::KeyS1H => "key_s1_h",
        }
    }
}

/// A storage location: the unit of taint tracking.
///
/// Locations have a canonical lowercase name (`x5`, `w3`, `fg0.c`, `acc`,
/// `dmem`) which round-trips through [`FromStr`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Location {
    /// General-purpose register `x0`..`x31`.
    Gpr(u8),
    /// Wide data register `w0`..`w31`.
    Wdr(u8),
    /// One flag of a flag group.
    Flag(FlagGroup, Flag),
    /// Wide special register.
    Special(SpecialReg),
    /// Data memory, modeled as a single region.
    Dmem,
}

impl Location {
    /// Size of the location universe.
    pub const COUNT: usize = DMEM_INDEX + 1;

    /// Dense index in `0..Location::COUNT`.
    pub const fn index(self) -> usize {
        match self {
            Self::Gpr(r) => (r as usize) % NUM_GPRS,
            Self::Wdr(r) => WDR_BASE + (r as usize) % NUM_WDRS,
            Self::Flag(group, flag) => FLAG_BASE + group.index() * 4 + flag.index(),
            Self::Special(reg) => SPECIAL_BASE + reg.index(),
            Self::Dmem => DMEM_INDEX,
        }
    }

    /// Inverse of [`Location::index`].
    pub const fn from_index(idx: usize) -> Option<Self> {
        if idx < WDR_BASE {
            Some(Self::Gpr(idx as u8))
        } else if idx < FLAG_BASE {
            Some(Self::Wdr((idx - WDR_BASE) as u8))
        } else if idx < SPECIAL_BASE {
            let rel = idx - FLAG_BASE;
            let group = if rel < 4 { FlagGroup::Fg0 } else { FlagGroup::Fg1 };
            Some(Self::Flag(group, Flag::from_bits((rel % 4) as u32)))
        } else if idx < DMEM_INDEX {
            Some(Self::Special(SpecialReg::ALL[idx - SPECIAL_BASE]))
        } else if idx == DMEM_INDEX {
            Some(Self::Dmem)
        } else {
            None
        }
    }

    /// Every architectural location, in index order.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..Self::COUNT).filter_map(Self::from_index)
    }

    pub const fn is_gpr(self) -> bool {
        matches!(self, Self::Gpr(_))
    }

    /// `x0` always reads as zero.
    pub const fn is_hardwired_zero(self) -> bool {
        matches!(self, Self::Gpr(0))
    }

    /// `x1` is the hardware call stack: writes push, reads pop.
    pub const fn is_call_stack(self) -> bool {
        matches!(self, Self::Gpr(CALL_STACK_GPR))
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gpr(r) => write!(f, "x{r}"),
            Self::Wdr(r) => write!(f, "w{r}"),
            Self::Flag(group, flag) => write!(f, "{group}.{}", flag.name()),
            Self::Special(reg) => f.write_str(reg.name()),
            Self::Dmem => f.write_str("dmem"),
        }
    }
}

/// Location name parse errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocationError {
    #[error("unknown storage location `{0}`")]
    Unknown(String),
}

impl FromStr for Location {
    type Err = LocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        if let Some(reg) = parse_indexed(&name, 'x') {
            return Ok(Self::Gpr(reg));
        }
        if let Some(reg) = parse_indexed(&name, 'w') {
            return Ok(Self::Wdr(reg));
        }
        if let Some((group, flag)) = name.split_once('.') {
            let group = match group {
                "fg0" => FlagGroup::Fg0,
                "fg1" => FlagGroup::Fg1,
                _ => return Err(LocationError::Unknown(s.to_string())),
            };
            let flag = match flag {
                "c" => Flag::C,
                "m" => Flag::M,
                "l" => Flag::L,
                "z" => Flag::Z,
                _ => return Err(LocationError::Unknown(s.to_string())),
            };
            return Ok(Self::Flag(group, flag));
        }
        if name == "dmem" {
            return Ok(Self::Dmem);
        }
        SpecialReg::ALL
            .iter()
            .find(|reg| reg.name() == name)
            .map(|reg| Self::Special(*reg))
            .ok_or_else(|| LocationError::Unknown(s.to_string()))
    }
}

/// Parse `<prefix><0..=31>` without leading zeros or signs.
pub(crate) fn parse_indexed(name: &str, prefix: char) -> Option<u8> {
    let digits = name.strip_prefix(prefix)?;
    if digits.is_empty() || digits.len() > 2 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return None;
    }
    let idx: u8 = digits.parse().ok()?;
    (usize::from(idx) < NUM_GPRS).then_some(idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_roundtrip() {
        let all: Vec<Location> = Location::all().collect();
        assert_eq!(all.len(), Location::COUNT);
        for (idx, loc) in all.iter().enumerate() {
            assert_eq!(loc.index(), idx);
        }
        assert_eq!(Location::COUNT, 81);
    }

    #[test]
    fn test_names() {
        assert_eq!(Location::Gpr(5).to_string(), "x5");
        assert_eq!(Location::Wdr(31).to_string(), "w31");
        assert_eq!(Location::Flag(FlagGroup::Fg1, Flag::Z).to_string(), "fg1.z");
        assert_eq!(Location::Special(SpecialReg::KeyS0L).to_string(), "key_s0_l");

        for loc in Location::all() {
            assert_eq!(loc.to_string().parse::<Location>(), Ok(loc));
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("x32".parse::<Location>().is_err());
        assert!("x05".parse::<Location>().is_err());
        assert!("a0".parse::<Location>().is_err());
        assert!("fg2.c".parse::<Location>().is_err());
        assert_eq!("ACC".parse::<Location>(), Ok(Location::Special(SpecialReg::Acc)));
    }

    #[test]
    fn test_special_gprs() {
        assert!(Location::Gpr(0).is_hardwired_zero());
        assert!(Location::Gpr(1).is_call_stack());
        assert!(!Location::Gpr(2).is_call_stack());
        assert!(!Location::Wdr(1).is_call_stack());
    }
}
