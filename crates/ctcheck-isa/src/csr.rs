//! OTBN CSR address map.

use crate::FlagGroup;

/// CSRs reachable through `csrrs`/`csrrw`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Csr {
    /// One flag group as a 4-bit value.
    Fg(FlagGroup),
    /// Both flag groups packed together.
    Flags,
    /// One 32-bit limb of the MOD WSR.
    Mod(u8),
    /// Writes kick off a prefetch; reads return zero.
    RndPrefetch,
    Rnd,
    Urnd,
}

pub const CSR_FG0: u16 = 0x7C0;
pub const CSR_FG1: u16 = 0x7C1;
pub const CSR_FLAGS: u16 = 0x7C8;
pub const CSR_MOD0: u16 = 0x7D0;
pub const CSR_MOD7: u16 = 0x7D7;
pub const CSR_RND_PREFETCH: u16 = 0x7D8;
pub const CSR_RND: u16 = 0xFC0;
pub const CSR_URND: u16 = 0xFC1;

const MOD_NAMES: [&str; 8] = ["mod0", "mod1", "mod2", "mod3", "mod4", "mod5", "mod6", "mod7"];

impl Csr {
    pub const fn from_addr(addr: u16) -> Option<Self> {
        match addr {
            CSR_FG0 => Some(Self::Fg(FlagGroup::Fg0)),
            CSR_FG1 => Some(Self::Fg(FlagGroup::Fg1)),
            CSR_FLAGS => Some(Self::Flags),
            CSR_MOD0..=CSR_MOD7 => Some(Self::Mod((addr - CSR_MOD0) as u8)),
            CSR_RND_PREFETCH => Some(Self::RndPrefetch),
            CSR_RND => Some(Self::Rnd),
            CSR_URND => Some(Self::Urnd),
            _ => None,
        }
    }

    pub const fn addr(self) -> u16 {
        match self {
            Self::Fg(FlagGroup::Fg0) => CSR_FG0,
            Self::Fg(FlagGroup::Fg1) => CSR_FG1,
            Self::Flags => CSR_FLAGS,
            Self::Mod(limb) => CSR_MOD0 + (limb & 7) as u16,
            Self::RndPrefetch => CSR_RND_PREFETCH,
            Self::Rnd => CSR_RND,
            Self::Urnd => CSR_URND,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Fg(FlagGroup::Fg0) => "fg0",
            Self::Fg(FlagGroup::Fg1) => "fg1",
            Self::Flags => "flags",
            Self::Mod(limb) => MOD_NAMES[(limb & 7) as usize],
            Self::RndPrefetch => "rnd_prefetch",
            Self::Rnd => "rnd",
            Self::Urnd => "urnd",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        [
            CSR_FG0,
            CSR_FG1,
            CSR_FLAGS,
            CSR_RND_PREFETCH,
            CSR_RND,
            CSR_URND,
        ]
        .into_iter()
        .chain(CSR_MOD0..=CSR_MOD7)
        .filter_map(Self::from_addr)
        .find(|csr| csr.name() == name)
    }
}

/// Symbolic name of a CSR address, if it is one OTBN implements.
pub fn csr_name(addr: u16) -> Option<&'static str> {
    Csr::from_addr(addr).map(Csr::name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csr_map() {
        assert_eq!(Csr::from_addr(0x7C8), Some(Csr::Flags));
        assert_eq!(Csr::from_addr(0x7D3), Some(Csr::Mod(3)));
        assert_eq!(Csr::from_addr(0xFC1), Some(Csr::Urnd));
        assert_eq!(Csr::from_addr(0x300), None);
        assert_eq!(Csr::from_name("MOD7").map(Csr::addr), Some(0x7D7));
        assert_eq!(csr_name(0x7C1), Some("fg1"));
    }
}
