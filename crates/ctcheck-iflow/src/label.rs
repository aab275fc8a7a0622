//! Taint labels and label sets.

use std::fmt::{self, Display};

use ctcheck_isa::Location;

/// A taint source: the entry-time contents of one storage location.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaintLabel(pub Location);

impl TaintLabel {
    pub const fn location(self) -> Location {
        self.0
    }
}

impl Display for TaintLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl From<Location> for TaintLabel {
    fn from(loc: Location) -> Self {
        Self(loc)
    }
}

const _: () = assert!(Location::COUNT <= 128);

/// A set of taint labels, one bit per location index.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct LabelSet(u128);

impl LabelSet {
    pub const EMPTY: Self = Self(0);

    pub const fn single(label: TaintLabel) -> Self {
        Self(1 << label.0.index())
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub const fn contains(self, label: TaintLabel) -> bool {
        self.0 & (1 << label.0.index()) != 0
    }

    pub const fn insert(&mut self, label: TaintLabel) {
        self.0 |= 1 << label.0.index();
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Add `other` into `self`. Returns true if `self` grew.
    pub const fn join(&mut self, other: Self) -> bool {
        let before = self.0;
        self.0 |= other.0;
        self.0 != before
    }

    /// Labels in location index order.
    pub fn iter(self) -> impl Iterator<Item = TaintLabel> {
        let bits = self.0;
        (0..Location::COUNT)
            .filter(move |idx| bits & (1 << idx) != 0)
            .filter_map(Location::from_index)
            .map(TaintLabel)
    }
}

impl FromIterator<TaintLabel> for LabelSet {
    fn from_iter<I: IntoIterator<Item = TaintLabel>>(iter: I) -> Self {
        let mut set = Self::EMPTY;
        for label in iter {
            set.insert(label);
        }
        set
    }
}

impl Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, label) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{label}")?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctcheck_isa::{Flag, FlagGroup};

    #[test]
    fn test_label_set_ops() {
        let x5 = TaintLabel(Location::Gpr(5));
        let w2 = TaintLabel(Location::Wdr(2));
        let dmem = TaintLabel(Location::Dmem);

        let mut set = LabelSet::single(x5);
        assert!(set.contains(x5));
        assert!(!set.contains(w2));
        assert!(set.join(LabelSet::single(dmem)));
        assert!(!set.join(LabelSet::single(dmem)));
        assert_eq!(set.len(), 2);
        assert_eq!(LabelSet::single(x5).union(set), set);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![x5, dmem]);
    }

    #[test]
    fn test_display() {
        let set: LabelSet = [
            TaintLabel(Location::Flag(FlagGroup::Fg1, Flag::Z)),
            TaintLabel(Location::Gpr(3)),
        ]
        .into_iter()
        .collect();
        assert_eq!(set.to_string(), "{x3, fg1.z}");
        assert_eq!(LabelSet::EMPTY.to_string(), "{}");
    }
}
