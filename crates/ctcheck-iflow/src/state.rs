//! Per-location taint state.

use ctcheck_isa::Location;

use crate::label::{LabelSet, TaintLabel};

/// Taint labels held by every storage location at one program point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaintState {
    labels: [LabelSet; Location::COUNT],
}

impl Default for TaintState {
    fn default() -> Self {
        Self::new()
    }
}

impl TaintState {
    /// Every location untainted.
    pub const fn new() -> Self {
        Self {
            labels: [LabelSet::EMPTY; Location::COUNT],
        }
    }

    pub const fn get(&self, loc: Location) -> LabelSet {
        self.labels[loc.index()]
    }

    /// Overwrite the labels of `loc`. Writes to `x0` are discarded.
    pub const fn set(&mut self, loc: Location, labels: LabelSet) {
        if !loc.is_hardwired_zero() {
            self.labels[loc.index()] = labels;
        }
    }

    /// Add labels to `loc` without removing existing ones.
    pub const fn add(&mut self, loc: Location, labels: LabelSet) {
        if !loc.is_hardwired_zero() {
            self.labels[loc.index()].join(labels);
        }
    }

    /// Taint `loc` with its own entry-time label.
    pub const fn seed(&mut self, loc: Location) {
        self.add(loc, LabelSet::single(TaintLabel(loc)));
    }

    /// Union of the labels of several locations.
    pub fn union_of(&self, locs: impl IntoIterator<Item = Location>) -> LabelSet {
        locs.into_iter()
            .fold(LabelSet::EMPTY, |acc, loc| acc.union(self.get(loc)))
    }

    /// Pointwise union with `other`. Returns true if anything grew.
    pub fn join(&mut self, other: &Self) -> bool {
        let mut changed = false;
        for (mine, theirs) in self.labels.iter_mut().zip(other.labels.iter()) {
            changed |= mine.join(*theirs);
        }
        changed
    }

    /// Tainted locations with their labels, in location order.
    pub fn tainted(&self) -> impl Iterator<Item = (Location, LabelSet)> + '_ {
        Location::all()
            .map(|loc| (loc, self.get(loc)))
            .filter(|(_, labels)| !labels.is_empty())
    }
}
