//! Top-N membership tracking.
//!
//! Keeps the previous poll's identifier set and reports which coins
//! entered and which dropped out. The first observation only sets the
//! baseline. A short poll (fewer records than requested) never reports
//! exits and never shrinks the baseline.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

/// Change in top-N membership between two polls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipDiff {
    /// current − previous
    pub entrants: BTreeSet<String>,
    /// previous − current
    pub exits: BTreeSet<String>,
    /// Exits were withheld because the poll came back short.
    pub exits_suppressed: bool,
}

impl MembershipDiff {
    pub fn is_empty(&self) -> bool {
        self.entrants.is_empty() && self.exits.is_empty()
    }
}

impl fmt::Display for MembershipDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |s: &BTreeSet<String>| s.iter().cloned().collect::<Vec<_>>().join(", ");
        write!(f, "+[{}] -[{}]", join(&self.entrants), join(&self.exits))
    }
}

#[derive(Debug, Default)]
pub struct MembershipTracker {
    previous: Option<HashSet<String>>,
}

impl MembershipTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifiers from the last accepted baseline, if any.
    pub fn baseline(&self) -> Option<&HashSet<String>> {
        self.previous.as_ref()
    }

    /// Record a poll and return the diff against the previous baseline.
    ///
    /// `requested` is the coin count asked for; a poll with fewer ids is
    /// treated as short.
    pub fn observe<I, S>(&mut self, ids: I, requested: usize) -> MembershipDiff
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let current: HashSet<String> = ids.into_iter().map(Into::into).collect();
        let short = current.len() < requested;

        let Some(previous) = self.previous.take() else {
            self.previous = Some(current);
            return MembershipDiff::default();
        };

        let entrants: BTreeSet<String> = current.difference(&previous).cloned().collect();

        if short {
            let mut merged = previous;
            merged.extend(current);
            self.previous = Some(merged);
            return MembershipDiff {
                entrants,
                exits: BTreeSet::new(),
                exits_suppressed: true,
            };
        }

        let exits: BTreeSet<String> = previous.difference(&current).cloned().collect();
        self.previous = Some(current);

        MembershipDiff {
            entrants,
            exits,
            exits_suppressed: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
