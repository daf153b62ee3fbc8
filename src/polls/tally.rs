//! Vote Tally
//!
//! Per-choice vote counts, indexed by choice number starting at 1.

use serde::Serialize;

/// Counts for choices `1..=choices()`.
///
/// Serializes as a plain JSON array, e.g. `[1,1,0]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct VoteTally {
    counts: Vec<u64>,
}

impl VoteTally {
    /// Tally with no choices
    pub fn empty() -> Self {
        Self::default()
    }

    /// All-zero tally for `choices` choices
    pub fn zeroed(choices: usize) -> Self {
        Self {
            counts: vec![0; choices],
        }
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn choices(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum of all counts
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Count for a 1-based choice
    pub fn get(&self, choice: usize) -> Option<u64> {
        self.counts.get(choice.checked_sub(1)?).copied()
    }

    /// Add one vote for a 1-based choice; `false` if out of range
    pub(crate) fn record(&mut self, choice: usize) -> bool {
        match choice
            .checked_sub(1)
            .and_then(|index| self.counts.get_mut(index))
        {
            Some(count) => {
                *count += 1;
                true
            }
            None => false,
        }
    }
}

impl From<Vec<u64>> for VoteTally {
    fn from(counts: Vec<u64>) -> Self {
        Self { counts }
    }
}
