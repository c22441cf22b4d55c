use std::collections::BTreeMap;

use crate::types::{DivisionResult, Role, Vote};

/// Per-option vote counts for one division. Tellers count towards their side.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VoteTally {
    counts: BTreeMap<String, usize>,
    tellers: usize,
}

impl VoteTally {
    pub fn from_votes(votes: &[Vote]) -> VoteTally {
        let mut tally = VoteTally::default();
        for vote in votes {
            *tally.counts.entry(vote.option.clone()).or_default() += 1;
            if vote.role == Some(Role::Teller) {
                tally.tellers += 1;
            }
        }
        tally
    }

    /// `None` when nobody recorded `option`, as opposed to a count of zero.
    pub fn count(&self, option: &str) -> Option<usize> {
        self.counts.get(option).copied()
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// A side with no recorded votes counts as zero.
    pub fn result(&self) -> DivisionResult {
        let side = |option: &str| {
            self.count(option).unwrap_or_else(|| {
                log::warn!("No '{}' votes recorded, counting the side as zero", option);
                0
            })
        };
        DivisionResult::from_counts(side("yes"), side("no"))
    }
}

impl std::fmt::Display for VoteTally {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\nTally:")?;
        for (option, count) in &self.counts {
            writeln!(f, "  {:<8} {}", option, count)?;
        }
        writeln!(f, "  tellers  {}", self.tellers)?;
        writeln!(f, "  total    {}", self.total())
    }
}
