use std::collections::BTreeMap;

use crate::{choice::Choice, submission::TallyRow};

/// Point-in-time count of choices across all tally rows.
///
/// Serializes as a flat object keyed by choice, e.g. `{"a":2,"b":1}`. Choices
/// with no rows are absent rather than zero, matching a `GROUP BY` result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct AggregateSnapshot {
    pub counts: BTreeMap<Choice, u64>,
}

impl AggregateSnapshot {
    pub fn from_rows<'a>(rows: impl IntoIterator<Item = &'a TallyRow>) -> Self {
        let mut counts = BTreeMap::new();
        for row in rows {
            *counts.entry(row.vote).or_insert(0) += 1;
        }
        Self { counts }
    }

    pub fn from_counts(counts: impl IntoIterator<Item = (Choice, u64)>) -> Self {
        let mut merged = BTreeMap::new();
        for (choice, count) in counts {
            *merged.entry(choice).or_insert(0) += count;
        }
        Self { counts: merged }
    }

    pub fn count(&self, choice: Choice) -> u64 {
        self.counts.get(&choice).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Share of the total for `choice` in percent; an empty tally splits evenly.
    pub fn percent(&self, choice: Choice) -> f64 {
        let total = self.total();
        if total == 0 {
            return 100.0 / Choice::ALL.len() as f64;
        }
        self.count(choice) as f64 * 100.0 / total as f64
    }
}
