use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Derived vote counts for one poll. Recomputed from the vote records on
/// demand, never stored. Clients must treat every tally push as an absolute
/// snapshot, never a delta.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub counts: HashMap<String, i64>,
    pub total: i64,
}

impl VoteTally {
    pub fn from_option_ids<I>(option_ids: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut tally = VoteTally::default();
        for id in option_ids {
            tally.record(&id.into());
        }
        tally
    }

    pub fn record(&mut self, option_id: &str) {
        *self.counts.entry(option_id.to_string()).or_insert(0) += 1;
        self.total += 1;
    }

    pub fn count_for(&self, option_id: &str) -> i64 {
        self.counts.get(option_id).copied().unwrap_or(0)
    }
}
