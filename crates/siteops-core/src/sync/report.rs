//! Outcome of a single sync run

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::RecordCategory;

/// Aggregated result of [`super::SyncOrchestrator::run`].
///
/// Failures are reported here as data; a run never fails as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub synced_counts: BTreeMap<RecordCategory, usize>,
    pub failed_count: usize,
    pub errors: Vec<String>,
}

impl SyncReport {
    /// `true` when the run pushed nothing at all.
    pub fn is_empty(&self) -> bool {
        self.total_synced() == 0 && self.failed_count == 0 && self.errors.is_empty()
    }

    pub fn total_synced(&self) -> usize {
        self.synced_counts.values().sum()
    }

    pub fn synced(&self, category: RecordCategory) -> usize {
        self.synced_counts.get(&category).copied().unwrap_or(0)
    }

    pub(crate) fn record_success(&mut self, category: RecordCategory) {
        *self.synced_counts.entry(category).or_insert(0) += 1;
    }

    pub(crate) fn record_failure(&mut self, message: String) {
        self.failed_count += 1;
        self.errors.push(message);
    }
}
