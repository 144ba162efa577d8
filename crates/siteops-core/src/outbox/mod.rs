//! Local outbox: durable queue of field-captured records plus a best-effort
//! response cache.
//!
//! [`Outbox`] is the boundary the rest of the app talks to. Apart from
//! [`Outbox::enqueue`], none of its operations return errors: store failures
//! are logged and degrade to "nothing listed", "not updated" or "cache miss".

mod store;

use std::collections::BTreeMap;
use std::time::Duration;

pub use store::{LibSqlOutboxStore, OutboxStore};

use crate::error::Result;
use crate::models::{CacheEntry, CacheKey, QueuedRecord, RecordCategory, RecordId, RecordPayload};
use crate::util::unix_millis_now;

/// Bounds applied by [`Outbox::apply_retention`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// How long acknowledged records are kept after syncing
    pub synced_max_age: Duration,
    /// How long cached responses stay usable
    pub cache_max_age: Duration,
    pub cache_max_entries: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            synced_max_age: Duration::from_secs(30 * 24 * 60 * 60),
            cache_max_age: Duration::from_secs(7 * 24 * 60 * 60),
            cache_max_entries: 500,
        }
    }
}

/// Rows removed by a retention pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionOutcome {
    pub records_pruned: usize,
    pub cache_evicted: usize,
}

pub struct Outbox<S: OutboxStore> {
    store: S,
}

impl<S: OutboxStore> Outbox<S> {
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// Queue a record captured now.
    pub async fn enqueue(&self, payload: RecordPayload) -> Result<RecordId> {
        self.enqueue_captured(payload, Some(unix_millis_now())).await
    }

    /// Queue a record with an explicit capture time (Unix ms).
    ///
    /// A `None` capture time makes the record order by its enqueue time.
    pub async fn enqueue_captured(
        &self,
        payload: RecordPayload,
        created_at: Option<i64>,
    ) -> Result<RecordId> {
        let record = QueuedRecord::new(payload, created_at);
        self.store.insert(&record).await?;
        tracing::debug!("Queued {} record {}", record.category, record.id);
        Ok(record.id)
    }

    pub async fn get(&self, category: RecordCategory, id: &RecordId) -> Option<QueuedRecord> {
        match self.store.get(category, id).await {
            Ok(record) => record,
            Err(error) => {
                tracing::warn!("Failed to read {category} record {id}: {error}");
                None
            }
        }
    }

    /// All records of a category, newest first.
    pub async fn list(&self, category: RecordCategory) -> Vec<QueuedRecord> {
        self.store.list(category, false).await.unwrap_or_else(|error| {
            tracing::warn!("Failed to list {category} records: {error}");
            Vec::new()
        })
    }

    /// Unsynced records of a category, in no particular order.
    pub async fn list_unsynced(&self, category: RecordCategory) -> Vec<QueuedRecord> {
        self.store.list(category, true).await.unwrap_or_else(|error| {
            tracing::warn!("Failed to list unsynced {category} records: {error}");
            Vec::new()
        })
    }

    pub async fn mark_synced(&self, category: RecordCategory, id: &RecordId) {
        match self.store.mark_synced(category, id, unix_millis_now()).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!("{category} record {id} was already synced or missing"),
            Err(error) => tracing::warn!("Failed to mark {category} record {id} synced: {error}"),
        }
    }

    pub async fn mark_failed(&self, category: RecordCategory, id: &RecordId, error: &str) {
        match self.store.mark_failed(category, id, error).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!("{category} record {id} was already synced or missing"),
            Err(store_error) => {
                tracing::warn!("Failed to record push error on {category} record {id}: {store_error}");
            }
        }
    }

    /// Unsynced record counts; categories with nothing pending are present with 0.
    pub async fn pending_counts(&self) -> BTreeMap<RecordCategory, usize> {
        let mut counts: BTreeMap<RecordCategory, usize> = RecordCategory::SYNC_PRIORITY
            .iter()
            .map(|category| (*category, 0))
            .collect();
        match self.store.pending_counts().await {
            Ok(stored) => counts.extend(stored),
            Err(error) => tracing::warn!("Failed to count pending records: {error}"),
        }
        counts
    }

    pub async fn get_cache(&self, key: &CacheKey) -> Option<CacheEntry> {
        match self.store.get_cache(key).await {
            Ok(entry) => entry,
            Err(error) => {
                tracing::warn!("Cache read failed for {key}: {error}");
                None
            }
        }
    }

    pub async fn set_cache(&self, key: CacheKey, response: serde_json::Value) {
        let entry = CacheEntry {
            key,
            response,
            stored_at: unix_millis_now(),
        };
        if let Err(error) = self.store.put_cache(&entry).await {
            tracing::warn!("Cache write failed for {}: {error}", entry.key);
        }
    }

    pub async fn clear_cache(&self) -> usize {
        self.store.clear_cache().await.unwrap_or_else(|error| {
            tracing::warn!("Failed to clear response cache: {error}");
            0
        })
    }

    /// Prune acknowledged records and stale cache entries.
    ///
    /// Unsynced records are never removed here.
    pub async fn apply_retention(&self, policy: &RetentionPolicy) -> RetentionOutcome {
        let now = unix_millis_now();
        let records_cutoff = now.saturating_sub(duration_millis(policy.synced_max_age));
        let cache_cutoff = now.saturating_sub(duration_millis(policy.cache_max_age));

        let records_pruned = self
            .store
            .delete_synced_before(records_cutoff)
            .await
            .unwrap_or_else(|error| {
                tracing::warn!("Failed to prune synced records: {error}");
                0
            });
        let cache_evicted = self
            .store
            .evict_cache(cache_cutoff, policy.cache_max_entries)
            .await
            .unwrap_or_else(|error| {
                tracing::warn!("Failed to evict cache entries: {error}");
                0
            });

        tracing::info!(
            "Retention pass removed {records_pruned} synced record(s) and {cache_evicted} cache entries"
        );
        RetentionOutcome {
            records_pruned,
            cache_evicted,
        }
    }
}

fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::error::Error;
    use crate::models::AttendanceStatus;

    /// Store that fails every operation.
    pub struct FailingStore;

    fn unavailable<T>() -> Result<T> {
        Err(Error::Database("store unavailable".to_string()))
    }

    impl OutboxStore for FailingStore {
        async fn insert(&self, _record: &QueuedRecord) -> Result<()> {
            unavailable()
        }
        async fn get(&self, _: RecordCategory, _: &RecordId) -> Result<Option<QueuedRecord>> {
            unavailable()
        }
        async fn list(&self, _: RecordCategory, _: bool) -> Result<Vec<QueuedRecord>> {
            unavailable()
        }
        async fn mark_synced(&self, _: RecordCategory, _: &RecordId, _: i64) -> Result<bool> {
            unavailable()
        }
        async fn mark_failed(&self, _: RecordCategory, _: &RecordId, _: &str) -> Result<bool> {
            unavailable()
        }
        async fn pending_counts(&self) -> Result<BTreeMap<RecordCategory, usize>> {
            unavailable()
        }
        async fn delete_synced_before(&self, _: i64) -> Result<usize> {
            unavailable()
        }
        async fn get_cache(&self, _: &CacheKey) -> Result<Option<CacheEntry>> {
            unavailable()
        }
        async fn put_cache(&self, _: &CacheEntry) -> Result<()> {
            unavailable()
        }
        async fn evict_cache(&self, _: i64, _: usize) -> Result<usize> {
            unavailable()
        }
        async fn clear_cache(&self) -> Result<usize> {
            unavailable()
        }
    }

    pub fn attendance(worker: &str) -> RecordPayload {
        RecordPayload::Attendance {
            worker_id: worker.to_string(),
            site_id: "site-1".to_string(),
            status: AttendanceStatus::Present,
            check_in: None,
            check_out: None,
            note: None,
        }
    }

    pub fn daily_report(summary: &str) -> RecordPayload {
        RecordPayload::DailyReport {
            site_id: "site-1".to_string(),
            report_date: "2026-10-19".to_string(),
            summary: summary.to_string(),
            weather: None,
            workers_on_site: None,
            issues: Vec::new(),
        }
    }

    pub async fn memory_outbox() -> Outbox<LibSqlOutboxStore> {
        Outbox::new(LibSqlOutboxStore::open_in_memory().await.unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{attendance, daily_report, memory_outbox, FailingStore};
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test(flavor = "multi_thread")]
    async fn enqueue_stores_unsynced_record() {
        let outbox = memory_outbox().await;
        let id = outbox.enqueue(attendance("w-1")).await.unwrap();

        let record = outbox.get(RecordCategory::Attendance, &id).await.unwrap();
        assert_eq!(record.payload, attendance("w-1"));
        assert!(!record.synced);
        assert_eq!(record.attempts, 0);
        assert!(record.created_at.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn list_unsynced_is_scoped_to_category() {
        let outbox = memory_outbox().await;
        outbox.enqueue(attendance("w-1")).await.unwrap();
        outbox.enqueue(attendance("w-2")).await.unwrap();
        outbox.enqueue(daily_report("Slab poured")).await.unwrap();

        assert_eq!(outbox.list_unsynced(RecordCategory::Attendance).await.len(), 2);
        assert_eq!(outbox.list_unsynced(RecordCategory::DailyReport).await.len(), 1);
        assert!(outbox
            .list_unsynced(RecordCategory::MaterialRequest)
            .await
            .is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mark_synced_is_idempotent_and_clears_error() {
        let outbox = memory_outbox().await;
        let id = outbox.enqueue(attendance("w-1")).await.unwrap();

        outbox
            .mark_failed(RecordCategory::Attendance, &id, "HTTP 503")
            .await;
        outbox.mark_synced(RecordCategory::Attendance, &id).await;
        outbox.mark_synced(RecordCategory::Attendance, &id).await;

        let record = outbox.get(RecordCategory::Attendance, &id).await.unwrap();
        assert!(record.synced);
        assert!(record.synced_at.is_some());
        assert_eq!(record.last_error, None);
        assert_eq!(record.attempts, 1);
        assert!(outbox
            .list_unsynced(RecordCategory::Attendance)
            .await
            .is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mark_failed_never_reverts_synced() {
        let outbox = memory_outbox().await;
        let id = outbox.enqueue(attendance("w-1")).await.unwrap();

        outbox.mark_synced(RecordCategory::Attendance, &id).await;
        outbox
            .mark_failed(RecordCategory::Attendance, &id, "late failure")
            .await;

        let record = outbox.get(RecordCategory::Attendance, &id).await.unwrap();
        assert!(record.synced);
        assert_eq!(record.last_error, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mark_failed_accumulates_attempts() {
        let outbox = memory_outbox().await;
        let id = outbox.enqueue(daily_report("Rain delay")).await.unwrap();

        outbox
            .mark_failed(RecordCategory::DailyReport, &id, "first")
            .await;
        outbox
            .mark_failed(RecordCategory::DailyReport, &id, "second")
            .await;

        let record = outbox.get(RecordCategory::DailyReport, &id).await.unwrap();
        assert!(!record.synced);
        assert_eq!(record.attempts, 2);
        assert_eq!(record.last_error.as_deref(), Some("second"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pending_counts_include_empty_categories() {
        let outbox = memory_outbox().await;
        outbox.enqueue(attendance("w-1")).await.unwrap();

        let counts = outbox.pending_counts().await;
        assert_eq!(counts[&RecordCategory::Attendance], 1);
        assert_eq!(counts[&RecordCategory::DailyReport], 0);
        assert_eq!(counts[&RecordCategory::MaterialRequest], 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cache_roundtrip_overwrites_previous_value() {
        let outbox = memory_outbox().await;
        let key = CacheKey::new("/v1/sites", "user-1");

        assert!(outbox.get_cache(&key).await.is_none());
        outbox.set_cache(key.clone(), json!({"sites": [1]})).await;
        outbox.set_cache(key.clone(), json!({"sites": [1, 2]})).await;

        let entry = outbox.get_cache(&key).await.unwrap();
        assert_eq!(entry.response, json!({"sites": [1, 2]}));
        assert!(outbox
            .get_cache(&CacheKey::new("/v1/sites", "user-2"))
            .await
            .is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failing_store_degrades_to_cache_miss() {
        let outbox = Outbox::new(FailingStore);
        let key = CacheKey::new("/v1/sites", "user-1");

        outbox.set_cache(key.clone(), json!({"ok": true})).await;
        assert!(outbox.get_cache(&key).await.is_none());
        assert_eq!(outbox.clear_cache().await, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failing_store_never_fails_queue_bookkeeping() {
        let outbox = Outbox::new(FailingStore);
        let id = RecordId::new();

        assert!(outbox
            .list_unsynced(RecordCategory::Attendance)
            .await
            .is_empty());
        outbox.mark_synced(RecordCategory::Attendance, &id).await;
        outbox
            .mark_failed(RecordCategory::Attendance, &id, "boom")
            .await;
        assert_eq!(outbox.pending_counts().await[&RecordCategory::Attendance], 0);
        assert_eq!(
            outbox.apply_retention(&RetentionPolicy::default()).await,
            RetentionOutcome::default()
        );

        // Losing a freshly captured record must be visible to the form.
        assert!(outbox.enqueue(attendance("w-1")).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn retention_prunes_only_old_synced_records() {
        let outbox = memory_outbox().await;
        let synced = outbox.enqueue(attendance("w-1")).await.unwrap();
        let pending = outbox.enqueue(attendance("w-2")).await.unwrap();
        outbox.mark_synced(RecordCategory::Attendance, &synced).await;

        // Default policy keeps fresh acknowledgements.
        let outcome = outbox.apply_retention(&RetentionPolicy::default()).await;
        assert_eq!(outcome.records_pruned, 0);

        tokio::time::sleep(Duration::from_millis(5)).await;
        let aggressive = RetentionPolicy {
            synced_max_age: Duration::ZERO,
            ..RetentionPolicy::default()
        };
        let outcome = outbox.apply_retention(&aggressive).await;
        assert_eq!(outcome.records_pruned, 1);

        assert!(outbox.get(RecordCategory::Attendance, &synced).await.is_none());
        assert!(outbox.get(RecordCategory::Attendance, &pending).await.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn retention_caps_cache_size() {
        let outbox = memory_outbox().await;
        for index in 0..3 {
            outbox
                .set_cache(CacheKey::new(&format!("/v1/item/{index}"), "u"), json!(index))
                .await;
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let policy = RetentionPolicy {
            cache_max_entries: 1,
            ..RetentionPolicy::default()
        };
        let outcome = outbox.apply_retention(&policy).await;
        assert_eq!(outcome.cache_evicted, 2);
        assert!(outbox
            .get_cache(&CacheKey::new("/v1/item/2", "u"))
            .await
            .is_some());
        assert!(outbox
            .get_cache(&CacheKey::new("/v1/item/0", "u"))
            .await
            .is_none());
    }
}
