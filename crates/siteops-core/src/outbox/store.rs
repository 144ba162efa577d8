//! Storage primitives behind the outbox

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use libsql::{params, Row};
use tokio::sync::Mutex;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{
    CacheEntry, CacheKey, QueuedRecord, RecordCategory, RecordId, RecordPayload,
};

/// Fallible storage operations for queued records and cached responses.
///
/// Implementations report every failure; [`super::Outbox`] decides which ones
/// are swallowed.
pub trait OutboxStore: Send + Sync + 'static {
    /// Insert a new record
    fn insert(&self, record: &QueuedRecord) -> impl Future<Output = Result<()>> + Send;

    /// Fetch one record
    fn get(
        &self,
        category: RecordCategory,
        id: &RecordId,
    ) -> impl Future<Output = Result<Option<QueuedRecord>>> + Send;

    /// List records of a category, newest first
    fn list(
        &self,
        category: RecordCategory,
        unsynced_only: bool,
    ) -> impl Future<Output = Result<Vec<QueuedRecord>>> + Send;

    /// Flag a record as synced. Returns whether a row changed.
    fn mark_synced(
        &self,
        category: RecordCategory,
        id: &RecordId,
        synced_at: i64,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Record a failed push attempt. Returns whether a row changed.
    fn mark_failed(
        &self,
        category: RecordCategory,
        id: &RecordId,
        error: &str,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Count unsynced records per category
    fn pending_counts(
        &self,
    ) -> impl Future<Output = Result<BTreeMap<RecordCategory, usize>>> + Send;

    /// Delete synced records acknowledged before `cutoff` (Unix ms)
    fn delete_synced_before(&self, cutoff: i64) -> impl Future<Output = Result<usize>> + Send;

    fn get_cache(&self, key: &CacheKey)
        -> impl Future<Output = Result<Option<CacheEntry>>> + Send;

    fn put_cache(&self, entry: &CacheEntry) -> impl Future<Output = Result<()>> + Send;

    /// Drop cache entries older than `cutoff`, then the oldest beyond `max_entries`
    fn evict_cache(
        &self,
        cutoff: i64,
        max_entries: usize,
    ) -> impl Future<Output = Result<usize>> + Send;

    fn clear_cache(&self) -> impl Future<Output = Result<usize>> + Send;
}

const RECORD_COLUMNS: &str =
    "id, category, payload, created_at, enqueued_at, synced, last_error, attempts, synced_at";

/// libSQL-backed outbox storage, shareable across tasks.
#[derive(Clone)]
pub struct LibSqlOutboxStore {
    db: Arc<Mutex<Database>>,
}

impl LibSqlOutboxStore {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    /// Open (and migrate) the outbox database at the given path.
    pub async fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Database::open(path).await?))
    }

    /// Open an in-memory outbox (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory().await?))
    }

    /// Parse a record from a database row.
    ///
    /// Returns `Ok(None)` for rows this build cannot interpret, such as a
    /// category written by a newer client.
    fn parse_record(row: &Row) -> Result<Option<QueuedRecord>> {
        let id: String = row.get(0)?;
        let category: String = row.get(1)?;
        let payload: String = row.get(2)?;

        let Ok(category) = category.parse::<RecordCategory>() else {
            tracing::warn!("Skipping outbox row {id} with unknown category {category}");
            return Ok(None);
        };
        let Ok(id) = id.parse::<RecordId>() else {
            tracing::warn!("Skipping outbox row with malformed id {id}");
            return Ok(None);
        };
        let payload: RecordPayload = match serde_json::from_str(&payload) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!("Skipping outbox row {id}: undecodable payload: {error}");
                return Ok(None);
            }
        };
        if payload.category() != category {
            tracing::warn!(
                "Skipping outbox row {id}: stored as {category} but payload is {}",
                payload.category()
            );
            return Ok(None);
        }

        Ok(Some(QueuedRecord {
            id,
            category,
            payload,
            created_at: row.get::<Option<i64>>(3)?,
            enqueued_at: row.get(4)?,
            synced: row.get::<i64>(5)? != 0,
            last_error: row.get::<Option<String>>(6)?,
            attempts: u32::try_from(row.get::<i64>(7)?).unwrap_or(0),
            synced_at: row.get::<Option<i64>>(8)?,
        }))
    }
}

impl OutboxStore for LibSqlOutboxStore {
    async fn insert(&self, record: &QueuedRecord) -> Result<()> {
        let payload = serde_json::to_string(&record.payload)?;
        let db = self.db.lock().await;
        db.connection()
            .execute(
                "INSERT INTO outbox_records
                 (id, category, payload, created_at, enqueued_at, synced, last_error, attempts, synced_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    record.id.as_str(),
                    record.category.as_str(),
                    payload,
                    record.created_at,
                    record.enqueued_at,
                    i64::from(record.synced),
                    record.last_error.clone(),
                    i64::from(record.attempts),
                    record.synced_at
                ],
            )
            .await?;
        Ok(())
    }

    async fn get(&self, category: RecordCategory, id: &RecordId) -> Result<Option<QueuedRecord>> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM outbox_records WHERE category = ? AND id = ?"
                ),
                params![category.as_str(), id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Self::parse_record(&row),
            None => Ok(None),
        }
    }

    async fn list(&self, category: RecordCategory, unsynced_only: bool) -> Result<Vec<QueuedRecord>> {
        let filter = if unsynced_only { "AND synced = 0" } else { "" };
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM outbox_records
                     WHERE category = ? {filter}
                     ORDER BY COALESCE(created_at, enqueued_at) DESC"
                ),
                params![category.as_str()],
            )
            .await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            if let Some(record) = Self::parse_record(&row)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn mark_synced(
        &self,
        category: RecordCategory,
        id: &RecordId,
        synced_at: i64,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        let changed = db
            .connection()
            .execute(
                "UPDATE outbox_records
                 SET synced = 1, synced_at = ?, last_error = NULL
                 WHERE category = ? AND id = ? AND synced = 0",
                params![synced_at, category.as_str(), id.as_str()],
            )
            .await?;
        Ok(changed > 0)
    }

    async fn mark_failed(&self, category: RecordCategory, id: &RecordId, error: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let changed = db
            .connection()
            .execute(
                "UPDATE outbox_records
                 SET last_error = ?, attempts = attempts + 1
                 WHERE category = ? AND id = ? AND synced = 0",
                params![error, category.as_str(), id.as_str()],
            )
            .await?;
        Ok(changed > 0)
    }

    async fn pending_counts(&self) -> Result<BTreeMap<RecordCategory, usize>> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(
                "SELECT category, COUNT(*) FROM outbox_records WHERE synced = 0 GROUP BY category",
                (),
            )
            .await?;

        let mut counts = BTreeMap::new();
        while let Some(row) = rows.next().await? {
            let category: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            if let Ok(category) = category.parse::<RecordCategory>() {
                counts.insert(category, usize::try_from(count).unwrap_or(0));
            }
        }
        Ok(counts)
    }

    async fn delete_synced_before(&self, cutoff: i64) -> Result<usize> {
        let db = self.db.lock().await;
        let deleted = db
            .connection()
            .execute(
                "DELETE FROM outbox_records
                 WHERE synced = 1 AND COALESCE(synced_at, enqueued_at) < ?",
                params![cutoff],
            )
            .await?;
        usize::try_from(deleted).map_err(|error| Error::Database(error.to_string()))
    }

    async fn get_cache(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(
                "SELECT response, stored_at FROM response_cache WHERE key = ?",
                params![key.as_str()],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        let response: String = row.get(0)?;
        Ok(Some(CacheEntry {
            key: key.clone(),
            response: serde_json::from_str(&response)?,
            stored_at: row.get(1)?,
        }))
    }

    async fn put_cache(&self, entry: &CacheEntry) -> Result<()> {
        let response = serde_json::to_string(&entry.response)?;
        let db = self.db.lock().await;
        db.connection()
            .execute(
                "INSERT INTO response_cache (key, response, stored_at) VALUES (?, ?, ?)
                 ON CONFLICT(key) DO UPDATE SET response = excluded.response, stored_at = excluded.stored_at",
                params![entry.key.as_str(), response, entry.stored_at],
            )
            .await?;
        Ok(())
    }

    async fn evict_cache(&self, cutoff: i64, max_entries: usize) -> Result<usize> {
        let db = self.db.lock().await;
        let conn = db.connection();
        let expired = conn
            .execute(
                "DELETE FROM response_cache WHERE stored_at < ?",
                params![cutoff],
            )
            .await?;
        let overflow = conn
            .execute(
                "DELETE FROM response_cache WHERE key NOT IN (
                    SELECT key FROM response_cache ORDER BY stored_at DESC LIMIT ?
                 )",
                params![max_entries as i64],
            )
            .await?;
        usize::try_from(expired + overflow).map_err(|error| Error::Database(error.to_string()))
    }

    async fn clear_cache(&self) -> Result<usize> {
        let db = self.db.lock().await;
        let deleted = db
            .connection()
            .execute("DELETE FROM response_cache", ())
            .await?;
        usize::try_from(deleted).map_err(|error| Error::Database(error.to_string()))
    }
}
