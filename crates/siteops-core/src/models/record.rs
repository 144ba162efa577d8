//! Queued record model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::RecordPayload;
use crate::error::Error;

/// A unique identifier for a queued record, using UUID v7 (time-sortable).
///
/// The id doubles as the idempotency key sent with every push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Create a new unique record ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// The closed set of field-captured record kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordCategory {
    Attendance,
    DailyReport,
    MaterialRequest,
}

impl RecordCategory {
    /// Order in which categories are drained during a sync run.
    pub const SYNC_PRIORITY: [Self; 3] = [Self::Attendance, Self::DailyReport, Self::MaterialRequest];

    /// Stable tag used in the local store.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Attendance => "attendance",
            Self::DailyReport => "daily_report",
            Self::MaterialRequest => "material_request",
        }
    }

    /// Path segment of the category's push endpoint.
    pub const fn endpoint_path(self) -> &'static str {
        match self {
            Self::Attendance => "attendance",
            Self::DailyReport => "daily-reports",
            Self::MaterialRequest => "material-requests",
        }
    }
}

impl fmt::Display for RecordCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "attendance" => Ok(Self::Attendance),
            "daily_report" => Ok(Self::DailyReport),
            "material_request" => Ok(Self::MaterialRequest),
            other => Err(Error::InvalidInput(format!("unknown record category: {other}"))),
        }
    }
}

/// A field-captured record waiting in (or already drained from) the outbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedRecord {
    pub id: RecordId,
    pub category: RecordCategory,
    pub payload: RecordPayload,
    /// Capture timestamp (Unix ms), when the originating form supplied one
    pub created_at: Option<i64>,
    /// Time the record entered the outbox (Unix ms)
    pub enqueued_at: i64,
    /// Set once the remote acknowledged the id; never reverts
    pub synced: bool,
    /// Acknowledgement timestamp (Unix ms)
    pub synced_at: Option<i64>,
    pub last_error: Option<String>,
    /// Number of failed push attempts
    pub attempts: u32,
}

impl QueuedRecord {
    /// Build a fresh unsynced record for the given payload.
    #[must_use]
    pub fn new(payload: RecordPayload, created_at: Option<i64>) -> Self {
        Self {
            id: RecordId::new(),
            category: payload.category(),
            payload,
            created_at,
            enqueued_at: chrono::Utc::now().timestamp_millis(),
            synced: false,
            synced_at: None,
            last_error: None,
            attempts: 0,
        }
    }

    /// Timestamp used for FIFO ordering within a category.
    pub fn order_key(&self) -> i64 {
        self.created_at.unwrap_or(self.enqueued_at)
    }

    /// Minimal payload sent to the remote push endpoint.
    #[must_use]
    pub fn to_wire(&self) -> WireRecord {
        WireRecord {
            client_id: self.id.as_str(),
            category: self.category,
            created_at: self.order_key(),
            data: self.payload.clone(),
        }
    }
}

/// Record shape accepted by the remote push endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRecord {
    /// Local id, used by the server to deduplicate repeated deliveries
    pub client_id: String,
    pub category: RecordCategory,
    pub created_at: i64,
    pub data: RecordPayload,
}
