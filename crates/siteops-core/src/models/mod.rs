//! Data models for SiteOps

mod cache;
mod payload;
mod record;

pub use cache::{CacheEntry, CacheKey};
pub use payload::{
    AttendanceStatus, MaterialItem, RecordPayload, RequestUrgency,
};
pub use record::{QueuedRecord, RecordCategory, RecordId, WireRecord};
