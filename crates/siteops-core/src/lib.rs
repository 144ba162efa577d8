//! siteops-core - Core library for SiteOps
//!
//! This crate contains the offline-first synchronization core shared by all
//! SiteOps hosts: the durable local outbox, the network liveness detector,
//! the sync orchestrator, and the scheduler that decides when to run it.

pub mod config;
pub mod db;
pub mod error;
pub mod liveness;
pub mod models;
pub mod outbox;
pub mod remote;
pub mod scheduler;
pub mod sync;
pub mod util;

#[cfg(test)]
mod testing;

pub use config::ClientConfig;
pub use error::{Error, PushError, Result};
pub use models::{QueuedRecord, RecordCategory, RecordId, RecordPayload};
pub use outbox::Outbox;
pub use scheduler::{LifecycleEvent, SchedulerPhase, SyncScheduler};
pub use sync::{SyncOrchestrator, SyncReport, SyncRunner};
