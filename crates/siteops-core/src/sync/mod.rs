//! Sync orchestrator: drains the outbox to the remote service.
//!
//! A run pushes categories in [`RecordCategory::SYNC_PRIORITY`] order and,
//! within a category, one record at a time in ascending capture order. A
//! failed record is annotated and skipped; the rest of the batch continues.

mod report;

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use report::SyncReport;

use crate::liveness::ConnectivityCheck;
use crate::models::{QueuedRecord, RecordCategory};
use crate::outbox::{Outbox, OutboxStore};
use crate::remote::{CredentialSource, RemotePush};

/// Something the scheduler can invoke to perform one sync pass.
pub trait SyncRunner: Send + Sync + 'static {
    fn run(&self) -> impl Future<Output = SyncReport> + Send;
}

pub struct SyncOrchestrator<S: OutboxStore, L, R, C> {
    outbox: Arc<Outbox<S>>,
    liveness: Arc<L>,
    remote: R,
    credentials: C,
    in_progress: AtomicBool,
}

/// Clears the in-progress flag when a run ends, including when its future is
/// dropped mid-flight.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<S, L, R, C> SyncOrchestrator<S, L, R, C>
where
    S: OutboxStore,
    L: ConnectivityCheck,
    R: RemotePush,
    C: CredentialSource,
{
    pub const fn new(outbox: Arc<Outbox<S>>, liveness: Arc<L>, remote: R, credentials: C) -> Self {
        Self {
            outbox,
            liveness,
            remote,
            credentials,
            in_progress: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    pub const fn outbox(&self) -> &Arc<Outbox<S>> {
        &self.outbox
    }

    /// Push every unsynced record once.
    ///
    /// Returns an empty report without touching the network when another run
    /// is in flight, when the remote is unreachable, or when no credential is
    /// available.
    pub async fn run(&self) -> SyncReport {
        let Some(_guard) = self.try_begin() else {
            tracing::debug!("Sync already in progress; skipping overlapping run");
            return SyncReport::default();
        };

        if !self.liveness.is_online().await {
            tracing::debug!("Skipping sync: remote is unreachable");
            return SyncReport::default();
        }

        let Some(token) = self
            .credentials
            .bearer_token()
            .await
            .filter(|token| !token.trim().is_empty())
        else {
            tracing::debug!("Skipping sync: no credential available");
            return SyncReport::default();
        };

        let mut report = SyncReport::default();
        for category in RecordCategory::SYNC_PRIORITY {
            self.drain_category(category, &token, &mut report).await;
        }

        if !report.is_empty() {
            tracing::info!(
                "Sync run finished: {} synced, {} failed",
                report.total_synced(),
                report.failed_count
            );
        }
        report
    }

    fn try_begin(&self) -> Option<RunGuard<'_>> {
        self.in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(&self.in_progress))
    }

    async fn drain_category(&self, category: RecordCategory, token: &str, report: &mut SyncReport) {
        let mut pending = self.outbox.list_unsynced(category).await;
        if pending.is_empty() {
            return;
        }
        pending.sort_by_key(|record| (record.order_key(), record.enqueued_at, record.id));
        tracing::debug!("Pushing {} {category} record(s)", pending.len());

        for record in pending {
            self.push_one(&record, token, report).await;
        }
    }

    async fn push_one(&self, record: &QueuedRecord, token: &str, report: &mut SyncReport) {
        let category = record.category;
        let wire = record.to_wire();

        let failure = match self
            .remote
            .push(category, std::slice::from_ref(&wire), token)
            .await
        {
            Ok(ack) if ack.contains(&wire.client_id) => {
                self.outbox.mark_synced(category, &record.id).await;
                report.record_success(category);
                tracing::debug!("Synced {category} record {}", record.id);
                return;
            }
            Ok(_) => "not acknowledged by remote".to_string(),
            Err(error) => error.to_string(),
        };

        tracing::warn!("Failed to sync {category} record {}: {failure}", record.id);
        self.outbox.mark_failed(category, &record.id, &failure).await;
        report.record_failure(format!("{category} {}: {failure}", record.id));
    }
}

impl<S, L, R, C> SyncRunner for SyncOrchestrator<S, L, R, C>
where
    S: OutboxStore,
    L: ConnectivityCheck,
    R: RemotePush,
    C: CredentialSource,
{
    async fn run(&self) -> SyncReport {
        Self::run(self).await
    }
}
