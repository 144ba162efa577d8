//! Decides when the sync orchestrator runs.
//!
//! Triggers arm a debounce timer; re-triggering before it fires restarts it,
//! so a burst of connectivity flaps produces one run. Cancelling only disarms
//! a pending timer. A run that has started always completes; a timer that
//! fires during a run queues exactly one follow-up run after it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::sync::{SyncReport, SyncRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Idle,
    PendingDebounce,
    Running,
}

/// Host signals the scheduler reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    NetworkOnline,
    NetworkOffline,
    /// App came to the foreground / page became visible
    Foreground,
    /// App went to the background / page was hidden
    Background,
    /// Caller-initiated sync request
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub debounce: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(2),
        }
    }
}

#[derive(Default)]
struct TimerState {
    generation: u64,
    pending: Option<JoinHandle<()>>,
    /// A timer fired while a run was in progress; re-arm when it ends
    rerun_requested: bool,
}

struct Inner<R> {
    runner: Arc<R>,
    debounce: Duration,
    timer: Mutex<TimerState>,
    running: AtomicUsize,
    last_report: Mutex<Option<SyncReport>>,
    completed_runs: watch::Sender<u64>,
}

pub struct SyncScheduler<R: SyncRunner> {
    inner: Arc<Inner<R>>,
}

impl<R: SyncRunner> Clone for SyncScheduler<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: SyncRunner> SyncScheduler<R> {
    pub fn new(runner: Arc<R>, config: SchedulerConfig) -> Self {
        let (completed_runs, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                runner,
                debounce: config.debounce,
                timer: Mutex::new(TimerState::default()),
                running: AtomicUsize::new(0),
                last_report: Mutex::new(None),
                completed_runs,
            }),
        }
    }

    /// Arm (or re-arm) the debounce timer. Must be called within a tokio runtime.
    pub fn schedule_sync(&self) {
        Inner::arm(&self.inner);
    }

    /// Disarm a pending timer, including a follow-up queued behind the
    /// current run. Has no effect on a run already in progress.
    pub fn cancel_scheduled_sync(&self) {
        let mut timer = self.inner.lock_timer();
        timer.generation = timer.generation.wrapping_add(1);
        timer.rerun_requested = false;
        if let Some(pending) = timer.pending.take() {
            pending.abort();
            tracing::debug!("Pending sync cancelled");
        }
    }

    pub fn handle(&self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::NetworkOnline | LifecycleEvent::Foreground | LifecycleEvent::Manual => {
                self.schedule_sync();
            }
            LifecycleEvent::Background => self.cancel_scheduled_sync(),
            LifecycleEvent::NetworkOffline => {
                tracing::debug!("Network went offline; queued records wait for the next trigger");
            }
        }
    }

    pub fn phase(&self) -> SchedulerPhase {
        let timer = self.inner.lock_timer();
        if timer.pending.is_some() {
            SchedulerPhase::PendingDebounce
        } else if self.inner.running.load(Ordering::SeqCst) > 0 {
            SchedulerPhase::Running
        } else {
            SchedulerPhase::Idle
        }
    }

    /// Report of the most recently completed run.
    pub fn last_report(&self) -> Option<SyncReport> {
        self.inner
            .last_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Counter of completed runs; changes after every run.
    pub fn subscribe_completions(&self) -> watch::Receiver<u64> {
        self.inner.completed_runs.subscribe()
    }

    /// Turn offline→online transitions of a liveness channel into triggers.
    pub fn watch_network(&self, mut online: watch::Receiver<bool>) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            let mut was_online = *online.borrow_and_update();
            while online.changed().await.is_ok() {
                let is_online = *online.borrow_and_update();
                match (was_online, is_online) {
                    (false, true) => scheduler.handle(LifecycleEvent::NetworkOnline),
                    (true, false) => scheduler.handle(LifecycleEvent::NetworkOffline),
                    _ => {}
                }
                was_online = is_online;
            }
        })
    }
}

impl<R: SyncRunner> Inner<R> {
    fn lock_timer(&self) -> MutexGuard<'_, TimerState> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn arm(this: &Arc<Self>) {
        let mut timer = this.lock_timer();
        timer.generation = timer.generation.wrapping_add(1);
        if let Some(previous) = timer.pending.take() {
            previous.abort();
        }

        let generation = timer.generation;
        let inner = Arc::clone(this);
        timer.pending = Some(tokio::spawn(async move {
            inner.run_after_debounce(generation).await;
        }));
        tracing::debug!("Sync scheduled in {:?}", this.debounce);
    }

    async fn run_after_debounce(self: Arc<Self>, generation: u64) {
        tokio::time::sleep(self.debounce).await;

        {
            let mut timer = self.lock_timer();
            if timer.generation != generation {
                return;
            }
            // Dropping our own handle detaches this task from cancellation.
            timer.pending = None;
            if self.running.load(Ordering::SeqCst) > 0 {
                timer.rerun_requested = true;
                tracing::debug!("Sync already running; queued a follow-up run");
                return;
            }
            self.running.fetch_add(1, Ordering::SeqCst);
        }

        let report = self.runner.run().await;

        *self
            .last_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(report);

        let rerun = {
            let mut timer = self.lock_timer();
            self.running.fetch_sub(1, Ordering::SeqCst);
            std::mem::take(&mut timer.rerun_requested)
        };
        self.completed_runs.send_modify(|count| *count += 1);
        if rerun {
            Self::arm(&self);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::error::PushError;
    use crate::liveness::test_support::AlwaysOnline;
    use crate::models::{RecordCategory, WireRecord};
    use crate::outbox::test_support::{attendance, memory_outbox};
    use crate::remote::{PushAck, RemotePush, StaticCredential};
    use crate::sync::SyncOrchestrator;

    #[derive(Default)]
    struct CountingRunner {
        runs: AtomicUsize,
        delay: Duration,
    }

    impl SyncRunner for CountingRunner {
        async fn run(&self) -> SyncReport {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.runs.fetch_add(1, Ordering::SeqCst);
            SyncReport::default()
        }
    }

    struct SlowRemote;

    impl RemotePush for SlowRemote {
        async fn push(
            &self,
            _category: RecordCategory,
            records: &[WireRecord],
            _bearer_token: &str,
        ) -> Result<PushAck, PushError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(PushAck {
                accepted: records
                    .iter()
                    .map(|record| record.client_id.clone())
                    .collect::<HashSet<_>>(),
            })
        }
    }

    fn scheduler(runner: &Arc<CountingRunner>) -> SyncScheduler<CountingRunner> {
        SyncScheduler::new(Arc::clone(runner), SchedulerConfig::default())
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_sync_runs_after_debounce() {
        let runner = Arc::new(CountingRunner::default());
        let scheduler = scheduler(&runner);

        scheduler.schedule_sync();
        assert_eq!(scheduler.phase(), SchedulerPhase::PendingDebounce);

        tokio::time::advance(Duration::from_millis(1_900)).await;
        settle().await;
        assert_eq!(runner.runs.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_millis(200)).await;
        settle().await;
        assert_eq!(runner.runs.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.phase(), SchedulerPhase::Idle);
        assert_eq!(scheduler.last_report(), Some(SyncReport::default()));
    }

    #[tokio::test(start_paused = true)]
    async fn bursts_of_triggers_coalesce_into_one_run() {
        let runner = Arc::new(CountingRunner::default());
        let scheduler = scheduler(&runner);

        for _ in 0..5 {
            scheduler.handle(LifecycleEvent::NetworkOnline);
            tokio::time::advance(Duration::from_millis(1_000)).await;
            settle().await;
        }
        assert_eq!(runner.runs.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(runner.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_disarms_pending_timer() {
        let runner = Arc::new(CountingRunner::default());
        let scheduler = scheduler(&runner);

        scheduler.schedule_sync();
        scheduler.cancel_scheduled_sync();
        assert_eq!(scheduler.phase(), SchedulerPhase::Idle);

        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(runner.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn lifecycle_events_map_to_schedule_and_cancel() {
        let runner = Arc::new(CountingRunner::default());
        let scheduler = scheduler(&runner);

        scheduler.handle(LifecycleEvent::NetworkOffline);
        assert_eq!(scheduler.phase(), SchedulerPhase::Idle);

        scheduler.handle(LifecycleEvent::Foreground);
        assert_eq!(scheduler.phase(), SchedulerPhase::PendingDebounce);
        scheduler.handle(LifecycleEvent::Background);
        assert_eq!(scheduler.phase(), SchedulerPhase::Idle);

        scheduler.handle(LifecycleEvent::Manual);
        tokio::time::advance(Duration::from_secs(3)).await;
        settle().await;
        assert_eq!(runner.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_does_not_interrupt_running_sync() {
        let runner = Arc::new(CountingRunner {
            runs: AtomicUsize::new(0),
            delay: Duration::from_secs(10),
        });
        let scheduler = scheduler(&runner);
        let mut completions = scheduler.subscribe_completions();

        scheduler.schedule_sync();
        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(scheduler.phase(), SchedulerPhase::Running);

        scheduler.cancel_scheduled_sync();
        assert_eq!(scheduler.phase(), SchedulerPhase::Running);

        completions.changed().await.unwrap();
        assert_eq!(runner.runs.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.phase(), SchedulerPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_during_run_queues_one_follow_up() {
        let runner = Arc::new(CountingRunner {
            runs: AtomicUsize::new(0),
            delay: Duration::from_secs(10),
        });
        let scheduler = scheduler(&runner);

        scheduler.schedule_sync();
        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(scheduler.phase(), SchedulerPhase::Running);

        scheduler.handle(LifecycleEvent::Manual);
        scheduler.handle(LifecycleEvent::Manual);
        settle().await;
        for _ in 0..30 {
            tokio::time::advance(Duration::from_secs(1)).await;
            settle().await;
        }

        assert_eq!(runner.runs.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.phase(), SchedulerPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_drops_follow_up_queued_behind_run() {
        let runner = Arc::new(CountingRunner {
            runs: AtomicUsize::new(0),
            delay: Duration::from_secs(10),
        });
        let scheduler = scheduler(&runner);

        scheduler.schedule_sync();
        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        scheduler.handle(LifecycleEvent::Manual);
        settle().await;
        tokio::time::advance(Duration::from_secs(3)).await;
        settle().await;
        assert_eq!(scheduler.phase(), SchedulerPhase::Running);

        scheduler.handle(LifecycleEvent::Background);
        for _ in 0..30 {
            tokio::time::advance(Duration::from_secs(1)).await;
            settle().await;
        }

        assert_eq!(runner.runs.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.phase(), SchedulerPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_during_run_still_updates_outbox() {
        let outbox = Arc::new(memory_outbox().await);
        let id = outbox.enqueue(attendance("w-1")).await.unwrap();
        let orchestrator = Arc::new(SyncOrchestrator::new(
            Arc::clone(&outbox),
            Arc::new(AlwaysOnline(true)),
            SlowRemote,
            StaticCredential::new(Some("token".to_string())),
        ));
        let scheduler = SyncScheduler::new(orchestrator, SchedulerConfig::default());
        let mut completions = scheduler.subscribe_completions();

        scheduler.schedule_sync();
        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        scheduler.cancel_scheduled_sync();

        completions.changed().await.unwrap();
        let report = scheduler.last_report().unwrap();
        assert_eq!(report.synced(RecordCategory::Attendance), 1);
        assert!(
            outbox
                .get(RecordCategory::Attendance, &id)
                .await
                .unwrap()
                .synced
        );
    }

    #[tokio::test(start_paused = true)]
    async fn network_watch_schedules_on_reconnect() {
        let runner = Arc::new(CountingRunner::default());
        let scheduler = scheduler(&runner);
        let (online, receiver) = watch::channel(false);
        let watcher = scheduler.watch_network(receiver);
        settle().await;

        online.send_replace(true);
        settle().await;
        assert_eq!(scheduler.phase(), SchedulerPhase::PendingDebounce);

        tokio::time::advance(Duration::from_secs(3)).await;
        settle().await;
        assert_eq!(runner.runs.load(Ordering::SeqCst), 1);

        drop(online);
        watcher.await.unwrap();
    }
}
