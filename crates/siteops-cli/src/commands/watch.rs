use std::path::Path;
use std::time::Duration;

use siteops_core::{LifecycleEvent, SchedulerPhase, SyncRunner, SyncScheduler};
use tokio::sync::watch;

use crate::commands::common::{build_sync_stack, format_report_lines, load_config, open_outbox};
use crate::error::CliError;

pub async fn run_watch(
    recheck_secs: u64,
    db_path: &Path,
    config_path: Option<&Path>,
) -> Result<(), CliError> {
    if recheck_secs == 0 {
        return Err(CliError::InvalidArgument(
            "--recheck-secs must be greater than zero".to_string(),
        ));
    }

    let config = load_config(config_path)?;
    let outbox = open_outbox(db_path).await?;
    let stack = build_sync_stack(&config, outbox, false)?;
    let scheduler = SyncScheduler::new(stack.orchestrator, config.scheduler());

    let network_watch = scheduler.watch_network(stack.detector.subscribe());
    let mut completions = scheduler.subscribe_completions();
    let mut recheck = tokio::time::interval(Duration::from_secs(recheck_secs));

    stack.detector.check_now().await;
    scheduler.handle(LifecycleEvent::Manual);
    println!("Watching for connectivity changes (Ctrl-C to stop)");

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
            _ = recheck.tick() => {
                stack.detector.check_now().await;
            }
            changed = completions.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(report) = scheduler.last_report() {
                    if !report.is_empty() {
                        for line in format_report_lines(&report) {
                            println!("{line}");
                        }
                    }
                }
            }
        }
    }

    scheduler.handle(LifecycleEvent::Background);
    network_watch.abort();
    if scheduler.phase() == SchedulerPhase::Running {
        println!("Waiting for the current sync run to finish");
        finish_in_flight(&scheduler, &mut completions).await;
        if let Some(report) = scheduler.last_report() {
            for line in format_report_lines(&report) {
                println!("{line}");
            }
        }
    }
    println!("Stopped watching");
    Ok(())
}

/// Wait until no sync run is executing.
///
/// Completions already published are marked seen first, so only a run that
/// ends after this call releases the wait.
pub async fn finish_in_flight<R: SyncRunner>(
    scheduler: &SyncScheduler<R>,
    completions: &mut watch::Receiver<u64>,
) {
    completions.borrow_and_update();
    while scheduler.phase() == SchedulerPhase::Running {
        if completions.changed().await.is_err() {
            break;
        }
    }
}
