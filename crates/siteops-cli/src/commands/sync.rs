use std::path::Path;

use crate::commands::common::{build_sync_stack, format_report_lines, load_config, open_outbox};
use crate::error::CliError;

pub async fn run_sync(
    offline: bool,
    db_path: &Path,
    config_path: Option<&Path>,
) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let outbox = open_outbox(db_path).await?;
    let stack = build_sync_stack(&config, outbox, offline)?;

    if !stack.detector.check_now().await {
        println!("Offline; records stay queued.");
        return Ok(());
    }

    let report = stack.orchestrator.run().await;
    for line in format_report_lines(&report) {
        println!("{line}");
    }
    Ok(())
}
