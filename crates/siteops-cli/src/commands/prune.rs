use std::path::Path;

use crate::commands::common::{load_config, open_outbox};
use crate::error::CliError;

pub async fn run_prune(
    as_json: bool,
    db_path: &Path,
    config_path: Option<&Path>,
) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let outbox = open_outbox(db_path).await?;
    let outcome = outbox.apply_retention(&config.retention()).await;

    if as_json {
        println!(
            "{}",
            serde_json::json!({
                "records_pruned": outcome.records_pruned,
                "cache_evicted": outcome.cache_evicted,
            })
        );
    } else {
        println!(
            "Pruned {} synced record(s), evicted {} cached response(s)",
            outcome.records_pruned, outcome.cache_evicted
        );
    }
    Ok(())
}
