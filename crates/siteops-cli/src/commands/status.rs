use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::auth::{resolve_access_token, TokenStore};
use crate::commands::common::{build_detector, load_config, open_outbox};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub pending: BTreeMap<String, usize>,
    pub total_pending: usize,
    /// `None` when no API is configured
    pub online: Option<bool>,
    pub api_base_url: Option<String>,
    pub token_source: String,
}

pub async fn run_status(
    as_json: bool,
    db_path: &Path,
    config_path: Option<&Path>,
) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let outbox = open_outbox(db_path).await?;

    let pending = outbox
        .pending_counts()
        .await
        .into_iter()
        .map(|(category, count)| (category.to_string(), count))
        .collect::<BTreeMap<_, _>>();
    let online = match build_detector(&config, false)? {
        Some(detector) => Some(detector.check_now().await),
        None => None,
    };
    let (_, token_source) =
        resolve_access_token(&TokenStore::default(), |name| std::env::var(name).ok())?;

    let report = StatusReport {
        total_pending: pending.values().sum(),
        pending,
        online,
        api_base_url: config.api_base_url,
        token_source: token_source.label().to_string(),
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for line in format_status_lines(&report) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_status_lines(report: &StatusReport) -> Vec<String> {
    let mut lines = report
        .pending
        .iter()
        .map(|(category, count)| format!("{category}: {count} pending"))
        .collect::<Vec<_>>();
    let connectivity = match report.online {
        Some(true) => "online",
        Some(false) => "offline",
        None => "not configured",
    };
    lines.push(format!("Connectivity: {connectivity}"));
    lines.push(format!("Access token: {}", report.token_source));
    lines
}
