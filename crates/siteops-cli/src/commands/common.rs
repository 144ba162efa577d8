use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use siteops_core::config::{default_config_path, ClientConfig};
use siteops_core::liveness::{HttpHealthProbe, LivenessDetector};
use siteops_core::models::MaterialItem;
use siteops_core::outbox::LibSqlOutboxStore;
use siteops_core::remote::{HttpRemote, StaticCredential};
use siteops_core::{Outbox, QueuedRecord, SyncOrchestrator, SyncReport};

use crate::auth::load_credential;
use crate::error::CliError;
use crate::network::HostNetwork;

pub const DB_PATH_ENV: &str = "SITEOPS_DB_PATH";

pub type CliOutbox = Outbox<LibSqlOutboxStore>;
pub type CliDetector = LivenessDetector<HostNetwork, HttpHealthProbe>;
pub type CliOrchestrator =
    SyncOrchestrator<LibSqlOutboxStore, CliDetector, HttpRemote, StaticCredential>;

#[derive(Debug, Serialize)]
pub struct RecordListItem {
    pub id: String,
    pub category: String,
    pub site_id: String,
    pub summary: String,
    pub created_at: Option<i64>,
    pub enqueued_at: i64,
    pub synced: bool,
    pub synced_at: Option<i64>,
    pub attempts: u32,
    pub last_error: Option<String>,
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    cli_db_path
        .or_else(|| env::var_os(DB_PATH_ENV).map(PathBuf::from))
        .or_else(default_db_path)
        .ok_or(CliError::NoDataDir)
}

pub fn default_db_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("siteops").join("outbox.db"))
}

pub async fn open_outbox(path: &Path) -> Result<Arc<CliOutbox>, CliError> {
    let store = LibSqlOutboxStore::open_path(path).await?;
    Ok(Arc::new(Outbox::new(store)))
}

pub fn load_config(path: Option<&Path>) -> Result<ClientConfig, CliError> {
    let path = path.map(Path::to_path_buf).or_else(default_config_path);
    Ok(ClientConfig::load(path.as_deref())?)
}

/// Liveness detector for the configured API, if one is configured.
pub fn build_detector(
    config: &ClientConfig,
    offline: bool,
) -> Result<Option<Arc<CliDetector>>, CliError> {
    let Some(health_url) = config.health_check_url() else {
        return Ok(None);
    };
    let liveness = config.liveness();
    let probe = HttpHealthProbe::new(health_url, liveness.probe_timeout)
        .map_err(|error| CliError::Config(error.to_string()))?;
    let network = if offline {
        HostNetwork::offline()
    } else {
        HostNetwork::default()
    };
    Ok(Some(Arc::new(LivenessDetector::new(network, probe, liveness))))
}

pub struct SyncStack {
    pub orchestrator: Arc<CliOrchestrator>,
    pub detector: Arc<CliDetector>,
}

pub fn build_sync_stack(
    config: &ClientConfig,
    outbox: Arc<CliOutbox>,
    offline: bool,
) -> Result<SyncStack, CliError> {
    let base_url = config
        .api_base_url
        .clone()
        .ok_or(CliError::SyncNotConfigured)?;
    let detector = build_detector(config, offline)?.ok_or(CliError::SyncNotConfigured)?;
    let remote = HttpRemote::new(base_url)?;
    let credential = load_credential()?;
    if !credential.is_present() {
        tracing::warn!("No access token configured; sync runs will be skipped");
    }

    let orchestrator = Arc::new(SyncOrchestrator::new(
        outbox,
        Arc::clone(&detector),
        remote,
        credential,
    ));
    Ok(SyncStack {
        orchestrator,
        detector,
    })
}

pub fn record_to_list_item(record: &QueuedRecord) -> RecordListItem {
    RecordListItem {
        id: record.id.to_string(),
        category: record.category.to_string(),
        site_id: record.payload.site_id().to_string(),
        summary: record.payload.summary(),
        created_at: record.created_at,
        enqueued_at: record.enqueued_at,
        synced: record.synced,
        synced_at: record.synced_at,
        attempts: record.attempts,
        last_error: record.last_error.clone(),
    }
}

pub fn format_record_lines(records: &[QueuedRecord]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    records
        .iter()
        .map(|record| {
            let id = record.id.to_string();
            let short_id = id.chars().take(13).collect::<String>();
            let relative_time = format_relative_time(record.order_key(), now_ms);
            format!(
                "{short_id}  {:<16}  {:<10}  {}  ({relative_time})",
                record.category.as_str(),
                record_state(record),
                record.payload.summary()
            )
        })
        .collect()
}

pub fn record_state(record: &QueuedRecord) -> String {
    if record.synced {
        "synced".to_string()
    } else if record.attempts > 0 {
        format!("failed x{}", record.attempts)
    } else {
        "pending".to_string()
    }
}

pub fn format_report_lines(report: &SyncReport) -> Vec<String> {
    if report.is_empty() {
        return vec!["Nothing synced.".to_string()];
    }

    let mut lines = report
        .synced_counts
        .iter()
        .filter(|(_, count)| **count > 0)
        .map(|(category, count)| format!("{category}: {count} synced"))
        .collect::<Vec<_>>();
    if report.failed_count > 0 {
        lines.push(format!("{} failed", report.failed_count));
        lines.extend(report.errors.iter().map(|error| format!("  {error}")));
    }
    lines
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else {
        format!("{}d ago", diff / day)
    }
}

/// Parse an RFC 3339 timestamp into Unix milliseconds.
pub fn parse_timestamp(value: &str) -> Result<i64, CliError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|time| time.timestamp_millis())
        .map_err(|_| CliError::InvalidArgument(format!("'{value}' is not an RFC 3339 timestamp")))
}

pub fn parse_optional_timestamp(value: Option<&str>) -> Result<Option<i64>, CliError> {
    value.map(parse_timestamp).transpose()
}

pub fn normalize_date(value: &str) -> Result<String, CliError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map(|date| date.format("%Y-%m-%d").to_string())
        .map_err(|_| CliError::InvalidArgument(format!("'{value}' is not a YYYY-MM-DD date")))
}

/// Parse `NAME:QUANTITY[:UNIT]`.
pub fn parse_material_item(value: &str) -> Result<MaterialItem, CliError> {
    let invalid = || CliError::InvalidArgument(format!("'{value}' is not NAME:QUANTITY[:UNIT]"));
    let mut parts = value.splitn(3, ':').map(str::trim);

    let name = parts.next().filter(|name| !name.is_empty()).ok_or_else(invalid)?;
    let quantity = parts
        .next()
        .and_then(|quantity| quantity.parse::<f64>().ok())
        .filter(|quantity| quantity.is_finite() && *quantity > 0.0)
        .ok_or_else(invalid)?;
    let unit = parts.next().filter(|unit| !unit.is_empty()).map(str::to_string);

    Ok(MaterialItem {
        name: name.to_string(),
        quantity,
        unit,
    })
}
