//! Client configuration.
//!
//! Values come from an optional JSON file, then `SITEOPS_*` environment
//! overrides. Every field is optional so older config files keep loading.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::liveness::LivenessConfig;
use crate::outbox::RetentionPolicy;
use crate::scheduler::SchedulerConfig;
use crate::util::{http_base_url, non_blank};

const CONFIG_FILE_NAME: &str = "client-config.json";
const DAY_SECS: u64 = 24 * 60 * 60;

pub const ENV_API_BASE_URL: &str = "SITEOPS_API_BASE_URL";
pub const ENV_HEALTH_URL: &str = "SITEOPS_HEALTH_URL";
pub const ENV_DEBOUNCE_MS: &str = "SITEOPS_DEBOUNCE_MS";
pub const ENV_PROBE_TIMEOUT_MS: &str = "SITEOPS_PROBE_TIMEOUT_MS";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(default)]
    pub api_base_url: Option<String>,
    /// Unauthenticated liveness endpoint; defaults to `{api_base_url}/health`
    #[serde(default)]
    pub health_check_url: Option<String>,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_probe_min_interval_ms")]
    pub probe_min_interval_ms: u64,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_synced_retention_days")]
    pub synced_retention_days: u64,
    #[serde(default = "default_cache_max_age_days")]
    pub cache_max_age_days: u64,
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,
}

const fn default_probe_timeout_ms() -> u64 {
    3_000
}

const fn default_probe_min_interval_ms() -> u64 {
    5_000
}

const fn default_debounce_ms() -> u64 {
    2_000
}

const fn default_synced_retention_days() -> u64 {
    30
}

const fn default_cache_max_age_days() -> u64 {
    7
}

const fn default_cache_max_entries() -> usize {
    500
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            health_check_url: None,
            probe_timeout_ms: default_probe_timeout_ms(),
            probe_min_interval_ms: default_probe_min_interval_ms(),
            debounce_ms: default_debounce_ms(),
            synced_retention_days: default_synced_retention_days(),
            cache_max_age_days: default_cache_max_age_days(),
            cache_max_entries: default_cache_max_entries(),
        }
    }
}

/// Default location of the client config file, when the platform has a
/// config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("siteops").join(CONFIG_FILE_NAME))
}

impl ClientConfig {
    /// Load from `path` (missing file = defaults), then apply environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::load_from_path(path)?,
            None => Self::default(),
        };
        config.with_overrides(|name| std::env::var(name).ok())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw).map_err(|error| {
            Error::InvalidInput(format!(
                "Failed to parse config at {}: {error}",
                path.display()
            ))
        })?;
        config.normalized()
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let normalized = self.clone().normalized()?;
        std::fs::write(path, serde_json::to_string_pretty(&normalized)?)?;
        Ok(())
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production).
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(url) = non_blank(lookup(ENV_API_BASE_URL)) {
            self.api_base_url = Some(url);
        }
        if let Some(url) = non_blank(lookup(ENV_HEALTH_URL)) {
            self.health_check_url = Some(url);
        }
        if let Some(value) = non_blank(lookup(ENV_DEBOUNCE_MS)) {
            self.debounce_ms = parse_millis(ENV_DEBOUNCE_MS, &value)?;
        }
        if let Some(value) = non_blank(lookup(ENV_PROBE_TIMEOUT_MS)) {
            self.probe_timeout_ms = parse_millis(ENV_PROBE_TIMEOUT_MS, &value)?;
        }
        self.normalized()
    }

    fn normalized(mut self) -> Result<Self> {
        self.api_base_url = normalize_http_url(self.api_base_url, "api_base_url")?;
        self.health_check_url = normalize_http_url(self.health_check_url, "health_check_url")?;
        if self.probe_timeout_ms == 0 {
            return Err(Error::InvalidInput(
                "probe_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(self)
    }

    /// Health endpoint to probe, derived from the API base URL when not set.
    pub fn health_check_url(&self) -> Option<String> {
        self.health_check_url.clone().or_else(|| {
            self.api_base_url
                .as_ref()
                .map(|base| format!("{base}/health"))
        })
    }

    pub const fn liveness(&self) -> LivenessConfig {
        LivenessConfig {
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            probe_min_interval: Duration::from_millis(self.probe_min_interval_ms),
        }
    }

    pub const fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            debounce: Duration::from_millis(self.debounce_ms),
        }
    }

    pub const fn retention(&self) -> RetentionPolicy {
        RetentionPolicy {
            synced_max_age: days(self.synced_retention_days),
            cache_max_age: days(self.cache_max_age_days),
            cache_max_entries: self.cache_max_entries,
        }
    }
}

const fn days(count: u64) -> Duration {
    Duration::from_secs(count.saturating_mul(DAY_SECS))
}

fn normalize_http_url(value: Option<String>, field: &str) -> Result<Option<String>> {
    let Some(value) = non_blank(value) else {
        return Ok(None);
    };
    http_base_url(&value)
        .map(Some)
        .ok_or_else(|| Error::InvalidInput(format!("{field} must include http:// or https://")))
}

fn parse_millis(name: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|_| Error::InvalidInput(format!("{name} must be a whole number of milliseconds")))
}
