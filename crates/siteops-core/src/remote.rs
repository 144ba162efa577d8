//! Remote service boundary: record push, credentials, and cached reads.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::PushError;
use crate::models::{CacheEntry, CacheKey, RecordCategory, WireRecord};
use crate::outbox::{Outbox, OutboxStore};
use crate::util::{http_base_url, non_blank};

/// Upper bound on one HTTP exchange with the API, body included.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const ERROR_BODY_EXCERPT_CHARS: usize = 180;

/// Ids the remote durably accepted from one push.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushAck {
    pub accepted: HashSet<String>,
}

impl PushAck {
    pub fn contains(&self, client_id: &str) -> bool {
        self.accepted.contains(client_id)
    }
}

/// Remote endpoint that accepts queued records.
///
/// The remote deduplicates by `client_id`; pushing the same record twice must
/// be harmless.
///
/// A push runs while the orchestrator holds its in-flight flag, so it must
/// finish or fail in bounded time; an implementation that can hang blocks
/// every later run.
pub trait RemotePush: Send + Sync + 'static {
    fn push(
        &self,
        category: RecordCategory,
        records: &[WireRecord],
        bearer_token: &str,
    ) -> impl Future<Output = Result<PushAck, PushError>> + Send;
}

/// Source of the bearer credential used for pushes.
pub trait CredentialSource: Send + Sync + 'static {
    /// `None` means "cannot sync yet", not an error.
    fn bearer_token(&self) -> impl Future<Output = Option<String>> + Send;
}

/// A fixed (possibly absent) bearer token.
#[derive(Clone, Default)]
pub struct StaticCredential {
    token: Option<String>,
}

impl StaticCredential {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: non_blank(token),
        }
    }

    pub const fn is_present(&self) -> bool {
        self.token.is_some()
    }
}

impl fmt::Debug for StaticCredential {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("StaticCredential")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl CredentialSource for StaticCredential {
    async fn bearer_token(&self) -> Option<String> {
        self.token.clone()
    }
}

/// A cached read, possibly served while offline.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub body: serde_json::Value,
    /// `true` when the remote could not be reached and the cache answered
    pub stale: bool,
    pub stored_at: Option<i64>,
}

#[derive(Serialize)]
struct PushRequest<'a> {
    records: &'a [WireRecord],
}

#[derive(Debug, Deserialize)]
struct PushResponse {
    #[serde(default)]
    accepted: Option<Vec<String>>,
    #[serde(default)]
    accepted_ids: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// reqwest client for the SiteOps API.
#[derive(Clone)]
pub struct HttpRemote {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>) -> Result<Self, PushError> {
        Self::with_timeout(base_url, REQUEST_TIMEOUT)
    }

    /// Like [`HttpRemote::new`], failing any request that takes longer than
    /// `timeout`.
    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, PushError> {
        let base_url = normalize_base_url(base_url.into())?;
        Ok(Self {
            base_url,
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn push_url(&self, category: RecordCategory) -> String {
        format!("{}/v1/sync/{}", self.base_url, category.endpoint_path())
    }

    /// GET an idempotent endpoint, caching successes per caller.
    ///
    /// Any failure falls back to the cached response for the same caller;
    /// the error is only returned when nothing is cached.
    pub async fn get_cached<S: OutboxStore>(
        &self,
        outbox: &Outbox<S>,
        path: &str,
        caller: &str,
        bearer_token: Option<&str>,
    ) -> Result<CachedResponse, PushError> {
        let key = CacheKey::new(path, caller);
        match self.get_json(path, bearer_token).await {
            Ok(body) => {
                outbox.set_cache(key, body.clone()).await;
                Ok(CachedResponse {
                    body,
                    stale: false,
                    stored_at: None,
                })
            }
            Err(error) => match outbox.get_cache(&key).await {
                Some(CacheEntry {
                    response,
                    stored_at,
                    ..
                }) => {
                    tracing::debug!("Serving cached {path} after fetch failure: {error}");
                    Ok(CachedResponse {
                        body: response,
                        stale: true,
                        stored_at: Some(stored_at),
                    })
                }
                None => Err(error),
            },
        }
    }

    async fn get_json(
        &self,
        path: &str,
        bearer_token: Option<&str>,
    ) -> Result<serde_json::Value, PushError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut request = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(token) = bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PushError::Api(parse_api_error(status, &body)));
        }
        Ok(response.json().await?)
    }
}

impl RemotePush for HttpRemote {
    async fn push(
        &self,
        category: RecordCategory,
        records: &[WireRecord],
        bearer_token: &str,
    ) -> Result<PushAck, PushError> {
        let mut request = self
            .client
            .post(self.push_url(category))
            .bearer_auth(bearer_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&PushRequest { records });
        if let [single] = records {
            request = request.header("Idempotency-Key", &single.client_id);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PushError::Api(parse_api_error(status, &body)));
        }

        let body = response.text().await?;
        let payload: PushResponse = serde_json::from_str(&body)
            .map_err(|error| PushError::InvalidResponse(error.to_string()))?;
        let accepted = payload
            .accepted
            .or(payload.accepted_ids)
            .ok_or_else(|| {
                PushError::InvalidResponse("response did not include accepted ids".to_string())
            })?;

        Ok(PushAck {
            accepted: accepted.into_iter().collect(),
        })
    }
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let excerpt: String = body.trim().chars().take(ERROR_BODY_EXCERPT_CHARS).collect();
    if excerpt.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{excerpt} ({})", status.as_u16())
    }
}

fn normalize_base_url(raw: String) -> Result<String, PushError> {
    if raw.trim().is_empty() {
        return Err(PushError::InvalidResponse(
            "API base URL must not be empty".to_string(),
        ));
    }
    http_base_url(&raw).ok_or_else(|| {
        PushError::InvalidResponse("API base URL must include http:// or https://".to_string())
    })
}
