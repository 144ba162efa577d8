//! Response cache model

use serde::{Deserialize, Serialize};
use std::fmt;

/// Cache key combining endpoint identity and caller identity, so two
/// authenticated users never share a cached response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    #[must_use]
    pub fn new(endpoint: &str, caller: &str) -> Self {
        // Length prefix keeps the split unambiguous whatever the parts contain.
        Self(format!("{}:{endpoint}|{caller}", endpoint.len()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A cached response for an idempotent remote read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub response: serde_json::Value,
    /// Time the response was stored (Unix ms)
    pub stored_at: i64,
}
