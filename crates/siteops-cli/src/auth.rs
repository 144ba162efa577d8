//! API access token persistence in the OS keychain.

#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::{Mutex, OnceLock};

#[cfg(not(test))]
use keyring::Entry;
use siteops_core::remote::StaticCredential;
use siteops_core::util::non_blank;

use crate::error::CliError;

pub const ACCESS_TOKEN_ENV: &str = "SITEOPS_ACCESS_TOKEN";

#[cfg(not(test))]
const KEYRING_SERVICE_NAME: &str = "siteops-cli";
const KEYRING_USERNAME: &str = "api_access_token";

/// Where the active access token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Environment,
    Keychain,
    Missing,
}

impl TokenSource {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Environment => ACCESS_TOKEN_ENV,
            Self::Keychain => "OS keychain",
            Self::Missing => "none",
        }
    }
}

#[derive(Clone)]
pub struct TokenStore {
    username: String,
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new(KEYRING_USERNAME)
    }
}

impl TokenStore {
    pub fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
        }
    }

    #[cfg(test)]
    fn test_store() -> &'static Mutex<HashMap<String, String>> {
        static STORE: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
        STORE.get_or_init(|| Mutex::new(HashMap::new()))
    }

    #[cfg(not(test))]
    fn entry(&self) -> Result<Entry, CliError> {
        Entry::new(KEYRING_SERVICE_NAME, &self.username)
            .map_err(|error| CliError::Auth(error.to_string()))
    }

    #[cfg(not(test))]
    pub fn load(&self) -> Result<Option<String>, CliError> {
        match self.entry()?.get_password() {
            Ok(token) => Ok(non_blank(Some(token))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(CliError::Auth(error.to_string())),
        }
    }

    #[cfg(test)]
    pub fn load(&self) -> Result<Option<String>, CliError> {
        let guard = Self::test_store()
            .lock()
            .map_err(|error| CliError::Auth(error.to_string()))?;
        Ok(guard.get(&self.username).cloned())
    }

    #[cfg(not(test))]
    pub fn save(&self, token: &str) -> Result<(), CliError> {
        self.entry()?
            .set_password(token)
            .map_err(|error| CliError::Auth(error.to_string()))
    }

    #[cfg(test)]
    pub fn save(&self, token: &str) -> Result<(), CliError> {
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| CliError::Auth(error.to_string()))?;
        guard.insert(self.username.clone(), token.to_string());
        Ok(())
    }

    #[cfg(not(test))]
    pub fn clear(&self) -> Result<(), CliError> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(CliError::Auth(error.to_string())),
        }
    }

    #[cfg(test)]
    pub fn clear(&self) -> Result<(), CliError> {
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| CliError::Auth(error.to_string()))?;
        guard.remove(&self.username);
        Ok(())
    }
}

/// Resolve the access token, letting the environment override the keychain.
pub fn resolve_access_token(
    store: &TokenStore,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(Option<String>, TokenSource), CliError> {
    if let Some(token) = non_blank(lookup(ACCESS_TOKEN_ENV)) {
        return Ok((Some(token), TokenSource::Environment));
    }
    match store.load()? {
        Some(token) => Ok((Some(token), TokenSource::Keychain)),
        None => Ok((None, TokenSource::Missing)),
    }
}

/// Credential for the sync orchestrator, read once per command.
pub fn load_credential() -> Result<StaticCredential, CliError> {
    let (token, _) = resolve_access_token(&TokenStore::default(), |name| {
        std::env::var(name).ok()
    })?;
    Ok(StaticCredential::new(token))
}
