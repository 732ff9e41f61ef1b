use log::{debug, info};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::studio::Studio;

#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Returns `None` for blank input.
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into().trim().to_string();
        if key.is_empty() {
            None
        } else {
            Some(Self(key))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(****)")
    }
}

pub trait CredentialProvider: Send + Sync {
    fn has_key(&self) -> bool;

    fn current(&self) -> Option<ApiKey>;

    fn select_key(&self, key: ApiKey);
}

/// In-process key holder. Seeded once at startup, then changed only by explicit selection.
#[derive(Debug, Default)]
pub struct KeyStore {
    key: RwLock<Option<ApiKey>>,
}

impl KeyStore {
    pub fn new(initial: Option<ApiKey>) -> Self {
        Self {
            key: RwLock::new(initial),
        }
    }

    pub fn from_env(var: &str) -> Self {
        let key = std::env::var(var).ok().and_then(ApiKey::new);
        if key.is_some() {
            info!("Using API key from ${}", var);
        } else {
            debug!("${} is not set", var);
        }
        Self::new(key)
    }
}

impl CredentialProvider for KeyStore {
    fn has_key(&self) -> bool {
        self.key.read().is_some()
    }

    fn current(&self) -> Option<ApiKey> {
        self.key.read().clone()
    }

    fn select_key(&self, key: ApiKey) {
        *self.key.write() = Some(key);
    }
}

/// Mirrors the provider's "has a usable key" flag into the studio every `interval`.
pub async fn watch_credentials(
    provider: Arc<dyn CredentialProvider>,
    studio: Studio,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let has_key = provider.has_key();
        if studio.has_key() != has_key {
            info!("API key {}", if has_key { "connected" } else { "missing" });
        }
        studio.set_has_key(has_key);
    }
}
