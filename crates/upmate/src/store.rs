//! Persistent key-value store capability.
//!
//! The SDK never talks to a platform keychain directly. It is handed a
//! `KeyValueStore` and keeps all of its state under three fixed keys
//! (see [`keys`]). This module defines the trait and an in-memory
//! implementation for tests and hosts that do not need persistence.
//!
//! Absent keys are the normal first-run condition, never an error.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

/// Fixed keys owned by the SDK.
pub mod keys {
    /// Backend-assigned installation identifier.
    pub const USER_ID: &str = "userId";
    /// App version recorded by the last reconcile.
    pub const LAST_SEEN_VERSION: &str = "lastSeenVersion";
    /// String-encoded boolean: update surface already shown for `lastSeenVersion`.
    pub const HAS_SEEN_VERSION_UPDATE: &str = "hasSeenVersionUpdate";

    /// Every key the SDK writes.
    pub const ALL: [&str; 3] = [USER_ID, LAST_SEEN_VERSION, HAS_SEEN_VERSION_UPDATE];
}

/// Encode a boolean the way it is persisted.
pub fn encode_bool(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// Decode a persisted boolean. Anything other than `"true"` reads as false.
pub fn decode_bool(value: Option<&str>) -> bool {
    matches!(value, Some("true"))
}

/// Errors that can occur during store operations.
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("store backend failure: {0}")]
    Backend(String),

    #[error("store serialization error: {0}")]
    Serialization(String),

    #[error("store IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Namespaced string key-value storage.
///
/// Implementations are shared across tasks, so every method takes `&self`.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a key. `Ok(None)` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a single key.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Write several keys together.
    ///
    /// Backends that can commit atomically must override this. The default
    /// writes entries one by one in the given order, and callers rely on that
    /// order when the backend cannot do better.
    async fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        for (key, value) in entries {
            self.set(key, value).await?;
        }
        Ok(())
    }

    /// Remove every key in this store's namespace.
    async fn remove_all(&self) -> Result<(), StoreError>;
}

/// Thread-safe in-memory store.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with entries.
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            entries: Arc::new(RwLock::new(map)),
        }
    }

    /// Create a new in-memory store wrapped in an Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Copy of the current contents.
    pub async fn snapshot(&self) -> HashMap<String, String> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        let mut map = self.entries.write().await;
        for (key, value) in entries {
            map.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }

    async fn remove_all(&self) -> Result<(), StoreError> {
        self.entries.write().await.clear();
        Ok(())
    }
}
