//! OS credential store backed key-value store.
//!
//! Uses the `keyring` crate, which picks the platform store:
//! - **macOS / iOS**: Keychain
//! - **Windows**: Credential Manager
//! - **Linux**: kernel keyutils
//!
//! Each SDK key becomes one entry under the configured service identifier.
//! Keyring calls block, so they run on the blocking pool.

use async_trait::async_trait;
use tracing::debug;

use crate::store::{keys, KeyValueStore, StoreError};

/// Key-value store living in the platform credential store.
pub struct KeyringStore {
    service: String,
    known_keys: Vec<String>,
}

impl KeyringStore {
    /// Create a store under `service`. `remove_all` clears the SDK's keys.
    pub fn new(service: impl Into<String>) -> Self {
        Self::with_known_keys(service, keys::ALL)
    }

    /// Create a store that clears `known_keys` on `remove_all`.
    ///
    /// Platform credential stores cannot enumerate a namespace portably,
    /// so the keys to clear have to be listed up front.
    pub fn with_known_keys<I, K>(service: impl Into<String>, known_keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            service: service.into(),
            known_keys: known_keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    async fn blocking<T, F>(&self, key: &str, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(keyring::Entry) -> Result<T, StoreError> + Send + 'static,
    {
        let service = self.service.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            let entry = keyring::Entry::new(&service, &key).map_err(|e| {
                StoreError::Backend(format!("failed to open keyring entry {}: {}", key, e))
            })?;
            op(entry)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("keyring task failed: {}", e)))?
    }
}

#[async_trait]
impl KeyValueStore for KeyringStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.blocking(key, |entry| match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(StoreError::Backend(format!("failed to read entry: {}", e))),
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let value = value.to_string();
        self.blocking(key, move |entry| {
            entry
                .set_password(&value)
                .map_err(|e| StoreError::Backend(format!("failed to write entry: {}", e)))
        })
        .await
    }

    async fn remove_all(&self) -> Result<(), StoreError> {
        for key in &self.known_keys {
            debug!("Removing keyring entry {} from {}", key, self.service);
            self.blocking(key, |entry| match entry.delete_credential() {
                Ok(()) => Ok(()),
                Err(keyring::Error::NoEntry) => Ok(()),
                Err(e) => Err(StoreError::Backend(format!("failed to delete entry: {}", e))),
            })
            .await?;
        }
        Ok(())
    }
}
