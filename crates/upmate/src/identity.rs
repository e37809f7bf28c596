//! Installation identity.
//!
//! The backend assigns each installation a `userId`. It is read from the
//! store at startup and, when absent, provisioned lazily from the backend.
//! A failed provisioning leaves the identity absent; nothing retries on its
//! own, a later call may try again.
//!
//! At most one provisioning request is in flight per SDK instance. Once a
//! `userId` is persisted it is never replaced: provisioning only writes
//! after confirming the store has none, and an unreadable store counts as
//! "maybe present", never as absent.

use std::sync::{Arc, Weak};

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::client::UpdateClient;
use crate::error::UpdateError;
use crate::store::{keys, KeyValueStore, StoreError};

/// Outcome of an identity lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityStatus {
    /// Identifier known (persisted or freshly provisioned)
    Known(String),
    /// Not provisioned yet
    Pending,
}

impl IdentityStatus {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::Known(id) => Some(id),
            Self::Pending => None,
        }
    }
}

/// Persisted mapping of this installation to its backend identifier.
pub struct IdentityStore {
    client: Arc<UpdateClient>,
    store: Arc<dyn KeyValueStore>,
    user_id: RwLock<Option<String>>,
    /// Held for the duration of a provisioning request
    flight: Arc<Mutex<()>>,
}

impl IdentityStore {
    pub fn new(client: Arc<UpdateClient>, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            client,
            store,
            user_id: RwLock::new(None),
            flight: Arc::new(Mutex::new(())),
        }
    }

    /// Read the persisted identifier into the cache.
    pub async fn load(&self) -> Result<Option<String>, StoreError> {
        let stored = self.store.get(keys::USER_ID).await?;
        match &stored {
            Some(id) => debug!("Loaded userId {} from store", id),
            None => debug!("No userId in store"),
        }
        *self.user_id.write().await = stored.clone();
        Ok(stored)
    }

    /// Cached identifier, if known.
    pub async fn remote_user_id(&self) -> Option<String> {
        self.user_id.read().await.clone()
    }

    /// Wait for any in-flight provisioning, then clear the store and forget
    /// the cached identifier.
    pub async fn reset(&self) -> Result<(), StoreError> {
        let _flight = self.flight.lock().await;
        self.store.remove_all().await?;
        *self.user_id.write().await = None;
        Ok(())
    }

    /// Return the identifier, provisioning it from the backend if needed.
    ///
    /// Concurrent callers wait for the in-flight request instead of issuing
    /// their own.
    pub async fn ensure_identity(&self) -> IdentityStatus {
        if let Some(id) = self.remote_user_id().await {
            return IdentityStatus::Known(id);
        }

        let _flight = self.flight.lock().await;
        if let Some(id) = self.remote_user_id().await {
            return IdentityStatus::Known(id);
        }

        match self.read_persisted().await {
            Persisted::Found(id) => return IdentityStatus::Known(id),
            Persisted::Unreadable => return IdentityStatus::Pending,
            Persisted::Absent => {}
        }

        let result = self.client.fetch_identity().await;
        self.complete(result).await
    }

    /// Provision in the background, holding only a weak handle while the
    /// request is in flight.
    ///
    /// Skipped when an identity is already known or another provisioning is
    /// running. If the owner is dropped before the response arrives, the
    /// response is discarded.
    pub async fn provision_in_background(this: Weak<Self>) {
        let (client, _flight) = {
            let Some(identity) = this.upgrade() else {
                return;
            };
            if identity.remote_user_id().await.is_some() {
                return;
            }
            let Ok(flight) = identity.flight.clone().try_lock_owned() else {
                debug!("Identity provisioning already in flight");
                return;
            };
            if !matches!(identity.read_persisted().await, Persisted::Absent) {
                return;
            }
            (identity.client.clone(), flight)
        };

        info!("UserId not found in store, fetching from backend");
        let result = client.fetch_identity().await;

        let Some(identity) = this.upgrade() else {
            debug!("SDK released before identity arrived, dropping response");
            return;
        };
        identity.complete(result).await;
    }

    /// Look for a persisted identifier, caching it when found.
    async fn read_persisted(&self) -> Persisted {
        match self.store.get(keys::USER_ID).await {
            Ok(Some(id)) => {
                *self.user_id.write().await = Some(id.clone());
                Persisted::Found(id)
            }
            Ok(None) => Persisted::Absent,
            Err(e) => {
                warn!("Failed to read userId from store, not provisioning: {}", e);
                Persisted::Unreadable
            }
        }
    }

    /// Persist a fetched identifier. Must run under the flight guard.
    async fn complete(&self, result: Result<String, UpdateError>) -> IdentityStatus {
        match result {
            Ok(id) => {
                match self.read_persisted().await {
                    Persisted::Found(existing) => {
                        debug!("userId {} already persisted, discarding fetched id", existing);
                        return IdentityStatus::Known(existing);
                    }
                    Persisted::Unreadable => return IdentityStatus::Pending,
                    Persisted::Absent => {}
                }
                if let Err(e) = self.store.set(keys::USER_ID, &id).await {
                    error!("Failed to persist userId: {}", e);
                }
                info!("Provisioned userId {}", id);
                *self.user_id.write().await = Some(id.clone());
                IdentityStatus::Known(id)
            }
            Err(e) => {
                warn!("Failed to fetch userId ({}): {}", e.kind(), e);
                IdentityStatus::Pending
            }
        }
    }
}

/// Outcome of reading `userId` from the store.
enum Persisted {
    Found(String),
    Absent,
    /// The store failed; the identifier may exist, so nothing is written.
    Unreadable,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ApiKey;
    use crate::config::UpMateConfig;
    use crate::store::InMemoryStore;

    fn unreachable_client() -> Arc<UpdateClient> {
        // Port 9 (discard) on loopback: connection refused, no real traffic.
        let config = UpMateConfig::default().with_base_url("http://127.0.0.1:9");
        Arc::new(UpdateClient::new(&config, &ApiKey::new("test-key").unwrap()).unwrap())
    }

    #[tokio::test]
    async fn test_load_persisted_identity() {
        let store = InMemoryStore::with_entries([(keys::USER_ID, "u-stored")]);
        let identity = IdentityStore::new(unreachable_client(), Arc::new(store));
        assert_eq!(identity.load().await.unwrap().as_deref(), Some("u-stored"));
        assert_eq!(
            identity.ensure_identity().await,
            IdentityStatus::Known("u-stored".into())
        );
    }

    #[tokio::test]
    async fn test_failed_provisioning_stays_pending() {
        let store = InMemoryStore::new();
        let identity = IdentityStore::new(unreachable_client(), Arc::new(store.clone()));
        assert_eq!(identity.ensure_identity().await, IdentityStatus::Pending);
        assert_eq!(identity.remote_user_id().await, None);
        assert_eq!(store.get(keys::USER_ID).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_background_provisioning_after_drop_is_noop() {
        let store = InMemoryStore::new();
        let identity = Arc::new(IdentityStore::new(
            unreachable_client(),
            Arc::new(store.clone()),
        ));
        let weak = Arc::downgrade(&identity);
        drop(identity);
        IdentityStore::provision_in_background(weak).await;
        assert!(store.snapshot().await.is_empty());
    }

    /// Store whose reads always fail; writes go to `inner`.
    struct UnreadableStore {
        inner: InMemoryStore,
    }

    #[async_trait::async_trait]
    impl KeyValueStore for UnreadableStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Backend("locked".into()))
        }

        async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
            self.inner.set(key, value).await
        }

        async fn remove_all(&self) -> Result<(), StoreError> {
            self.inner.remove_all().await
        }
    }

    #[tokio::test]
    async fn test_unreadable_store_skips_provisioning() {
        let inner = InMemoryStore::new();
        let identity = Arc::new(IdentityStore::new(
            unreachable_client(),
            Arc::new(UnreadableStore {
                inner: inner.clone(),
            }),
        ));

        assert!(identity.load().await.is_err());
        assert_eq!(identity.ensure_identity().await, IdentityStatus::Pending);
        IdentityStore::provision_in_background(Arc::downgrade(&identity)).await;
        assert!(inner.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_fetched_identity_does_not_replace_persisted_one() {
        let store = InMemoryStore::new();
        let identity = IdentityStore::new(unreachable_client(), Arc::new(store.clone()));
        store.set(keys::USER_ID, "orig").await.unwrap();

        let status = identity.complete(Ok("new".into())).await;
        assert_eq!(status, IdentityStatus::Known("orig".into()));
        assert_eq!(
            store.get(keys::USER_ID).await.unwrap().as_deref(),
            Some("orig")
        );
        assert_eq!(identity.remote_user_id().await.as_deref(), Some("orig"));
    }

    #[tokio::test]
    async fn test_fetched_identity_not_written_when_store_unreadable() {
        let inner = InMemoryStore::new();
        let identity = IdentityStore::new(
            unreachable_client(),
            Arc::new(UnreadableStore {
                inner: inner.clone(),
            }),
        );
        let status = identity.complete(Ok("new".into())).await;
        assert_eq!(status, IdentityStatus::Pending);
        assert!(inner.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_reset_waits_for_flight_and_clears() {
        let store = InMemoryStore::with_entries([(keys::USER_ID, "u-stored")]);
        let identity = Arc::new(IdentityStore::new(
            unreachable_client(),
            Arc::new(store.clone()),
        ));
        identity.load().await.unwrap();

        let flight = identity.flight.clone().lock_owned().await;
        let resetting = tokio::spawn({
            let identity = identity.clone();
            async move { identity.reset().await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!resetting.is_finished());
        assert_eq!(
            store.get(keys::USER_ID).await.unwrap().as_deref(),
            Some("u-stored")
        );

        drop(flight);
        resetting.await.unwrap().unwrap();
        assert!(store.snapshot().await.is_empty());
        assert_eq!(identity.remote_user_id().await, None);
    }

    #[tokio::test]
    async fn test_identity_written_externally_is_picked_up() {
        let store = InMemoryStore::new();
        let identity = IdentityStore::new(unreachable_client(), Arc::new(store.clone()));
        identity.load().await.unwrap();
        store.set(keys::USER_ID, "u-late").await.unwrap();
        assert_eq!(
            identity.ensure_identity().await.user_id(),
            Some("u-late")
        );
    }
}
