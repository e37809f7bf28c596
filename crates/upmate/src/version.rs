//! Last-seen version and acknowledgment tracking.
//!
//! Two persisted keys describe where this installation stands:
//! `lastSeenVersion` and `hasSeenVersionUpdate` (the acknowledged flag).
//! Whenever the running version differs from the persisted one, the
//! acknowledged flag is reset in the same write that advances the version,
//! so `lastSeenVersion == current` is never observed next to a stale
//! `true` from an older version.
//!
//! All access goes through [`VersionTracker::lock`], which serializes store
//! writes per SDK instance.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::store::{decode_bool, encode_bool, keys, KeyValueStore, StoreError};

/// Snapshot of the persisted version state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionState {
    /// Version of the running application
    pub current_version: String,
    /// Version persisted by the previous reconcile, if any
    pub last_seen_version: Option<String>,
    /// Whether the update surface was already shown for `last_seen_version`
    pub acknowledged: bool,
}

/// Result of a reconcile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// True when the persisted version differed from the running one
    pub transitioned: bool,
    /// Version persisted before this reconcile
    pub previous: Option<String>,
}

/// Persisted record of the last-seen app version.
pub struct VersionTracker {
    current_version: String,
    store: Arc<dyn KeyValueStore>,
    lock: Mutex<()>,
}

impl VersionTracker {
    pub fn new(current_version: impl Into<String>, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            current_version: current_version.into(),
            store,
            lock: Mutex::new(()),
        }
    }

    /// Version of the running application.
    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    /// Take exclusive access to the version keys.
    pub async fn lock(&self) -> TrackerGuard<'_> {
        TrackerGuard {
            tracker: self,
            _guard: self.lock.lock().await,
        }
    }

    /// Reconcile under a short-lived lock.
    pub async fn reconcile(&self) -> Result<Reconciliation, StoreError> {
        self.lock().await.reconcile().await
    }

    /// Read the acknowledged flag under a short-lived lock.
    pub async fn is_acknowledged(&self) -> Result<bool, StoreError> {
        self.lock().await.is_acknowledged().await
    }

    /// Set the acknowledged flag under a short-lived lock.
    pub async fn mark_acknowledged(&self) -> Result<(), StoreError> {
        self.lock().await.mark_acknowledged().await
    }

    /// Read the persisted state.
    pub async fn state(&self) -> Result<VersionState, StoreError> {
        self.lock().await.state().await
    }
}

/// Exclusive access to the version keys; released on drop.
pub struct TrackerGuard<'a> {
    tracker: &'a VersionTracker,
    _guard: MutexGuard<'a, ()>,
}

impl TrackerGuard<'_> {
    /// Compare the running version with the persisted one.
    ///
    /// On a transition the acknowledged flag is reset and the version is
    /// advanced in one `set_many`, flag first. Without a transition the
    /// version is rewritten as-is.
    pub async fn reconcile(&self) -> Result<Reconciliation, StoreError> {
        let store = &self.tracker.store;
        let current = self.tracker.current_version.as_str();
        let previous = store.get(keys::LAST_SEEN_VERSION).await?;
        let transitioned = previous.as_deref() != Some(current);

        if transitioned {
            info!(
                "App version changed: {} -> {}",
                previous.as_deref().unwrap_or("<none>"),
                current
            );
            store
                .set_many(&[
                    (keys::HAS_SEEN_VERSION_UPDATE, encode_bool(false)),
                    (keys::LAST_SEEN_VERSION, current),
                ])
                .await?;
        } else {
            debug!("App version unchanged at {}", current);
            store.set(keys::LAST_SEEN_VERSION, current).await?;
        }

        Ok(Reconciliation {
            transitioned,
            previous,
        })
    }

    pub async fn is_acknowledged(&self) -> Result<bool, StoreError> {
        let raw = self.tracker.store.get(keys::HAS_SEEN_VERSION_UPDATE).await?;
        Ok(decode_bool(raw.as_deref()))
    }

    pub async fn mark_acknowledged(&self) -> Result<(), StoreError> {
        debug!("Marking version {} acknowledged", self.tracker.current_version);
        self.tracker
            .store
            .set(keys::HAS_SEEN_VERSION_UPDATE, encode_bool(true))
            .await
    }

    pub async fn state(&self) -> Result<VersionState, StoreError> {
        let store = &self.tracker.store;
        Ok(VersionState {
            current_version: self.tracker.current_version.clone(),
            last_seen_version: store.get(keys::LAST_SEEN_VERSION).await?,
            acknowledged: decode_bool(store.get(keys::HAS_SEEN_VERSION_UPDATE).await?.as_deref()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn tracker(version: &str, store: &InMemoryStore) -> VersionTracker {
        VersionTracker::new(version, Arc::new(store.clone()))
    }

    #[tokio::test]
    async fn test_first_run_transitions() {
        let store = InMemoryStore::new();
        let tracker = tracker("1.0.0", &store);

        let result = tracker.reconcile().await.unwrap();
        assert!(result.transitioned);
        assert_eq!(result.previous, None);

        let state = tracker.state().await.unwrap();
        assert_eq!(state.last_seen_version.as_deref(), Some("1.0.0"));
        assert!(!state.acknowledged);
        assert_eq!(
            store.get(keys::HAS_SEEN_VERSION_UPDATE).await.unwrap().as_deref(),
            Some("false")
        );
    }

    #[tokio::test]
    async fn test_upgrade_resets_acknowledged() {
        let store = InMemoryStore::with_entries([
            (keys::LAST_SEEN_VERSION, "1.0.0"),
            (keys::HAS_SEEN_VERSION_UPDATE, "true"),
        ]);
        let tracker = tracker("1.1.0", &store);

        let result = tracker.reconcile().await.unwrap();
        assert!(result.transitioned);
        assert_eq!(result.previous.as_deref(), Some("1.0.0"));

        let state = tracker.state().await.unwrap();
        assert_eq!(state.last_seen_version.as_deref(), Some("1.1.0"));
        assert!(!state.acknowledged);
    }

    #[tokio::test]
    async fn test_same_version_keeps_acknowledged() {
        let store = InMemoryStore::with_entries([
            (keys::LAST_SEEN_VERSION, "2.0.0"),
            (keys::HAS_SEEN_VERSION_UPDATE, "true"),
        ]);
        let tracker = tracker("2.0.0", &store);

        let result = tracker.reconcile().await.unwrap();
        assert!(!result.transitioned);
        assert!(tracker.is_acknowledged().await.unwrap());
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let store = InMemoryStore::with_entries([(keys::LAST_SEEN_VERSION, "0.9.0")]);
        let tracker = tracker("1.0.0", &store);

        tracker.reconcile().await.unwrap();
        let once = store.snapshot().await;
        let second = tracker.reconcile().await.unwrap();
        assert!(!second.transitioned);
        assert_eq!(store.snapshot().await, once);
    }

    #[tokio::test]
    async fn test_mark_acknowledged() {
        let store = InMemoryStore::new();
        let tracker = tracker("1.0.0", &store);
        tracker.reconcile().await.unwrap();
        assert!(!tracker.is_acknowledged().await.unwrap());
        tracker.mark_acknowledged().await.unwrap();
        assert!(tracker.is_acknowledged().await.unwrap());
    }

    #[tokio::test]
    async fn test_wiped_store_reads_unacknowledged() {
        let store = InMemoryStore::new();
        let tracker = tracker("1.0.0", &store);
        tracker.reconcile().await.unwrap();
        tracker.mark_acknowledged().await.unwrap();
        store.remove_all().await.unwrap();

        let state = tracker.state().await.unwrap();
        assert_eq!(state.last_seen_version, None);
        assert!(!state.acknowledged);
    }
}
