//! Public SDK entry point.
//!
//! [`UpMate`] wires the store, identity, version tracking, update client and
//! presentation gateway together. Starting it reads the persisted identity,
//! reconciles the running version, and provisions an identity in the
//! background if none is known.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use upmate::{FileStore, UpMate};
//!
//! # async fn run() -> Result<(), upmate::UpdateError> {
//! let sdk = UpMate::builder("my-api-key", env!("CARGO_PKG_VERSION"))
//!     .store(Arc::new(FileStore::open("/var/lib/myapp", "com.example.myapp")))
//!     .start()
//!     .await?;
//!
//! let decision = sdk.display_update_if_needed().await;
//! println!("{}", decision.outcome.label());
//!
//! // Short-lived processes wait for the background follow-ups before exiting.
//! sdk.flush().await;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use reqwest::Url;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::client::{ApiKey, UpdateClient};
use crate::config::UpMateConfig;
use crate::engine::{DisplayPolicy, UpdateDecision, UpdateDecisionEngine};
use crate::error::UpdateError;
use crate::identity::{IdentityStatus, IdentityStore};
use crate::presentation::{
    Dismissal, PresentationGateway, PresentationRequest, PresentationStyle,
    StubPresentationGateway,
};
use crate::store::{InMemoryStore, KeyValueStore};
use crate::version::{VersionState, VersionTracker};

/// Builder for [`UpMate`].
pub struct UpMateBuilder {
    api_key: String,
    app_version: String,
    config: UpMateConfig,
    store: Option<Arc<dyn KeyValueStore>>,
    gateway: Option<Arc<dyn PresentationGateway>>,
}

impl UpMateBuilder {
    pub fn config(mut self, config: UpMateConfig) -> Self {
        self.config = config;
        self
    }

    /// Persistent store. Without one, state lives in memory only.
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Presentation gateway. Without one, presentations are only logged.
    pub fn gateway(mut self, gateway: Arc<dyn PresentationGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Build the SDK and run the startup side effects.
    ///
    /// Only configuration problems fail here. Store and network failures
    /// during startup are logged and the SDK starts anyway.
    pub async fn start(self) -> Result<UpMate, UpdateError> {
        self.config.validate()?;
        let api_key = ApiKey::new(self.api_key)?;
        let app_version = self.app_version.trim().to_string();
        if app_version.is_empty() {
            return Err(UpdateError::InvalidConfiguration(
                "app version must not be empty".to_string(),
            ));
        }

        let client = Arc::new(UpdateClient::new(&self.config, &api_key)?);
        let store = self.store.unwrap_or_else(|| {
            warn!("No persistent store configured, update state will not survive restarts");
            Arc::new(InMemoryStore::new())
        });
        let gateway = self.gateway.unwrap_or_else(|| {
            warn!("No presentation gateway configured, updates will only be logged");
            Arc::new(StubPresentationGateway::new())
        });

        let identity = Arc::new(IdentityStore::new(client.clone(), store.clone()));
        let tracker = Arc::new(VersionTracker::new(app_version, store.clone()));
        let engine = UpdateDecisionEngine::new(client.clone(), tracker.clone(), gateway);

        let inner = Arc::new(Inner {
            config: self.config,
            client,
            identity,
            tracker,
            engine,
            tasks: Mutex::new(JoinSet::new()),
        });

        if let Err(e) = inner.identity.load().await {
            warn!("Failed to read userId from store, identity left unknown: {}", e);
        }
        if let Err(e) = inner.tracker.reconcile().await {
            error!("Failed to reconcile version state: {}", e);
        }

        let sdk = UpMate { inner };
        sdk.spawn_identity_provisioning();
        info!(
            "UpMate SDK initialized for version {} against {}",
            sdk.current_version(),
            sdk.inner.client.base_url()
        );
        Ok(sdk)
    }
}

struct Inner {
    config: UpMateConfig,
    client: Arc<UpdateClient>,
    identity: Arc<IdentityStore>,
    tracker: Arc<VersionTracker>,
    engine: UpdateDecisionEngine,
    /// Background follow-ups (identity provisioning, version reports)
    tasks: Mutex<JoinSet<()>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Outstanding follow-ups finish on their own instead of being aborted.
        self.tasks
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .detach_all();
    }
}

/// In-app update announcement SDK.
///
/// Cheap to clone; clones share one instance. Background work started by
/// the SDK holds only weak handles and becomes a no-op once every clone is
/// dropped. Call [`UpMate::flush`] before the runtime shuts down to let it
/// finish.
#[derive(Clone)]
pub struct UpMate {
    inner: Arc<Inner>,
}

impl UpMate {
    /// Start building an SDK for `api_key` and the running `app_version`.
    pub fn builder(api_key: impl Into<String>, app_version: impl Into<String>) -> UpMateBuilder {
        UpMateBuilder {
            api_key: api_key.into(),
            app_version: app_version.into(),
            config: UpMateConfig::default(),
            store: None,
            gateway: None,
        }
    }

    pub fn config(&self) -> &UpMateConfig {
        &self.inner.config
    }

    /// Version of the running application.
    pub fn current_version(&self) -> &str {
        self.inner.tracker.current_version()
    }

    /// Present the latest offer whenever one is available.
    pub async fn display_update_always(&self) -> UpdateDecision {
        self.display_update(DisplayPolicy::AlwaysShow).await
    }

    /// Present the latest offer once per app version.
    pub async fn display_update_if_needed(&self) -> UpdateDecision {
        self.display_update(DisplayPolicy::ShowIfNeeded).await
    }

    /// Run one invocation under `policy`.
    pub async fn display_update(&self, policy: DisplayPolicy) -> UpdateDecision {
        let decision = self.inner.engine.decide(policy).await;
        self.after_invocation();
        decision
    }

    /// Run one invocation on a background task.
    ///
    /// Resolves to `None` if every handle to the SDK was dropped while the
    /// check was in flight; in that case nothing is written or presented.
    pub fn spawn_display_update(&self, policy: DisplayPolicy) -> JoinHandle<Option<UpdateDecision>> {
        let weak = Arc::downgrade(&self.inner);
        let client = self.inner.client.clone();
        let version = self.current_version().to_string();

        tokio::spawn(async move {
            let check = client.check_for_update(&version).await;
            let Some(inner) = weak.upgrade() else {
                debug!("SDK released before update check completed, dropping result");
                return None;
            };
            let sdk = UpMate { inner };
            let decision = sdk.inner.engine.apply(policy, check).await;
            sdk.after_invocation();
            Some(decision)
        })
    }

    /// Present `url` directly, bypassing the update check.
    ///
    /// A missing style uses the configured default. On success the current
    /// version is marked acknowledged.
    pub async fn present_update(
        &self,
        url: &str,
        presentation_style: Option<&str>,
        toast: bool,
    ) -> Result<Dismissal, UpdateError> {
        let url = Url::parse(url).map_err(|e| {
            UpdateError::InvalidConfiguration(format!("invalid URL string {:?}: {}", url, e))
        })?;
        let style = presentation_style
            .map(PresentationStyle::from_str_lossy)
            .unwrap_or(self.inner.config.default_presentation_style);
        let request = PresentationRequest::new(url, style).with_toast(toast);
        self.inner.engine.present(request).await
    }

    /// Backend identifier of this installation, provisioning it if needed.
    pub async fn ensure_identity(&self) -> IdentityStatus {
        self.inner.identity.ensure_identity().await
    }

    /// Cached backend identifier, if known.
    pub async fn remote_user_id(&self) -> Option<String> {
        self.inner.identity.remote_user_id().await
    }

    /// Persisted version state.
    pub async fn version_state(&self) -> Result<VersionState, UpdateError> {
        Ok(self.inner.tracker.state().await?)
    }

    /// Remove everything the SDK persisted and forget the cached identity.
    ///
    /// Waits for an in-flight identity provisioning, so its result cannot
    /// land after the wipe.
    pub async fn reset(&self) -> Result<(), UpdateError> {
        let _guard = self.inner.tracker.lock().await;
        self.inner.identity.reset().await?;
        info!("Cleared persisted update state");
        Ok(())
    }

    /// Wait for every background follow-up started so far.
    pub async fn flush(&self) {
        loop {
            let mut tasks = std::mem::take(
                &mut *self
                    .inner
                    .tasks
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner),
            );
            if tasks.is_empty() {
                return;
            }
            debug!("Waiting for {} background task(s)", tasks.len());
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    error!("Background task failed: {}", e);
                }
            }
        }
    }

    /// Best-effort follow-ups of an invocation: report the version and make
    /// sure an identity gets provisioned. Neither can affect the decision.
    fn after_invocation(&self) {
        self.spawn_version_report();
        self.spawn_identity_provisioning();
    }

    fn track<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self
            .inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }

    fn spawn_identity_provisioning(&self) {
        let weak = Arc::downgrade(&self.inner.identity);
        self.track(IdentityStore::provision_in_background(weak));
    }

    fn spawn_version_report(&self) {
        let client = self.inner.client.clone();
        let version = self.current_version().to_string();
        self.track(async move {
            match client.report_last_seen_version(&version).await {
                Ok(offer) => debug!(
                    "Reported last seen version {}, backend offer {}",
                    version, offer.url
                ),
                Err(e) => warn!(
                    "Failed to report last seen version {} ({}): {}",
                    version,
                    e.kind(),
                    e
                ),
            }
        });
    }
}
