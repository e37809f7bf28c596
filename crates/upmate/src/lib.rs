//! # upmate
//!
//! In-app update announcement SDK.
//!
//! This crate handles:
//! - Provisioning a backend identifier for each installation
//! - Tracking the last-seen app version and whether its update was acknowledged
//! - Asking the backend whether an update surface exists for the running version
//! - Deciding, per display policy, whether to hand that surface to the host
//! - Persisting state through a pluggable key-value store
//!
//! Rendering is left to the host through [`PresentationGateway`].
//!
//! ## Persistence
//!
//! Three keys are written under the configured service name: `userId`,
//! `lastSeenVersion` and `hasSeenVersionUpdate`. [`FileStore`] keeps them in
//! a JSON document; the `keychain` feature adds an OS credential store
//! backend.

pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod file_store;
pub mod identity;
#[cfg(feature = "keychain")]
pub mod keychain;
pub mod presentation;
#[cfg(test)]
mod proptests;
pub mod sdk;
pub mod store;
pub mod version;

// Re-export main types for convenience
pub use client::{ApiKey, UpdateClient, UpdateOffer, API_KEY_HEADER};
pub use config::{NetworkConfig, UpMateConfig, DEFAULT_BASE_URL, DEFAULT_SERVICE};
pub use engine::{
    CheckFailure, CheckResult, DecisionOutcome, DecisionPhase, DisplayPolicy, UpdateDecision,
    UpdateDecisionEngine,
};
pub use error::{ErrorKind, UpdateError};
pub use file_store::FileStore;
pub use identity::{IdentityStatus, IdentityStore};
#[cfg(feature = "keychain")]
pub use keychain::KeyringStore;
pub use presentation::{
    opens_externally, DismissHandle, DismissReason, Dismissal, PresentationGateway,
    PresentationRequest, PresentationStyle, StubPresentationGateway, DISMISS_MESSAGE,
};
pub use sdk::{UpMate, UpMateBuilder};
pub use store::{InMemoryStore, KeyValueStore, StoreError};
pub use version::{Reconciliation, TrackerGuard, VersionState, VersionTracker};
