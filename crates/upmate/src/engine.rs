//! Update decision engine.
//!
//! Combines the backend's update check with the persisted version state to
//! decide whether to present an update surface:
//!
//! ```text
//! Idle -> Checking -> NoOffer
//!                  -> CheckFailed
//!                  -> OfferPending -> Suppressed            (ShowIfNeeded, already acknowledged)
//!                                  -> Presenting -> Presented
//!                                                -> PresentationFailed
//! ```
//!
//! Every invocation reconciles the version state after the check completes,
//! whatever the check returned. A failed check never presents and is
//! reported separately from "no update". Nothing retries on its own.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::client::{UpdateClient, UpdateOffer};
use crate::error::{ErrorKind, UpdateError};
use crate::presentation::{Dismissal, PresentationGateway, PresentationRequest};
use crate::version::{Reconciliation, VersionTracker};

/// Result of an update check.
pub type CheckResult = Result<Option<UpdateOffer>, UpdateError>;

/// When to present an available offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayPolicy {
    /// Present every offer, acknowledged or not
    AlwaysShow,
    /// Present only if the current version has not been acknowledged
    ShowIfNeeded,
}

impl std::fmt::Display for DisplayPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlwaysShow => write!(f, "always-show"),
            Self::ShowIfNeeded => write!(f, "show-if-needed"),
        }
    }
}

/// Intermediate states, logged as the engine moves through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionPhase {
    Idle,
    Checking,
    OfferPending,
    Presenting,
}

/// Why a check failed, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&UpdateError> for CheckFailure {
    fn from(err: &UpdateError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Terminal state of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionOutcome {
    /// Backend reported no update
    NoOffer,
    /// Offer handed to the presentation gateway
    Presented,
    /// Offer available but already acknowledged for this version
    Suppressed,
    /// Check failed; treated like no update for presentation purposes
    CheckFailed(CheckFailure),
    /// Gateway could not start the presentation
    PresentationFailed(String),
}

impl DecisionOutcome {
    pub fn is_presented(&self) -> bool {
        matches!(self, Self::Presented)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::NoOffer => "no-offer",
            Self::Presented => "presented",
            Self::Suppressed => "suppressed",
            Self::CheckFailed(_) => "check-failed",
            Self::PresentationFailed(_) => "presentation-failed",
        }
    }
}

/// Everything one invocation decided. Returned per call; nothing is kept
/// on the engine between calls.
#[derive(Debug)]
pub struct UpdateDecision {
    pub policy: DisplayPolicy,
    pub outcome: DecisionOutcome,
    /// Offer returned by the check, presented or not
    pub offer: Option<UpdateOffer>,
    /// Version bookkeeping of this invocation; `None` if the store failed
    pub reconciliation: Option<Reconciliation>,
    /// Resolves when the presented surface is dismissed
    pub dismissal: Option<Dismissal>,
}

/// Decides whether to present update offers.
pub struct UpdateDecisionEngine {
    client: Arc<UpdateClient>,
    tracker: Arc<VersionTracker>,
    gateway: Arc<dyn PresentationGateway>,
    /// Serializes reconcile-to-acknowledge sequences.
    decisions: Mutex<()>,
}

impl UpdateDecisionEngine {
    pub fn new(
        client: Arc<UpdateClient>,
        tracker: Arc<VersionTracker>,
        gateway: Arc<dyn PresentationGateway>,
    ) -> Self {
        Self {
            client,
            tracker,
            gateway,
            decisions: Mutex::new(()),
        }
    }

    /// Run a full invocation: check, reconcile, maybe present.
    pub async fn decide(&self, policy: DisplayPolicy) -> UpdateDecision {
        transition(policy, DecisionPhase::Idle);
        let check = self.check().await;
        self.apply(policy, check).await
    }

    /// Ask the backend for an offer for the running version.
    pub async fn check(&self) -> CheckResult {
        self.client
            .check_for_update(self.tracker.current_version())
            .await
    }

    /// Apply a completed check to the persisted state.
    ///
    /// Invocations are serialized from reconcile through `mark_acknowledged`,
    /// so concurrent ones cannot both present for one version. The tracker
    /// itself is only locked per store operation and stays usable from
    /// inside the gateway.
    pub async fn apply(&self, policy: DisplayPolicy, check: CheckResult) -> UpdateDecision {
        transition(policy, DecisionPhase::Checking);
        match &check {
            Ok(Some(_)) => {}
            Ok(None) => info!("No update to display"),
            Err(e) => warn!("Update check failed ({}): {}", e.kind(), e),
        }

        let _decision = self.decisions.lock().await;
        let reconciliation = match self.tracker.reconcile().await {
            Ok(r) => Some(r),
            Err(e) => {
                error!("Failed to reconcile version state: {}", e);
                None
            }
        };

        let decision = |outcome, offer, dismissal| UpdateDecision {
            policy,
            outcome,
            offer,
            reconciliation: reconciliation.clone(),
            dismissal,
        };

        let offer = match check {
            Ok(Some(offer)) => offer,
            Ok(None) => return decision(DecisionOutcome::NoOffer, None, None),
            Err(e) => {
                return decision(DecisionOutcome::CheckFailed(CheckFailure::from(&e)), None, None)
            }
        };

        transition(policy, DecisionPhase::OfferPending);
        if policy == DisplayPolicy::ShowIfNeeded {
            let acknowledged = match self.tracker.is_acknowledged().await {
                Ok(acknowledged) => acknowledged,
                Err(e) => {
                    error!("Failed to read acknowledged flag, not presenting: {}", e);
                    true
                }
            };
            if acknowledged {
                info!("User has already seen this update");
                return decision(DecisionOutcome::Suppressed, Some(offer), None);
            }
        }

        transition(policy, DecisionPhase::Presenting);
        let request = PresentationRequest::new(offer.url.clone(), offer.presentation_style);
        match self.gateway.present(request).await {
            Ok(dismissal) => {
                info!("Displaying update from {}", offer.url);
                if let Err(e) = self.tracker.mark_acknowledged().await {
                    error!("Failed to mark update acknowledged: {}", e);
                }
                decision(DecisionOutcome::Presented, Some(offer), Some(dismissal))
            }
            Err(e) => {
                warn!("Failed to present update: {}", e);
                decision(
                    DecisionOutcome::PresentationFailed(e.to_string()),
                    Some(offer),
                    None,
                )
            }
        }
    }

    /// Present a request directly, bypassing the check, and mark the
    /// current version acknowledged once the presentation has started.
    pub async fn present(&self, request: PresentationRequest) -> Result<Dismissal, UpdateError> {
        let _decision = self.decisions.lock().await;
        let dismissal = self.gateway.present(request).await?;
        if let Err(e) = self.tracker.mark_acknowledged().await {
            error!("Failed to mark update acknowledged: {}", e);
        }
        Ok(dismissal)
    }
}

fn transition(policy: DisplayPolicy, phase: DecisionPhase) {
    debug!("[{}] -> {:?}", policy, phase);
}
