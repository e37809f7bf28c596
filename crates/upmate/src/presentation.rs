//! Presentation gateway interface.
//!
//! The SDK decides *whether* to show an update surface; the host decides
//! *how*. A [`PresentationGateway`] receives the URL and presentation style,
//! starts showing it (modal window, embedded web view, console output...),
//! and hands back a [`Dismissal`] that resolves when the surface goes away.

use std::str::FromStr;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::error::UpdateError;

/// Message name the embedded web content posts to close the surface.
pub const DISMISS_MESSAGE: &str = "closeWebView";

/// Symbolic display modes understood by presentation gateways.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PresentationStyle {
    #[default]
    FullScreen,
    PageSheet,
    FormSheet,
    CurrentContext,
    Custom,
    OverFullScreen,
    OverCurrentContext,
    Popover,
    None,
}

impl PresentationStyle {
    pub const ALL: [PresentationStyle; 9] = [
        Self::FullScreen,
        Self::PageSheet,
        Self::FormSheet,
        Self::CurrentContext,
        Self::Custom,
        Self::OverFullScreen,
        Self::OverCurrentContext,
        Self::Popover,
        Self::None,
    ];

    /// Wire name of the style.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FullScreen => "fullScreen",
            Self::PageSheet => "pageSheet",
            Self::FormSheet => "formSheet",
            Self::CurrentContext => "currentContext",
            Self::Custom => "custom",
            Self::OverFullScreen => "overFullScreen",
            Self::OverCurrentContext => "overCurrentContext",
            Self::Popover => "popover",
            Self::None => "none",
        }
    }

    /// Parse a style name case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        let needle = s.trim();
        Self::ALL
            .into_iter()
            .find(|style| style.as_str().eq_ignore_ascii_case(needle))
    }

    /// Parse a style name, falling back to [`PresentationStyle::FullScreen`]
    /// for anything unrecognized.
    pub fn from_str_lossy(s: &str) -> Self {
        Self::parse(s).unwrap_or_else(|| {
            warn!("Unknown presentation style {:?}, falling back to fullScreen", s);
            Self::FullScreen
        })
    }

    /// Style the modal is actually shown with.
    ///
    /// `overCurrentContext` is shown through the custom fade-in transition.
    pub fn effective(&self) -> Self {
        match self {
            Self::OverCurrentContext => Self::Custom,
            other => *other,
        }
    }
}

impl std::fmt::Display for PresentationStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresentationStyle {
    type Err = UpdateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            UpdateError::InvalidConfiguration(format!("unknown presentation style: {}", s))
        })
    }
}

impl Serialize for PresentationStyle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PresentationStyle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_str_lossy(&raw))
    }
}

/// Whether a navigation inside the presented surface should leave it.
///
/// Only `http` and `https` pages load in place; every other scheme (app
/// deep links, `mailto:`, `tel:`...) is handed to the host OS.
pub fn opens_externally(url: &Url) -> bool {
    !matches!(url.scheme().to_ascii_lowercase().as_str(), "http" | "https")
}

/// A request to show an update surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentationRequest {
    pub url: Url,
    pub style: PresentationStyle,
    /// Lightweight non-modal presentation hint
    pub toast: bool,
}

impl PresentationRequest {
    pub fn new(url: Url, style: PresentationStyle) -> Self {
        Self {
            url,
            style,
            toast: false,
        }
    }

    pub fn with_toast(mut self, toast: bool) -> Self {
        self.toast = toast;
        self
    }
}

/// Why a presented surface went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DismissReason {
    /// The web content posted [`DISMISS_MESSAGE`]
    Content,
    /// The user closed the surface
    User,
    /// The gateway dropped its handle without reporting
    Abandoned,
}

/// Gateway side of a dismissal: report exactly once when the surface closes.
#[derive(Debug)]
pub struct DismissHandle {
    tx: oneshot::Sender<DismissReason>,
}

impl DismissHandle {
    pub fn dismiss(self, reason: DismissReason) {
        // The SDK side may have stopped listening; that is fine.
        let _ = self.tx.send(reason);
    }
}

/// SDK side of a dismissal.
#[derive(Debug)]
pub struct Dismissal {
    rx: oneshot::Receiver<DismissReason>,
}

impl Dismissal {
    /// Create a linked handle / dismissal pair.
    pub fn channel() -> (DismissHandle, Dismissal) {
        let (tx, rx) = oneshot::channel();
        (DismissHandle { tx }, Dismissal { rx })
    }

    /// A dismissal that has already resolved.
    pub fn resolved(reason: DismissReason) -> Self {
        let (handle, dismissal) = Self::channel();
        handle.dismiss(reason);
        dismissal
    }

    /// Wait for the surface to go away.
    pub async fn wait(self) -> DismissReason {
        self.rx.await.unwrap_or(DismissReason::Abandoned)
    }
}

/// Host capability that shows update surfaces.
#[async_trait]
pub trait PresentationGateway: Send + Sync {
    /// Start presenting. Returns once the presentation has been initiated,
    /// not when it is dismissed.
    ///
    /// Runs while the SDK holds its decision lock. Reading state or calling
    /// `reset` from here is fine, but awaiting another display call or
    /// `present_update` on the same SDK never completes; spawn it instead.
    async fn present(&self, request: PresentationRequest) -> Result<Dismissal, UpdateError>;
}

/// Gateway that records requests instead of showing anything.
///
/// Used when the host does not provide a gateway, and as a test double.
#[derive(Debug, Default)]
pub struct StubPresentationGateway {
    presented: Mutex<Vec<PresentationRequest>>,
    failure: Option<String>,
}

impl StubPresentationGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// A gateway whose every presentation fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            presented: Mutex::new(Vec::new()),
            failure: Some(message.into()),
        }
    }

    /// Requests presented so far.
    pub fn presented(&self) -> Vec<PresentationRequest> {
        self.presented
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    pub fn presented_count(&self) -> usize {
        self.presented.lock().map(|p| p.len()).unwrap_or_default()
    }
}

#[async_trait]
impl PresentationGateway for StubPresentationGateway {
    async fn present(&self, request: PresentationRequest) -> Result<Dismissal, UpdateError> {
        if let Some(message) = &self.failure {
            return Err(UpdateError::Presentation(message.clone()));
        }
        info!(
            "Stub presentation of {} ({})",
            request.url,
            request.style.effective()
        );
        if let Ok(mut presented) = self.presented.lock() {
            presented.push(request);
        }
        Ok(Dismissal::resolved(DismissReason::User))
    }
}
