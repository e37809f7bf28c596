//! Error types for the update announcement SDK.

use thiserror::Error;

use crate::store::StoreError;

/// Errors that can occur while talking to the update backend, the
/// persistent store, or the presentation layer.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// Network or connectivity failure before a response was received
    #[error("transport error: {0}")]
    Transport(String),

    /// Well-formed request answered with a status the operation does not accept
    #[error("unexpected response status {status}")]
    UnexpectedStatus { status: u16 },

    /// Success status with a body that could not be decoded
    #[error("failed to decode response body: {0}")]
    Decode(String),

    /// Malformed URL, endpoint template, or SDK configuration
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Persistent store failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Presentation gateway could not initiate the presentation
    #[error("presentation failed: {0}")]
    Presentation(String),
}

/// Classification of an [`UpdateError`], used in diagnostics and decision results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    UnexpectedStatus(u16),
    Decode,
    InvalidConfiguration,
    Store,
    Presentation,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport => write!(f, "transport"),
            Self::UnexpectedStatus(status) => write!(f, "unexpected-status({})", status),
            Self::Decode => write!(f, "decode"),
            Self::InvalidConfiguration => write!(f, "invalid-configuration"),
            Self::Store => write!(f, "store"),
            Self::Presentation => write!(f, "presentation"),
        }
    }
}

impl UpdateError {
    /// Get the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) => ErrorKind::Transport,
            Self::UnexpectedStatus { status } => ErrorKind::UnexpectedStatus(*status),
            Self::Decode(_) => ErrorKind::Decode,
            Self::InvalidConfiguration(_) => ErrorKind::InvalidConfiguration,
            Self::Store(_) => ErrorKind::Store,
            Self::Presentation(_) => ErrorKind::Presentation,
        }
    }
}

impl From<reqwest::Error> for UpdateError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            UpdateError::Decode(err.to_string())
        } else if err.is_builder() {
            UpdateError::InvalidConfiguration(err.to_string())
        } else {
            UpdateError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for UpdateError {
    fn from(err: serde_json::Error) -> Self {
        UpdateError::Decode(err.to_string())
    }
}

impl From<reqwest::header::InvalidHeaderValue> for UpdateError {
    fn from(err: reqwest::header::InvalidHeaderValue) -> Self {
        UpdateError::InvalidConfiguration(format!("invalid header value: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_classification() {
        assert_eq!(
            UpdateError::Transport("reset".into()).kind(),
            ErrorKind::Transport
        );
        assert_eq!(
            UpdateError::UnexpectedStatus { status: 500 }.kind(),
            ErrorKind::UnexpectedStatus(500)
        );
        assert_eq!(UpdateError::Decode("eof".into()).kind(), ErrorKind::Decode);
        assert_eq!(
            UpdateError::Store(StoreError::Backend("locked".into())).kind(),
            ErrorKind::Store
        );
    }

    #[test]
    fn test_json_error_is_decode() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert_eq!(UpdateError::from(err).kind(), ErrorKind::Decode);
    }

    #[test]
    fn test_display_includes_status() {
        let err = UpdateError::UnexpectedStatus { status: 503 };
        assert_eq!(err.to_string(), "unexpected response status 503");
        assert_eq!(err.kind().to_string(), "unexpected-status(503)");
    }
}
