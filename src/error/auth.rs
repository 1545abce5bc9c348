//! Errors produced by a credential refresh episode.

use thiserror::Error;

/// Terminal outcome of a failed refresh episode.
///
/// `Clone` because the same failure is handed to the triggering caller and to
/// every waiter queued behind the episode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    #[error("Refresh rejected by server (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Refresh request failed: {0}")]
    Transport(String),

    #[error("Refresh timed out after {timeout_seconds}s")]
    Timeout { timeout_seconds: u64 },

    #[error("Refresh response could not be parsed: {0}")]
    MalformedResponse(String),

    #[error("Refresh episode ended without an outcome")]
    Abandoned,
}

impl RefreshError {
    /// Creates a rejection error from an HTTP status and server message.
    #[must_use]
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }

    /// Whether the server actively refused the session, as opposed to the
    /// request never completing.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

impl From<reqwest::Error> for RefreshError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RefreshError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedResponse(err.to_string())
    }
}
