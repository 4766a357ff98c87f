//! Error types shared by the session core.

use crate::flags::FeatureFlag;
use thiserror::Error;

/// Errors reported by the REST transport.
///
/// Clonable so that every reader waiting on a de-duplicated fetch receives the
/// same failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Server returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    /// HTTP status code, when the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Decode(e.to_string())
    }
}

/// Errors surfaced by the session core
#[derive(Debug, Error)]
pub enum CoreError {
    /// Identity is still being resolved
    #[error("Identity not resolved yet")]
    AuthUnresolved,

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Feature {flag} is disabled")]
    FeatureDisabled { flag: FeatureFlag },

    #[error("A trading transition is already in flight for user {user_id}")]
    TransitionConflict { user_id: String },

    #[error("{command} command failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Cached value for key {key} has an unexpected type")]
    CacheType { key: String },

    #[error(transparent)]
    Api(#[from] ApiError),
}

pub type CoreResult<T> = Result<T, CoreError>;
