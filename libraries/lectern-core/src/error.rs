/// Core error types for Lectern
use crate::types::BackendKind;
use thiserror::Error;

/// Result type alias using `LecternError`
pub type Result<T> = std::result::Result<T, LecternError>;

/// Core error type shared by the collaborator contracts
#[derive(Error, Debug)]
pub enum LecternError {
    /// Network failure talking to the remote session API
    #[error("Network error: {0}")]
    Network(String),

    /// A bounded remote call did not finish in time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Remote API answered with a non-success status
    #[error("Remote error ({status}): {message}")]
    Remote {
        /// HTTP-style status code
        status: u16,
        /// Body or reason returned by the server
        message: String,
    },

    /// Entity not found
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity
        entity: String,
        /// Identifier that was looked up
        id: String,
    },

    /// Local persistence errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Session metadata violates an invariant (empty tracks, gaps, overlap)
    #[error("Invalid session: {0}")]
    InvalidSession(String),

    /// The session cannot be rendered on the requested backend
    #[error("Session cannot play on the {kind} backend: {reason}")]
    IncompatibleBackend {
        /// Requested backend
        kind: BackendKind,
        /// Why the session is not eligible
        reason: String,
    },

    /// Backend could not be initialised or reached
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Serialization errors
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl LecternError {
    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an invalid session error
    pub fn invalid_session(msg: impl Into<String>) -> Self {
        Self::InvalidSession(msg.into())
    }

    /// Create a not found error
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Whether retrying later (on the sync cadence or after reconnecting) can succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Remote { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
