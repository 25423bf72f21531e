//! Error types for the Lectern server client.

use lectern_core::LecternError;
use thiserror::Error;

/// Errors that can occur when interacting with the media server.
#[derive(Error, Debug)]
pub enum ServerClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Server returned an error response
    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// Authentication required but no token available, or token rejected
    #[error("Authentication required")]
    AuthRequired,

    /// Invalid server URL
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    /// Failed to parse server response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Server is offline or unreachable
    #[error("Server unreachable: {0}")]
    ServerUnreachable(String),

    /// Request did not complete before the client timeout
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Rate limited by server
    #[error("Rate limited, retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },
}

impl ServerClientError {
    /// Classify a transport error from `reqwest`
    pub(crate) fn from_send(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::ServerUnreachable(err.to_string())
        } else {
            Self::Request(err)
        }
    }
}

impl From<ServerClientError> for LecternError {
    fn from(err: ServerClientError) -> Self {
        match err {
            ServerClientError::ServerUnreachable(msg) => LecternError::Network(msg),
            ServerClientError::Timeout(msg) => LecternError::Timeout(msg),
            ServerClientError::Request(e) => LecternError::Network(e.to_string()),
            ServerClientError::ServerError { status, message } => {
                LecternError::Remote { status, message }
            }
            ServerClientError::AuthRequired => LecternError::Remote {
                status: 401,
                message: "authentication required".to_string(),
            },
            ServerClientError::RateLimited { retry_after_secs } => LecternError::Remote {
                status: 429,
                message: format!("retry after {retry_after_secs}s"),
            },
            other => LecternError::Other(other.to_string()),
        }
    }
}

/// Result type for server client operations.
pub type Result<T> = std::result::Result<T, ServerClientError>;
