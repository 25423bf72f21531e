use lectern_core::LecternError;
use thiserror::Error;

/// Errors that can occur while syncing progress
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Remote error: {0}")]
    Remote(#[from] LecternError),

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Server rejected sessions: {0}")]
    Rejected(String),
}

impl SyncError {
    /// Whether a later retry may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Remote(err) => err.is_transient(),
            Self::Timeout { .. } => true,
            Self::Storage(_) | Self::Rejected(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
