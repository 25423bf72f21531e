//! Error types for playback coordination

use crate::lifecycle::SessionState;
use lectern_core::LecternError;
use lectern_sync::SyncError;
use thiserror::Error;

/// Playback errors
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// No session is prepared
    #[error("No active session")]
    NoActiveSession,

    /// Navigation target outside the segment list
    #[error("Segment index out of range: {index} (segment count {count})")]
    IndexOutOfBounds {
        /// Requested index
        index: usize,
        /// Number of segments
        count: usize,
    },

    /// Speed must be finite and positive
    #[error("Invalid speed: {0}")]
    InvalidSpeed(f32),

    /// Lifecycle refused a state change
    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Current state
        from: SessionState,
        /// Requested state
        to: SessionState,
    },

    /// Rendering backend failure
    #[error("Backend error: {0}")]
    Backend(String),

    /// Bounded remote call did not finish
    #[error("{0} timed out")]
    Timeout(&'static str),

    /// Collaborator or session metadata error
    #[error(transparent)]
    Core(#[from] LecternError),

    /// Progress sync error
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// The coordination task is gone
    #[error("Player service stopped")]
    ServiceStopped,
}

impl PlaybackError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

/// Result type for playback operations
pub type Result<T> = std::result::Result<T, PlaybackError>;
