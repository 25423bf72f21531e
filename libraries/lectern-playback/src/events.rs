//! Player events
//!
//! Broadcast to every subscriber of a [`crate::PlayerHandle`]. Emitted at:
//! - Session prepared or replaced
//! - Play/pause transitions
//! - Position and state changes (metadata)
//! - Fatal failures
//! - Backend handoff
//! - Progress sync health transitions

use crate::lifecycle::SessionState;
use lectern_core::{BackendKind, PlaybackSession};
use serde::{Deserialize, Serialize};

/// Events emitted by the player service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlayerEvent {
    /// A session was prepared and is now active
    PlaybackSession(Box<PlaybackSession>),

    /// Playing state flipped
    PlayingUpdate { is_playing: bool },

    /// Duration, position and lifecycle state
    Metadata {
        duration_ms: u64,
        current_time_ms: u64,
        state: SessionState,
    },

    /// Playback failed and the session was cleared
    PlaybackFailed { message: String },

    /// Rendering moved to another backend
    BackendChanged { kind: BackendKind },

    /// Progress pushes started failing
    ProgressSyncFailing,

    /// Progress pushes are succeeding again
    ProgressSyncSuccess,
}
