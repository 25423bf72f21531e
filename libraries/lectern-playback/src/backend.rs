//! Rendering backend abstraction
//!
//! Platform code provides concrete backends (a device-side decoder, a cast
//! receiver). The coordinator only talks to them through this trait and
//! only from the coordination task.

use crate::error::Result;
use crate::translator::{LocalPosition, SegmentList};
use lectern_core::{AudioTrack, BackendKind};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

/// Playback state reported by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendState {
    Idle,
    Buffering,
    Playing,
    Paused,
    Stopped,
}

/// Position and state reports from a backend
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// Periodic position report
    Position {
        kind: BackendKind,
        position: LocalPosition,
    },
    StateChanged {
        kind: BackendKind,
        state: BackendState,
    },
    /// Backend began moving into the next segment on its own
    AutoAdvanceStarted {
        kind: BackendKind,
        from_segment: usize,
    },
    /// Backend is settled in its new segment
    AutoAdvanceSettled {
        kind: BackendKind,
        segment_index: usize,
    },
    /// End of the last segment reached
    Ended { kind: BackendKind },
    /// Decode or connection failure
    Error { kind: BackendKind, message: String },
}

impl BackendEvent {
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Position { kind, .. }
            | Self::StateChanged { kind, .. }
            | Self::AutoAdvanceStarted { kind, .. }
            | Self::AutoAdvanceSettled { kind, .. }
            | Self::Ended { kind }
            | Self::Error { kind, .. } => *kind,
        }
    }
}

/// Capability set every rendering backend provides
pub trait PlaybackBackend: Send {
    fn kind(&self) -> BackendKind;

    /// Prepare the backend for use
    ///
    /// A remote backend fails here when no receiver session exists.
    fn initialize(&mut self) -> Result<()>;

    /// Replace the playlist
    fn set_segments(&mut self, segments: &SegmentList, tracks: &[AudioTrack]) -> Result<()>;

    fn seek_to(&mut self, position: LocalPosition) -> Result<()>;

    fn play(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    /// Stop and drop the playlist
    fn stop(&mut self);

    fn set_speed(&mut self, speed: f32) -> Result<()>;

    fn speed(&self) -> f32;

    /// Reported position, `None` while seeking or without a playlist
    fn current_position(&self) -> Option<LocalPosition>;

    fn is_playing(&self) -> bool;

    /// Register the channel events are reported on
    fn subscribe(&mut self, events: UnboundedSender<BackendEvent>);

    /// Give clock-driven backends a chance to report progress
    fn poll(&mut self) {}
}
