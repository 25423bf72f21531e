//! Clock-driven backend
//!
//! Renders nothing: position advances with the tokio clock at the configured
//! speed. Used by the CLI dry-run player and by tests.

use crate::backend::{BackendEvent, BackendState, PlaybackBackend};
use crate::error::{PlaybackError, Result};
use crate::translator::{LocalPosition, SegmentList};
use lectern_core::{AudioTrack, BackendKind};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tracing::{debug, trace};

pub struct SimulatedBackend {
    kind: BackendKind,
    reachable: bool,
    initialized: bool,
    segments: Option<SegmentList>,
    /// Absolute position at `anchor`
    base_ms: u64,
    anchor: Option<Instant>,
    speed: f32,
    reported_segment: Option<usize>,
    advancing_to: Option<usize>,
    events: Option<UnboundedSender<BackendEvent>>,
}

impl SimulatedBackend {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            reachable: true,
            initialized: false,
            segments: None,
            base_ms: 0,
            anchor: None,
            speed: 1.0,
            reported_segment: None,
            advancing_to: None,
            events: None,
        }
    }

    pub fn local() -> Self {
        Self::new(BackendKind::Local)
    }

    pub fn remote() -> Self {
        Self::new(BackendKind::Remote)
    }

    /// A backend whose receiver cannot be reached
    pub fn unreachable(kind: BackendKind) -> Self {
        Self {
            reachable: false,
            ..Self::new(kind)
        }
    }

    /// Absolute position right now
    pub fn absolute_ms(&self) -> u64 {
        let total = self.segments.as_ref().map_or(0, SegmentList::total_duration_ms);
        let elapsed = self.anchor.map_or(0, |anchor| {
            (anchor.elapsed().as_millis() as f64 * f64::from(self.speed)) as u64
        });
        (self.base_ms + elapsed).min(total)
    }

    fn rebase(&mut self) {
        self.base_ms = self.absolute_ms();
        if self.anchor.is_some() {
            self.anchor = Some(Instant::now());
        }
    }

    fn emit(&self, event: BackendEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    fn require_ready(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(PlaybackError::backend(format!("{} backend not initialized", self.kind)))
        }
    }
}

impl PlaybackBackend for SimulatedBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn initialize(&mut self) -> Result<()> {
        if !self.reachable {
            return Err(PlaybackError::backend(format!(
                "{} receiver unreachable",
                self.kind
            )));
        }
        self.initialized = true;
        Ok(())
    }

    fn set_segments(&mut self, segments: &SegmentList, _tracks: &[AudioTrack]) -> Result<()> {
        self.require_ready()?;
        debug!(kind = %self.kind, count = segments.len(), "Segments loaded");
        self.segments = Some(segments.clone());
        self.base_ms = 0;
        self.anchor = None;
        self.reported_segment = None;
        self.advancing_to = None;
        Ok(())
    }

    fn seek_to(&mut self, position: LocalPosition) -> Result<()> {
        self.require_ready()?;
        let segments = self
            .segments
            .as_ref()
            .ok_or_else(|| PlaybackError::backend("seek without segments"))?;
        self.base_ms = segments.to_absolute(position);
        self.reported_segment = Some(position.segment_index);
        self.advancing_to = None;
        if self.anchor.is_some() {
            self.anchor = Some(Instant::now());
        }
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        self.require_ready()?;
        if self.segments.is_none() {
            return Err(PlaybackError::backend("play without segments"));
        }
        if self.anchor.is_none() {
            self.anchor = Some(Instant::now());
            self.emit(BackendEvent::StateChanged {
                kind: self.kind,
                state: BackendState::Playing,
            });
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        if self.anchor.is_some() {
            self.base_ms = self.absolute_ms();
            self.anchor = None;
            self.emit(BackendEvent::StateChanged {
                kind: self.kind,
                state: BackendState::Paused,
            });
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.anchor = None;
        self.segments = None;
        self.base_ms = 0;
        self.reported_segment = None;
        self.advancing_to = None;
    }

    fn set_speed(&mut self, speed: f32) -> Result<()> {
        if !(speed.is_finite() && speed > 0.0) {
            return Err(PlaybackError::InvalidSpeed(speed));
        }
        self.rebase();
        self.speed = speed;
        Ok(())
    }

    fn speed(&self) -> f32 {
        self.speed
    }

    fn current_position(&self) -> Option<LocalPosition> {
        let segments = self.segments.as_ref()?;
        Some(segments.to_local(self.absolute_ms() as i64))
    }

    fn is_playing(&self) -> bool {
        self.anchor.is_some()
    }

    fn subscribe(&mut self, events: UnboundedSender<BackendEvent>) {
        self.events = Some(events);
    }

    fn poll(&mut self) {
        if let Some(segment_index) = self.advancing_to.take() {
            self.emit(BackendEvent::AutoAdvanceSettled {
                kind: self.kind,
                segment_index,
            });
        }

        if self.anchor.is_none() {
            return;
        }
        let Some(segments) = self.segments.as_ref() else {
            return;
        };

        let absolute = self.absolute_ms();
        if absolute >= segments.total_duration_ms() {
            self.base_ms = segments.total_duration_ms();
            self.anchor = None;
            trace!(kind = %self.kind, "End of content");
            self.emit(BackendEvent::Ended { kind: self.kind });
            return;
        }

        let position = segments.to_local(absolute as i64);
        if let Some(previous) = self.reported_segment {
            if previous != position.segment_index {
                self.emit(BackendEvent::AutoAdvanceStarted {
                    kind: self.kind,
                    from_segment: previous,
                });
                self.advancing_to = Some(position.segment_index);
            }
        }
        self.reported_segment = Some(position.segment_index);
        self.emit(BackendEvent::Position {
            kind: self.kind,
            position,
        });
    }
}
