//! Backend switch coordinator
//!
//! Owns the local backend, an optional remote backend and the single
//! pointer saying which one is active. Every backend mutation goes through
//! here so there is never more than one backend rendering a session.

use crate::backend::{BackendEvent, PlaybackBackend};
use crate::error::{PlaybackError, Result};
use crate::segmentation::build_segments;
use crate::translator::{LocalPosition, SegmentList};
use lectern_core::{BackendKind, LecternError, PlaybackSession};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

pub struct BackendSwitchCoordinator {
    local: Box<dyn PlaybackBackend>,
    remote: Option<Box<dyn PlaybackBackend>>,
    active: BackendKind,
    segments: Option<SegmentList>,
    events: UnboundedSender<BackendEvent>,
}

impl BackendSwitchCoordinator {
    pub fn new(mut local: Box<dyn PlaybackBackend>, events: UnboundedSender<BackendEvent>) -> Self {
        local.subscribe(events.clone());
        Self {
            local,
            remote: None,
            active: BackendKind::Local,
            segments: None,
            events,
        }
    }

    pub fn active_kind(&self) -> BackendKind {
        self.active
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn segments(&self) -> Option<&SegmentList> {
        self.segments.as_ref()
    }

    pub fn active(&self) -> &dyn PlaybackBackend {
        match (self.active, &self.remote) {
            (BackendKind::Remote, Some(remote)) => remote.as_ref(),
            _ => self.local.as_ref(),
        }
    }

    fn active_mut(&mut self) -> &mut dyn PlaybackBackend {
        match (self.active, &mut self.remote) {
            (BackendKind::Remote, Some(remote)) => remote.as_mut(),
            _ => self.local.as_mut(),
        }
    }

    fn backend_mut(&mut self, kind: BackendKind) -> Result<&mut dyn PlaybackBackend> {
        match kind {
            BackendKind::Local => Ok(self.local.as_mut()),
            BackendKind::Remote => match self.remote.as_mut() {
                Some(remote) => Ok(remote.as_mut()),
                None => Err(LecternError::BackendUnavailable(
                    "no remote receiver attached".into(),
                )
                .into()),
            },
        }
    }

    /// Absolute position reported by the active backend
    pub fn current_absolute(&self) -> Option<u64> {
        let segments = self.segments.as_ref()?;
        let position = self.active().current_position()?;
        Some(segments.to_absolute(position))
    }

    pub fn is_playing(&self) -> bool {
        self.active().is_playing()
    }

    pub fn speed(&self) -> f32 {
        self.active().speed()
    }

    /// Hand a freshly prepared session to the active backend
    pub fn load(
        &mut self,
        session: &PlaybackSession,
        segments: SegmentList,
        play_when_ready: bool,
        speed: f32,
    ) -> Result<()> {
        if !session.supports_backend(self.active) {
            info!(
                session_id = %session.id,
                from = %self.active,
                "Session cannot use the active backend, falling back to local"
            );
            self.active_mut().stop();
            self.active = BackendKind::Local;
        }

        let tracks = session.audio_tracks.clone();
        let start = segments.to_local(session.current_time_ms as i64);
        let backend = self.active_mut();
        backend.initialize()?;
        backend.set_segments(&segments, &tracks)?;
        backend.seek_to(start)?;
        backend.set_speed(speed)?;
        if play_when_ready {
            backend.play()?;
        } else {
            backend.pause()?;
        }

        debug!(
            session_id = %session.id,
            backend = %self.active,
            segments = segments.len(),
            segment_index = start.segment_index,
            offset_ms = start.offset_ms,
            "Session loaded"
        );
        self.segments = Some(segments);
        Ok(())
    }

    pub fn seek(&mut self, position: LocalPosition) -> Result<()> {
        if self.segments.is_none() {
            return Err(PlaybackError::NoActiveSession);
        }
        self.active_mut().seek_to(position)
    }

    pub fn play(&mut self) -> Result<()> {
        if self.segments.is_none() {
            return Err(PlaybackError::NoActiveSession);
        }
        self.active_mut().play()
    }

    pub fn pause(&mut self) -> Result<()> {
        self.active_mut().pause()
    }

    pub fn set_speed(&mut self, speed: f32) -> Result<()> {
        self.active_mut().set_speed(speed)
    }

    /// Move playback to another backend, preserving position, speed and play state
    ///
    /// Returns `false` when `target` is already active. On failure the
    /// previous backend stays active and resumes if it was playing.
    pub fn switch_to(&mut self, target: BackendKind, session: &PlaybackSession) -> Result<bool> {
        if target == self.active {
            return Ok(false);
        }
        if !session.supports_backend(target) {
            return Err(LecternError::IncompatibleBackend {
                kind: target,
                reason: format!("session {} is a device-local copy", session.id),
            }
            .into());
        }

        let source = self.active;
        let was_playing = self.is_playing();
        let speed = self.speed();
        let absolute = self.current_absolute().unwrap_or(session.current_time_ms);

        self.active_mut().pause()?;

        let segments = build_segments(session);
        let start = segments.to_local(absolute as i64);
        let tracks = session.audio_tracks.clone();

        let handoff = self.backend_mut(target).and_then(|backend| {
            backend.initialize()?;
            backend.set_segments(&segments, &tracks)?;
            backend.seek_to(start)?;
            backend.set_speed(speed)?;
            if was_playing {
                backend.play()?;
            }
            Ok(())
        });

        if let Err(err) = handoff {
            warn!(from = %source, to = %target, error = %err, "Backend switch failed, staying put");
            if was_playing {
                if let Err(resume_err) = self.active_mut().play() {
                    warn!(error = %resume_err, "Failed to resume previous backend");
                }
            }
            return Err(err);
        }

        self.active = target;
        self.segments = Some(segments);
        info!(
            from = %source,
            to = %target,
            absolute_ms = absolute,
            speed,
            was_playing,
            "Switched backend"
        );
        Ok(true)
    }

    /// Stop the active backend and drop segment state
    pub fn stop(&mut self) {
        self.active_mut().stop();
        self.segments = None;
    }

    /// A cast receiver became available
    pub fn attach_remote(&mut self, mut backend: Box<dyn PlaybackBackend>) {
        if self.active == BackendKind::Remote {
            self.active_mut().stop();
            self.active = BackendKind::Local;
        }
        backend.subscribe(self.events.clone());
        self.remote = Some(backend);
    }

    /// The cast receiver went away
    ///
    /// When remote playback is active it is handed back to the local backend
    /// first. Returns `true` if that hand-back happened.
    pub fn detach_remote(&mut self, session: Option<&PlaybackSession>) -> Result<bool> {
        let mut handed_back = false;
        if self.active == BackendKind::Remote {
            match session {
                Some(session) => {
                    handed_back = self.switch_to(BackendKind::Local, session)?;
                }
                None => self.active = BackendKind::Local,
            }
        }
        if let Some(mut remote) = self.remote.take() {
            remote.stop();
        }
        Ok(handed_back)
    }

    /// Let the active backend report progress
    pub fn poll(&mut self) {
        self.active_mut().poll();
    }
}
