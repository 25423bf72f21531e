//! Session lifecycle state machine
//!
//! Owns the active [`PlaybackSession`] together with the backend
//! coordinator, the navigation controller and the progress syncer. Every
//! operation here runs on the coordination task; network work is either
//! awaited under a timeout (finalize, refresh, fallback, server close) or
//! spawned by the syncer and reported back as a [`SyncOutcome`].

use crate::backend::{BackendEvent, BackendState, PlaybackBackend};
use crate::coordinator::BackendSwitchCoordinator;
use crate::error::{PlaybackError, Result};
use crate::events::PlayerEvent;
use crate::navigation::{NavigationController, NavigationTarget};
use crate::segmentation::build_segments;
use crate::translator::SegmentList;
use crate::types::PlaybackConfig;
use lectern_core::{
    unix_now_ms, BackendKind, DeviceInfo, PlayMethod, PlaybackSession, RemoteSessionApi,
    SessionOptions,
};
use lectern_sync::{ProgressSyncer, SyncOutcome, SyncStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

/// Lifecycle of the active session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Nothing prepared yet
    Idle,
    Preparing,
    /// Replacing an expired server session
    RefreshingSession,
    Ready,
    Playing,
    Paused,
    Buffering,
    /// Played to the end of the work
    Ended,
    Closed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        use SessionState::*;

        if next == Failed {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (
                Idle | Ready | Playing | Paused | Buffering | Ended | Closed | Failed,
                Preparing
            ) | (Preparing, RefreshingSession | Ready)
                | (RefreshingSession, Preparing)
                | (Ready, Playing | Paused | Buffering)
                | (Playing, Paused | Buffering | Ended)
                | (Paused, Playing | Buffering | Ended)
                | (Buffering, Playing | Paused | Ended)
                | (Ended, Playing | Paused)
                | (Ready | Playing | Paused | Buffering | Ended | Failed, Closed)
        )
    }
}

/// Point-in-time view of the player
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerStatus {
    pub state: SessionState,
    pub session_id: Option<String>,
    pub current_time_ms: u64,
    pub duration_ms: u64,
    pub backend: BackendKind,
    pub is_playing: bool,
    pub speed: f32,
    pub current_index: Option<usize>,
}

pub struct SessionLifecycle {
    state: SessionState,
    session: Option<PlaybackSession>,
    coordinator: BackendSwitchCoordinator,
    navigation: NavigationController,
    syncer: ProgressSyncer,
    remote: Arc<dyn RemoteSessionApi>,
    device: DeviceInfo,
    config: PlaybackConfig,
    events: broadcast::Sender<PlayerEvent>,
    transcode_attempted: bool,
}

impl SessionLifecycle {
    pub fn new(
        coordinator: BackendSwitchCoordinator,
        syncer: ProgressSyncer,
        remote: Arc<dyn RemoteSessionApi>,
        device: DeviceInfo,
        config: PlaybackConfig,
        events: broadcast::Sender<PlayerEvent>,
    ) -> Self {
        Self {
            state: SessionState::Idle,
            session: None,
            coordinator,
            navigation: NavigationController::new(config.skip_previous_threshold_ms),
            syncer,
            remote,
            device,
            config,
            events,
            transcode_attempted: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    pub fn coordinator(&self) -> &BackendSwitchCoordinator {
        &self.coordinator
    }

    pub fn status(&mut self) -> PlayerStatus {
        let position = self.coordinator.current_absolute();
        let current_index = match self.coordinator.segments() {
            Some(segments) => self.navigation.current_index(segments, position),
            None => None,
        };
        PlayerStatus {
            state: self.state,
            session_id: self.session.as_ref().map(|s| s.id.clone()),
            current_time_ms: self.session.as_ref().map_or(0, |s| s.current_time_ms),
            duration_ms: self.session.as_ref().map_or(0, |s| s.total_duration_ms()),
            backend: self.coordinator.active_kind(),
            is_playing: self.session.is_some() && self.coordinator.is_playing(),
            speed: self.coordinator.speed(),
            current_index,
        }
    }

    // ===== Prepare / close =====

    /// Make `session` the active session
    ///
    /// A different active session is finalized first and its flush awaited.
    /// Any failure leaves the lifecycle in `Failed` with no active session.
    pub async fn prepare(
        &mut self,
        session: PlaybackSession,
        play_when_ready: bool,
        speed: f32,
    ) -> Result<()> {
        self.transcode_attempted = false;
        self.prepare_inner(session, play_when_ready, speed).await
    }

    async fn prepare_inner(
        &mut self,
        session: PlaybackSession,
        play_when_ready: bool,
        speed: f32,
    ) -> Result<()> {
        self.finalize_previous(&session.id).await;

        let session_id = session.id.clone();
        let server_session = (!session.is_local).then(|| session_id.clone());
        match self.prepare_session(session, play_when_ready, speed).await {
            Ok(()) => Ok(()),
            Err(err) => {
                error!(session_id = %session_id, error = %err, "Prepare failed");
                self.fail(err.to_string(), server_session).await;
                Err(err)
            }
        }
    }

    async fn finalize_previous(&mut self, next_id: &str) {
        let Some(mut previous) = self.session.take() else {
            return;
        };
        if let Some(absolute) = self.coordinator.current_absolute() {
            previous.current_time_ms = absolute;
        }
        if let Err(err) = self.coordinator.pause() {
            warn!(session_id = %previous.id, error = %err, "Failed to pause previous session");
        }

        if previous.id == next_id {
            debug!(session_id = %previous.id, "Re-preparing the active session");
            self.syncer.abandon();
            return;
        }

        info!(previous = %previous.id, next = %next_id, "Finalizing previous session");
        if let Err(err) = self.syncer.finalize(&mut previous).await {
            warn!(session_id = %previous.id, error = %err, "Finalize failed, continuing with the new session");
        }
    }

    async fn prepare_session(
        &mut self,
        mut session: PlaybackSession,
        play_when_ready: bool,
        speed: f32,
    ) -> Result<()> {
        self.transition(SessionState::Preparing)?;
        if !(speed.is_finite() && speed > 0.0) {
            return Err(PlaybackError::InvalidSpeed(speed));
        }

        // Refreshed at most once per prepare
        if session.is_stale(unix_now_ms(), self.config.session_max_age_ms) {
            self.transition(SessionState::RefreshingSession)?;
            session = self.refresh_session(&session).await?;
            self.transition(SessionState::Preparing)?;
        }

        session.validate()?;
        session.speed = speed;
        self.syncer.reconcile_session(&mut session).await;

        let segments = build_segments(&session);
        debug!(
            session_id = %session.id,
            scheme = ?segments.scheme(),
            segments = segments.len(),
            "Segments built"
        );
        self.navigation.reset();
        self.coordinator
            .load(&session, segments, play_when_ready, speed)?;
        session.backend_kind = self.coordinator.active_kind();

        self.syncer.begin(&session);
        self.transition(SessionState::Ready)?;
        info!(
            session_id = %session.id,
            current_time_ms = session.current_time_ms,
            backend = %session.backend_kind,
            "Session ready"
        );

        self.emit(PlayerEvent::PlaybackSession(Box::new(session.clone())));
        self.session = Some(session);

        if play_when_ready {
            self.syncer.on_play();
            self.transition(SessionState::Playing)?;
            self.emit(PlayerEvent::PlayingUpdate { is_playing: true });
        } else {
            self.transition(SessionState::Paused)?;
        }
        self.emit_metadata();
        Ok(())
    }

    async fn refresh_session(&mut self, stale: &PlaybackSession) -> Result<PlaybackSession> {
        info!(session_id = %stale.id, "Session expired, requesting a fresh one");
        let options = if stale.play_method == PlayMethod::Transcode {
            SessionOptions::transcode()
        } else {
            SessionOptions::default()
        };

        let mut fresh = self
            .request_session(stale, &options, "session refresh")
            .await?;
        fresh.current_time_ms = stale.current_time_ms;
        fresh.time_listening_ms = stale.time_listening_ms;
        fresh.updated_at = stale.updated_at;
        Ok(fresh)
    }

    async fn request_session(
        &mut self,
        like: &PlaybackSession,
        options: &SessionOptions,
        operation: &'static str,
    ) -> Result<PlaybackSession> {
        let request = self.remote.create_session(
            &like.library_item_id,
            like.episode_id.as_deref(),
            &self.device,
            options,
        );
        tokio::time::timeout(self.config.request_timeout(), request)
            .await
            .map_err(|_| PlaybackError::Timeout(operation))?
            .map_err(PlaybackError::from)
    }

    /// Stop the active session
    ///
    /// Progress is flushed unless the close was caused by an error; server
    /// sessions are closed remotely, best-effort.
    pub async fn close(&mut self, called_on_error: bool) -> Result<()> {
        let Some(mut session) = self.session.take() else {
            debug!("Close without an active session");
            if self.state.can_transition_to(SessionState::Closed) {
                self.state = SessionState::Closed;
            }
            return Ok(());
        };

        if let Some(absolute) = self.coordinator.current_absolute() {
            session.current_time_ms = absolute;
        }
        let was_playing = self.coordinator.is_playing();
        self.coordinator.stop();
        self.navigation.reset();

        if called_on_error {
            self.syncer.abandon();
        } else if let Err(err) = self.syncer.finalize(&mut session).await {
            warn!(session_id = %session.id, error = %err, "Final progress push failed");
        }

        if !session.is_local {
            self.close_remote(&session.id).await;
        }

        if let Err(err) = self.transition(SessionState::Closed) {
            warn!(error = %err, "Forcing Closed state");
            self.state = SessionState::Closed;
        }
        info!(session_id = %session.id, called_on_error, "Session closed");

        if was_playing {
            self.emit(PlayerEvent::PlayingUpdate { is_playing: false });
        }
        self.emit(PlayerEvent::Metadata {
            duration_ms: session.total_duration_ms(),
            current_time_ms: session.current_time_ms,
            state: self.state,
        });
        Ok(())
    }

    async fn close_remote(&mut self, session_id: &str) {
        let request = self.remote.close_session(session_id);
        match tokio::time::timeout(self.config.request_timeout(), request).await {
            Ok(Ok(())) => debug!(session_id = %session_id, "Server session closed"),
            Ok(Err(err)) => warn!(session_id = %session_id, error = %err, "Failed to close server session"),
            Err(_) => warn!(session_id = %session_id, "Closing server session timed out"),
        }
    }

    /// Fatal failure: close without flushing and report it
    ///
    /// `preparing` names a server session that never became active.
    async fn fail(&mut self, message: String, preparing: Option<String>) {
        let from = self.state;
        if self.session.is_some() {
            if let Err(err) = self.close(true).await {
                warn!(error = %err, "Close after failure failed");
            }
        } else {
            self.coordinator.stop();
            self.navigation.reset();
            self.syncer.abandon();
            if let Some(session_id) = preparing {
                self.close_remote(&session_id).await;
            }
        }

        if !from.can_transition_to(SessionState::Failed) {
            debug!(?from, "Failure outside an active lifecycle");
        }
        self.state = SessionState::Failed;

        self.emit(PlayerEvent::PlaybackFailed { message });
        self.emit_metadata();
    }

    // ===== Transport =====

    pub fn play(&mut self) -> Result<()> {
        if self.session.is_none() {
            return Err(PlaybackError::NoActiveSession);
        }
        if self.state == SessionState::Playing {
            return Ok(());
        }

        if self.state == SessionState::Ended {
            self.navigate_with(|nav, segments, _| Ok(Some(nav.seek_absolute(0, segments))))?;
            if let Some(session) = self.session.as_ref() {
                self.syncer.begin(session);
            }
        }

        self.coordinator.play()?;
        self.syncer.on_play();
        self.transition(SessionState::Playing)?;
        self.emit(PlayerEvent::PlayingUpdate { is_playing: true });
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        if self.session.is_none() {
            return Err(PlaybackError::NoActiveSession);
        }
        if self.state == SessionState::Paused {
            return Ok(());
        }

        self.coordinator.pause()?;
        self.capture_position();
        if let Some(session) = self.session.as_mut() {
            self.syncer.on_pause(session);
        }
        self.transition(SessionState::Paused)?;
        self.emit(PlayerEvent::PlayingUpdate { is_playing: false });
        self.emit_metadata();
        Ok(())
    }

    pub fn set_speed(&mut self, speed: f32) -> Result<()> {
        if !(speed.is_finite() && speed > 0.0) {
            return Err(PlaybackError::InvalidSpeed(speed));
        }
        let session = self.session.as_mut().ok_or(PlaybackError::NoActiveSession)?;
        self.coordinator.set_speed(speed)?;
        session.speed = speed;
        debug!(session_id = %session.id, speed, "Speed changed");
        Ok(())
    }

    // ===== Navigation =====

    fn navigate_with<F>(&mut self, navigate: F) -> Result<Option<NavigationTarget>>
    where
        F: FnOnce(&mut NavigationController, &SegmentList, Option<u64>) -> Result<Option<NavigationTarget>>,
    {
        if self.session.is_none() {
            return Err(PlaybackError::NoActiveSession);
        }
        let position = self.coordinator.current_absolute();
        let segments = self
            .coordinator
            .segments()
            .ok_or(PlaybackError::NoActiveSession)?;

        let Some(target) = navigate(&mut self.navigation, segments, position)? else {
            return Ok(None);
        };

        self.coordinator.seek(target.local)?;
        if let Some(session) = self.session.as_mut() {
            session.current_time_ms = target.absolute_ms;
            self.syncer.on_seek(session);
        }
        if self.state == SessionState::Ended {
            self.transition(SessionState::Paused)?;
        }
        trace!(index = target.index, absolute_ms = target.absolute_ms, "Navigated");
        self.emit_metadata();
        Ok(Some(target))
    }

    fn fallback_position(&self) -> u64 {
        self.session.as_ref().map_or(0, |s| s.current_time_ms)
    }

    pub fn seek_absolute(&mut self, absolute_ms: i64) -> Result<()> {
        self.navigate_with(|nav, segments, _| Ok(Some(nav.seek_absolute(absolute_ms, segments))))
            .map(|_| ())
    }

    pub fn navigate_to_index(&mut self, index: usize) -> Result<()> {
        self.navigate_with(|nav, segments, _| nav.navigate_to_index(index, segments).map(Some))
            .map(|_| ())
    }

    /// Returns `false` when already on the last segment
    pub fn skip_next(&mut self) -> Result<bool> {
        self.navigate_with(|nav, segments, position| Ok(nav.skip_next(segments, position)))
            .map(|target| target.is_some())
    }

    pub fn skip_previous(&mut self) -> Result<()> {
        let fallback = self.fallback_position();
        self.navigate_with(|nav, segments, position| {
            Ok(nav.skip_previous(segments, position.or(Some(fallback))))
        })
        .map(|_| ())
    }

    pub fn jump_forward(&mut self, delta_ms: Option<u64>) -> Result<()> {
        let delta_ms = delta_ms.unwrap_or(self.config.jump_forward_ms);
        let fallback = self.fallback_position();
        self.navigate_with(|nav, segments, position| {
            Ok(Some(nav.jump_forward(delta_ms, segments, position.unwrap_or(fallback))))
        })
        .map(|_| ())
    }

    pub fn jump_backward(&mut self, delta_ms: Option<u64>) -> Result<()> {
        let delta_ms = delta_ms.unwrap_or(self.config.jump_backward_ms);
        let fallback = self.fallback_position();
        self.navigate_with(|nav, segments, position| {
            Ok(Some(nav.jump_backward(delta_ms, segments, position.unwrap_or(fallback))))
        })
        .map(|_| ())
    }

    // ===== Backends =====

    pub fn switch_backend(&mut self, kind: BackendKind) -> Result<()> {
        let position = self.coordinator.current_absolute();
        let session = self.session.as_mut().ok_or(PlaybackError::NoActiveSession)?;
        if let Some(absolute) = position {
            session.current_time_ms = absolute;
        }

        if self.coordinator.switch_to(kind, session)? {
            session.backend_kind = kind;
            self.emit(PlayerEvent::BackendChanged { kind });
        }
        Ok(())
    }

    pub fn attach_remote(&mut self, backend: Box<dyn PlaybackBackend>) -> Result<()> {
        if self.coordinator.active_kind() == BackendKind::Remote {
            self.detach_remote()?;
        }
        info!("Remote receiver attached");
        self.coordinator.attach_remote(backend);
        Ok(())
    }

    pub fn detach_remote(&mut self) -> Result<()> {
        self.capture_position();
        let handed_back = self.coordinator.detach_remote(self.session.as_ref())?;
        info!(handed_back, "Remote receiver detached");
        if handed_back {
            if let Some(session) = self.session.as_mut() {
                session.backend_kind = BackendKind::Local;
            }
            self.emit(PlayerEvent::BackendChanged {
                kind: BackendKind::Local,
            });
        }
        Ok(())
    }

    // ===== Backend events =====

    pub async fn handle_backend_event(&mut self, event: BackendEvent) {
        if event.kind() != self.coordinator.active_kind() {
            trace!(?event, "Ignoring event from inactive backend");
            return;
        }

        match event {
            BackendEvent::Position { position, .. } => {
                let Some(segments) = self.coordinator.segments() else {
                    return;
                };
                let absolute = segments.to_absolute(position);
                if let Some(session) = self.session.as_mut() {
                    session.current_time_ms = absolute;
                }
                self.emit_metadata();
            }
            BackendEvent::StateChanged { state, .. } => self.on_backend_state(state),
            BackendEvent::AutoAdvanceStarted { .. } | BackendEvent::AutoAdvanceSettled { .. } => {}
            BackendEvent::Ended { .. } => self.on_ended(),
            BackendEvent::Error { kind, message } => self.on_backend_error(kind, message).await,
        }
    }

    fn on_backend_state(&mut self, state: BackendState) {
        let next = match (self.state, state) {
            (SessionState::Playing, BackendState::Buffering) => SessionState::Buffering,
            (SessionState::Buffering, BackendState::Playing) => SessionState::Playing,
            _ => return,
        };
        if self.transition(next).is_ok() {
            self.emit_metadata();
        }
    }

    fn on_ended(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.current_time_ms = session.total_duration_ms();
        info!(session_id = %session.id, "Reached end of content");
        self.syncer.finish(session);

        if let Err(err) = self.transition(SessionState::Ended) {
            warn!(error = %err, "Ignoring end of content");
            return;
        }
        self.emit(PlayerEvent::PlayingUpdate { is_playing: false });
        self.emit_metadata();
    }

    async fn on_backend_error(&mut self, kind: BackendKind, message: String) {
        warn!(backend = %kind, message = %message, "Backend error");

        let can_transcode = kind == BackendKind::Local
            && !self.transcode_attempted
            && self
                .session
                .as_ref()
                .is_some_and(|s| !s.is_local && s.play_method.can_fall_back_to_transcode());
        if can_transcode {
            self.transcode_attempted = true;
            self.fallback_to_transcode(message).await;
            return;
        }

        if kind == BackendKind::Remote && self.session.is_some() {
            match self.detach_remote() {
                Ok(()) => return,
                Err(err) => warn!(error = %err, "Hand-back to local failed"),
            }
        }

        self.fail(message, None).await;
    }

    /// One retry of a failing direct stream as a server-side transcode
    async fn fallback_to_transcode(&mut self, message: String) {
        let Some(current) = self.session.as_ref() else {
            return;
        };
        let mut failed = current.clone();
        if let Some(absolute) = self.coordinator.current_absolute() {
            failed.current_time_ms = absolute;
        }
        let was_playing = matches!(self.state, SessionState::Playing | SessionState::Buffering);
        info!(session_id = %failed.id, "Direct play failed, retrying as transcode");

        let mut fresh = match self
            .request_session(&failed, &SessionOptions::transcode(), "transcode fallback")
            .await
        {
            Ok(fresh) => fresh,
            Err(err) => {
                self.fail(format!("{message} (transcode fallback failed: {err})"), None)
                    .await;
                return;
            }
        };
        fresh.current_time_ms = failed.current_time_ms;
        fresh.time_listening_ms = failed.time_listening_ms;
        fresh.updated_at = failed.updated_at;

        // prepare_inner reports its own failure
        let _ = self.prepare_inner(fresh, was_playing, failed.speed).await;
    }

    // ===== Periodic work =====

    /// Position refresh and periodic sync
    pub fn tick(&mut self) {
        self.coordinator.poll();
        if self.state != SessionState::Playing {
            return;
        }
        let position = self.coordinator.current_absolute();
        if let Some(session) = self.session.as_mut() {
            if let Some(absolute) = position {
                session.current_time_ms = absolute;
            }
            self.syncer.tick(session);
        }
    }

    pub fn handle_sync_outcome(&mut self, outcome: SyncOutcome) {
        match self.syncer.handle_outcome(outcome) {
            Some(SyncStatus::Failing) => self.emit(PlayerEvent::ProgressSyncFailing),
            Some(SyncStatus::Recovered) => self.emit(PlayerEvent::ProgressSyncSuccess),
            None => {}
        }
    }

    /// Upload queued offline sessions in the background
    pub fn sync_offline_queue(&self) {
        self.syncer.spawn_queue_sync();
    }

    pub fn network_restored(&mut self) {
        info!("Network restored, retrying progress sync");
        self.syncer.spawn_queue_sync();
        if self.syncer.is_failing() {
            if let Some(session) = self.session.as_mut() {
                self.syncer.sync_now(session);
            }
        }
    }

    // ===== Helpers =====

    fn transition(&mut self, next: SessionState) -> Result<()> {
        if self.state == next {
            return Ok(());
        }
        if !self.state.can_transition_to(next) {
            return Err(PlaybackError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        debug!(from = ?self.state, to = ?next, "Session state");
        self.state = next;
        Ok(())
    }

    fn capture_position(&mut self) {
        let position = self.coordinator.current_absolute();
        if let (Some(session), Some(absolute)) = (self.session.as_mut(), position) {
            session.current_time_ms = absolute;
        }
    }

    fn emit(&self, event: PlayerEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn emit_metadata(&self) {
        let (duration_ms, current_time_ms) = self
            .session
            .as_ref()
            .map_or((0, 0), |s| (s.total_duration_ms(), s.current_time_ms));
        self.emit(PlayerEvent::Metadata {
            duration_ms,
            current_time_ms,
            state: self.state,
        });
    }
}
