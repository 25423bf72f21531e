//! Player service - the coordination task
//!
//! All session state lives on one tokio task. Callers hold a cheap
//! [`PlayerHandle`] and talk to the task through a command channel; backends
//! and the progress syncer report back through their own channels. Commands
//! are processed strictly one at a time, so two `prepare` calls can never
//! interleave.

use crate::backend::{BackendEvent, PlaybackBackend};
use crate::coordinator::BackendSwitchCoordinator;
use crate::error::{PlaybackError, Result};
use crate::events::PlayerEvent;
use crate::lifecycle::{PlayerStatus, SessionLifecycle};
use crate::types::PlaybackConfig;
use lectern_core::{BackendKind, DeviceInfo, PlaybackSession, ProgressStore, RemoteSessionApi};
use lectern_sync::{ProgressSyncer, SyncConfig, SyncOutcome};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 256;

/// A deferred navigation command is applied anyway after this many retries
const MAX_DEFERRALS: u32 = 20;

/// Commands sent to the player service
pub enum PlayerCommand {
    Prepare {
        session: Box<PlaybackSession>,
        play_when_ready: bool,
        speed: f32,
        reply: oneshot::Sender<Result<()>>,
    },
    Play,
    Pause,
    SeekAbsolute(i64),
    NavigateToIndex(usize),
    SkipNext,
    SkipPrevious,
    /// `None` jumps by the configured default
    JumpForward(Option<u64>),
    JumpBackward(Option<u64>),
    SetSpeed(f32),
    SwitchBackend {
        kind: BackendKind,
        reply: oneshot::Sender<Result<()>>,
    },
    Close,
    AttachRemote(Box<dyn PlaybackBackend>),
    DetachRemote,
    NetworkRestored,
    Status(oneshot::Sender<PlayerStatus>),
    Shutdown,
}

impl PlayerCommand {
    fn name(&self) -> &'static str {
        match self {
            Self::Prepare { .. } => "prepare",
            Self::Play => "play",
            Self::Pause => "pause",
            Self::SeekAbsolute(_) => "seek_absolute",
            Self::NavigateToIndex(_) => "navigate_to_index",
            Self::SkipNext => "skip_next",
            Self::SkipPrevious => "skip_previous",
            Self::JumpForward(_) => "jump_forward",
            Self::JumpBackward(_) => "jump_backward",
            Self::SetSpeed(_) => "set_speed",
            Self::SwitchBackend { .. } => "switch_backend",
            Self::Close => "close",
            Self::AttachRemote(_) => "attach_remote",
            Self::DetachRemote => "detach_remote",
            Self::NetworkRestored => "network_restored",
            Self::Status(_) => "status",
            Self::Shutdown => "shutdown",
        }
    }

    /// Commands that move the playhead and must wait out an auto-advance
    fn is_navigation(&self) -> bool {
        matches!(
            self,
            Self::SeekAbsolute(_)
                | Self::NavigateToIndex(_)
                | Self::SkipNext
                | Self::SkipPrevious
                | Self::JumpForward(_)
                | Self::JumpBackward(_)
        )
    }
}

/// Handle to the player service for sending commands
#[derive(Clone)]
pub struct PlayerHandle {
    command_tx: mpsc::UnboundedSender<PlayerCommand>,
    events: broadcast::Sender<PlayerEvent>,
}

impl PlayerHandle {
    /// Prepare `session`, resolving once it is `Playing`/`Paused` or has failed
    pub async fn prepare(
        &self,
        session: PlaybackSession,
        play_when_ready: bool,
        speed: f32,
    ) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(PlayerCommand::Prepare {
            session: Box::new(session),
            play_when_ready,
            speed,
            reply,
        })?;
        rx.await.map_err(|_| PlaybackError::ServiceStopped)?
    }

    pub async fn switch_backend(&self, kind: BackendKind) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(PlayerCommand::SwitchBackend { kind, reply })?;
        rx.await.map_err(|_| PlaybackError::ServiceStopped)?
    }

    pub async fn status(&self) -> Result<PlayerStatus> {
        let (reply, rx) = oneshot::channel();
        self.send(PlayerCommand::Status(reply))?;
        rx.await.map_err(|_| PlaybackError::ServiceStopped)
    }

    pub fn play(&self) {
        let _ = self.command_tx.send(PlayerCommand::Play);
    }

    pub fn pause(&self) {
        let _ = self.command_tx.send(PlayerCommand::Pause);
    }

    pub fn seek_absolute(&self, absolute_ms: i64) {
        let _ = self.command_tx.send(PlayerCommand::SeekAbsolute(absolute_ms));
    }

    pub fn navigate_to_index(&self, index: usize) {
        let _ = self.command_tx.send(PlayerCommand::NavigateToIndex(index));
    }

    pub fn skip_next(&self) {
        let _ = self.command_tx.send(PlayerCommand::SkipNext);
    }

    pub fn skip_previous(&self) {
        let _ = self.command_tx.send(PlayerCommand::SkipPrevious);
    }

    pub fn jump_forward(&self, delta_ms: Option<u64>) {
        let _ = self.command_tx.send(PlayerCommand::JumpForward(delta_ms));
    }

    pub fn jump_backward(&self, delta_ms: Option<u64>) {
        let _ = self.command_tx.send(PlayerCommand::JumpBackward(delta_ms));
    }

    pub fn set_speed(&self, speed: f32) {
        let _ = self.command_tx.send(PlayerCommand::SetSpeed(speed));
    }

    pub fn close(&self) {
        let _ = self.command_tx.send(PlayerCommand::Close);
    }

    pub fn attach_remote(&self, backend: Box<dyn PlaybackBackend>) {
        let _ = self.command_tx.send(PlayerCommand::AttachRemote(backend));
    }

    pub fn detach_remote(&self) {
        let _ = self.command_tx.send(PlayerCommand::DetachRemote);
    }

    pub fn network_restored(&self) {
        let _ = self.command_tx.send(PlayerCommand::NetworkRestored);
    }

    /// Close the active session and stop the service task
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(PlayerCommand::Shutdown);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    fn send(&self, command: PlayerCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|_| PlaybackError::ServiceStopped)
    }
}

/// Player service that owns the session lifecycle
pub struct PlayerService {
    lifecycle: SessionLifecycle,
    config: PlaybackConfig,
    command_rx: mpsc::UnboundedReceiver<PlayerCommand>,
    backend_rx: mpsc::UnboundedReceiver<BackendEvent>,
    outcome_rx: mpsc::UnboundedReceiver<SyncOutcome>,
}

impl PlayerService {
    pub fn new(
        local_backend: Box<dyn PlaybackBackend>,
        remote: Arc<dyn RemoteSessionApi>,
        store: Arc<dyn ProgressStore>,
        device: DeviceInfo,
        config: PlaybackConfig,
        sync_config: SyncConfig,
    ) -> (Self, PlayerHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (backend_tx, backend_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let coordinator = BackendSwitchCoordinator::new(local_backend, backend_tx);
        let (syncer, outcome_rx) = ProgressSyncer::new(remote.clone(), store, sync_config);
        let lifecycle = SessionLifecycle::new(
            coordinator,
            syncer,
            remote,
            device,
            config.clone(),
            events.clone(),
        );

        let service = Self {
            lifecycle,
            config,
            command_rx,
            backend_rx,
            outcome_rx,
        };
        let handle = PlayerHandle { command_tx, events };
        (service, handle)
    }

    /// Run the service on its own task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        let Self {
            mut lifecycle,
            config,
            mut command_rx,
            mut backend_rx,
            mut outcome_rx,
        } = self;

        info!("Player service started");
        lifecycle.sync_offline_queue();

        let mut ticker = tokio::time::interval(config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut auto_advancing = false;

        // Navigation held back during an auto-advance, applied in arrival order
        let mut deferred: VecDeque<PlayerCommand> = VecDeque::new();
        let mut deferrals = 0u32;
        let retry = tokio::time::sleep(config.navigation_defer());
        tokio::pin!(retry);

        loop {
            tokio::select! {
                command = command_rx.recv() => {
                    let Some(command) = command else {
                        debug!("All player handles dropped");
                        break;
                    };
                    if matches!(command, PlayerCommand::Shutdown) {
                        break;
                    }
                    if matches!(command, PlayerCommand::Prepare { .. } | PlayerCommand::Close) {
                        auto_advancing = false;
                        if !deferred.is_empty() {
                            debug!(dropped = deferred.len(), "Dropping navigation for the previous session");
                            deferred.clear();
                        }
                    }
                    // Newer navigation queues behind older deferred navigation
                    if (auto_advancing || !deferred.is_empty()) && command.is_navigation() {
                        debug!(command = command.name(), "Deferring navigation during auto-advance");
                        if deferred.is_empty() {
                            deferrals = 0;
                            retry.as_mut().reset(Instant::now() + config.navigation_defer());
                        }
                        deferred.push_back(command);
                        continue;
                    }
                    handle_command(&mut lifecycle, command).await;
                }
                () = &mut retry, if !deferred.is_empty() => {
                    if auto_advancing && deferrals < MAX_DEFERRALS {
                        deferrals += 1;
                        retry.as_mut().reset(Instant::now() + config.navigation_defer());
                        continue;
                    }
                    while let Some(command) = deferred.pop_front() {
                        handle_command(&mut lifecycle, command).await;
                    }
                }
                Some(event) = backend_rx.recv() => {
                    match &event {
                        BackendEvent::AutoAdvanceStarted { from_segment, .. } => {
                            debug!(from_segment, "Auto-advance started");
                            auto_advancing = true;
                        }
                        BackendEvent::AutoAdvanceSettled { segment_index, .. } => {
                            debug!(segment_index, "Auto-advance settled");
                            auto_advancing = false;
                        }
                        _ => {}
                    }
                    lifecycle.handle_backend_event(event).await;
                }
                Some(outcome) = outcome_rx.recv() => {
                    lifecycle.handle_sync_outcome(outcome);
                }
                _ = ticker.tick() => {
                    lifecycle.tick();
                }
            }
        }

        if let Err(err) = lifecycle.close(false).await {
            warn!(error = %err, "Close on shutdown failed");
        }
        info!("Player service stopped");
    }
}

async fn handle_command(lifecycle: &mut SessionLifecycle, command: PlayerCommand) {
    let name = command.name();
    let result = match command {
        PlayerCommand::Prepare {
            session,
            play_when_ready,
            speed,
            reply,
        } => {
            let result = lifecycle.prepare(*session, play_when_ready, speed).await;
            let _ = reply.send(result);
            Ok(())
        }
        PlayerCommand::Play => lifecycle.play(),
        PlayerCommand::Pause => lifecycle.pause(),
        PlayerCommand::SeekAbsolute(absolute_ms) => lifecycle.seek_absolute(absolute_ms),
        PlayerCommand::NavigateToIndex(index) => lifecycle.navigate_to_index(index),
        PlayerCommand::SkipNext => lifecycle.skip_next().map(|moved| {
            if !moved {
                debug!("Skip next on the last segment ignored");
            }
        }),
        PlayerCommand::SkipPrevious => lifecycle.skip_previous(),
        PlayerCommand::JumpForward(delta_ms) => lifecycle.jump_forward(delta_ms),
        PlayerCommand::JumpBackward(delta_ms) => lifecycle.jump_backward(delta_ms),
        PlayerCommand::SetSpeed(speed) => lifecycle.set_speed(speed),
        PlayerCommand::SwitchBackend { kind, reply } => {
            let _ = reply.send(lifecycle.switch_backend(kind));
            Ok(())
        }
        PlayerCommand::Close => lifecycle.close(false).await,
        PlayerCommand::AttachRemote(backend) => lifecycle.attach_remote(backend),
        PlayerCommand::DetachRemote => lifecycle.detach_remote(),
        PlayerCommand::NetworkRestored => {
            lifecycle.network_restored();
            Ok(())
        }
        PlayerCommand::Status(reply) => {
            let _ = reply.send(lifecycle.status());
            Ok(())
        }
        // Handled by the run loop
        PlayerCommand::Shutdown => Ok(()),
    };

    if let Err(err) = result {
        warn!(command = name, error = %err, "Player command failed");
    }
}
