//! Progress syncer
//!
//! Owned by the coordination context. Accumulates listening time from
//! play/pause/seek events, pushes progress on a fixed cadence and on state
//! transitions, and parks snapshots in the offline queue whenever a push
//! fails. Periodic pushes run on spawned tasks and report back through
//! [`SyncOutcome`] so the owner never blocks on the network.

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::reconcile::{self, Reconciliation};
use lectern_core::{
    unix_now_ms, LocalProgress, PlaybackSession, ProgressStore, ProgressUpdate,
    RemoteProgressRecord, RemoteSessionApi, SyncQueueEntry,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Result of background sync work, delivered back to the owner
#[derive(Debug)]
pub enum SyncOutcome {
    /// A periodic or transition push finished
    Pushed {
        session_id: String,
        listened_ms: u64,
        result: Result<()>,
    },
    /// An offline batch upload finished
    QueueSynced(Result<QueueSyncReport>),
}

/// Health transitions the owner reports to listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Failing,
    Recovered,
}

/// Summary of one offline batch upload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSyncReport {
    /// Sessions the server accepted
    pub pushed: usize,
    /// Rejection reasons returned by the server
    pub rejected: Vec<String>,
    /// Superseded entries dropped after the upload
    pub collapsed: usize,
}

pub struct ProgressSyncer {
    remote: Arc<dyn RemoteSessionApi>,
    store: Arc<dyn ProgressStore>,
    config: SyncConfig,
    outcome_tx: mpsc::UnboundedSender<SyncOutcome>,

    session_id: Option<String>,
    playing_since: Option<Instant>,
    unsynced_listening_ms: u64,
    last_push: Option<Instant>,
    push_in_flight: bool,
    failing: bool,
}

impl ProgressSyncer {
    /// Create a syncer and the receiver its background work reports to
    pub fn new(
        remote: Arc<dyn RemoteSessionApi>,
        store: Arc<dyn ProgressStore>,
        config: SyncConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SyncOutcome>) {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let syncer = Self {
            remote,
            store,
            config,
            outcome_tx,
            session_id: None,
            playing_since: None,
            unsynced_listening_ms: 0,
            last_push: None,
            push_in_flight: false,
            failing: false,
        };
        (syncer, outcome_rx)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn is_failing(&self) -> bool {
        self.failing
    }

    /// Listening time not yet acknowledged by the server
    pub fn unsynced_listening_ms(&self) -> u64 {
        self.unsynced_listening_ms
    }

    pub fn active_session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Start tracking a freshly prepared session
    pub fn begin(&mut self, session: &PlaybackSession) {
        debug!(session_id = %session.id, "Tracking progress");
        self.session_id = Some(session.id.clone());
        self.playing_since = None;
        self.unsynced_listening_ms = 0;
        self.last_push = Some(Instant::now());
        self.push_in_flight = false;
    }

    /// Stop tracking without pushing (session dropped after an error)
    pub fn abandon(&mut self) {
        if let Some(session_id) = self.session_id.take() {
            debug!(session_id = %session_id, unsynced_ms = self.unsynced_listening_ms, "Progress tracking abandoned");
        }
        self.playing_since = None;
        self.unsynced_listening_ms = 0;
        self.last_push = None;
        self.push_in_flight = false;
    }

    pub fn on_play(&mut self) {
        if self.playing_since.is_none() {
            self.playing_since = Some(Instant::now());
        }
    }

    /// Pausing stops the listening clock and pushes immediately
    pub fn on_pause(&mut self, session: &mut PlaybackSession) {
        self.accumulate(session);
        self.playing_since = None;
        self.sync_now(session);
    }

    pub fn on_seek(&mut self, session: &mut PlaybackSession) {
        self.accumulate(session);
    }

    /// Periodic tick while the session is active
    ///
    /// Returns `true` when a push was started.
    pub fn tick(&mut self, session: &mut PlaybackSession) -> bool {
        if self.playing_since.is_none() {
            return false;
        }
        self.accumulate(session);

        let due = self
            .last_push
            .map_or(true, |at| at.elapsed() >= self.config.sync_interval());
        if !due || self.push_in_flight {
            return false;
        }
        self.sync_now(session);
        true
    }

    /// Push the current snapshot on a background task
    pub fn sync_now(&mut self, session: &mut PlaybackSession) {
        self.spawn_push(session, false);
    }

    /// Final push for a session that played to the end
    ///
    /// Runs in the background like [`sync_now`](Self::sync_now); device-local
    /// sessions also get their progress record marked finished.
    pub fn finish(&mut self, session: &mut PlaybackSession) {
        self.accumulate(session);
        self.playing_since = None;
        self.spawn_push(session, true);
    }

    fn spawn_push(&mut self, session: &mut PlaybackSession, finished: bool) {
        session.touch(unix_now_ms());
        let listened_ms = std::mem::take(&mut self.unsynced_listening_ms);
        self.last_push = Some(Instant::now());
        self.push_in_flight = true;

        let snapshot = session.clone();
        let remote = Arc::clone(&self.remote);
        let store = Arc::clone(&self.store);
        let timeout = self.config.request_timeout();
        let clear_queued = self.failing;
        let outcome_tx = self.outcome_tx.clone();

        tokio::spawn(async move {
            let mut result = push_snapshot(
                remote.as_ref(),
                store.as_ref(),
                &snapshot,
                listened_ms,
                timeout,
                clear_queued,
            )
            .await;
            if finished && snapshot.is_local {
                let mut progress = LocalProgress::from_session(&snapshot);
                progress.is_finished = true;
                if let Err(err) = store.save_progress(&progress).await {
                    warn!(session_id = %snapshot.id, error = %err, "Failed to mark local progress finished");
                    if result.is_ok() {
                        result = Err(SyncError::Storage(err.to_string()));
                    }
                }
            }
            let _ = outcome_tx.send(SyncOutcome::Pushed {
                session_id: snapshot.id,
                listened_ms,
                result,
            });
        });
    }

    /// Fold a background result into the syncer state
    pub fn handle_outcome(&mut self, outcome: SyncOutcome) -> Option<SyncStatus> {
        match outcome {
            SyncOutcome::Pushed {
                session_id,
                listened_ms,
                result,
            } => {
                let is_current = self.session_id.as_deref() == Some(session_id.as_str());
                if is_current {
                    self.push_in_flight = false;
                }

                match result {
                    Ok(()) => {
                        debug!(session_id = %session_id, listened_ms, "Progress synced");
                        self.recover()
                    }
                    Err(err) => {
                        warn!(session_id = %session_id, error = %err, "Progress sync failed");
                        if is_current {
                            self.unsynced_listening_ms += listened_ms;
                        }
                        if self.failing {
                            None
                        } else {
                            self.failing = true;
                            Some(SyncStatus::Failing)
                        }
                    }
                }
            }
            SyncOutcome::QueueSynced(Ok(report)) => {
                if report.pushed > 0 {
                    info!(
                        pushed = report.pushed,
                        collapsed = report.collapsed,
                        "Offline sessions synced"
                    );
                    self.recover()
                } else {
                    None
                }
            }
            SyncOutcome::QueueSynced(Err(err)) => {
                debug!(error = %err, "Offline queue sync failed");
                None
            }
        }
    }

    /// Forced flush, awaited by the caller before the session is replaced
    ///
    /// On failure the snapshot is already in the offline queue; the error is
    /// returned for logging only.
    pub async fn finalize(&mut self, session: &mut PlaybackSession) -> Result<()> {
        self.accumulate(session);
        self.playing_since = None;
        session.touch(unix_now_ms());

        let listened_ms = std::mem::take(&mut self.unsynced_listening_ms);
        let result = push_snapshot(
            self.remote.as_ref(),
            self.store.as_ref(),
            session,
            listened_ms,
            self.config.request_timeout(),
            self.failing,
        )
        .await;

        self.session_id = None;
        self.push_in_flight = false;
        self.last_push = None;

        match &result {
            Ok(()) => info!(session_id = %session.id, listened_ms, "Session finalized"),
            Err(err) => warn!(session_id = %session.id, error = %err, "Finalize push failed"),
        }
        result
    }

    /// Fetch the server's record for the session's work, bounded by the request timeout
    pub async fn fetch_remote_progress(
        &self,
        session: &PlaybackSession,
    ) -> Result<Option<RemoteProgressRecord>> {
        bounded(
            self.config.request_timeout(),
            "progress fetch",
            self.remote
                .get_progress(&session.library_item_id, session.episode_id.as_deref()),
        )
        .await
    }

    /// Reconcile a server session against remote progress
    ///
    /// Device-local sessions and fetch failures keep the local position.
    pub async fn reconcile_session(&self, session: &mut PlaybackSession) -> Reconciliation {
        let threshold = self.config.remote_progress_threshold_ms;
        if session.is_local {
            return reconcile::apply(session, None, threshold);
        }

        match self.fetch_remote_progress(session).await {
            Ok(remote) => {
                let result = reconcile::apply(session, remote.as_ref(), threshold);
                debug!(
                    session_id = %session.id,
                    source = ?result.source,
                    current_time_ms = result.current_time_ms,
                    "Progress reconciled"
                );
                result
            }
            Err(err) => {
                warn!(session_id = %session.id, error = %err, "Remote progress unavailable, keeping local");
                reconcile::apply(session, None, threshold)
            }
        }
    }

    /// Worker that uploads the offline queue
    pub fn queue_sync(&self) -> QueueSync {
        QueueSync {
            remote: Arc::clone(&self.remote),
            store: Arc::clone(&self.store),
            timeout: self.config.request_timeout(),
        }
    }

    /// Upload the offline queue on a background task
    pub fn spawn_queue_sync(&self) {
        let worker = self.queue_sync();
        let outcome_tx = self.outcome_tx.clone();
        tokio::spawn(async move {
            let result = worker.run().await;
            let _ = outcome_tx.send(SyncOutcome::QueueSynced(result));
        });
    }

    fn accumulate(&mut self, session: &mut PlaybackSession) {
        if let Some(since) = self.playing_since {
            let now = Instant::now();
            let elapsed = now.duration_since(since).as_millis() as u64;
            self.unsynced_listening_ms += elapsed;
            session.time_listening_ms += elapsed;
            self.playing_since = Some(now);
        }
    }

    fn recover(&mut self) -> Option<SyncStatus> {
        if self.failing {
            self.failing = false;
            info!("Progress sync recovered");
            Some(SyncStatus::Recovered)
        } else {
            None
        }
    }
}

/// Uploads queued offline sessions and collapses the queue
#[derive(Clone)]
pub struct QueueSync {
    remote: Arc<dyn RemoteSessionApi>,
    store: Arc<dyn ProgressStore>,
    timeout: Duration,
}

impl QueueSync {
    pub async fn run(&self) -> Result<QueueSyncReport> {
        let pending = self
            .store
            .pending()
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;
        if pending.is_empty() {
            return Ok(QueueSyncReport::default());
        }

        let sessions: Vec<PlaybackSession> = pending.iter().map(|e| e.session.clone()).collect();
        info!(count = sessions.len(), "Uploading offline sessions");

        let result = bounded(
            self.timeout,
            "offline sync",
            self.remote.sync_local_sessions(&sessions),
        )
        .await?;

        if !result.errors.is_empty() {
            warn!(errors = ?result.errors, "Server rejected some offline sessions");
        }

        // Only the snapshots that were actually sent; newer ones stay pending
        let accepted: Vec<SyncQueueEntry> = pending
            .into_iter()
            .filter(|entry| result.synced_session_ids.contains(&entry.session_id))
            .collect();
        self.store
            .mark_synced(&accepted)
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;
        let collapsed = self
            .store
            .retain_latest_per_work()
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;

        Ok(QueueSyncReport {
            pushed: result.synced_session_ids.len(),
            rejected: result.errors,
            collapsed,
        })
    }
}

async fn push_snapshot(
    remote: &dyn RemoteSessionApi,
    store: &dyn ProgressStore,
    session: &PlaybackSession,
    listened_ms: u64,
    timeout: Duration,
    clear_queued: bool,
) -> Result<()> {
    // Device-local copies are uploaded in batches through the offline queue
    if session.is_local {
        store
            .save_progress(&LocalProgress::from_session(session))
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;
        store
            .enqueue(&SyncQueueEntry::from_session(session))
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;
        return Ok(());
    }

    let update = ProgressUpdate::from_session(session, listened_ms);
    match bounded(timeout, "progress sync", remote.sync_session(&session.id, &update)).await {
        Ok(()) => {
            if clear_queued {
                if let Err(err) = store.remove_entry(&session.id).await {
                    warn!(session_id = %session.id, error = %err, "Failed to clear queued snapshot");
                }
            }
            Ok(())
        }
        Err(err) => {
            if let Err(store_err) = store.enqueue(&SyncQueueEntry::from_session(session)).await {
                warn!(session_id = %session.id, error = %store_err, "Failed to queue snapshot offline");
            }
            Err(err)
        }
    }
}

async fn bounded<T, F>(timeout: Duration, operation: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = lectern_core::Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(SyncError::from),
        Err(_) => Err(SyncError::Timeout {
            operation,
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}
