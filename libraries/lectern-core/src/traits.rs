/// Collaborator contracts for Lectern
use crate::error::Result;
use crate::types::{
    DeviceInfo, LocalProgress, LocalSyncResult, PlaybackSession, ProgressUpdate,
    RemoteProgressRecord, SessionOptions, SyncQueueEntry, UserProgress,
};
use async_trait::async_trait;
use std::collections::HashMap;

/// Remote session API
///
/// Implementers talk to the media server that owns sessions and progress.
/// Every call may fail with a transient error; callers bound them with a
/// timeout and never let a failure stop local playback.
#[async_trait]
pub trait RemoteSessionApi: Send + Sync {
    /// Open a playback session for a work (and episode)
    async fn create_session(
        &self,
        library_item_id: &str,
        episode_id: Option<&str>,
        device: &DeviceInfo,
        options: &SessionOptions,
    ) -> Result<PlaybackSession>;

    /// Close a server session
    async fn close_session(&self, session_id: &str) -> Result<()>;

    /// Push progress for an open server session
    async fn sync_session(&self, session_id: &str, update: &ProgressUpdate) -> Result<()>;

    /// Fetch progress for a work (and episode)
    ///
    /// Returns `None` when the server has no record.
    async fn get_progress(
        &self,
        library_item_id: &str,
        episode_id: Option<&str>,
    ) -> Result<Option<RemoteProgressRecord>>;

    /// Fetch the current user with all progress records
    async fn get_current_user(&self) -> Result<UserProgress>;

    /// Upload sessions that were played while offline
    async fn sync_local_sessions(&self, sessions: &[PlaybackSession]) -> Result<LocalSyncResult>;
}

/// Device-local progress store
///
/// Holds progress for device-local works and the queue of session snapshots
/// that could not be pushed. Queue entries survive restarts until synced.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Insert or replace local progress for `progress.progress_key`
    async fn save_progress(&self, progress: &LocalProgress) -> Result<()>;

    /// Get local progress by key
    async fn get_progress(&self, progress_key: &str) -> Result<Option<LocalProgress>>;

    /// Remove local progress by key
    async fn remove_progress(&self, progress_key: &str) -> Result<()>;

    /// Insert or replace the queue entry for `entry.session_id`
    async fn enqueue(&self, entry: &SyncQueueEntry) -> Result<()>;

    /// All queue entries, oldest first
    async fn entries(&self) -> Result<Vec<SyncQueueEntry>>;

    /// Queue entries not yet pushed, oldest first
    async fn pending(&self) -> Result<Vec<SyncQueueEntry>> {
        Ok(self
            .entries()
            .await?
            .into_iter()
            .filter(|entry| !entry.synced)
            .collect())
    }

    /// Flag uploaded entries as pushed
    ///
    /// An entry replaced by a newer snapshot since it was read keeps its
    /// pending flag, matched on `session_id` and `updated_at`.
    async fn mark_synced(&self, uploaded: &[SyncQueueEntry]) -> Result<()>;

    /// Remove a queue entry
    async fn remove_entry(&self, session_id: &str) -> Result<()>;

    /// Drop synced entries superseded by a newer entry for the same work
    ///
    /// After a batch sync at most one entry per work remains: the most
    /// recently updated one. Unsynced entries are never dropped.
    /// Returns the number of entries removed.
    async fn retain_latest_per_work(&self) -> Result<usize> {
        let entries = self.entries().await?;

        let mut newest: HashMap<&str, &SyncQueueEntry> = HashMap::new();
        for entry in &entries {
            match newest.get(entry.progress_key.as_str()) {
                Some(current) if current.updated_at > entry.updated_at => {}
                _ => {
                    newest.insert(entry.progress_key.as_str(), entry);
                }
            }
        }

        let mut removed = 0;
        for entry in &entries {
            let is_newest = newest
                .get(entry.progress_key.as_str())
                .is_some_and(|n| n.session_id == entry.session_id);
            if entry.synced && !is_newest {
                self.remove_entry(&entry.session_id).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
