/// Progress records exchanged with the server and kept on the device
use super::session::PlaybackSession;
use serde::{Deserialize, Serialize};

/// Key identifying a work (and episode) across local and remote progress
pub fn progress_key(library_item_id: &str, episode_id: Option<&str>) -> String {
    match episode_id {
        Some(episode) => format!("{library_item_id}-{episode}"),
        None => library_item_id.to_string(),
    }
}

/// Server-side progress for one work/episode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteProgressRecord {
    /// Work identifier
    pub library_item_id: String,
    /// Episode identifier (podcasts)
    #[serde(default)]
    pub episode_id: Option<String>,
    /// Absolute position in milliseconds
    pub current_time_ms: u64,
    /// Work duration in milliseconds
    pub duration_ms: u64,
    /// Server timestamp of the last update (Unix epoch ms)
    pub last_update: i64,
    /// Whether the listener finished the work
    #[serde(default)]
    pub is_finished: bool,
}

impl RemoteProgressRecord {
    /// Key shared with sessions and local progress
    pub fn progress_key(&self) -> String {
        progress_key(&self.library_item_id, self.episode_id.as_deref())
    }
}

/// Current user with every progress record the server holds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProgress {
    /// User identifier
    pub id: String,
    /// Username
    #[serde(default)]
    pub username: String,
    /// All progress records
    #[serde(default)]
    pub media_progress: Vec<RemoteProgressRecord>,
}

impl UserProgress {
    /// Look up the record for a work/episode
    pub fn find(
        &self,
        library_item_id: &str,
        episode_id: Option<&str>,
    ) -> Option<&RemoteProgressRecord> {
        self.media_progress.iter().find(|p| {
            p.library_item_id == library_item_id && p.episode_id.as_deref() == episode_id
        })
    }
}

/// Payload pushed to the server on every sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    /// Absolute position in milliseconds
    pub current_time_ms: u64,
    /// Listening time accumulated since the previous successful push
    pub time_listened_ms: u64,
    /// Work duration in milliseconds
    pub duration_ms: u64,
    /// Client timestamp (Unix epoch ms)
    pub updated_at: i64,
}

impl ProgressUpdate {
    /// Build an update from the session snapshot
    pub fn from_session(session: &PlaybackSession, time_listened_ms: u64) -> Self {
        Self {
            current_time_ms: session.current_time_ms,
            time_listened_ms,
            duration_ms: session.total_duration_ms(),
            updated_at: session.updated_at,
        }
    }
}

/// Device-local progress for a work (kept for local copies and offline play)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalProgress {
    /// Key (`work` or `work-episode`)
    pub progress_key: String,
    /// Work identifier
    pub library_item_id: String,
    /// Episode identifier (podcasts)
    pub episode_id: Option<String>,
    /// Absolute position in milliseconds
    pub current_time_ms: u64,
    /// Work duration in milliseconds
    pub duration_ms: u64,
    /// Last update (Unix epoch ms)
    pub last_update: i64,
    /// Whether the listener finished the work
    pub is_finished: bool,
}

impl LocalProgress {
    /// Snapshot the session position
    pub fn from_session(session: &PlaybackSession) -> Self {
        Self {
            progress_key: session.progress_key(),
            library_item_id: session.library_item_id.clone(),
            episode_id: session.episode_id.clone(),
            current_time_ms: session.current_time_ms,
            duration_ms: session.total_duration_ms(),
            last_update: session.updated_at,
            is_finished: false,
        }
    }
}

/// Unsynced session snapshot waiting for connectivity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueEntry {
    /// Session identifier (one entry per session)
    pub session_id: String,
    /// Work key used to collapse entries after a batch sync
    pub progress_key: String,
    /// Snapshot pushed to the server
    pub session: PlaybackSession,
    /// Snapshot timestamp (Unix epoch ms)
    pub updated_at: i64,
    /// Set once the snapshot reached the server
    #[serde(default)]
    pub synced: bool,
}

impl SyncQueueEntry {
    /// Queue a snapshot of the session
    pub fn from_session(session: &PlaybackSession) -> Self {
        Self {
            session_id: session.id.clone(),
            progress_key: session.progress_key(),
            session: session.clone(),
            updated_at: session.updated_at,
            synced: false,
        }
    }
}

/// Server answer to a batch upload of offline sessions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalSyncResult {
    /// Sessions the server accepted
    #[serde(default)]
    pub synced_session_ids: Vec<String>,
    /// Sessions the server rejected, with reasons
    #[serde(default)]
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AudioTrack;

    #[test]
    fn user_progress_lookup_matches_episode() {
        let user = UserProgress {
            id: "u1".into(),
            username: "reader".into(),
            media_progress: vec![
                RemoteProgressRecord {
                    library_item_id: "pod".into(),
                    episode_id: Some("ep1".into()),
                    current_time_ms: 10_000,
                    duration_ms: 60_000,
                    last_update: 5,
                    is_finished: false,
                },
                RemoteProgressRecord {
                    library_item_id: "pod".into(),
                    episode_id: Some("ep2".into()),
                    current_time_ms: 20_000,
                    duration_ms: 60_000,
                    last_update: 6,
                    is_finished: false,
                },
            ],
        };

        assert_eq!(
            user.find("pod", Some("ep2")).map(|p| p.current_time_ms),
            Some(20_000)
        );
        assert!(user.find("pod", None).is_none());
    }

    #[test]
    fn queue_entry_snapshots_session() {
        let mut session = PlaybackSession::new(
            "ps_7",
            "li_7",
            "Book",
            vec![AudioTrack::new(0, 0, 1_000, "/a.mp3")],
        );
        session.updated_at = 42;
        let entry = SyncQueueEntry::from_session(&session);
        assert_eq!(entry.session_id, "ps_7");
        assert_eq!(entry.progress_key, "li_7");
        assert_eq!(entry.updated_at, 42);
        assert!(!entry.synced);
    }
}
