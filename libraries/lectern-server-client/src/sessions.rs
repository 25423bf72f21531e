//! Playback session operations.

use crate::client::{expect_success, read_json};
use crate::error::{Result, ServerClientError};
use crate::types::{CreateSessionRequest, LocalSessionsRequest};
use lectern_core::{LocalSyncResult, PlaybackSession, ProgressUpdate};
use reqwest::Client;
use tracing::debug;

/// Session client for the media server.
pub struct SessionClient<'a> {
    http: &'a Client,
    base_url: &'a str,
    access_token: &'a str,
}

impl<'a> SessionClient<'a> {
    pub(crate) fn new(http: &'a Client, base_url: &'a str, access_token: &'a str) -> Self {
        Self {
            http,
            base_url,
            access_token,
        }
    }

    /// Open a playback session for a work, or an episode of a podcast.
    pub async fn create(
        &self,
        library_item_id: &str,
        episode_id: Option<&str>,
        request: &CreateSessionRequest,
    ) -> Result<PlaybackSession> {
        let url = match episode_id {
            Some(episode) => format!("{}/api/items/{}/play/{}", self.base_url, library_item_id, episode),
            None => format!("{}/api/items/{}/play", self.base_url, library_item_id),
        };
        debug!(url = %url, force_transcode = request.force_transcode, "Opening playback session");

        let response = self
            .http
            .post(&url)
            .bearer_auth(self.access_token)
            .json(request)
            .send()
            .await
            .map_err(ServerClientError::from_send)?;

        let session: PlaybackSession = read_json(response, "playback session").await?;
        debug!(
            session_id = %session.id,
            tracks = session.audio_tracks.len(),
            chapters = session.chapters.len(),
            "Opened playback session"
        );
        Ok(session)
    }

    /// Push progress for an open session.
    pub async fn sync(&self, session_id: &str, update: &ProgressUpdate) -> Result<()> {
        let url = format!("{}/api/session/{}/sync", self.base_url, session_id);
        debug!(
            session_id = %session_id,
            current_time_ms = update.current_time_ms,
            time_listened_ms = update.time_listened_ms,
            "Syncing session progress"
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(self.access_token)
            .json(update)
            .send()
            .await
            .map_err(ServerClientError::from_send)?;

        expect_success(response).await
    }

    /// Close a session on the server.
    pub async fn close(&self, session_id: &str) -> Result<()> {
        let url = format!("{}/api/session/{}/close", self.base_url, session_id);
        debug!(session_id = %session_id, "Closing session");

        let response = self
            .http
            .post(&url)
            .bearer_auth(self.access_token)
            .send()
            .await
            .map_err(ServerClientError::from_send)?;

        expect_success(response).await
    }

    /// Upload sessions that were played without connectivity.
    pub async fn sync_local(&self, sessions: &[PlaybackSession]) -> Result<LocalSyncResult> {
        let url = format!("{}/api/session/local-all", self.base_url);
        debug!(count = sessions.len(), "Uploading offline sessions");

        let body = LocalSessionsRequest {
            sessions: sessions.to_vec(),
        };
        let response = self
            .http
            .post(&url)
            .bearer_auth(self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(ServerClientError::from_send)?;

        read_json(response, "local session sync result").await
    }
}
