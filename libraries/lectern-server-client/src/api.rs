//! `RemoteSessionApi` over HTTP.

use crate::client::LecternServerClient;
use crate::types::CreateSessionRequest;
use async_trait::async_trait;
use lectern_core::{
    DeviceInfo, LocalSyncResult, PlaybackSession, ProgressUpdate, RemoteProgressRecord,
    RemoteSessionApi, Result, SessionOptions, UserProgress,
};

#[async_trait]
impl RemoteSessionApi for LecternServerClient {
    async fn create_session(
        &self,
        library_item_id: &str,
        episode_id: Option<&str>,
        device: &DeviceInfo,
        options: &SessionOptions,
    ) -> Result<PlaybackSession> {
        let request = CreateSessionRequest::new(device, options);
        let handle = self.sessions().await?;
        Ok(handle
            .client()
            .create(library_item_id, episode_id, &request)
            .await?)
    }

    async fn close_session(&self, session_id: &str) -> Result<()> {
        let handle = self.sessions().await?;
        Ok(handle.client().close(session_id).await?)
    }

    async fn sync_session(&self, session_id: &str, update: &ProgressUpdate) -> Result<()> {
        let handle = self.sessions().await?;
        Ok(handle.client().sync(session_id, update).await?)
    }

    async fn get_progress(
        &self,
        library_item_id: &str,
        episode_id: Option<&str>,
    ) -> Result<Option<RemoteProgressRecord>> {
        let handle = self.progress().await?;
        Ok(handle
            .client()
            .get_progress(library_item_id, episode_id)
            .await?)
    }

    async fn get_current_user(&self) -> Result<UserProgress> {
        let handle = self.progress().await?;
        Ok(handle.client().get_current_user().await?)
    }

    async fn sync_local_sessions(&self, sessions: &[PlaybackSession]) -> Result<LocalSyncResult> {
        let handle = self.sessions().await?;
        Ok(handle.client().sync_local(sessions).await?)
    }
}
