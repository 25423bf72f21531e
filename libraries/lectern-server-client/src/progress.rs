//! Progress lookups.

use crate::client::{error_for_status, read_json};
use crate::error::{Result, ServerClientError};
use lectern_core::{RemoteProgressRecord, UserProgress};
use reqwest::{Client, StatusCode};
use tracing::debug;

/// Progress client for the media server.
pub struct ProgressClient<'a> {
    http: &'a Client,
    base_url: &'a str,
    access_token: &'a str,
}

impl<'a> ProgressClient<'a> {
    pub(crate) fn new(http: &'a Client, base_url: &'a str, access_token: &'a str) -> Self {
        Self {
            http,
            base_url,
            access_token,
        }
    }

    /// Get progress for a work (and episode).
    ///
    /// A 404 means the server has never seen progress for it and maps to `None`.
    pub async fn get_progress(
        &self,
        library_item_id: &str,
        episode_id: Option<&str>,
    ) -> Result<Option<RemoteProgressRecord>> {
        let url = match episode_id {
            Some(episode) => format!(
                "{}/api/me/progress/{}/{}",
                self.base_url, library_item_id, episode
            ),
            None => format!("{}/api/me/progress/{}", self.base_url, library_item_id),
        };
        debug!(url = %url, "Fetching remote progress");

        let response = self
            .http
            .get(&url)
            .bearer_auth(self.access_token)
            .send()
            .await
            .map_err(ServerClientError::from_send)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let record: RemoteProgressRecord = read_json(response, "progress").await?;
                Ok(Some(record))
            }
            _ => Err(error_for_status(response).await),
        }
    }

    /// Get the current user with all progress records.
    pub async fn get_current_user(&self) -> Result<UserProgress> {
        let url = format!("{}/api/me", self.base_url);
        debug!(url = %url, "Fetching current user");

        let response = self
            .http
            .get(&url)
            .bearer_auth(self.access_token)
            .send()
            .await
            .map_err(ServerClientError::from_send)?;

        let user: UserProgress = read_json(response, "user").await?;
        debug!(records = user.media_progress.len(), "Fetched current user");
        Ok(user)
    }
}
