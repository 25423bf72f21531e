//! Main Lectern server client.

use crate::error::{Result, ServerClientError};
use crate::progress::ProgressClient;
use crate::sessions::SessionClient;
use crate::types::ServerConfig;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;

/// Main client for the media server's session and progress API.
///
/// # Example
///
/// ```ignore
/// use lectern_server_client::{LecternServerClient, ServerConfig};
///
/// let client = LecternServerClient::new(ServerConfig::with_token("https://books.example.com", "t"))?;
/// let user = client.progress().await?.client().get_current_user().await?;
/// println!("{} progress records", user.media_progress.len());
/// ```
pub struct LecternServerClient {
    http: Client,
    config: Arc<RwLock<ServerConfig>>,
}

impl LecternServerClient {
    /// Create a new client with the given configuration.
    pub fn new(config: ServerConfig) -> Result<Self> {
        if config.url.is_empty() {
            return Err(ServerClientError::InvalidUrl("URL cannot be empty".into()));
        }

        // Parse and normalize URL
        let url = config.url.trim_end_matches('/').to_string();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ServerClientError::InvalidUrl(
                "URL must start with http:// or https://".into(),
            ));
        }
        url::Url::parse(&url).map_err(|e| ServerClientError::InvalidUrl(e.to_string()))?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(format!("Lectern/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ServerClientError::Request)?;

        Ok(Self {
            http,
            config: Arc::new(RwLock::new(ServerConfig { url, ..config })),
        })
    }

    /// Get the server URL.
    pub async fn url(&self) -> String {
        self.config.read().await.url.clone()
    }

    /// Check if the client has an access token.
    pub async fn is_authenticated(&self) -> bool {
        self.config.read().await.access_token.is_some()
    }

    /// Replace the access token (e.g., after the app signs in again).
    pub async fn set_token(&self, access_token: impl Into<String>) {
        self.config.write().await.access_token = Some(access_token.into());
    }

    /// Clear the stored token.
    pub async fn logout(&self) {
        self.config.write().await.access_token = None;
        info!("Logged out");
    }

    async fn credentials(&self) -> Result<(String, String)> {
        let config = self.config.read().await;
        let access_token = config
            .access_token
            .clone()
            .ok_or(ServerClientError::AuthRequired)?;
        Ok((config.url.clone(), access_token))
    }

    /// Get a handle for session operations.
    ///
    /// Returns an error if not authenticated.
    pub async fn sessions(&self) -> Result<SessionClientHandle> {
        let (url, access_token) = self.credentials().await?;
        Ok(SessionClientHandle {
            http: self.http.clone(),
            url,
            access_token,
        })
    }

    /// Get a handle for progress operations.
    ///
    /// Returns an error if not authenticated.
    pub async fn progress(&self) -> Result<ProgressClientHandle> {
        let (url, access_token) = self.credentials().await?;
        Ok(ProgressClientHandle {
            http: self.http.clone(),
            url,
            access_token,
        })
    }
}

/// Handle for session operations.
pub struct SessionClientHandle {
    http: Client,
    url: String,
    access_token: String,
}

impl SessionClientHandle {
    /// Get the session client.
    pub fn client(&self) -> SessionClient<'_> {
        SessionClient::new(&self.http, &self.url, &self.access_token)
    }
}

/// Handle for progress operations.
pub struct ProgressClientHandle {
    http: Client,
    url: String,
    access_token: String,
}

impl ProgressClientHandle {
    /// Get the progress client.
    pub fn client(&self) -> ProgressClient<'_> {
        ProgressClient::new(&self.http, &self.url, &self.access_token)
    }
}

/// Turn a non-success response into a typed error.
pub(crate) async fn error_for_status(response: Response) -> ServerClientError {
    let status = response.status().as_u16();
    match status {
        401 => ServerClientError::AuthRequired,
        429 => {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(60);
            ServerClientError::RateLimited { retry_after_secs }
        }
        _ => ServerClientError::ServerError {
            status,
            message: response.text().await.unwrap_or_default(),
        },
    }
}

/// Decode a JSON body, or turn the response into an error.
pub(crate) async fn read_json<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
    if response.status().is_success() {
        response
            .json()
            .await
            .map_err(|e| ServerClientError::ParseError(format!("Failed to parse {what}: {e}")))
    } else {
        Err(error_for_status(response).await)
    }
}

/// Succeed on any 2xx, ignoring the body.
pub(crate) async fn expect_success(response: Response) -> Result<()> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(error_for_status(response).await)
    }
}
