//! Types for the session and progress API requests.

use lectern_core::{DeviceInfo, PlaybackSession, SessionOptions};
use serde::{Deserialize, Serialize};

/// Configuration for connecting to the media server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the server (e.g., "https://books.example.com")
    pub url: String,
    /// Bearer token for the current user
    #[serde(default)]
    pub access_token: Option<String>,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl ServerConfig {
    /// Create a new server config with just the URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            access_token: None,
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Create a config with an existing token.
    pub fn with_token(url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            ..Self::new(url)
        }
    }
}

// =============================================================================
// Session Types
// =============================================================================

/// Request body for opening a playback session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub device_info: DeviceInfo,
    pub force_transcode: bool,
    pub force_direct_play: bool,
    pub supported_mime_types: Vec<String>,
    pub media_player: String,
}

impl CreateSessionRequest {
    pub fn new(device: &DeviceInfo, options: &SessionOptions) -> Self {
        Self {
            device_info: device.clone(),
            force_transcode: options.force_transcode,
            force_direct_play: options.force_direct_play,
            supported_mime_types: options.supported_mime_types.clone(),
            media_player: "lectern".to_string(),
        }
    }
}

/// Request body for uploading sessions played offline.
#[derive(Debug, Clone, Serialize)]
pub struct LocalSessionsRequest {
    pub sessions: Vec<PlaybackSession>,
}
