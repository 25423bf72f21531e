/// Device description sent when opening a server session
use serde::{Deserialize, Serialize};

/// Identifies this client to the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Stable device identifier
    pub device_id: String,
    /// Client application name
    pub client_name: String,
    /// Client application version
    pub client_version: String,
    /// Hardware manufacturer, when known
    #[serde(default)]
    pub manufacturer: Option<String>,
    /// Hardware model, when known
    #[serde(default)]
    pub model: Option<String>,
}

impl DeviceInfo {
    /// Describe this client
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            client_name: "Lectern".to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            manufacturer: None,
            model: None,
        }
    }
}

/// Options for opening a server session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOptions {
    /// Ask the server for a transcoded stream
    pub force_transcode: bool,
    /// Ask the server for the original files
    pub force_direct_play: bool,
    /// MIME types the active backend can render
    #[serde(default)]
    pub supported_mime_types: Vec<String>,
}

impl SessionOptions {
    /// Options used for the one-time fallback after a direct-play engine failure
    pub fn transcode() -> Self {
        Self {
            force_transcode: true,
            ..Self::default()
        }
    }
}
