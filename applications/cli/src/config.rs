/// CLI configuration
use lectern_playback::PlaybackConfig;
use lectern_server_client::ServerConfig;
use lectern_sync::SyncConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LecternConfig {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default = "default_device")]
    pub device: DeviceSettings,

    #[serde(default)]
    pub playback: PlaybackConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default = "default_storage")]
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceSettings {
    #[serde(default = "default_device_id")]
    pub device_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageSettings {
    #[serde(default = "default_database_url")]
    pub database_url: String,
}

impl LecternConfig {
    /// Load configuration from file and environment
    ///
    /// `path` defaults to `lectern.toml` in the working directory; a missing
    /// file is not an error. `LECTERN_*` variables override file values, with
    /// `__` separating sections (`LECTERN_SERVER__URL`).
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut settings = config::Config::builder();

        let config_path = path.map_or_else(|| PathBuf::from("lectern.toml"), Path::to_path_buf);
        if config_path.exists() {
            settings = settings.add_source(config::File::from(config_path));
        }

        settings = settings.add_source(
            config::Environment::with_prefix("LECTERN")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        settings.build()?.try_deserialize()
    }

    /// Server URL must be set before talking to the server
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.url.trim().is_empty() {
            anyhow::bail!("Server URL is required (set [server] url or LECTERN_SERVER__URL)");
        }
        Ok(())
    }
}

// Default values
fn default_server() -> ServerConfig {
    ServerConfig::new("")
}

fn default_device() -> DeviceSettings {
    DeviceSettings {
        device_id: default_device_id(),
    }
}

fn default_device_id() -> String {
    format!("lectern-cli-{}", uuid::Uuid::new_v4())
}

fn default_storage() -> StorageSettings {
    StorageSettings {
        database_url: default_database_url(),
    }
}

fn default_database_url() -> String {
    "sqlite://./lectern.db".to_string()
}
