//! Sync configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Progress sync tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between periodic pushes while playing (default: 15)
    pub sync_interval_secs: u64,

    /// Remote progress must differ from local by more than this to be adopted
    /// (default: 30000)
    pub remote_progress_threshold_ms: u64,

    /// Upper bound for every remote call made by the syncer (default: 10000)
    pub request_timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_interval_secs: 15,
            remote_progress_threshold_ms: 30_000,
            request_timeout_ms: 10_000,
        }
    }
}

impl SyncConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.sync_interval(), Duration::from_secs(15));
        assert_eq!(config.remote_progress_threshold_ms, 30_000);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn partial_config_uses_defaults() {
        let config: SyncConfig = serde_json::from_str(r#"{"sync_interval_secs": 5}"#).unwrap();
        assert_eq!(config.sync_interval_secs, 5);
        assert_eq!(config.remote_progress_threshold_ms, 30_000);
    }
}
