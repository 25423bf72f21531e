//! Playback configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the player service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Skip-previous restarts the current segment once this far in (default: 5000)
    pub skip_previous_threshold_ms: u64,

    /// Delay applied to navigation issued during an auto-advance (default: 100)
    pub navigation_defer_ms: u64,

    /// Position/sync tick cadence (default: 1000)
    pub tick_interval_ms: u64,

    /// Server sessions older than this are refreshed before use (default: 24h)
    pub session_max_age_ms: u64,

    /// Upper bound for session refresh and close calls (default: 10000)
    pub request_timeout_ms: u64,

    /// Default jump-forward distance (default: 30000)
    pub jump_forward_ms: u64,

    /// Default jump-backward distance (default: 10000)
    pub jump_backward_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            skip_previous_threshold_ms: 5_000,
            navigation_defer_ms: 100,
            tick_interval_ms: 1_000,
            session_max_age_ms: 24 * 60 * 60 * 1_000,
            request_timeout_ms: 10_000,
            jump_forward_ms: 30_000,
            jump_backward_ms: 10_000,
        }
    }
}

impl PlaybackConfig {
    pub fn navigation_defer(&self) -> Duration {
        Duration::from_millis(self.navigation_defer_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
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
        let config = PlaybackConfig::default();
        assert_eq!(config.skip_previous_threshold_ms, 5_000);
        assert_eq!(config.navigation_defer(), Duration::from_millis(100));
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn zero_tick_interval_is_clamped() {
        let config = PlaybackConfig {
            tick_interval_ms: 0,
            ..PlaybackConfig::default()
        };
        assert_eq!(config.tick_interval(), Duration::from_millis(1));
    }
}
