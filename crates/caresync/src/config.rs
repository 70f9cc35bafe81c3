//! Core configuration.
//!
//! All values are host-supplied; defaults match the production backend
//! layout. The auth token is deliberately not part of the config: it is
//! looked up through the host's `TokenProvider` on every request.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::realtime::RealtimeConfig;
use crate::sync::SyncConfig;

/// Configuration for the consistency core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// REST base URL.
    pub api_base_url: String,
    /// Push-stream base URL; may differ from the REST base.
    pub stream_base_url: String,
    /// Local database file.
    pub database_path: PathBuf,
    /// Seconds between automatic sync cycles while online.
    pub sync_interval_seconds: u64,
    /// Seconds between polling-fallback requests.
    pub poll_interval_seconds: u64,
    /// Seconds before each push-channel reconnect attempt.
    pub reconnect_delay_seconds: u64,
    /// Recent notifications pulled per sync cycle.
    pub pull_notification_limit: u32,
    /// Activities requested per fallback poll.
    pub poll_activity_limit: u32,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000/api".to_string(),
            stream_base_url: "http://localhost:8000/api".to_string(),
            database_path: PathBuf::from("caresync.db"),
            sync_interval_seconds: 30,
            poll_interval_seconds: 15,
            reconnect_delay_seconds: 5,
            pull_notification_limit: 50,
            poll_activity_limit: 5,
        }
    }
}

impl CoreConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
    }

    /// Coordinator configuration derived from this config.
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            interval: Duration::from_secs(self.sync_interval_seconds),
            pull_notification_limit: self.pull_notification_limit,
        }
    }

    /// Realtime-channel configuration derived from this config.
    pub fn realtime_config(&self) -> RealtimeConfig {
        RealtimeConfig {
            stream_base_url: self.stream_base_url.clone(),
            poll_interval: Duration::from_secs(self.poll_interval_seconds),
            reconnect_delay: Duration::from_secs(self.reconnect_delay_seconds),
            poll_limit: self.poll_activity_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.sync_interval_seconds, 30);
        assert_eq!(config.poll_interval_seconds, 15);
        assert_eq!(config.reconnect_delay_seconds, 5);
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config: CoreConfig =
            toml::from_str("api_base_url = \"https://api.example.org/v1\"").unwrap();
        assert_eq!(config.api_base_url, "https://api.example.org/v1");
        assert_eq!(config.sync_interval_seconds, 30);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("caresync.toml");
        std::fs::write(&path, "sync_interval_seconds = 5\n").unwrap();

        let config = CoreConfig::load(&path).unwrap();
        assert_eq!(config.sync_config().interval, Duration::from_secs(5));
    }
}
