//! Real-time channel types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Named real-time event categories, each with its own listener set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    Activity,
    Alert,
    AlertAcknowledged,
    Stats,
    Workload,
}

impl Topic {
    /// All topics.
    pub const ALL: [Topic; 5] = [
        Topic::Activity,
        Topic::Alert,
        Topic::AlertAcknowledged,
        Topic::Stats,
        Topic::Workload,
    ];

    /// Wire name of the SSE event for this topic.
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Activity => "activity",
            Topic::Alert => "alert",
            Topic::AlertAcknowledged => "alert-acknowledged",
            Topic::Stats => "stats",
            Topic::Workload => "workload",
        }
    }

    /// Map an SSE event name to its topic. `heartbeat` and unknown names
    /// have no topic.
    pub fn from_event_name(name: &str) -> Option<Topic> {
        Topic::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health of the push channel as observed by subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Connected,
    #[default]
    Disconnected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Which transports are currently live. At any instant at most one of the
/// two flags is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportStatus {
    /// The push stream is open.
    pub push_connected: bool,
    /// The polling fallback timer is running.
    pub polling_active: bool,
}

/// Real-time channel configuration.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Base URL of the push-stream host (may differ from the REST base).
    pub stream_base_url: String,
    /// Fixed polling period while the push channel is down.
    pub poll_interval: Duration,
    /// Fixed delay before each push reconnect attempt.
    pub reconnect_delay: Duration,
    /// How many activities each poll requests.
    pub poll_limit: u32,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            stream_base_url: "http://localhost:8000/api".to_string(),
            poll_interval: Duration::from_secs(15),
            reconnect_delay: Duration::from_secs(5),
            poll_limit: 5,
        }
    }
}

impl RealtimeConfig {
    /// Full URL of the SSE endpoint.
    pub fn stream_url(&self) -> String {
        format!(
            "{}/dashboard/stream",
            self.stream_base_url.trim_end_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_event_names_round_trip() {
        for topic in Topic::ALL {
            assert_eq!(Topic::from_event_name(topic.as_str()), Some(topic));
        }
        assert_eq!(Topic::from_event_name("heartbeat"), None);
        assert_eq!(Topic::from_event_name("bogus"), None);
    }

    #[test]
    fn test_stream_url_normalizes_trailing_slash() {
        let config = RealtimeConfig {
            stream_base_url: "http://host/api/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.stream_url(), "http://host/api/dashboard/stream");
    }
}
