//! Remote API types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Acknowledgment for a pushed record.
///
/// The server may or may not assign an identifier; the coordinator branches
/// on this tag instead of probing response fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushAck {
    /// Server-assigned identifier, when the endpoint returns one.
    #[serde(default)]
    pub id: Option<String>,
}

/// A notification as returned by the server's pull endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteNotification {
    pub id: String,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub read: bool,
    pub timestamp: DateTime<Utc>,
}

impl RemoteNotification {
    /// Payload stored locally for a pulled notification.
    pub fn to_payload(&self) -> Value {
        serde_json::json!({
            "userId": self.user_id,
            "title": self.title,
            "body": self.body,
            "read": self.read,
            "timestamp": self.timestamp,
        })
    }
}

/// Envelope for the notifications pull endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsPage {
    #[serde(default)]
    pub notifications: Vec<RemoteNotification>,
}

/// Envelope for the recent-activity endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ActivityPage {
    #[serde(default)]
    pub activities: Vec<Value>,
}
