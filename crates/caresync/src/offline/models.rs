//! Offline entity models.
//!
//! Payloads are serialized camelCase; the field names double as the index
//! fields the store queries with `json_extract`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::{LocalRecord, Table};

/// Author role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    #[default]
    User,
    Assistant,
    System,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// A chat message to be written locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub conversation_id: i64,
    pub role: MessageRole,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A conversation to be written locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConversation {
    pub user_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<DateTime<Utc>>,
}

/// A clinical-tool result to be written locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewToolResult {
    pub user_id: String,
    pub tool_type: String,
    pub input: Value,
    pub output: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A notification to be written locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    pub user_id: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub read: bool,
    /// Server identifier, when the notification is a local copy of one the
    /// server already knows (e.g. received over the push channel). Kept on
    /// the record, not in the payload.
    #[serde(skip)]
    pub server_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// An audit entry to be written locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAuditEntry {
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Snapshot of every unsynced record, grouped by table.
#[derive(Debug, Clone, Default)]
pub struct UnsyncedSnapshot {
    pub messages: Vec<LocalRecord>,
    pub conversations: Vec<LocalRecord>,
    pub tool_results: Vec<LocalRecord>,
    pub notifications: Vec<LocalRecord>,
    pub audit_logs: Vec<LocalRecord>,
    pub total: usize,
}

impl UnsyncedSnapshot {
    /// Records for one of the syncable tables.
    pub fn records(&self, table: Table) -> &[LocalRecord] {
        match table {
            Table::Messages => &self.messages,
            Table::Conversations => &self.conversations,
            Table::ToolResults => &self.tool_results,
            Table::Notifications => &self.notifications,
            Table::AuditLogs => &self.audit_logs,
            _ => &[],
        }
    }
}

/// Per-table record counts.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    pub messages: u64,
    pub conversations: u64,
    pub tool_results: u64,
    pub cached_queries: u64,
    pub notifications: u64,
    pub audit_logs: u64,
    pub total: u64,
}
