//! Local record data models.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Logical tables of the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Table {
    Messages,
    Conversations,
    ToolResults,
    Notifications,
    AuditLogs,
    Settings,
    KnowledgeCache,
    UserProfile,
}

impl Table {
    /// All logical tables.
    pub const ALL: [Table; 8] = [
        Table::Messages,
        Table::Conversations,
        Table::ToolResults,
        Table::Notifications,
        Table::AuditLogs,
        Table::Settings,
        Table::KnowledgeCache,
        Table::UserProfile,
    ];

    /// Tables that participate in the push side of a sync cycle.
    ///
    /// Conversations are drained before messages so a message never reaches
    /// the server ahead of its parent conversation.
    pub const SYNCABLE: [Table; 5] = [
        Table::Conversations,
        Table::Messages,
        Table::ToolResults,
        Table::Notifications,
        Table::AuditLogs,
    ];

    /// Stable storage name of the table.
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Messages => "messages",
            Table::Conversations => "conversations",
            Table::ToolResults => "toolResults",
            Table::Notifications => "notifications",
            Table::AuditLogs => "auditLogs",
            Table::Settings => "settings",
            Table::KnowledgeCache => "knowledgeCache",
            Table::UserProfile => "userProfile",
        }
    }

    /// Natural-key payload field for tables that upsert instead of append.
    pub fn natural_key(&self) -> Option<&'static str> {
        match self {
            Table::Settings => Some("key"),
            Table::UserProfile => Some("userId"),
            _ => None,
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Table {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "messages" => Ok(Table::Messages),
            "conversations" => Ok(Table::Conversations),
            "toolResults" => Ok(Table::ToolResults),
            "notifications" => Ok(Table::Notifications),
            "auditLogs" => Ok(Table::AuditLogs),
            "settings" => Ok(Table::Settings),
            "knowledgeCache" => Ok(Table::KnowledgeCache),
            "userProfile" => Ok(Table::UserProfile),
            _ => Err(format!("unknown table: {}", s)),
        }
    }
}

/// A persisted local record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalRecord {
    pub table: Table,
    pub id: i64,
    pub payload: Value,
    pub synced: bool,
    pub server_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Input for creating a record.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
    pub synced: bool,
    pub server_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewRecord {
    /// Create a new unsynced record.
    pub fn new(payload: Value, timestamp: DateTime<Utc>) -> Self {
        Self {
            payload,
            timestamp,
            synced: false,
            server_id: None,
            expires_at: None,
        }
    }

    /// Mark the record as already synced (server-originated data).
    pub fn synced(mut self) -> Self {
        self.synced = true;
        self
    }

    /// Attach the server-assigned identifier.
    pub fn server_id(mut self, server_id: impl Into<String>) -> Self {
        self.server_id = Some(server_id.into());
        self
    }

    /// Set an expiry (knowledge-cache entries).
    pub fn expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

/// Partial update for an existing record.
///
/// The store enforces record invariants regardless of patch contents:
/// `synced` can only move from false to true, and `server_id` keeps its
/// first non-null value.
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    pub payload: Option<Value>,
    pub synced: Option<bool>,
    pub server_id: Option<String>,
}

impl RecordPatch {
    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn synced(mut self, synced: bool) -> Self {
        self.synced = Some(synced);
        self
    }

    pub fn server_id(mut self, server_id: impl Into<String>) -> Self {
        self.server_id = Some(server_id.into());
        self
    }
}

/// Sort direction for timestamp-ordered queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    Ascending,
    #[default]
    Descending,
}

impl Order {
    pub(crate) fn sql(&self) -> &'static str {
        match self {
            Order::Ascending => "ASC",
            Order::Descending => "DESC",
        }
    }
}

/// Options for index-field queries.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptions {
    pub limit: Option<u32>,
    pub order: Order,
}

impl QueryOptions {
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }
}

/// Format a timestamp the way the store persists it.
///
/// Millisecond RFC-3339 with a trailing `Z`; constant width keeps
/// lexicographic TEXT ordering chronological.
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a persisted timestamp.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
