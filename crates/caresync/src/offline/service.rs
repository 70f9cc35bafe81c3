//! Offline write service.
//!
//! Façade over [`LocalStore`] implementing write-then-mark-unsynced
//! semantics. Reads degrade to empty results on storage faults so a
//! transient local error never crashes a consumer; writes the user directly
//! initiated propagate their error.

use chrono::{DateTime, Duration, Utc};
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::store::{
    LocalRecord, LocalStore, NewRecord, QueryOptions, RecordPatch, StorageResult, Table,
};

use super::models::{
    NewAuditEntry, NewConversation, NewMessage, NewNotification, NewToolResult, StorageStats,
    UnsyncedSnapshot,
};

/// Offline-first write/read façade over the local store.
#[derive(Debug, Clone)]
pub struct OfflineWriteService {
    store: LocalStore,
}

impl OfflineWriteService {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    // ------------------------------------------------------------------
    // Entity writes (propagate errors)
    // ------------------------------------------------------------------

    /// Save a message locally. It becomes visible to later sync sweeps.
    pub async fn save_message(&self, mut message: NewMessage) -> StorageResult<i64> {
        let timestamp = message.timestamp.unwrap_or_else(Utc::now);
        message.timestamp = Some(timestamp);
        let payload = serde_json::to_value(&message)?;

        let id = self
            .store
            .put(Table::Messages, NewRecord::new(payload, timestamp))
            .await?;
        info!("message saved offline with id {}", id);
        Ok(id)
    }

    /// Save a conversation locally.
    pub async fn save_conversation(&self, mut conversation: NewConversation) -> StorageResult<i64> {
        let timestamp = conversation.last_message_at.unwrap_or_else(Utc::now);
        conversation.last_message_at = Some(timestamp);
        let payload = serde_json::to_value(&conversation)?;

        let id = self
            .store
            .put(Table::Conversations, NewRecord::new(payload, timestamp))
            .await?;
        info!("conversation saved offline with id {}", id);
        Ok(id)
    }

    /// Save a tool result locally.
    pub async fn save_tool_result(&self, mut result: NewToolResult) -> StorageResult<i64> {
        let timestamp = result.timestamp.unwrap_or_else(Utc::now);
        result.timestamp = Some(timestamp);
        let payload = serde_json::to_value(&result)?;

        let id = self
            .store
            .put(Table::ToolResults, NewRecord::new(payload, timestamp))
            .await?;
        info!("tool result saved offline with id {}", id);
        Ok(id)
    }

    /// Save a notification locally.
    pub async fn save_notification(&self, mut notification: NewNotification) -> StorageResult<i64> {
        let timestamp = notification.timestamp.unwrap_or_else(Utc::now);
        notification.timestamp = Some(timestamp);
        let payload = serde_json::to_value(&notification)?;

        let mut record = NewRecord::new(payload, timestamp);
        if let Some(server_id) = &notification.server_id {
            record = record.server_id(server_id);
        }
        let id = self.store.put(Table::Notifications, record).await?;
        info!("notification saved offline with id {}", id);
        Ok(id)
    }

    /// Mark a locally held notification as read. The read-mark reaches the
    /// server on the next sync cycle if the record is still unsynced and
    /// carries a server id.
    pub async fn mark_notification_read(&self, id: i64) -> StorageResult<()> {
        let record = self.store.get(Table::Notifications, id).await?.ok_or(
            crate::store::StorageError::NotFound {
                table: Table::Notifications.as_str(),
                id,
            },
        )?;

        let mut payload = record.payload;
        payload["read"] = Value::Bool(true);
        self.store
            .update(Table::Notifications, id, RecordPatch::default().payload(payload))
            .await
    }

    /// Save an audit entry locally.
    pub async fn save_audit_entry(&self, mut entry: NewAuditEntry) -> StorageResult<i64> {
        let timestamp = entry.timestamp.unwrap_or_else(Utc::now);
        entry.timestamp = Some(timestamp);
        let payload = serde_json::to_value(&entry)?;

        self.store
            .put(Table::AuditLogs, NewRecord::new(payload, timestamp))
            .await
    }

    /// Save a setting (upsert on key).
    pub async fn save_setting(&self, key: &str, value: Value) -> StorageResult<()> {
        let payload = json!({ "key": key, "value": value });
        self.store
            .put(Table::Settings, NewRecord::new(payload, Utc::now()))
            .await?;
        debug!("setting '{}' saved offline", key);
        Ok(())
    }

    /// Save the user profile (upsert on user id). Profiles are
    /// server-owned, so they enter the store already synced.
    pub async fn save_user_profile(&self, user_id: &str, profile: Value) -> StorageResult<()> {
        let mut payload = match profile {
            Value::Object(map) => map,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("profile".to_string(), other);
                map
            }
        };
        payload.insert("userId".to_string(), Value::String(user_id.to_string()));

        self.store
            .put(
                Table::UserProfile,
                NewRecord::new(Value::Object(payload), Utc::now()).synced(),
            )
            .await?;
        info!("user profile saved offline");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Entity reads (degrade to empty on storage faults)
    // ------------------------------------------------------------------

    /// Messages for a conversation, in chronological order.
    pub async fn get_messages(&self, conversation_id: i64, limit: u32) -> Vec<LocalRecord> {
        match self
            .store
            .query(
                Table::Messages,
                "conversationId",
                &json!(conversation_id),
                QueryOptions::default().limit(limit),
            )
            .await
        {
            Ok(mut messages) => {
                // Newest N fetched descending, handed to the UI oldest-first.
                messages.reverse();
                messages
            }
            Err(err) => {
                error!("failed to get messages: {}", err);
                Vec::new()
            }
        }
    }

    /// Conversations for a user, most recently active first.
    pub async fn get_conversations(&self, user_id: &str) -> Vec<LocalRecord> {
        match self
            .store
            .query(
                Table::Conversations,
                "userId",
                &json!(user_id),
                QueryOptions::default(),
            )
            .await
        {
            Ok(conversations) => conversations,
            Err(err) => {
                error!("failed to get conversations: {}", err);
                Vec::new()
            }
        }
    }

    /// Tool results for a user, optionally filtered by tool type.
    pub async fn get_tool_results(
        &self,
        user_id: &str,
        tool_type: Option<&str>,
    ) -> Vec<LocalRecord> {
        let results = match self
            .store
            .query(
                Table::ToolResults,
                "userId",
                &json!(user_id),
                QueryOptions::default(),
            )
            .await
        {
            Ok(results) => results,
            Err(err) => {
                error!("failed to get tool results: {}", err);
                return Vec::new();
            }
        };

        match tool_type {
            Some(tool_type) => results
                .into_iter()
                .filter(|r| r.payload["toolType"] == tool_type)
                .collect(),
            None => results,
        }
    }

    /// Notifications for a user, newest first.
    pub async fn get_notifications(&self, user_id: &str, limit: u32) -> Vec<LocalRecord> {
        match self
            .store
            .query(
                Table::Notifications,
                "userId",
                &json!(user_id),
                QueryOptions::default().limit(limit),
            )
            .await
        {
            Ok(notifications) => notifications,
            Err(err) => {
                error!("failed to get notifications: {}", err);
                Vec::new()
            }
        }
    }

    /// Read a setting value, `None` on absence or fault.
    pub async fn get_setting(&self, key: &str) -> Option<Value> {
        match self
            .store
            .query(
                Table::Settings,
                "key",
                &json!(key),
                QueryOptions::default().limit(1),
            )
            .await
        {
            Ok(records) => records.first().map(|r| r.payload["value"].clone()),
            Err(err) => {
                error!("failed to get setting '{}': {}", key, err);
                None
            }
        }
    }

    /// Read the stored user profile.
    pub async fn get_user_profile(&self, user_id: &str) -> Option<Value> {
        match self
            .store
            .query(
                Table::UserProfile,
                "userId",
                &json!(user_id),
                QueryOptions::default().limit(1),
            )
            .await
        {
            Ok(records) => records.first().map(|r| r.payload.clone()),
            Err(err) => {
                error!("failed to get user profile: {}", err);
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Knowledge cache
    // ------------------------------------------------------------------

    /// Cache a knowledge response with a TTL. Cache writes are best-effort.
    pub async fn cache_knowledge(&self, query: &str, response: Value, ttl_minutes: i64) {
        if ttl_minutes <= 0 {
            warn!("refusing to cache '{}' with non-positive ttl", query);
            return;
        }
        let now = Utc::now();
        let payload = json!({
            "query": query.to_lowercase(),
            "response": response,
        });
        let record = NewRecord::new(payload, now).expires_at(now + Duration::minutes(ttl_minutes));

        match self.store.put(Table::KnowledgeCache, record).await {
            Ok(_) => info!("knowledge cached offline"),
            Err(err) => error!("failed to cache knowledge: {}", err),
        }
    }

    /// Read the freshest non-expired cached response for a query.
    pub async fn get_cached_knowledge(&self, query: &str) -> Option<Value> {
        match self
            .store
            .query(
                Table::KnowledgeCache,
                "query",
                &json!(query.to_lowercase()),
                QueryOptions::default().limit(1),
            )
            .await
        {
            Ok(records) => records.first().map(|r| r.payload["response"].clone()),
            Err(err) => {
                error!("failed to get cached knowledge: {}", err);
                None
            }
        }
    }

    /// Prune expired cache entries. Returns the number removed.
    pub async fn cleanup_expired_cache(&self) -> u64 {
        match self.store.prune_expired(Utc::now()).await {
            Ok(0) => 0,
            Ok(pruned) => {
                info!("cleaned up {} expired cache entries", pruned);
                pruned
            }
            Err(err) => {
                error!("failed to cleanup cache: {}", err);
                0
            }
        }
    }

    // ------------------------------------------------------------------
    // Sync support
    // ------------------------------------------------------------------

    /// Snapshot every unsynced record across the syncable tables.
    ///
    /// Read-only aggregation; degrades to an empty snapshot on fault.
    pub async fn unsynced_items(&self) -> UnsyncedSnapshot {
        let mut snapshot = UnsyncedSnapshot::default();
        for table in Table::SYNCABLE {
            let records = match self.store.list_unsynced(table).await {
                Ok(records) => records,
                Err(err) => {
                    error!("failed to list unsynced {} records: {}", table, err);
                    return UnsyncedSnapshot::default();
                }
            };
            snapshot.total += records.len();
            match table {
                Table::Messages => snapshot.messages = records,
                Table::Conversations => snapshot.conversations = records,
                Table::ToolResults => snapshot.tool_results = records,
                Table::Notifications => snapshot.notifications = records,
                Table::AuditLogs => snapshot.audit_logs = records,
                _ => {}
            }
        }
        snapshot
    }

    /// Mark a record as synced. Idempotent.
    pub async fn mark_as_synced(&self, table: Table, id: i64) -> StorageResult<()> {
        self.store
            .update(table, id, RecordPatch::default().synced(true))
            .await?;
        debug!("marked {}/{} as synced", table, id);
        Ok(())
    }

    /// Persist the server-assigned identifier for a record.
    pub async fn record_server_id(
        &self,
        table: Table,
        id: i64,
        server_id: &str,
    ) -> StorageResult<()> {
        self.store
            .update(table, id, RecordPatch::default().server_id(server_id))
            .await
    }

    /// Whether a record with this server id already exists locally.
    pub async fn has_server_record(&self, table: Table, server_id: &str) -> StorageResult<bool> {
        Ok(self.store.find_by_server_id(table, server_id).await?.is_some())
    }

    /// Insert a server-originated record; it enters the store already
    /// synced and carrying its server id.
    pub async fn insert_synced(
        &self,
        table: Table,
        payload: Value,
        server_id: &str,
        timestamp: DateTime<Utc>,
    ) -> StorageResult<i64> {
        self.store
            .put(
                table,
                NewRecord::new(payload, timestamp)
                    .synced()
                    .server_id(server_id),
            )
            .await
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Per-table counts plus total. Never propagates a storage fault.
    pub async fn storage_stats(&self) -> Option<StorageStats> {
        let mut stats = StorageStats::default();
        let counters: [(&mut u64, Table); 6] = [
            (&mut stats.messages, Table::Messages),
            (&mut stats.conversations, Table::Conversations),
            (&mut stats.tool_results, Table::ToolResults),
            (&mut stats.cached_queries, Table::KnowledgeCache),
            (&mut stats.notifications, Table::Notifications),
            (&mut stats.audit_logs, Table::AuditLogs),
        ];
        for (slot, table) in counters {
            match self.store.count(table).await {
                Ok(count) => *slot = count,
                Err(err) => {
                    error!("failed to get storage stats: {}", err);
                    return None;
                }
            }
        }
        stats.total = stats.messages
            + stats.conversations
            + stats.tool_results
            + stats.cached_queries
            + stats.notifications
            + stats.audit_logs;
        Some(stats)
    }

    /// Clear the data tables repopulated by a full re-sync; settings and
    /// the user profile survive.
    pub async fn clear_data_tables(&self) -> StorageResult<()> {
        for table in [
            Table::Messages,
            Table::Conversations,
            Table::ToolResults,
            Table::AuditLogs,
            Table::Notifications,
            Table::KnowledgeCache,
        ] {
            self.store.clear(table).await?;
        }
        Ok(())
    }

    /// Clear every table (logout).
    pub async fn clear_all(&self) -> StorageResult<()> {
        self.store.clear_all().await
    }
}
