//! The local record store.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use tracing::debug;

use super::db::Database;
use super::error::{StorageError, StorageResult};
use super::models::{
    LocalRecord, NewRecord, Order, QueryOptions, RecordPatch, Table, format_timestamp,
    parse_timestamp,
};

const RECORD_COLUMNS: &str = "tbl, id, payload, synced, server_id, timestamp, expires_at";

/// Durable, keyed, queryable local tables.
///
/// All logical tables share one physical `records` table; index-field
/// queries go through `json_extract` on the JSON payload. The store performs
/// no retries; every fault surfaces as [`StorageError`].
#[derive(Debug, Clone)]
pub struct LocalStore {
    db: Database,
}

impl LocalStore {
    /// Create a store over an open database.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a record, returning its local id.
    ///
    /// Append-only tables allocate the next per-table id. Natural-key tables
    /// (`settings`, `userProfile`) upsert on their key field instead.
    pub async fn put(&self, table: Table, record: NewRecord) -> StorageResult<i64> {
        if let Some(key_field) = table.natural_key() {
            let key = record
                .payload
                .get(key_field)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| StorageError::InvalidPayload {
                    table: table.as_str(),
                    reason: format!("missing natural key field '{}'", key_field),
                })?;
            if let Some(existing) = self.find_by_field(table, key_field, &key).await? {
                self.replace_payload(table, existing.id, &record).await?;
                return Ok(existing.id);
            }
        }

        let payload = serde_json::to_string(&record.payload)?;
        let mut tx = self.db.pool().begin().await?;

        let next_id: i64 =
            sqlx::query("SELECT COALESCE(MAX(id), 0) + 1 AS next_id FROM records WHERE tbl = ?")
                .bind(table.as_str())
                .fetch_one(&mut *tx)
                .await?
                .get("next_id");

        sqlx::query(
            r#"
            INSERT INTO records (tbl, id, payload, synced, server_id, timestamp, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(table.as_str())
        .bind(next_id)
        .bind(&payload)
        .bind(record.synced as i64)
        .bind(&record.server_id)
        .bind(format_timestamp(record.timestamp))
        .bind(record.expires_at.map(format_timestamp))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(table = table.as_str(), id = next_id, "record stored");
        Ok(next_id)
    }

    /// Fetch a record by local id.
    pub async fn get(&self, table: Table, id: i64) -> StorageResult<Option<LocalRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM records WHERE tbl = ? AND id = ?");
        let row = sqlx::query(&sql)
            .bind(table.as_str())
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        row.map(|r| record_from_row(&r)).transpose()
    }

    /// Query a table by an index field of the payload, ordered by timestamp.
    ///
    /// Expired entries (knowledge cache) are never returned.
    pub async fn query(
        &self,
        table: Table,
        index_field: &str,
        value: &Value,
        options: QueryOptions,
    ) -> StorageResult<Vec<LocalRecord>> {
        let order = options.order.sql();
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM records \
             WHERE tbl = ? AND json_extract(payload, ?) = ? \
             AND (expires_at IS NULL OR expires_at > ?) \
             ORDER BY timestamp {order}, id {order} LIMIT ?"
        );

        let query = sqlx::query(&sql)
            .bind(table.as_str())
            .bind(format!("$.{}", index_field));
        let query = bind_json_value(query, value).bind(format_timestamp(Utc::now()));
        let rows = query
            .bind(options.limit.map(i64::from).unwrap_or(-1))
            .fetch_all(self.db.pool())
            .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// Apply a partial update to a record.
    ///
    /// `synced` is monotonic (false -> true only) and `server_id` keeps its
    /// first non-null value; both are enforced here rather than trusted to
    /// callers.
    pub async fn update(&self, table: Table, id: i64, patch: RecordPatch) -> StorageResult<()> {
        let payload = patch.payload.map(|p| serde_json::to_string(&p)).transpose()?;

        let result = sqlx::query(
            r#"
            UPDATE records SET
                payload = COALESCE(?, payload),
                synced = COALESCE(MAX(synced, ?), synced),
                server_id = COALESCE(server_id, ?)
            WHERE tbl = ? AND id = ?
            "#,
        )
        .bind(payload)
        .bind(patch.synced.map(|s| s as i64))
        .bind(patch.server_id)
        .bind(table.as_str())
        .bind(id)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                table: table.as_str(),
                id,
            });
        }
        Ok(())
    }

    /// Delete a record. Deleting an absent record is a no-op.
    pub async fn delete(&self, table: Table, id: i64) -> StorageResult<()> {
        sqlx::query("DELETE FROM records WHERE tbl = ? AND id = ?")
            .bind(table.as_str())
            .bind(id)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    /// Count records in a table.
    pub async fn count(&self, table: Table) -> StorageResult<u64> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM records WHERE tbl = ?")
            .bind(table.as_str())
            .fetch_one(self.db.pool())
            .await?
            .get("n");
        Ok(count as u64)
    }

    /// List a table's unsynced records in insertion order.
    pub async fn list_unsynced(&self, table: Table) -> StorageResult<Vec<LocalRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM records \
             WHERE tbl = ? AND synced = 0 ORDER BY id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(table.as_str())
            .fetch_all(self.db.pool())
            .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// Find the record carrying a given server-assigned identifier.
    pub async fn find_by_server_id(
        &self,
        table: Table,
        server_id: &str,
    ) -> StorageResult<Option<LocalRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM records \
             WHERE tbl = ? AND server_id = ? LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(table.as_str())
            .bind(server_id)
            .fetch_optional(self.db.pool())
            .await?;

        row.map(|r| record_from_row(&r)).transpose()
    }

    /// Delete all expired records. Returns the number pruned.
    pub async fn prune_expired(&self, now: DateTime<Utc>) -> StorageResult<u64> {
        let result =
            sqlx::query("DELETE FROM records WHERE expires_at IS NOT NULL AND expires_at < ?")
                .bind(format_timestamp(now))
                .execute(self.db.pool())
                .await?;
        Ok(result.rows_affected())
    }

    /// Delete every record in a table.
    pub async fn clear(&self, table: Table) -> StorageResult<()> {
        sqlx::query("DELETE FROM records WHERE tbl = ?")
            .bind(table.as_str())
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    /// Delete every record in every table (logout).
    pub async fn clear_all(&self) -> StorageResult<()> {
        sqlx::query("DELETE FROM records")
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    async fn find_by_field(
        &self,
        table: Table,
        field: &str,
        value: &str,
    ) -> StorageResult<Option<LocalRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM records \
             WHERE tbl = ? AND json_extract(payload, ?) = ? LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(table.as_str())
            .bind(format!("$.{}", field))
            .bind(value)
            .fetch_optional(self.db.pool())
            .await?;

        row.map(|r| record_from_row(&r)).transpose()
    }

    async fn replace_payload(
        &self,
        table: Table,
        id: i64,
        record: &NewRecord,
    ) -> StorageResult<()> {
        let payload = serde_json::to_string(&record.payload)?;
        sqlx::query(
            r#"
            UPDATE records SET
                payload = ?,
                timestamp = ?,
                expires_at = ?,
                synced = MAX(synced, ?)
            WHERE tbl = ? AND id = ?
            "#,
        )
        .bind(&payload)
        .bind(format_timestamp(record.timestamp))
        .bind(record.expires_at.map(format_timestamp))
        .bind(record.synced as i64)
        .bind(table.as_str())
        .bind(id)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }
}

type SqliteQuery<'q> =
    sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

/// Bind a JSON scalar the way `json_extract` surfaces it to SQL.
fn bind_json_value<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
    match value {
        Value::String(s) => query.bind(s.clone()),
        Value::Bool(b) => query.bind(*b as i64),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else {
                query.bind(n.as_f64().unwrap_or(0.0))
            }
        }
        other => query.bind(other.to_string()),
    }
}

fn record_from_row(row: &SqliteRow) -> StorageResult<LocalRecord> {
    let tbl: String = row.get("tbl");
    let id: i64 = row.get("id");
    let payload_raw: String = row.get("payload");
    let synced: i64 = row.get("synced");
    let server_id: Option<String> = row.get("server_id");
    let timestamp_raw: String = row.get("timestamp");
    let expires_raw: Option<String> = row.get("expires_at");

    let table = tbl
        .parse::<Table>()
        .map_err(|reason| StorageError::InvalidPayload {
            table: "records",
            reason,
        })?;
    let payload: Value = serde_json::from_str(&payload_raw)?;
    let timestamp =
        parse_timestamp(&timestamp_raw).ok_or_else(|| StorageError::InvalidPayload {
            table: table.as_str(),
            reason: format!("unparseable timestamp '{}'", timestamp_raw),
        })?;
    let expires_at = expires_raw.as_deref().and_then(parse_timestamp);

    Ok(LocalRecord {
        table,
        id,
        payload,
        synced: synced != 0,
        server_id,
        timestamp,
        expires_at,
    })
}
