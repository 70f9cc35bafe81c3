//! Background synchronizer.
//!
//! Drains unsynced local records to the server table-by-table, stamps them
//! with the server-assigned identifier, then pulls authoritative
//! server-owned state back into the local store. Sync is fire-and-forget
//! from the caller's perspective: a cycle that fails ends in Idle and the
//! records it could not deliver are retried on the next cycle
//! (at-least-once delivery).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::offline::OfflineWriteService;
use crate::remote::{PushAck, RemoteApi, TokenProvider};
use crate::store::{LocalRecord, Table};

/// Coordinator timing and pull limits.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Fixed period between automatic sync cycles while online.
    pub interval: Duration,
    /// How many recent notifications to pull for the additive merge.
    pub pull_notification_limit: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            pull_notification_limit: 50,
        }
    }
}

/// Snapshot of the coordinator's externally visible state.
#[derive(Debug, Clone, Copy)]
pub struct SyncStatus {
    pub is_syncing: bool,
    pub is_online: bool,
    pub auto_sync_active: bool,
}

/// Background process reconciling local state with the server.
///
/// State machine Idle -> Syncing -> Idle; `is_syncing` is a re-entrancy
/// guard, so a cycle requested while one is running is skipped, not queued.
#[derive(Clone)]
pub struct SyncCoordinator {
    offline: OfflineWriteService,
    api: Arc<dyn RemoteApi>,
    tokens: Arc<dyn TokenProvider>,
    config: SyncConfig,
    connectivity: watch::Receiver<bool>,
    is_syncing: Arc<AtomicBool>,
    auto_sync: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl SyncCoordinator {
    pub fn new(
        offline: OfflineWriteService,
        api: Arc<dyn RemoteApi>,
        tokens: Arc<dyn TokenProvider>,
        connectivity: watch::Receiver<bool>,
        config: SyncConfig,
    ) -> Self {
        Self {
            offline,
            api,
            tokens,
            config,
            connectivity,
            is_syncing: Arc::new(AtomicBool::new(false)),
            auto_sync: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
        }
    }

    /// Start the background loop: sync on offline->online transitions and
    /// on a fixed interval while online. Idempotent.
    pub fn start(&self) {
        if self.auto_sync.swap(true, Ordering::SeqCst) {
            debug!("sync loop already running");
            return;
        }

        let coordinator = self.clone();
        tokio::spawn(async move {
            coordinator.run_loop().await;
        });
        info!("sync coordinator started");
    }

    /// Stop the background loop. Does not interrupt a cycle in flight;
    /// cycles always run to completion. Stopping is final: construct a new
    /// coordinator to sync again.
    pub fn stop(&self) {
        self.cancel.cancel();
        self.auto_sync.store(false, Ordering::SeqCst);
        info!("sync coordinator stopped");
    }

    /// Run one sync cycle now, regardless of timers. Skipped if a cycle is
    /// already in progress.
    pub async fn force_sync(&self) {
        self.run_cycle().await;
    }

    /// Externally visible coordinator state.
    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            is_syncing: self.is_syncing.load(Ordering::SeqCst),
            is_online: *self.connectivity.borrow(),
            auto_sync_active: self.auto_sync.load(Ordering::SeqCst),
        }
    }

    /// Drop all locally cached data tables and pull fresh server state.
    /// Settings and the user profile survive.
    pub async fn reset_and_resync(&self) {
        info!("resetting offline data");
        if let Err(err) = self.offline.clear_data_tables().await {
            warn!("failed to clear offline data: {}", err);
            return;
        }
        self.pull_server_state().await;
    }

    async fn run_loop(&self) {
        let mut connectivity = self.connectivity.clone();
        let mut was_online = *connectivity.borrow();

        // First automatic cycle fires one full period after start.
        let start = tokio::time::Instant::now() + self.config.interval;
        let mut ticker = tokio::time::interval_at(start, self.config.interval);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                changed = connectivity.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let online = *connectivity.borrow();
                    if online && !was_online {
                        info!("connection restored, starting sync");
                        self.run_cycle().await;
                    } else if !online {
                        debug!("connection lost, sync paused");
                    }
                    was_online = online;
                }
                _ = ticker.tick() => {
                    if *connectivity.borrow() {
                        self.run_cycle().await;
                    }
                }
            }
        }
    }

    /// One complete cycle: push every unsynced record, then pull
    /// server-owned state. Never propagates an error.
    async fn run_cycle(&self) {
        if !*self.connectivity.borrow() {
            debug!("cannot sync while offline");
            return;
        }
        if self
            .is_syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("sync already in progress, skipping");
            return;
        }
        // Reset regardless of how the cycle ends.
        let _guard = SyncGuard(self.is_syncing.clone());

        if self.tokens.access_token().is_none() {
            debug!("no auth token, skipping sync cycle");
            return;
        }

        let snapshot = self.offline.unsynced_items().await;
        if snapshot.total == 0 {
            debug!("nothing to sync");
            return;
        }
        info!("starting sync of {} unsynced records", snapshot.total);

        for table in Table::SYNCABLE {
            self.push_table(table, snapshot.records(table)).await;
        }

        self.pull_server_state().await;
        info!("sync cycle finished");
    }

    /// Push a table's unsynced records sequentially, preserving insertion
    /// order. A failed record stays unsynced; the loop continues.
    async fn push_table(&self, table: Table, records: &[LocalRecord]) {
        if records.is_empty() {
            return;
        }
        debug!("syncing {} {} record(s)", records.len(), table);

        for record in records {
            if table == Table::Notifications {
                self.push_notification(record).await;
                continue;
            }

            let outcome = match table {
                Table::Conversations => self.api.push_conversation(&record.payload).await,
                Table::Messages => self.api.push_message(&record.payload).await,
                Table::ToolResults => self.api.push_tool_result(&record.payload).await,
                Table::AuditLogs => self.api.push_audit_entry(&record.payload).await,
                _ => continue,
            };

            match outcome {
                Ok(ack) => self.finish_record(table, record.id, ack).await,
                Err(err) => warn!("failed to sync {}/{}: {}", table, record.id, err),
            }
        }
    }

    /// Notifications only carry one remote mutation: the read-mark. A
    /// notification with nothing to push is acked vacuously.
    async fn push_notification(&self, record: &LocalRecord) {
        let read = record.payload["read"].as_bool().unwrap_or(false);
        match (&record.server_id, read) {
            (Some(server_id), true) => {
                match self.api.mark_notification_read(server_id).await {
                    Ok(ack) => self.finish_record(Table::Notifications, record.id, ack).await,
                    Err(err) => warn!(
                        "failed to sync notifications/{}: {}",
                        record.id, err
                    ),
                }
            }
            _ => {
                self.finish_record(Table::Notifications, record.id, PushAck::default())
                    .await;
            }
        }
    }

    /// Stamp a record synced, persisting the server id when one came back.
    async fn finish_record(&self, table: Table, id: i64, ack: PushAck) {
        if let Some(server_id) = &ack.id {
            if let Err(err) = self.offline.record_server_id(table, id, server_id).await {
                warn!("failed to store server id for {}/{}: {}", table, id, err);
            }
        }
        if let Err(err) = self.offline.mark_as_synced(table, id).await {
            warn!("failed to mark {}/{} as synced: {}", table, id, err);
        }
    }

    /// Pull authoritative server-owned resources and merge additively.
    /// Pulled records never overwrite something already held locally.
    async fn pull_server_state(&self) {
        debug!("pulling latest server state");

        match self.api.fetch_profile().await {
            Ok(profile) => self.store_profile(profile).await,
            Err(err) => warn!("failed to pull user profile: {}", err),
        }

        match self
            .api
            .fetch_notifications(self.config.pull_notification_limit)
            .await
        {
            Ok(notifications) => {
                let mut merged = 0u32;
                for notification in notifications {
                    match self
                        .offline
                        .has_server_record(Table::Notifications, &notification.id)
                        .await
                    {
                        Ok(true) => {}
                        Ok(false) => {
                            let inserted = self
                                .offline
                                .insert_synced(
                                    Table::Notifications,
                                    notification.to_payload(),
                                    &notification.id,
                                    notification.timestamp,
                                )
                                .await;
                            match inserted {
                                Ok(_) => merged += 1,
                                Err(err) => {
                                    warn!("failed to merge notification: {}", err)
                                }
                            }
                        }
                        Err(err) => warn!("failed to check notification: {}", err),
                    }
                }
                if merged > 0 {
                    info!("merged {} server notification(s)", merged);
                }
            }
            Err(err) => warn!("failed to pull notifications: {}", err),
        }
    }

    async fn store_profile(&self, profile: Value) {
        let user_id = profile
            .get("id")
            .or_else(|| profile.get("userId"))
            .and_then(Value::as_str)
            .map(str::to_string);

        match user_id {
            Some(user_id) => {
                if let Err(err) = self.offline.save_user_profile(&user_id, profile).await {
                    warn!("failed to store pulled profile: {}", err);
                }
            }
            None => warn!("profile response missing id field"),
        }
    }
}

/// Resets the syncing flag when the cycle ends, however it ends.
struct SyncGuard(Arc<AtomicBool>);

impl Drop for SyncGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
