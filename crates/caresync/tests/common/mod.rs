//! Test utilities and common setup.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use caresync::offline::OfflineWriteService;
use caresync::remote::{ApiError, ApiResult, PushAck, RemoteApi, RemoteNotification};
use caresync::store::{Database, LocalStore};

/// Install a test subscriber so `RUST_LOG=caresync=debug` works when
/// debugging a failing test. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Build an offline service over a fresh in-memory database, returning the
/// underlying store for direct inspection.
pub async fn offline_service() -> (OfflineWriteService, LocalStore) {
    init_tracing();
    let store = LocalStore::new(Database::in_memory().await.unwrap());
    (OfflineWriteService::new(store.clone()), store)
}

/// In-memory remote server double.
///
/// Records every push, assigns sequential server ids, and can be told to
/// fail specific records (by payload substring), delay pushes, or serve
/// canned pull/poll data.
#[derive(Default)]
pub struct MockApi {
    /// (endpoint, body) pairs in arrival order.
    pub pushed: Mutex<Vec<(String, Value)>>,
    /// Server ids of notifications marked read.
    pub read_marks: Mutex<Vec<String>>,
    /// Bodies containing this substring fail with a 503.
    pub fail_matching: Mutex<Option<String>>,
    /// Artificial latency per push.
    pub push_delay: Mutex<Option<Duration>>,
    /// Profile returned by the pull endpoint.
    pub profile: Mutex<Value>,
    /// Notifications returned by the pull endpoint.
    pub notifications: Mutex<Vec<RemoteNotification>>,
    /// Activities returned by the polling endpoint.
    pub activity: Mutex<Vec<Value>>,
    /// Number of polls served.
    pub activity_polls: AtomicUsize,
    next_id: AtomicU64,
}

impl MockApi {
    pub fn new() -> Self {
        let api = Self::default();
        *api.profile.lock().unwrap() =
            serde_json::json!({"id": "u1", "displayName": "Dr. Dev"});
        api
    }

    pub fn pushed_endpoints(&self) -> Vec<String> {
        self.pushed
            .lock()
            .unwrap()
            .iter()
            .map(|(endpoint, _)| endpoint.clone())
            .collect()
    }

    pub fn push_count(&self) -> usize {
        self.pushed.lock().unwrap().len()
    }

    async fn push(&self, endpoint: &str, body: &Value) -> ApiResult<PushAck> {
        let delay = *self.push_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let poison = self.fail_matching.lock().unwrap().clone();
        if let Some(poison) = poison
            && body.to_string().contains(&poison)
        {
            return Err(ApiError::Api {
                status: 503,
                message: "rejected by test".to_string(),
            });
        }

        self.pushed
            .lock()
            .unwrap()
            .push((endpoint.to_string(), body.clone()));
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PushAck {
            id: Some(format!("srv-{}", id)),
        })
    }
}

#[async_trait]
impl RemoteApi for MockApi {
    async fn push_message(&self, body: &Value) -> ApiResult<PushAck> {
        self.push("/messages", body).await
    }

    async fn push_conversation(&self, body: &Value) -> ApiResult<PushAck> {
        self.push("/conversations", body).await
    }

    async fn push_tool_result(&self, body: &Value) -> ApiResult<PushAck> {
        self.push("/tool-results", body).await
    }

    async fn push_audit_entry(&self, body: &Value) -> ApiResult<PushAck> {
        self.push("/audit/sync", body).await
    }

    async fn mark_notification_read(&self, server_id: &str) -> ApiResult<PushAck> {
        self.read_marks.lock().unwrap().push(server_id.to_string());
        Ok(PushAck::default())
    }

    async fn fetch_profile(&self) -> ApiResult<Value> {
        Ok(self.profile.lock().unwrap().clone())
    }

    async fn fetch_notifications(&self, _limit: u32) -> ApiResult<Vec<RemoteNotification>> {
        Ok(self.notifications.lock().unwrap().clone())
    }

    async fn recent_activity(&self, limit: u32) -> ApiResult<Vec<Value>> {
        self.activity_polls.fetch_add(1, Ordering::SeqCst);
        let activity = self.activity.lock().unwrap();
        Ok(activity.iter().take(limit as usize).cloned().collect())
    }
}

/// A mock shared as the trait object the coordinator expects.
pub fn mock_api() -> Arc<MockApi> {
    Arc::new(MockApi::new())
}
