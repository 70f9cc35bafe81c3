//! Remote server access.
//!
//! A typed `reqwest` client for the sync/poll REST surface, behind a
//! minimal trait so the coordinator and the polling fallback are testable
//! without a server.

mod client;
mod error;
mod types;

use async_trait::async_trait;
use serde_json::Value;

pub use client::ApiClient;
pub use error::{ApiError, ApiResult};
pub use types::{ActivityPage, NotificationsPage, PushAck, RemoteNotification};

/// Host-supplied credential source.
///
/// The core never owns or refreshes tokens; it asks the host on every
/// request so rotation is transparent.
pub trait TokenProvider: Send + Sync {
    /// The current access token, if the user is authenticated.
    fn access_token(&self) -> Option<String>;
}

/// Fixed-token provider for tests and simple hosts.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider {
    token: Option<String>,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// A provider with no token (unauthenticated).
    pub fn empty() -> Self {
        Self { token: None }
    }
}

impl TokenProvider for StaticTokenProvider {
    fn access_token(&self) -> Option<String> {
        self.token.clone()
    }
}

/// Minimal remote API abstraction for testability.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Push one unsynced message; the ack carries the server id.
    async fn push_message(&self, body: &Value) -> ApiResult<PushAck>;
    /// Push one unsynced conversation.
    async fn push_conversation(&self, body: &Value) -> ApiResult<PushAck>;
    /// Push one unsynced tool result.
    async fn push_tool_result(&self, body: &Value) -> ApiResult<PushAck>;
    /// Push one local audit action.
    async fn push_audit_entry(&self, body: &Value) -> ApiResult<PushAck>;
    /// Propagate a local read-mark to the server copy of a notification.
    async fn mark_notification_read(&self, server_id: &str) -> ApiResult<PushAck>;
    /// Pull the authoritative user profile.
    async fn fetch_profile(&self) -> ApiResult<Value>;
    /// Pull recent notifications for the additive merge.
    async fn fetch_notifications(&self, limit: u32) -> ApiResult<Vec<RemoteNotification>>;
    /// Recent activity; shared by the sync pull and the polling fallback.
    async fn recent_activity(&self, limit: u32) -> ApiResult<Vec<Value>>;
}
