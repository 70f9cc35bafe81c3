//! HTTP client for the sync and polling REST surface.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;

use super::error::{ApiError, ApiResult};
use super::types::{ActivityPage, NotificationsPage, PushAck, RemoteNotification};
use super::{RemoteApi, TokenProvider};

/// Client for the remote consistency endpoints.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl ApiClient {
    /// Create a new API client.
    pub fn new(base_url: impl Into<String>, tokens: Arc<dyn TokenProvider>) -> ApiResult<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
        })
    }

    /// Base URL the client was configured with.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorized(&self, builder: RequestBuilder) -> ApiResult<RequestBuilder> {
        let token = self.tokens.access_token().ok_or(ApiError::Unauthorized)?;
        Ok(builder.header("Authorization", format!("Bearer {}", token)))
    }

    async fn post_record(&self, path: &str, body: &Value) -> ApiResult<PushAck> {
        let url = format!("{}{}", self.base_url, path);
        let request = self.authorized(self.client.post(&url))?.json(body);
        let response = request.send().await?;
        handle_response(response).await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let request = self.authorized(self.client.get(&url))?;
        let response = request.send().await?;
        handle_response(response).await
    }
}

#[async_trait]
impl RemoteApi for ApiClient {
    async fn push_message(&self, body: &Value) -> ApiResult<PushAck> {
        self.post_record("/messages", body).await
    }

    async fn push_conversation(&self, body: &Value) -> ApiResult<PushAck> {
        self.post_record("/conversations", body).await
    }

    async fn push_tool_result(&self, body: &Value) -> ApiResult<PushAck> {
        self.post_record("/tool-results", body).await
    }

    async fn push_audit_entry(&self, body: &Value) -> ApiResult<PushAck> {
        self.post_record("/audit/sync", body).await
    }

    async fn mark_notification_read(&self, server_id: &str) -> ApiResult<PushAck> {
        let url = format!("{}/notifications/{}/read", self.base_url, server_id);
        let request = self.authorized(self.client.patch(&url))?;
        let response = request.send().await?;

        let status = response.status();
        if status.is_success() {
            // The read-receipt endpoint has no body worth parsing.
            Ok(PushAck::default())
        } else {
            Err(error_for_status(status, response).await)
        }
    }

    async fn fetch_profile(&self) -> ApiResult<Value> {
        self.get_json("/user/profile").await
    }

    async fn fetch_notifications(&self, limit: u32) -> ApiResult<Vec<RemoteNotification>> {
        let page: NotificationsPage = self
            .get_json(&format!("/notifications?limit={}", limit))
            .await?;
        Ok(page.notifications)
    }

    async fn recent_activity(&self, limit: u32) -> ApiResult<Vec<Value>> {
        let page: ActivityPage = self
            .get_json(&format!("/dashboard/activity?limit={}", limit))
            .await?;
        Ok(page.activities)
    }
}

/// Parse a successful response body, or map the status to an error.
async fn handle_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> ApiResult<T> {
    let status = response.status();
    if status.is_success() {
        response
            .json()
            .await
            .map_err(|e| ApiError::Parse(format!("failed to parse response: {}", e)))
    } else {
        Err(error_for_status(status, response).await)
    }
}

async fn error_for_status(status: StatusCode, response: reqwest::Response) -> ApiError {
    if status == StatusCode::UNAUTHORIZED {
        return ApiError::Unauthorized;
    }
    let message = response.text().await.unwrap_or_default();
    ApiError::Api {
        status: status.as_u16(),
        message,
    }
}
