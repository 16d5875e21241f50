//! Slack Web API client using reqwest.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{ApiError, BotIdentity, Channel, ChannelPage, HistoryMessage, SlackApi, UserInfo};

const DEFAULT_BASE_URL: &str = "https://slack.com/api";

/// Used when a throttled response carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 1;

pub struct SlackClient {
    token: String,
    base_url: String,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    channels: Vec<Channel>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    messages: Vec<HistoryMessage>,
}

#[derive(Deserialize)]
struct UserResponse {
    user: UserInfo,
}

#[derive(Deserialize)]
struct MembersResponse {
    #[serde(default)]
    members: Vec<String>,
}

#[derive(Deserialize)]
struct AuthResponse {
    user_id: String,
}

#[derive(Deserialize)]
struct OpenResponse {
    channel: OpenedChannel,
}

#[derive(Deserialize)]
struct OpenedChannel {
    id: String,
}

impl SlackClient {
    pub fn new(token: String) -> Self {
        Self::with_base_url(token, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(token: String, base_url: String) -> Self {
        Self {
            token,
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// POST a form-encoded Web API call and return headers plus the JSON body.
    async fn call_raw(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<(HeaderMap, serde_json::Value), ApiError> {
        debug!("Slack call: {method}");
        let response = self
            .http
            .post(format!("{}/{}", self.base_url, method))
            .bearer_auth(&self.token)
            .form(params)
            .send()
            .await
            .map_err(|e| ApiError::Http(e.to_string()))?;

        let status = response.status();
        let headers = response.headers().clone();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(rate_limited(&headers));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(ApiError::Http(format!("{status}: {body}")));
        }

        let payload: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| ApiError::Parse(e.to_string()))?;

        if payload.get("ok") != Some(&serde_json::Value::Bool(true)) {
            let code = payload
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown_error");
            if code == "ratelimited" {
                return Err(rate_limited(&headers));
            }
            return Err(ApiError::Api(code.to_string()));
        }

        Ok((headers, payload))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let (_, payload) = self.call_raw(method, params).await?;
        serde_json::from_value(payload).map_err(|e| ApiError::Parse(format!("{method}: {e}")))
    }
}

fn rate_limited(headers: &HeaderMap) -> ApiError {
    let retry_after = headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after)
        .unwrap_or(Duration::from_secs(DEFAULT_RETRY_AFTER_SECS));
    ApiError::RateLimited { retry_after }
}

/// Delay from a `Retry-After` value in seconds, fractions kept.
fn parse_retry_after(value: &str) -> Option<Duration> {
    let secs: f64 = value.trim().parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Some(Duration::from_secs_f64(secs))
}

/// Comma separated `x-oauth-scopes` header.
fn parse_scopes(headers: &HeaderMap) -> Option<Vec<String>> {
    let raw = headers.get("x-oauth-scopes")?.to_str().ok()?;
    let scopes: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    if scopes.is_empty() { None } else { Some(scopes) }
}

#[async_trait]
impl SlackApi for SlackClient {
    async fn list_channels(
        &self,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<ChannelPage, ApiError> {
        let mut params = vec![
            ("types", "public_channel".to_string()),
            ("exclude_archived", "true".to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor.to_string()));
        }

        let response: ListResponse = self.call("conversations.list", &params).await?;
        let next_cursor = response
            .response_metadata
            .and_then(|m| m.next_cursor)
            .filter(|c| !c.is_empty());

        Ok(ChannelPage { channels: response.channels, next_cursor })
    }

    async fn history(&self, channel_id: &str, limit: u32) -> Result<Vec<HistoryMessage>, ApiError> {
        let params = [("channel", channel_id.to_string()), ("limit", limit.to_string())];
        let response: HistoryResponse = self.call("conversations.history", &params).await?;
        Ok(response.messages)
    }

    async fn user_info(&self, user_id: &str) -> Result<UserInfo, ApiError> {
        let response: UserResponse =
            self.call("users.info", &[("user", user_id.to_string())]).await?;
        Ok(response.user)
    }

    async fn channel_members(&self, channel_id: &str) -> Result<Vec<String>, ApiError> {
        let params = [("channel", channel_id.to_string()), ("limit", "1000".to_string())];
        let response: MembersResponse = self.call("conversations.members", &params).await?;
        Ok(response.members)
    }

    async fn auth_test(&self) -> Result<BotIdentity, ApiError> {
        let (headers, payload) = self.call_raw("auth.test", &[]).await?;
        let auth: AuthResponse =
            serde_json::from_value(payload)
                .map_err(|e| ApiError::Parse(format!("auth.test: {e}")))?;
        Ok(BotIdentity { user_id: auth.user_id, scopes: parse_scopes(&headers) })
    }

    async fn join(&self, channel_id: &str) -> Result<(), ApiError> {
        self.call_raw("conversations.join", &[("channel", channel_id.to_string())])
            .await
            .map(|_| ())
    }

    async fn open_dm(&self, user_id: &str) -> Result<String, ApiError> {
        let response: OpenResponse = self
            .call("conversations.open", &[("users", user_id.to_string())])
            .await?;
        Ok(response.channel.id)
    }

    async fn post_message(&self, channel_id: &str, text: &str) -> Result<(), ApiError> {
        let params = [("channel", channel_id.to_string()), ("text", text.to_string())];
        self.call_raw("chat.postMessage", &params).await.map(|_| ())
    }
}
