//! Slack Web API seam.
//!
//! The auditor only talks to Slack through [`SlackApi`], so tests can swap in
//! an in-memory workspace while production uses [`SlackClient`].

pub mod client;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

pub use client::SlackClient;

/// A public channel as returned by `conversations.list`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// User ID of whoever created the channel.
    #[serde(default)]
    pub creator: String,
    /// Creation time, seconds since epoch.
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub is_member: bool,
}

/// One entry of `conversations.history`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct HistoryMessage {
    /// Fractional seconds since epoch, string-encoded ("1716712345.001200").
    pub ts: String,
    #[serde(default)]
    pub subtype: Option<String>,
}

impl HistoryMessage {
    /// Milliseconds since epoch, or None if `ts` isn't a number.
    pub fn timestamp_ms(&self) -> Option<i64> {
        let secs: f64 = self.ts.trim().parse().ok()?;
        if !secs.is_finite() {
            return None;
        }
        Some((secs * 1000.0).round() as i64)
    }
}

/// Name fields from `users.info`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct UserInfo {
    /// Short handle.
    pub name: String,
    #[serde(default)]
    pub real_name: Option<String>,
}

impl UserInfo {
    /// Real name if set, otherwise the handle.
    pub fn preferred_name(&self) -> &str {
        match self.real_name.as_deref() {
            Some(real) if !real.trim().is_empty() => real,
            _ => &self.name,
        }
    }
}

/// One page of the channel list.
#[derive(Debug, Clone, Default)]
pub struct ChannelPage {
    pub channels: Vec<Channel>,
    /// Continuation cursor; None means this was the last page.
    pub next_cursor: Option<String>,
}

/// Result of `auth.test` for the bot token.
#[derive(Debug, Clone)]
pub struct BotIdentity {
    pub user_id: String,
    /// Granted OAuth scopes, when Slack reports them.
    pub scopes: Option<Vec<String>>,
}

/// Errors returned by Slack calls.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    /// Throttled; retry after the given delay.
    RateLimited { retry_after: Duration },
    /// Transport failure or unexpected HTTP status.
    Http(String),
    /// Slack answered `ok: false` with this error code.
    Api(String),
    /// Response body didn't match the expected shape.
    Parse(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::RateLimited { retry_after } => {
                write!(f, "rate limited (retry after {}s)", retry_after.as_secs_f64())
            }
            ApiError::Http(e) => write!(f, "HTTP error: {e}"),
            ApiError::Api(e) => write!(f, "Slack API error: {e}"),
            ApiError::Parse(e) => write!(f, "Parse error: {e}"),
        }
    }
}

impl std::error::Error for ApiError {}

/// The Slack operations the auditor depends on.
///
/// Implementations report throttling as [`ApiError::RateLimited`] and leave
/// retrying to [`crate::rate_limit::RateLimiter`].
#[async_trait]
pub trait SlackApi: Send + Sync {
    /// One page of public, non-archived channels.
    async fn list_channels(
        &self,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<ChannelPage, ApiError>;

    /// Most recent messages first.
    async fn history(&self, channel_id: &str, limit: u32) -> Result<Vec<HistoryMessage>, ApiError>;

    async fn user_info(&self, user_id: &str) -> Result<UserInfo, ApiError>;

    /// User IDs currently in the channel.
    async fn channel_members(&self, channel_id: &str) -> Result<Vec<String>, ApiError>;

    async fn auth_test(&self) -> Result<BotIdentity, ApiError>;

    async fn join(&self, channel_id: &str) -> Result<(), ApiError>;

    /// Open (or find) the DM conversation with a user and return its ID.
    async fn open_dm(&self, user_id: &str) -> Result<String, ApiError>;

    async fn post_message(&self, channel_id: &str, text: &str) -> Result<(), ApiError>;
}
