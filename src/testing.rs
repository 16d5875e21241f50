//! In-memory Slack workspace for tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::slack::{ApiError, BotIdentity, Channel, ChannelPage, HistoryMessage, SlackApi, UserInfo};

pub const BOT_USER_ID: &str = "UBOT";

#[derive(Default)]
struct State {
    pages: Vec<Vec<Channel>>,
    list_error: Option<ApiError>,
    histories: HashMap<String, Vec<HistoryMessage>>,
    history_errors: HashMap<String, ApiError>,
    users: HashMap<String, UserInfo>,
    members: HashMap<String, HashSet<String>>,
    join_errors: HashMap<String, ApiError>,
    post_error: Option<ApiError>,
    auth_error: Option<ApiError>,
    throttles: HashMap<String, VecDeque<Duration>>,
    calls: HashMap<String, usize>,
    joined: Vec<String>,
    sent: Vec<(String, String)>,
}

/// Fake [`SlackApi`] backed by plain maps.
///
/// Channels without configured history have none; users not added fail
/// `users.info` with `user_not_found`.
#[derive(Default)]
pub struct FakeSlack {
    state: Mutex<State>,
}

pub fn channel(id: &str, name: &str, creator: &str, created: i64) -> Channel {
    Channel {
        id: id.to_string(),
        name: name.to_string(),
        creator: creator.to_string(),
        created,
        is_member: false,
    }
}

pub fn message(ts: i64, subtype: Option<&str>) -> HistoryMessage {
    HistoryMessage {
        ts: format!("{ts}.000100"),
        subtype: subtype.map(String::from),
    }
}

impl FakeSlack {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_page(&self, channels: Vec<Channel>) {
        self.state().pages.push(channels);
    }

    pub fn fail_list(&self, error: ApiError) {
        self.state().list_error = Some(error);
    }

    pub fn set_history(&self, channel_id: &str, messages: Vec<HistoryMessage>) {
        self.state().histories.insert(channel_id.to_string(), messages);
    }

    pub fn fail_history(&self, channel_id: &str, error: ApiError) {
        self.state().history_errors.insert(channel_id.to_string(), error);
    }

    pub fn add_user(&self, user_id: &str, name: &str, real_name: Option<&str>) {
        self.state().users.insert(
            user_id.to_string(),
            UserInfo { name: name.to_string(), real_name: real_name.map(String::from) },
        );
    }

    /// Put the bot in the channel up front.
    pub fn add_bot_to(&self, channel_id: &str) {
        self.state()
            .members
            .entry(channel_id.to_string())
            .or_default()
            .insert(BOT_USER_ID.to_string());
    }

    pub fn fail_join(&self, channel_id: &str, error: ApiError) {
        self.state().join_errors.insert(channel_id.to_string(), error);
    }

    pub fn fail_auth(&self, error: ApiError) {
        self.state().auth_error = Some(error);
    }

    pub fn fail_post(&self, error: ApiError) {
        self.state().post_error = Some(error);
    }

    /// Make the next calls to `method` fail with these retry-after delays.
    pub fn throttle(&self, method: &str, delays: &[Duration]) {
        self.state()
            .throttles
            .entry(method.to_string())
            .or_default()
            .extend(delays.iter().copied());
    }

    pub fn calls(&self, method: &str) -> usize {
        self.state().calls.get(method).copied().unwrap_or(0)
    }

    pub fn joined(&self) -> Vec<String> {
        self.state().joined.clone()
    }

    /// `(conversation_id, text)` for every posted message.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.state().sent.clone()
    }

    fn enter(&self, method: &str) -> Result<(), ApiError> {
        let mut state = self.state();
        *state.calls.entry(method.to_string()).or_insert(0) += 1;
        if let Some(delay) = state.throttles.get_mut(method).and_then(|q| q.pop_front()) {
            return Err(ApiError::RateLimited { retry_after: delay });
        }
        Ok(())
    }
}

#[async_trait]
impl SlackApi for FakeSlack {
    async fn list_channels(
        &self,
        cursor: Option<&str>,
        _limit: u32,
    ) -> Result<ChannelPage, ApiError> {
        self.enter("conversations.list")?;
        let state = self.state();
        if let Some(ref e) = state.list_error {
            return Err(e.clone());
        }
        let index = match cursor {
            None => 0,
            Some(c) => c
                .strip_prefix("page-")
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| ApiError::Api("invalid_cursor".into()))?,
        };
        let channels = state.pages.get(index).cloned().unwrap_or_default();
        let next_cursor = (index + 1 < state.pages.len()).then(|| format!("page-{}", index + 1));
        Ok(ChannelPage { channels, next_cursor })
    }

    async fn history(&self, channel_id: &str, limit: u32) -> Result<Vec<HistoryMessage>, ApiError> {
        self.enter("conversations.history")?;
        let state = self.state();
        if let Some(e) = state.history_errors.get(channel_id) {
            return Err(e.clone());
        }
        let messages = state.histories.get(channel_id).cloned().unwrap_or_default();
        Ok(messages.into_iter().take(limit as usize).collect())
    }

    async fn user_info(&self, user_id: &str) -> Result<UserInfo, ApiError> {
        self.enter("users.info")?;
        self.state()
            .users
            .get(user_id)
            .cloned()
            .ok_or_else(|| ApiError::Api("user_not_found".into()))
    }

    async fn channel_members(&self, channel_id: &str) -> Result<Vec<String>, ApiError> {
        self.enter("conversations.members")?;
        Ok(self
            .state()
            .members
            .get(channel_id)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn auth_test(&self) -> Result<BotIdentity, ApiError> {
        self.enter("auth.test")?;
        if let Some(ref e) = self.state().auth_error {
            return Err(e.clone());
        }
        Ok(BotIdentity { user_id: BOT_USER_ID.to_string(), scopes: None })
    }

    async fn join(&self, channel_id: &str) -> Result<(), ApiError> {
        self.enter("conversations.join")?;
        let mut state = self.state();
        if let Some(e) = state.join_errors.get(channel_id) {
            return Err(e.clone());
        }
        state
            .members
            .entry(channel_id.to_string())
            .or_default()
            .insert(BOT_USER_ID.to_string());
        state.joined.push(channel_id.to_string());
        Ok(())
    }

    async fn open_dm(&self, user_id: &str) -> Result<String, ApiError> {
        self.enter("conversations.open")?;
        Ok(format!("D{user_id}"))
    }

    async fn post_message(&self, channel_id: &str, text: &str) -> Result<(), ApiError> {
        self.enter("chat.postMessage")?;
        let mut state = self.state();
        if let Some(ref e) = state.post_error {
            return Err(e.clone());
        }
        state.sent.push((channel_id.to_string(), text.to_string()));
        Ok(())
    }
}
