//! Direct-message delivery of reports.

use std::time::Duration;

use tracing::info;

use crate::rate_limit::RateLimiter;
use crate::slack::{ApiError, SlackApi};

pub struct Delivery {
    /// Pause after each delivered message.
    delay: Duration,
    dry_run: bool,
}

impl Delivery {
    pub fn new(delay: Duration, dry_run: bool) -> Self {
        Self { delay, dry_run }
    }

    /// DM `text` to `user_id`. Returns the conversation ID used.
    pub async fn send(
        &self,
        api: &dyn SlackApi,
        limiter: &RateLimiter,
        user_id: &str,
        user_name: &str,
        text: &str,
    ) -> Result<Option<String>, ApiError> {
        if self.dry_run {
            info!("[DRY RUN] Would send report to {user_name} ({user_id}):\n{text}");
            return Ok(None);
        }

        let conversation = limiter.call("conversations.open", || api.open_dm(user_id)).await?;
        limiter
            .call("chat.postMessage", || api.post_message(&conversation, text))
            .await?;
        info!("📨 Message sent to {user_name} (User ID: {user_id}) in {conversation}");

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(Some(conversation))
    }
}
