//! Full channel listing over cursor pagination.

use tracing::{debug, info};

use crate::rate_limit::RateLimiter;
use crate::slack::{ApiError, Channel, SlackApi};

/// Channels requested per `conversations.list` page.
pub const PAGE_SIZE: u32 = 1000;

/// Every public, non-archived channel, in the order Slack returns them.
pub async fn list_all_channels(
    api: &dyn SlackApi,
    limiter: &RateLimiter,
) -> Result<Vec<Channel>, ApiError> {
    info!("📡 Fetching list of all conversations...");

    let mut channels = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0;

    loop {
        let page = limiter
            .call("conversations.list", || api.list_channels(cursor.as_deref(), PAGE_SIZE))
            .await?;
        pages += 1;
        debug!("Page {pages}: {} channels", page.channels.len());
        channels.extend(page.channels);

        match page.next_cursor {
            Some(next) if !next.is_empty() => cursor = Some(next),
            _ => break,
        }
    }

    info!("✅ Retrieved {} channels from Slack API ({pages} page(s))", channels.len());
    Ok(channels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeSlack, channel};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concatenates_pages_in_order() {
        let slack = FakeSlack::new();
        slack.add_page(vec![channel("C1", "a", "U1", 0), channel("C2", "b", "U1", 0)]);
        slack.add_page(vec![channel("C3", "c", "U2", 0)]);
        slack.add_page(vec![channel("C4", "d", "U3", 0), channel("C5", "e", "U1", 0)]);

        let channels = list_all_channels(&slack, &RateLimiter::default()).await.unwrap();
        let ids: Vec<&str> = channels.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["C1", "C2", "C3", "C4", "C5"]);
        assert_eq!(slack.calls("conversations.list"), 3);
    }

    #[tokio::test]
    async fn test_empty_workspace() {
        let slack = FakeSlack::new();
        let channels = list_all_channels(&slack, &RateLimiter::default()).await.unwrap();
        assert!(channels.is_empty());
        assert_eq!(slack.calls("conversations.list"), 1);
    }

    #[tokio::test]
    async fn test_throttled_page_is_retried() {
        let slack = FakeSlack::new();
        slack.add_page(vec![channel("C1", "a", "U1", 0)]);
        slack.throttle("conversations.list", &[Duration::from_millis(1)]);

        let channels = list_all_channels(&slack, &RateLimiter::default()).await.unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(slack.calls("conversations.list"), 2);
    }

    #[tokio::test]
    async fn test_listing_error_propagates() {
        let slack = FakeSlack::new();
        slack.fail_list(ApiError::Api("invalid_auth".into()));
        let err = list_all_channels(&slack, &RateLimiter::default()).await.unwrap_err();
        assert_eq!(err, ApiError::Api("invalid_auth".into()));
    }
}
