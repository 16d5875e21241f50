//! Per-channel inactivity measurement and tiering.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use crate::rate_limit::RateLimiter;
use crate::slack::{ApiError, Channel, HistoryMessage, SlackApi};

/// History entries fetched per channel.
pub const HISTORY_LIMIT: u32 = 100;

const MS_PER_DAY: f64 = 1000.0 * 60.0 * 60.0 * 24.0;

const JOIN_SUBTYPE: &str = "channel_join";

/// One inactivity tier: channels idle for more than `days` days.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Threshold {
    pub days: u32,
    pub emoji: String,
}

impl Threshold {
    pub fn new(days: u32, emoji: &str) -> Self {
        Self { days, emoji: emoji.to_string() }
    }

    /// "30+" for a 30 day threshold.
    pub fn label(&self) -> String {
        format!("{}+", self.days)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ThresholdError {
    Empty,
    NonPositive,
    NotDescending { previous: u32, next: u32 },
}

impl fmt::Display for ThresholdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "at least one inactivity threshold is required"),
            Self::NonPositive => write!(f, "inactivity thresholds must be positive"),
            Self::NotDescending { previous, next } => write!(
                f,
                "inactivity thresholds must be strictly descending ({previous} then {next})"
            ),
        }
    }
}

impl std::error::Error for ThresholdError {}

/// Thresholds ordered strictly descending by days.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds(Vec<Threshold>);

impl Thresholds {
    pub fn new(thresholds: Vec<Threshold>) -> Result<Self, ThresholdError> {
        if thresholds.is_empty() {
            return Err(ThresholdError::Empty);
        }
        if thresholds.iter().any(|t| t.days == 0) {
            return Err(ThresholdError::NonPositive);
        }
        for pair in thresholds.windows(2) {
            if pair[1].days >= pair[0].days {
                return Err(ThresholdError::NotDescending {
                    previous: pair[0].days,
                    next: pair[1].days,
                });
            }
        }
        Ok(Self(thresholds))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Threshold> {
        self.0.iter()
    }

    /// Highest threshold strictly below `days`, if any.
    pub fn tier_for(&self, days: f64) -> Option<&Threshold> {
        self.0.iter().find(|t| days > f64::from(t.days))
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self(vec![
            Threshold::new(100, ":black_circle:"),
            Threshold::new(60, ":red_circle:"),
            Threshold::new(30, ":large_orange_circle:"),
            Threshold::new(15, ":large_yellow_circle:"),
            Threshold::new(5, ":large_green_circle:"),
        ])
    }
}

/// Which history entries don't count as activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinFilter {
    /// Ignore only `channel_join` events.
    #[default]
    JoinOnly,
    /// Ignore every entry carrying a subtype (joins, topic changes, bot posts...).
    AllSubtypes,
}

impl JoinFilter {
    pub fn is_genuine(self, message: &HistoryMessage) -> bool {
        match (self, message.subtype.as_deref()) {
            (_, None) | (_, Some("")) => true,
            (JoinFilter::JoinOnly, Some(subtype)) => subtype != JOIN_SUBTYPE,
            (JoinFilter::AllSubtypes, Some(_)) => false,
        }
    }
}

/// Where a channel's inactivity was measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivitySource {
    LastMessage,
    Creation,
}

/// Result of classifying one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedChannel {
    pub channel_id: String,
    pub channel_name: String,
    pub days_inactive: f64,
    pub source: ActivitySource,
    /// Days of the matched threshold; None if below every threshold.
    pub tier: Option<u32>,
    pub line: String,
}

/// Days since the newest genuine message, or since creation if there is none.
///
/// `messages` is newest first, as `conversations.history` returns it.
pub fn days_since_activity(
    channel: &Channel,
    messages: &[HistoryMessage],
    now: DateTime<Utc>,
    filter: JoinFilter,
) -> (f64, ActivitySource) {
    let now_ms = now.timestamp_millis();
    let last_message_ms = messages
        .iter()
        .filter(|m| filter.is_genuine(m))
        .find_map(HistoryMessage::timestamp_ms);

    match last_message_ms {
        Some(ts) => ((now_ms - ts) as f64 / MS_PER_DAY, ActivitySource::LastMessage),
        None => {
            let created_ms = channel.created.saturating_mul(1000);
            ((now_ms - created_ms) as f64 / MS_PER_DAY, ActivitySource::Creation)
        }
    }
}

/// Report line: a deep link to the channel plus the rounded idle days.
pub fn render_line(channel: &Channel, days: f64) -> String {
    format!(
        "<slack://channel?id={}|#{}> - inactive for {} days",
        channel.id,
        channel.name,
        days.round() as i64
    )
}

/// Classify a channel from already fetched history.
pub fn classify_history(
    channel: &Channel,
    messages: &[HistoryMessage],
    now: DateTime<Utc>,
    thresholds: &Thresholds,
    filter: JoinFilter,
) -> ClassifiedChannel {
    let (days, source) = days_since_activity(channel, messages, now, filter);
    ClassifiedChannel {
        channel_id: channel.id.clone(),
        channel_name: channel.name.clone(),
        days_inactive: days,
        source,
        tier: thresholds.tier_for(days).map(|t| t.days),
        line: render_line(channel, days),
    }
}

/// Fetch recent history for `channel` and classify it.
pub async fn classify(
    api: &dyn SlackApi,
    limiter: &RateLimiter,
    channel: &Channel,
    now: DateTime<Utc>,
    thresholds: &Thresholds,
    filter: JoinFilter,
) -> Result<ClassifiedChannel, ApiError> {
    info!("📡 Fetching history for channel: {} (ID: {})", channel.name, channel.id);
    let messages = limiter
        .call("conversations.history", || api.history(&channel.id, HISTORY_LIMIT))
        .await?;

    let classified = classify_history(channel, &messages, now, thresholds, filter);
    let rounded = classified.days_inactive.round() as i64;
    match classified.source {
        ActivitySource::LastMessage => {
            info!("📅 Last message in {} was {rounded} days ago", channel.name)
        }
        ActivitySource::Creation => {
            info!("📅 No messages found in {}, channel created {rounded} days ago", channel.name)
        }
    }
    Ok(classified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeSlack, channel, message};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn days_ago(days: i64) -> i64 {
        (now() - Duration::days(days)).timestamp()
    }

    #[test]
    fn test_thresholds_must_descend() {
        let err =
            Thresholds::new(vec![Threshold::new(5, "a"), Threshold::new(30, "b")]).unwrap_err();
        assert_eq!(err, ThresholdError::NotDescending { previous: 5, next: 30 });

        let err =
            Thresholds::new(vec![Threshold::new(30, "a"), Threshold::new(30, "b")]).unwrap_err();
        assert!(matches!(err, ThresholdError::NotDescending { .. }));
    }

    #[test]
    fn test_thresholds_reject_empty_and_zero() {
        assert_eq!(Thresholds::new(vec![]).unwrap_err(), ThresholdError::Empty);
        assert_eq!(
            Thresholds::new(vec![Threshold::new(10, "a"), Threshold::new(0, "b")]).unwrap_err(),
            ThresholdError::NonPositive
        );
    }

    #[test]
    fn test_tier_for_picks_highest_exceeded() {
        let thresholds = Thresholds::default();
        assert_eq!(thresholds.tier_for(150.0).map(|t| t.days), Some(100));
        assert_eq!(thresholds.tier_for(100.5).map(|t| t.days), Some(100));
        assert_eq!(thresholds.tier_for(40.0).map(|t| t.days), Some(30));
        assert_eq!(thresholds.tier_for(5.01).map(|t| t.days), Some(5));
    }

    #[test]
    fn test_tier_boundary_is_strict() {
        let thresholds = Thresholds::default();
        // Exactly 30 days is not "more than 30".
        assert_eq!(thresholds.tier_for(30.0).map(|t| t.days), Some(15));
        assert_eq!(thresholds.tier_for(5.0), None);
        assert_eq!(thresholds.tier_for(0.0), None);
    }

    #[test]
    fn test_label() {
        assert_eq!(Threshold::new(30, ":x:").label(), "30+");
    }

    #[test]
    fn test_join_filter_join_only() {
        let join = message(1, Some("channel_join"));
        let topic = message(1, Some("channel_topic"));
        let plain = message(1, None);
        assert!(!JoinFilter::JoinOnly.is_genuine(&join));
        assert!(JoinFilter::JoinOnly.is_genuine(&topic));
        assert!(JoinFilter::JoinOnly.is_genuine(&plain));
    }

    #[test]
    fn test_join_filter_all_subtypes() {
        assert!(!JoinFilter::AllSubtypes.is_genuine(&message(1, Some("channel_join"))));
        assert!(!JoinFilter::AllSubtypes.is_genuine(&message(1, Some("channel_topic"))));
        assert!(JoinFilter::AllSubtypes.is_genuine(&message(1, None)));
    }

    #[test]
    fn test_uses_most_recent_genuine_message() {
        let c = channel("C1", "general", "U1", days_ago(400));
        let history = vec![
            message(days_ago(2), Some("channel_join")),
            message(days_ago(40), None),
            message(days_ago(90), None),
        ];
        let (days, source) = days_since_activity(&c, &history, now(), JoinFilter::JoinOnly);
        assert_eq!(source, ActivitySource::LastMessage);
        assert!((days - 40.0).abs() < 0.01);
    }

    #[test]
    fn test_falls_back_to_creation_when_only_joins() {
        let c = channel("C2", "quiet", "U1", days_ago(10));
        let history = vec![message(days_ago(1), Some("channel_join"))];
        let (days, source) = days_since_activity(&c, &history, now(), JoinFilter::JoinOnly);
        assert_eq!(source, ActivitySource::Creation);
        assert!((days - 10.0).abs() < 0.01);
    }

    #[test]
    fn test_filter_variant_changes_result() {
        let c = channel("C3", "topic-only", "U1", days_ago(50));
        let history = vec![message(days_ago(3), Some("channel_topic"))];

        let (days, _) = days_since_activity(&c, &history, now(), JoinFilter::JoinOnly);
        assert!((days - 3.0).abs() < 0.01);

        let (days, source) = days_since_activity(&c, &history, now(), JoinFilter::AllSubtypes);
        assert_eq!(source, ActivitySource::Creation);
        assert!((days - 50.0).abs() < 0.01);
    }

    #[test]
    fn test_classify_history_renders_line() {
        let c = channel("C1", "support-acme", "U1", days_ago(400));
        let history = vec![message(days_ago(40), None)];
        let classified =
            classify_history(&c, &history, now(), &Thresholds::default(), JoinFilter::JoinOnly);
        assert_eq!(classified.tier, Some(30));
        assert_eq!(
            classified.line,
            "<slack://channel?id=C1|#support-acme> - inactive for 40 days"
        );
    }

    #[test]
    fn test_classify_history_unclassified_below_floor() {
        let c = channel("C2", "fresh", "U1", days_ago(3));
        let classified =
            classify_history(&c, &[], now(), &Thresholds::default(), JoinFilter::JoinOnly);
        assert_eq!(classified.tier, None);
    }

    #[tokio::test]
    async fn test_classify_fetches_history() {
        let slack = FakeSlack::new();
        slack.set_history("C1", vec![message(days_ago(65), None)]);
        let c = channel("C1", "old", "U1", days_ago(500));

        let classified = classify(
            &slack,
            &RateLimiter::default(),
            &c,
            now(),
            &Thresholds::default(),
            JoinFilter::JoinOnly,
        )
        .await
        .unwrap();

        assert_eq!(classified.tier, Some(60));
        assert_eq!(slack.calls("conversations.history"), 1);
    }

    #[tokio::test]
    async fn test_classify_propagates_history_error() {
        let slack = FakeSlack::new();
        slack.fail_history("C1", ApiError::Api("channel_not_found".into()));
        let c = channel("C1", "gone", "U1", days_ago(500));

        let result = classify(
            &slack,
            &RateLimiter::default(),
            &c,
            now(),
            &Thresholds::default(),
            JoinFilter::JoinOnly,
        )
        .await;

        assert_eq!(result.unwrap_err(), ApiError::Api("channel_not_found".into()));
    }
}
