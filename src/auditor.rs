//! One audit pass: list channels, keep the ones support users created,
//! make sure the bot can read them, and DM each creator a digest.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::activity::{self, JoinFilter, Thresholds};
use crate::cache::NegativeCache;
use crate::channels::list_all_channels;
use crate::delivery::Delivery;
use crate::rate_limit::RateLimiter;
use crate::report::{ReportTemplate, build_report};
use crate::slack::{ApiError, Channel, SlackApi};
use crate::users::{FallbackPolicy, NameResolver};

/// Everything a pass needs besides the Slack connection.
#[derive(Debug, Clone)]
pub struct AuditSettings {
    pub support_users: HashSet<String>,
    pub thresholds: Thresholds,
    pub join_filter: JoinFilter,
    pub template: ReportTemplate,
    pub timezone: Tz,
    pub fallback_policy: FallbackPolicy,
    /// Pause after each delivered report.
    pub message_delay: Duration,
    pub dry_run: bool,
    /// Don't DM users whose report has no inactive channel.
    pub skip_empty_reports: bool,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            support_users: HashSet::new(),
            thresholds: Thresholds::default(),
            join_filter: JoinFilter::default(),
            template: ReportTemplate::default(),
            timezone: chrono_tz::Europe::Paris,
            fallback_policy: FallbackPolicy::default(),
            message_delay: Duration::from_millis(1000),
            dry_run: false,
            skip_empty_reports: false,
        }
    }
}

/// Counters for a completed pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub channels_listed: usize,
    pub support_channels: usize,
    pub creators: usize,
    /// Reports delivered (or logged, in dry-run mode).
    pub reports_sent: usize,
    pub creators_failed: usize,
    /// Negative cache entries dropped by the end-of-pass reset.
    pub non_support_cleared: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PassOutcome {
    Completed(PassSummary),
    /// Channel listing failed; nothing was sent.
    Aborted(ApiError),
    /// Another pass was still running.
    Skipped,
}

/// Support-created channels keyed by creator, in first-seen order.
type CreatorGroups = Vec<(String, Vec<Channel>)>;

pub struct Auditor {
    api: Arc<dyn SlackApi>,
    limiter: RateLimiter,
    settings: AuditSettings,
    delivery: Delivery,
    negative_cache: Mutex<NegativeCache>,
    names: NameResolver,
    running: AtomicBool,
}

/// Clears the running flag however the pass ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Auditor {
    pub fn new(api: Arc<dyn SlackApi>, limiter: RateLimiter, settings: AuditSettings) -> Self {
        let delivery = Delivery::new(settings.message_delay, settings.dry_run);
        let names = NameResolver::new(settings.fallback_policy);
        Self {
            api,
            limiter,
            settings,
            delivery,
            negative_cache: Mutex::new(NegativeCache::new()),
            names,
            running: AtomicBool::new(false),
        }
    }

    pub async fn run_pass(&self) -> PassOutcome {
        self.run_pass_at(Utc::now()).await
    }

    /// Run a full pass measuring inactivity relative to `now`.
    pub async fn run_pass_at(&self, now: DateTime<Utc>) -> PassOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("⏳ Previous audit pass still running, skipping this one");
            return PassOutcome::Skipped;
        }
        let _running = RunningGuard(&self.running);

        info!("🚀 [START] Audit pass");
        let mut outcome = match self.audit(now).await {
            Ok(summary) => PassOutcome::Completed(summary),
            Err(e) => {
                error!("❌ Error while retrieving channel list: {e}");
                PassOutcome::Aborted(e)
            }
        };

        let cleared = {
            let mut cache = self.negative_cache.lock().await;
            let size = cache.size();
            cache.reset();
            size
        };

        if let PassOutcome::Completed(ref mut summary) = outcome {
            summary.non_support_cleared = cleared;
            info!(
                "✅ [END] Audit pass: {} channels, {} support channels, {} creators, \
                 {} reports sent, {} failed",
                summary.channels_listed,
                summary.support_channels,
                summary.creators,
                summary.reports_sent,
                summary.creators_failed
            );
        }
        outcome
    }

    pub async fn negative_cache_size(&self) -> usize {
        self.negative_cache.lock().await.size()
    }

    async fn audit(&self, now: DateTime<Utc>) -> Result<PassSummary, ApiError> {
        let channels = list_all_channels(self.api.as_ref(), &self.limiter).await?;

        let mut summary = PassSummary { channels_listed: channels.len(), ..Default::default() };

        let groups = self.group_by_creator(channels).await;
        summary.support_channels = groups.iter().map(|(_, c)| c.len()).sum();
        summary.creators = groups.len();
        info!("📌 Found {} unique creators.", groups.len());

        // Looked up once, on first use.
        let mut bot_user_id: Option<String> = None;

        for (creator_id, channels) in &groups {
            info!("📨 Processing {} channels for creator: {creator_id}", channels.len());
            match self.process_creator(creator_id, channels, now, &mut bot_user_id).await {
                Ok(true) => summary.reports_sent += 1,
                Ok(false) => {}
                Err(e) => {
                    error!("❌ Error processing channels for user {creator_id}: {e}");
                    summary.creators_failed += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Keep channels whose creator is a support user; remember the rest.
    async fn group_by_creator(&self, channels: Vec<Channel>) -> CreatorGroups {
        let mut cache = self.negative_cache.lock().await;
        let mut groups: CreatorGroups = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for channel in channels {
            if cache.has(&channel.id) {
                info!(
                    "⏭️ Skipping channel {} (ID: {}) - previously marked as non-support",
                    channel.name, channel.id
                );
                continue;
            }

            if !self.settings.support_users.contains(&channel.creator) {
                cache.add(&channel.id);
                info!(
                    "🚫 Channel {} (ID: {}) is not created by a support member. \
                     Marked as non-support.",
                    channel.name, channel.id
                );
                continue;
            }

            let creator_name = self
                .names
                .resolve(self.api.as_ref(), &self.limiter, &channel.creator)
                .await;
            info!(
                "🔍 Channel {} (ID: {}) belongs to {creator_name} (ID: {})",
                channel.name, channel.id, channel.creator
            );

            let slot = *index.entry(channel.creator.clone()).or_insert_with(|| {
                groups.push((channel.creator.clone(), Vec::new()));
                groups.len() - 1
            });
            groups[slot].1.push(channel);
        }

        groups
    }

    /// Returns whether a report went out.
    async fn process_creator(
        &self,
        creator_id: &str,
        channels: &[Channel],
        now: DateTime<Utc>,
        bot_user_id: &mut Option<String>,
    ) -> Result<bool, ApiError> {
        let user_name = self.names.resolve(self.api.as_ref(), &self.limiter, creator_id).await;
        info!("👤 Preparing report for: {user_name} (ID: {creator_id})");

        let mut readable = Vec::with_capacity(channels.len());
        for channel in channels {
            if self.ensure_membership(channel, bot_user_id).await {
                readable.push(channel);
            }
        }

        info!("📊 Gathering activity report for user: {creator_id}");
        let mut classified = Vec::with_capacity(readable.len());
        for channel in readable {
            match activity::classify(
                self.api.as_ref(),
                &self.limiter,
                channel,
                now,
                &self.settings.thresholds,
                self.settings.join_filter,
            )
            .await
            {
                Ok(c) => classified.push(c),
                Err(e) => error!("❌ Error retrieving history for channel {}: {e}", channel.name),
            }
        }

        let report = build_report(
            &user_name,
            &classified,
            &self.settings.thresholds,
            now.with_timezone(&self.settings.timezone),
        );
        if report.is_empty() && self.settings.skip_empty_reports {
            info!("💤 No inactive channels for {user_name}, report not sent");
            return Ok(false);
        }

        let text = report.render(&self.settings.template);
        self.delivery
            .send(self.api.as_ref(), &self.limiter, creator_id, &user_name, &text)
            .await?;
        info!(
            "✅ [END] Activity report sent to {creator_id} ({} channels)",
            report.channel_count()
        );
        Ok(true)
    }

    /// Make sure the bot can read `channel`, joining if needed.
    ///
    /// `false` means the join failed and the channel should be skipped.
    async fn ensure_membership(&self, channel: &Channel, bot_user_id: &mut Option<String>) -> bool {
        info!("🔎 Checking if bot is in channel: {} (ID: {})", channel.name, channel.id);

        let present = match self.is_bot_in_channel(channel, bot_user_id).await {
            Ok(present) => present,
            Err(e) => {
                warn!("❌ Error checking bot membership in channel {}: {e}", channel.id);
                false
            }
        };

        if present {
            info!("✔️ Bot already in channel: {}", channel.name);
            return true;
        }

        match self
            .limiter
            .call("conversations.join", || self.api.join(&channel.id))
            .await
        {
            Ok(()) => {
                info!("➕ Bot successfully joined channel: {} (ID: {})", channel.name, channel.id);
                true
            }
            Err(e) => {
                warn!("❌ Bot could not join channel {} (ID: {}): {e}", channel.name, channel.id);
                false
            }
        }
    }

    /// The bot's own ID is looked up on first use and kept for the pass.
    /// A failed lookup leaves it unset so the next channel tries again.
    async fn is_bot_in_channel(
        &self,
        channel: &Channel,
        bot_user_id: &mut Option<String>,
    ) -> Result<bool, ApiError> {
        let bot_id = match bot_user_id.clone() {
            Some(id) => id,
            None => {
                let identity = self.limiter.call("auth.test", || self.api.auth_test()).await?;
                *bot_user_id = Some(identity.user_id.clone());
                identity.user_id
            }
        };

        let members = self
            .limiter
            .call("conversations.members", || self.api.channel_members(&channel.id))
            .await?;
        Ok(members.iter().any(|m| *m == bot_id))
    }
}
