use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;

use inactivity_bot::config::{Config, LogRotation};
use inactivity_bot::rate_limit::RateLimiter;
use inactivity_bot::slack::{SlackApi, SlackClient};
use inactivity_bot::{Auditor, PassOutcome};

#[tokio::main]
async fn main() -> ExitCode {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "inactivity-bot.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };

    let slack: Arc<dyn SlackApi> = Arc::new(SlackClient::new(config.slack_bot_token.clone()));

    // Setup logging
    let log_dir = config.log_dir();
    std::fs::create_dir_all(&log_dir).ok();
    let rotation = match config.log_rotation {
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Daily => Rotation::DAILY,
        LogRotation::Never => Rotation::NEVER,
    };
    let appender = RollingFileAppender::new(rotation, &log_dir, &config.log_file_prefix);
    let (non_blocking, _guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    info!("🚀 Starting inactivity bot...");
    info!("Loaded config from {config_path}");
    info!("Support users: {}", config.support_user_ids.len());
    if config.dry_run {
        info!("DRY RUN mode enabled");
    }

    log_bot_permissions(slack.as_ref()).await;

    let auditor = Auditor::new(slack, RateLimiter::default(), config.audit_settings());

    if config.run_on_startup {
        info!("▶️ Running initial audit pass at startup");
        log_outcome(auditor.run_pass().await);
    }

    loop {
        let now = Utc::now();
        let next = match config.schedule.next_run(now) {
            Ok(next) => next,
            Err(e) => {
                error!("Scheduler stopped: {e}");
                return ExitCode::FAILURE;
            }
        };
        info!(
            "✅ Bot is running {} - next review at {}",
            config.schedule.describe(),
            next.with_timezone(&config.timezone).format("%d/%m/%Y %H:%M:%S")
        );

        let wait = (next - now).to_std().unwrap_or_default();
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("👋 Shutting down");
                return ExitCode::SUCCESS;
            }
        }

        // Awaited inline, so the next sleep starts only after this pass ends.
        log_outcome(auditor.run_pass().await);
    }
}

/// Log who the bot is and which OAuth scopes the token carries.
async fn log_bot_permissions(slack: &dyn SlackApi) {
    match RateLimiter::default().call("auth.test", || slack.auth_test()).await {
        Ok(identity) => {
            info!("Bot user ID: {}", identity.user_id);
            match identity.scopes {
                Some(scopes) => info!("Bot permissions (scopes): {}", scopes.join(", ")),
                None => warn!("Bot permissions: Slack did not report OAuth scopes for this token"),
            }
        }
        Err(e) => warn!("Failed to get bot info: {e}"),
    }
}

fn log_outcome(outcome: PassOutcome) {
    match outcome {
        PassOutcome::Completed(summary) => {
            info!("📈 Pass complete: {} report(s) sent", summary.reports_sent)
        }
        PassOutcome::Aborted(e) => warn!("Pass aborted, will retry at next trigger: {e}"),
        PassOutcome::Skipped => warn!("Pass skipped: previous pass still running"),
    }
}
