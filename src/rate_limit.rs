//! Retry wrapper for throttled Slack calls.
//!
//! A throttled call is retried after the server supplied delay, with no cap
//! on attempts. Any other error goes straight back to the caller. A workspace
//! that stays throttled stalls the pass until Slack lets it through.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::slack::ApiError;

/// How the limiter waits between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real wall-clock waiting.
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    sleeper: Arc<dyn Sleeper>,
}

impl RateLimiter {
    pub fn new(sleeper: Arc<dyn Sleeper>) -> Self {
        Self { sleeper }
    }

    /// Run `call` until it returns something other than a rate-limit error.
    ///
    /// `operation` only labels the warning.
    pub async fn call<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        loop {
            match call().await {
                Err(ApiError::RateLimited { retry_after }) => {
                    warn!(
                        "⚠️ Slack rate limit hit on {operation}. \
                         Waiting for {}s before retrying...",
                        retry_after.as_secs_f64()
                    );
                    self.sleeper.sleep(retry_after).await;
                }
                other => return other,
            }
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Arc::new(TokioSleeper))
    }
}
