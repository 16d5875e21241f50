//! User ID to display name resolution, memoized for the process lifetime.

use std::collections::HashMap;

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::rate_limit::RateLimiter;
use crate::slack::SlackApi;

/// What to do with the `User_<id>` label produced by a failed lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Remember the fallback, never ask Slack about this user again.
    #[default]
    Cache,
    /// Return the fallback but try the lookup again next time.
    Retry,
}

pub struct NameResolver {
    names: Mutex<HashMap<String, String>>,
    policy: FallbackPolicy,
}

impl NameResolver {
    pub fn new(policy: FallbackPolicy) -> Self {
        Self { names: Mutex::new(HashMap::new()), policy }
    }

    /// Display name for `user_id`. Never fails.
    pub async fn resolve(
        &self,
        api: &dyn SlackApi,
        limiter: &RateLimiter,
        user_id: &str,
    ) -> String {
        if let Some(name) = self.names.lock().await.get(user_id) {
            return name.clone();
        }

        let name = match limiter.call("users.info", || api.user_info(user_id)).await {
            Ok(user) => {
                let name = user.preferred_name().to_string();
                info!("✅ Retrieved user info: {} ({})", name, user.name);
                name
            }
            Err(e) => {
                warn!("❌ Error retrieving name for user {user_id}: {e}");
                let fallback = fallback_name(user_id);
                match self.policy {
                    FallbackPolicy::Cache => fallback,
                    FallbackPolicy::Retry => return fallback,
                }
            }
        };

        self.names.lock().await.insert(user_id.to_string(), name.clone());
        name
    }

    pub async fn cached_count(&self) -> usize {
        self.names.lock().await.len()
    }
}

pub fn fallback_name(user_id: &str) -> String {
    format!("User_{user_id}")
}
