//! Per-pass memo of channels known not to belong to a support creator.

use std::collections::HashSet;

use tracing::info;

/// Channel IDs confirmed non-support during the current pass.
///
/// Volatile: starts empty, and the auditor clears it once at the end of
/// every pass so the next pass re-evaluates every channel.
#[derive(Debug, Default)]
pub struct NegativeCache {
    ids: HashSet<String>,
}

impl NegativeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, channel_id: &str) {
        self.ids.insert(channel_id.to_string());
    }

    pub fn has(&self, channel_id: &str) -> bool {
        self.ids.contains(channel_id)
    }

    pub fn reset(&mut self) {
        let cleared = self.ids.len();
        self.ids.clear();
        info!("🧹 Non-support channel cache has been reset ({cleared} entries)");
    }

    pub fn size(&self) -> usize {
        self.ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_then_has() {
        let mut cache = NegativeCache::new();
        assert!(!cache.has("C1"));
        cache.add("C1");
        assert!(cache.has("C1"));
        assert!(!cache.has("C2"));
    }

    #[test]
    fn test_size_counts_distinct_adds() {
        let mut cache = NegativeCache::new();
        cache.add("C1");
        cache.add("C2");
        cache.add("C3");
        assert_eq!(cache.size(), 3);

        cache.add("C2");
        assert_eq!(cache.size(), 3);
    }

    #[test]
    fn test_reset_forgets_everything() {
        let mut cache = NegativeCache::new();
        for id in ["C1", "C2", "C3"] {
            cache.add(id);
        }
        cache.reset();
        assert_eq!(cache.size(), 0);
        for id in ["C1", "C2", "C3"] {
            assert!(!cache.has(id));
        }
    }
}
