//! External lookup caching using Moka.
//!
//! Account, class and item ids are looked up by name and change rarely, so
//! they are cached. A stale entry can only make a later external call
//! fail; it never produces a write against the wrong entity.

use moka::sync::Cache;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

use ledgersync_shared::config::SyncConfig;

/// Default cache capacity (number of entries).
const DEFAULT_CACHE_CAPACITY: u64 = 1_000;

/// What kind of external entity a lookup targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LookupKind {
    /// Chart-of-accounts entry.
    Account,
    /// Classification dimension.
    Class,
    /// Catalog item.
    Item,
}

impl LookupKind {
    /// Returns the string representation of the kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Class => "class",
            Self::Item => "item",
        }
    }
}

impl fmt::Display for LookupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Expiry policy for cached lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Entries live until evicted by capacity or invalidated.
    Unbounded,
    /// Entries expire after the given duration.
    TimeToLive(Duration),
}

/// Cache of external ids keyed by lookup kind and name.
///
/// Cloning is cheap and clones share entries.
#[derive(Clone)]
pub struct LookupCache {
    cache: Cache<(LookupKind, String), String>,
}

impl LookupCache {
    /// Creates an unbounded-lifetime cache with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(DEFAULT_CACHE_CAPACITY, CachePolicy::Unbounded)
    }

    /// Creates a cache with the given capacity and expiry policy.
    #[must_use]
    pub fn with_policy(max_capacity: u64, policy: CachePolicy) -> Self {
        let builder = Cache::builder().max_capacity(max_capacity);
        let cache = match policy {
            CachePolicy::Unbounded => builder.build(),
            CachePolicy::TimeToLive(ttl) => builder.time_to_live(ttl).build(),
        };
        Self { cache }
    }

    /// Creates a cache from the sync configuration.
    #[must_use]
    pub fn from_config(config: &SyncConfig) -> Self {
        let policy = config
            .lookup_cache_ttl_secs
            .map_or(CachePolicy::Unbounded, |secs| {
                CachePolicy::TimeToLive(Duration::from_secs(secs))
            });
        Self::with_policy(config.lookup_cache_capacity, policy)
    }

    /// Returns the cached id, if any.
    pub fn get(&self, kind: LookupKind, name: &str) -> Option<String> {
        self.cache.get(&(kind, name.to_string()))
    }

    /// Stores an id.
    pub fn insert(&self, kind: LookupKind, name: &str, id: String) {
        self.cache.insert((kind, name.to_string()), id);
    }

    /// Invalidates a single entry.
    pub fn invalidate(&self, kind: LookupKind, name: &str) {
        self.cache.invalidate(&(kind, name.to_string()));
    }

    /// Invalidates all cached entries.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Returns the number of entries currently in the cache.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Runs cache maintenance tasks.
    pub fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks();
    }
}

impl Default for LookupCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get_by_kind() {
        let cache = LookupCache::new();
        cache.insert(LookupKind::Class, "Events", "300".into());

        assert_eq!(cache.get(LookupKind::Class, "Events").as_deref(), Some("300"));
        assert_eq!(cache.get(LookupKind::Account, "Events"), None);
    }

    #[test]
    fn test_invalidate() {
        let cache = LookupCache::new();
        cache.insert(LookupKind::Account, "Bank Account", "35".into());
        cache.insert(LookupKind::Account, "Stripe Fees", "80".into());

        cache.invalidate(LookupKind::Account, "Bank Account");
        assert_eq!(cache.get(LookupKind::Account, "Bank Account"), None);

        cache.invalidate_all();
        cache.run_pending_tasks();
        assert_eq!(cache.entry_count(), 0);
    }

    #[test]
    fn test_clones_share_entries() {
        let cache = LookupCache::new();
        let clone = cache.clone();
        clone.insert(LookupKind::Item, "Events", "7".into());
        assert_eq!(cache.get(LookupKind::Item, "Events").as_deref(), Some("7"));
    }

    #[test]
    fn test_ttl_policy_from_config() {
        let config = SyncConfig {
            lookup_cache_ttl_secs: Some(60),
            ..SyncConfig::default()
        };
        let cache = LookupCache::from_config(&config);
        cache.insert(LookupKind::Class, "Tahoe", "301".into());
        assert_eq!(cache.get(LookupKind::Class, "Tahoe").as_deref(), Some("301"));
    }
}
