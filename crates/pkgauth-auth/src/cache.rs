//! Short-lived credential cache
//!
//! Maps a username to the digest and resolved groups of its last successful
//! store-backed authentication. Entries expire lazily after a fixed TTL and
//! the cache is bounded; when full, the least recently *inserted* entry is
//! evicted. Reads never refresh an entry's position or age.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Default time-to-live for cached credentials (5 minutes)
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Default maximum number of cached users
pub const DEFAULT_MAX_ENTRIES: NonZeroUsize = match NonZeroUsize::new(1000) {
    Some(n) => n,
    None => unreachable!(),
};

/// Cached result of a successful authentication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedCredential {
    pub password_digest: String,
    pub groups: Vec<String>,
}

/// Cache bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    pub ttl: Duration,
    pub max_entries: NonZeroUsize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

struct Slot {
    credential: CachedCredential,
    inserted_at: Instant,
}

/// Bounded, time-expiring username -> credential map
///
/// Safe to share across tasks. Concurrent writers for the same user are
/// last-write-wins.
pub struct CredentialCache {
    entries: Mutex<LruCache<String, Slot>>,
    ttl: Duration,
}

impl CredentialCache {
    pub fn new(settings: CacheSettings) -> Self {
        debug!(
            "Initializing credential cache (ttl: {:?}, max_entries: {})",
            settings.ttl, settings.max_entries
        );

        Self {
            entries: Mutex::new(LruCache::new(settings.max_entries)),
            ttl: settings.ttl,
        }
    }

    /// Look up a user; expired entries are dropped and reported as absent
    pub fn get(&self, username: &str) -> Option<CachedCredential> {
        let mut entries = self.entries.lock();

        match entries.peek(username) {
            Some(slot) if slot.inserted_at.elapsed() < self.ttl => {
                return Some(slot.credential.clone());
            }
            Some(_) => {}
            None => return None,
        }

        entries.pop(username);
        debug!("Credential cache entry for '{}' expired", username);
        None
    }

    /// Insert or replace a user's entry, restarting its TTL
    pub fn put(&self, username: &str, credential: CachedCredential) {
        let slot = Slot {
            credential,
            inserted_at: Instant::now(),
        };

        let evicted = self.entries.lock().push(username.to_string(), slot);
        if let Some((key, _)) = evicted
            && key != username
        {
            debug!("Credential cache full, evicted '{}'", key);
        }
    }

    /// Number of entries currently held, including not-yet-swept expired ones
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn credential(user: &str) -> CachedCredential {
        CachedCredential {
            password_digest: format!("digest-{}", user),
            groups: vec!["user".to_string(), user.to_string()],
        }
    }

    fn cache(ttl: Duration, max: usize) -> CredentialCache {
        CredentialCache::new(CacheSettings {
            ttl,
            max_entries: NonZeroUsize::new(max).unwrap(),
        })
    }

    #[test]
    fn test_defaults() {
        let settings = CacheSettings::default();
        assert_eq!(settings.ttl, Duration::from_millis(300_000));
        assert_eq!(settings.max_entries.get(), 1000);
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let cache = cache(DEFAULT_TTL, 10);
        assert!(cache.get("alice").is_none());

        cache.put("alice", credential("alice"));
        assert_eq!(cache.get("alice"), Some(credential("alice")));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let ttl = Duration::from_secs(60);
        let cache = cache(ttl, 10);
        cache.put("alice", credential("alice"));

        tokio::time::advance(ttl - Duration::from_millis(1)).await;
        assert!(cache.get("alice").is_some());

        tokio::time::advance(Duration::from_millis(2)).await;
        assert!(cache.get("alice").is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reinsert_restarts_ttl() {
        let ttl = Duration::from_secs(60);
        let cache = cache(ttl, 10);
        cache.put("alice", credential("alice"));

        tokio::time::advance(Duration::from_secs(45)).await;
        cache.put("alice", credential("alice"));

        tokio::time::advance(Duration::from_secs(45)).await;
        assert!(cache.get("alice").is_some());
    }

    #[tokio::test]
    async fn test_bounded_by_max_entries() {
        let cache = cache(DEFAULT_TTL, 3);
        for user in ["a", "b", "c", "d"] {
            cache.put(user, credential(user));
            assert!(cache.len() <= 3);
        }

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.capacity(), 3);
        assert!(cache.get("a").is_none());
        assert!(cache.get("d").is_some());
    }

    #[tokio::test]
    async fn test_reads_do_not_change_eviction_order() {
        let cache = cache(DEFAULT_TTL, 3);
        for user in ["a", "b", "c"] {
            cache.put(user, credential(user));
        }

        assert!(cache.get("a").is_some());
        cache.put("d", credential("d"));

        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_access_stays_bounded() {
        let cache = Arc::new(cache(DEFAULT_TTL, 16));

        let handles: Vec<_> = (0..64)
            .map(|i| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    let user = format!("user{}", i % 32);
                    cache.put(&user, credential(&user));
                    cache.get(&user);
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        assert!(cache.len() <= 16);
    }
}
