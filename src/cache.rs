//! # Response Cache
//!
//! Optional content-addressed cache for fetcher GETs. Bounded LRU with
//! TTL stamps; last-write-wins, stale reads within TTL are acceptable.
//! Never authoritative: a miss simply falls through to the network.

use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct CacheEntry {
    body: String,
    stored_at: Instant,
}

/// In-memory read-through cache keyed by the SHA-256 of the request URL.
pub struct ResponseCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is non-zero");
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    fn key(url: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Fetch a fresh entry; entries past TTL are treated as absent and
    /// evicted.
    pub fn get(&self, url: &str) -> Option<String> {
        let key = Self::key(url);
        let mut entries = self.entries.lock().expect("cache lock");
        match entries.get(&key) {
            Some(entry) if entry.stored_at.elapsed() <= self.ttl => Some(entry.body.clone()),
            Some(_) => {
                entries.pop(&key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, url: &str, body: String) {
        let mut entries = self.entries.lock().expect("cache lock");
        entries.put(
            Self::key(url),
            CacheEntry {
                body,
                stored_at: Instant::now(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_within_ttl() {
        let cache = ResponseCache::new(16, Duration::from_secs(60));
        cache.put("https://example.com/a", "body".to_string());
        assert_eq!(cache.get("https://example.com/a"), Some("body".to_string()));
        assert_eq!(cache.get("https://example.com/b"), None);
    }

    #[test]
    fn expired_entries_are_absent() {
        let cache = ResponseCache::new(16, Duration::from_millis(0));
        cache.put("https://example.com/a", "body".to_string());
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("https://example.com/a"), None);
    }

    #[test]
    fn last_write_wins() {
        let cache = ResponseCache::new(16, Duration::from_secs(60));
        cache.put("https://example.com/a", "one".to_string());
        cache.put("https://example.com/a", "two".to_string());
        assert_eq!(cache.get("https://example.com/a"), Some("two".to_string()));
    }
}
