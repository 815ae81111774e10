//! Bounded LRU cache of parse results with per-entry expiry.
//!
//! Expiry is checked lazily on every lookup and eagerly by [`FeedCache::sweep`],
//! which the service runs on an interval. Timestamps come from
//! `tokio::time::Instant` so tests can drive expiry with a paused clock.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use tokio::time::Instant;

use crate::config::CacheConfig;
use crate::feed::FeedParseResult;

#[derive(Debug)]
struct CacheEntry {
    result: Arc<FeedParseResult>,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    /// An entry is still valid at exactly `ttl` and expires strictly after.
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) > self.ttl
    }
}

#[derive(Debug)]
pub struct FeedCache {
    entries: LruCache<String, CacheEntry>,
    ttl: Duration,
    failure_ttl: Duration,
}

impl FeedCache {
    pub fn new(capacity: NonZeroUsize, ttl: Duration, failure_ttl: Duration) -> Self {
        Self {
            entries: LruCache::new(capacity),
            ttl,
            failure_ttl,
        }
    }

    /// Builds a cache from config. A zero capacity (rejected by
    /// `Config::validate`, but possible for hand-built configs) becomes 1.
    pub fn from_config(config: &CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        Self::new(capacity, config.ttl(), config.failure_ttl())
    }

    /// Returns the cached result for `url` if present and unexpired, marking
    /// it most recently used. An expired entry is removed and reported as a miss.
    pub fn get(&mut self, url: &str) -> Option<Arc<FeedParseResult>> {
        let now = Instant::now();
        let expired = self.entries.peek(url)?.is_expired(now);

        if expired {
            self.entries.pop(url);
            tracing::trace!(url = %url, "Cache entry expired");
            return None;
        }

        self.entries.get(url).map(|entry| Arc::clone(&entry.result))
    }

    /// Stores a result, replacing any previous entry for `url`. Inserting
    /// into a full cache evicts the least recently used entry. Failed results
    /// get the failure TTL.
    pub fn insert(&mut self, url: &str, result: Arc<FeedParseResult>) {
        let ttl = if result.success {
            self.ttl
        } else {
            self.failure_ttl
        };

        let evicted = self.entries.push(
            url.to_owned(),
            CacheEntry {
                result,
                inserted_at: Instant::now(),
                ttl,
            },
        );

        if let Some((key, _)) = evicted {
            if key != url {
                tracing::debug!(evicted = %key, "Cache full, evicted least recently used feed");
            }
        }
    }

    /// Removes every expired entry. Returns how many were dropped.
    pub fn sweep(&mut self) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.entries.pop(key);
        }
        expired.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
