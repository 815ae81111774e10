//! The feed parsing entry point used by analysis tools.
//!
//! [`FeedService`] owns the cache, the single-flight registry and the
//! periodic sweep task. Collaborators only see
//! [`FeedService::parse_feed`] plus a few administrative operations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::cache::FeedCache;
use crate::config::Config;
use crate::feed::{
    FailureCategory, FeedLimits, FeedParseResult, FeedParser, HttpTransport, Transport,
    TransportError,
};
use crate::inflight::{FlightError, SingleFlight};
use crate::util::validate_url;

const SHUT_DOWN_MESSAGE: &str =
    "Feed request cancelled: the feed service was shut down before the fetch completed.";

struct ServiceInner {
    parser: FeedParser,
    cache: Mutex<FeedCache>,
    flights: SingleFlight<Arc<FeedParseResult>>,
    allow_private_hosts: bool,
    closed: AtomicBool,
}

impl ServiceInner {
    fn cache(&self) -> MutexGuard<'_, FeedCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Caches `result` unless the service is shut down. `closed` is read
    /// under the cache lock, which `destroy` also holds while setting it, so
    /// nothing can land in the cache after it was cleared.
    fn store(&self, url: &str, result: Arc<FeedParseResult>) {
        let mut cache = self.cache();
        if !self.closed.load(Ordering::Acquire) {
            cache.insert(url, result);
        }
    }
}

/// Cached, coalescing front end to [`FeedParser`].
///
/// Construct one per application and share it by reference. Construction
/// spawns the cache sweep task, so it must happen inside a tokio runtime.
pub struct FeedService {
    inner: Arc<ServiceInner>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl FeedService {
    /// Builds a service backed by the reqwest transport.
    pub fn new(config: &Config) -> Result<Self, TransportError> {
        let transport = HttpTransport::new(&config.fetch)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: &Config, transport: Arc<dyn Transport>) -> Self {
        let parser = FeedParser::new(transport)
            .with_limits(FeedLimits::from(&config.limits))
            .with_timeouts(config.fetch.timeout(), config.fetch.json_timeout());

        let inner = Arc::new(ServiceInner {
            parser,
            cache: Mutex::new(FeedCache::from_config(&config.cache)),
            flights: SingleFlight::new(),
            allow_private_hosts: config.fetch.allow_private_hosts,
            closed: AtomicBool::new(false),
        });

        let sweeper = spawn_sweeper(Arc::downgrade(&inner), config.cache.sweep_interval());

        Self {
            inner,
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    /// Parses the feed at `url`.
    ///
    /// With `use_cache`, an unexpired cached result (successful or not) is
    /// returned without touching the network. Without it the cache read is
    /// skipped, but a fetch already running for `url` is still joined and
    /// the fresh result is still stored. Concurrent callers for the same URL
    /// share one fetch and receive the same `Arc`.
    ///
    /// URLs that fail validation are rejected with an `unknown` failure and
    /// are neither fetched nor cached.
    pub async fn parse_feed(&self, url: &str, use_cache: bool) -> Arc<FeedParseResult> {
        let url = url.trim();

        if self.inner.closed.load(Ordering::Acquire) {
            return Arc::new(FeedParseResult::failure(
                FailureCategory::Unknown,
                SHUT_DOWN_MESSAGE,
            ));
        }

        if let Err(e) = self.check_url(url) {
            tracing::debug!(url = %url, error = %e, "Rejected feed URL");
            return Arc::new(FeedParseResult::failure(
                FailureCategory::Unknown,
                format!("Invalid feed URL: {e}. Use an absolute http(s) URL of a publicly reachable host."),
            ));
        }

        if use_cache {
            let cached = self.inner.cache().get(url);
            if let Some(result) = cached {
                tracing::debug!(url = %url, "Cache hit");
                return result;
            }
            tracing::debug!(url = %url, "Cache miss");
        }

        let inner = Arc::clone(&self.inner);
        let key = url.to_owned();
        let outcome = self
            .inner
            .flights
            .run(url, move || async move {
                let result = Arc::new(inner.parser.parse(&key).await);
                // Stored before the flight entry is released, so the next caller hits the cache
                inner.store(&key, Arc::clone(&result));
                result
            })
            .await;

        match outcome {
            Ok(result) => result,
            Err(FlightError::Cancelled) => Arc::new(FeedParseResult::failure(
                FailureCategory::Unknown,
                SHUT_DOWN_MESSAGE,
            )),
            Err(FlightError::Panicked) => {
                tracing::error!(url = %url, "Feed parse task panicked");
                Arc::new(FeedParseResult::failure(
                    FailureCategory::Unknown,
                    "Feed request failed with an internal error. \
                     Try again; if it persists, report the feed URL.",
                ))
            }
        }
    }

    fn check_url(&self, url: &str) -> Result<(), crate::util::UrlValidationError> {
        validate_url(url, self.inner.allow_private_hosts).map(|_| ())
    }

    pub fn clear_cache(&self) {
        self.inner.cache().clear();
        tracing::debug!("Cache cleared");
    }

    /// Number of cached results, including expired ones not yet swept.
    pub fn cache_size(&self) -> usize {
        self.inner.cache().len()
    }

    /// Number of URLs with a fetch currently running.
    pub fn in_flight_count(&self) -> usize {
        self.inner.flights.len()
    }

    /// Shuts the service down: stops the sweep task, aborts running fetches
    /// (their waiters receive a shut-down failure) and empties the cache.
    /// Later `parse_feed` calls fail immediately. Idempotent.
    pub fn destroy(&self) {
        {
            let mut cache = self.inner.cache();
            self.inner.closed.store(true, Ordering::Release);
            cache.clear();
        }
        self.stop_sweeper();
        let aborted = self.inner.flights.cancel_all();
        tracing::info!(aborted, "Feed service shut down");
    }

    fn stop_sweeper(&self) {
        let handle = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

impl Drop for FeedService {
    fn drop(&mut self) {
        self.stop_sweeper();
    }
}

/// Periodically drops expired cache entries. Holds only a weak reference so
/// it never keeps the service alive.
fn spawn_sweeper(inner: Weak<ServiceInner>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let Some(inner) = inner.upgrade() else {
                break;
            };
            let removed = inner.cache().sweep();
            if removed > 0 {
                tracing::debug!(removed, "Swept expired cache entries");
            }
        }
    })
}
