//! Get-or-fetch cache in front of an event source

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::keys::{cache_key, keys_for_url};
use super::Cache;
use crate::data::{EventSource, FetchError, NormalizedEvent};

/// Time-to-live for cached event lists (15 minutes)
pub const DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);

/// Outcome of clearing every cached item count for one URL
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearReport {
    /// Number of keys successfully removed (absent keys count as removed)
    pub cleared: usize,
    /// Item counts whose key could not be removed
    pub failed: Vec<u32>,
}

impl ClearReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Caches normalized events per `(api_url, item_count)`
///
/// Failed fetches are never stored, so the next request retries the
/// upstream. Concurrent misses for one key may both fetch; the fetch is
/// idempotent so the last write wins.
#[derive(Clone)]
pub struct EventCache {
    source: Arc<dyn EventSource>,
    store: Arc<dyn Cache>,
    ttl: Duration,
}

impl EventCache {
    /// Cache over `source` backed by `store`, with the default 15-minute TTL
    ///
    /// # Arguments
    /// * `source` - Where misses are fetched from
    /// * `store` - Memory or disk store holding the normalized lists
    pub fn new(source: Arc<dyn EventSource>, store: Arc<dyn Cache>) -> Self {
        Self {
            source,
            store,
            ttl: DEFAULT_TTL,
        }
    }

    /// Sets how long stored lists stay fresh
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Time-to-live applied to new entries
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns cached events, fetching and storing them on a miss
    ///
    /// A store that fails to read is treated as a miss, and a store that fails
    /// to write does not fail the request; both are logged.
    pub async fn get_cached_or_fetch(
        &self,
        api_url: &str,
        item_count: u32,
    ) -> Result<Vec<NormalizedEvent>, FetchError> {
        let key = cache_key(api_url, item_count);

        match self.store.get(&key) {
            Ok(Some(events)) => {
                debug!(target: "events_block::cache", api_url, item_count, "cache hit");
                return Ok(events);
            }
            Ok(None) => {
                debug!(target: "events_block::cache", api_url, item_count, "cache miss");
            }
            Err(err) => {
                warn!(
                    target: "events_block::cache",
                    api_url,
                    item_count,
                    error = %err,
                    "cache read failed; fetching"
                );
            }
        }

        let events = self.source.fetch_events(api_url, item_count).await?;

        if let Err(err) = self.store.set(&key, &events, self.ttl) {
            warn!(
                target: "events_block::cache",
                api_url,
                item_count,
                error = %err,
                "cache write failed"
            );
        }

        Ok(events)
    }

    /// Events for the public page: never fails
    ///
    /// An empty URL yields no events without a fetch. Fetch failures are logged
    /// and yield no events, so visitors only ever see the placeholder.
    pub async fn events_for_render(&self, api_url: &str, item_count: u32) -> Vec<NormalizedEvent> {
        if api_url.trim().is_empty() {
            return Vec::new();
        }

        match self.get_cached_or_fetch(api_url, item_count).await {
            Ok(events) => events,
            Err(err) => {
                warn!(
                    target: "events_block::render",
                    api_url,
                    item_count,
                    kind = err.kind(),
                    error = %err,
                    "events fetch failed; rendering placeholder"
                );
                Vec::new()
            }
        }
    }

    /// Removes the cached entries of `api_url` for every item count
    ///
    /// Each key is removed independently; a failure is recorded and the
    /// remaining keys are still attempted.
    pub fn clear_cache(&self, api_url: &str) -> ClearReport {
        let mut report = ClearReport::default();

        for (item_count, key) in keys_for_url(api_url) {
            match self.store.delete(&key) {
                Ok(()) => report.cleared += 1,
                Err(err) => {
                    warn!(
                        target: "events_block::cache",
                        api_url,
                        item_count,
                        error = %err,
                        "cache delete failed"
                    );
                    report.failed.push(item_count);
                }
            }
        }

        debug!(
            target: "events_block::cache",
            api_url,
            cleared = report.cleared,
            failed = report.failed.len(),
            "cache cleared"
        );
        report
    }
}
