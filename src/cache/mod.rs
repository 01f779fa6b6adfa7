//! Cache stores for normalized events
//!
//! The cache layer talks to a [`Cache`] rather than to a concrete store, so the
//! in-memory map used by the server, the on-disk store used by the CLI, and the
//! stubs used in tests are interchangeable. Entries carry their own expiry;
//! an expired entry reads as absent.

mod keys;
mod layer;
mod manager;
mod memory;

pub use keys::{cache_key, keys_for_url, CACHE_KEY_PREFIX};
pub use layer::{ClearReport, EventCache, DEFAULT_TTL};
pub use manager::{CacheManager, CachedData};
pub use memory::{MemoryCache, DEFAULT_MAX_ENTRIES};

use std::time::Duration;

use thiserror::Error;

use crate::data::NormalizedEvent;

/// Errors raised by a cache store
#[derive(Debug, Error)]
pub enum CacheError {
    /// Reading, writing or removing the backing file failed
    #[error("cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The entry could not be encoded or decoded
    #[error("cache entry encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    /// The requested time-to-live cannot be represented
    #[error("time-to-live out of range: {0:?}")]
    InvalidTtl(Duration),
}

/// A key/value store with per-entry time-to-live
pub trait Cache: Send + Sync {
    /// Returns the entry for `key` if present and not expired
    fn get(&self, key: &str) -> Result<Option<Vec<NormalizedEvent>>, CacheError>;

    /// Stores `value` under `key`, replacing any previous entry
    fn set(&self, key: &str, value: &[NormalizedEvent], ttl: Duration) -> Result<(), CacheError>;

    /// Removes the entry for `key`; removing an absent key succeeds
    fn delete(&self, key: &str) -> Result<(), CacheError>;
}
