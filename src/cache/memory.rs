//! Process-local cache store

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use super::{Cache, CacheError};
use crate::data::NormalizedEvent;

/// Entries kept before the oldest-expiring ones are evicted
pub const DEFAULT_MAX_ENTRIES: usize = 4096;

/// Every this many writes, expired entries are swept from the whole map
const SWEEP_EVERY: usize = 64;

#[derive(Debug, Clone)]
struct MemoryEntry {
    events: Vec<NormalizedEvent>,
    /// `None` when the TTL overflows `Instant`; such entries never expire
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |expires_at| now < expires_at)
    }
}

/// In-memory store shared by the server's request handlers
///
/// An expired entry is dropped when its key is read, and all expired entries
/// are swept every few writes. The map never holds more than `max_entries`:
/// a write to a new key at capacity first sweeps, then evicts the entry that
/// expires soonest.
#[derive(Debug)]
pub struct MemoryCache {
    entries: DashMap<String, MemoryEntry>,
    max_entries: usize,
    writes: AtomicUsize,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store holding at most `max_entries` keys (at least one)
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every expired entry, returning how many were removed
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh(now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(target: "events_block::cache", removed, "swept expired entries");
        }
        removed
    }

    fn evict_soonest_expiring(&self) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|entry| {
                // Entries that never expire sort last
                (entry.expires_at.is_none(), entry.expires_at)
            })
            .map(|entry| entry.key().clone());

        if let Some(key) = victim {
            debug!(target: "events_block::cache", key, "evicting entry at capacity");
            self.entries.remove(&key);
        }
    }

    fn make_room_for(&self, key: &str) {
        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % SWEEP_EVERY == 0 {
            self.sweep_expired();
        }

        if self.entries.contains_key(key) {
            return;
        }
        if self.entries.len() >= self.max_entries {
            self.sweep_expired();
        }
        while self.entries.len() >= self.max_entries {
            self.evict_soonest_expiring();
        }
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<Vec<NormalizedEvent>>, CacheError> {
        let now = Instant::now();

        if let Some(entry) = self.entries.get(key) {
            if entry.is_fresh(now) {
                return Ok(Some(entry.events.clone()));
            }
        }

        self.entries.remove_if(key, |_, entry| !entry.is_fresh(now));
        Ok(None)
    }

    fn set(&self, key: &str, value: &[NormalizedEvent], ttl: Duration) -> Result<(), CacheError> {
        self.make_room_for(key);

        let entry = MemoryEntry {
            events: value.to_vec(),
            expires_at: Instant::now().checked_add(ttl),
        };
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }
}
