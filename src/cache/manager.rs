//! On-disk event store used by the command-line renderer
//!
//! One JSON file per cache key, each carrying its own expiry, under the
//! platform cache directory (`~/.cache/events-block/` on Linux). Repeated CLI
//! invocations share the store the way server requests share the memory map.

use chrono::{DateTime, Duration, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{Cache, CacheError};
use crate::data::NormalizedEvent;

/// A stored event list together with its lifetime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedData {
    pub events: Vec<NormalizedEvent>,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CachedData {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone)]
pub struct CacheManager {
    cache_dir: PathBuf,
}

impl CacheManager {
    /// Store in the platform cache directory
    ///
    /// Returns `None` when no home directory can be determined.
    pub fn new() -> Option<Self> {
        let dirs = ProjectDirs::from("", "", "events-block")?;
        Some(Self::with_dir(dirs.cache_dir().to_path_buf()))
    }

    /// Store rooted at `cache_dir`, created on first write
    pub fn with_dir(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{key}.json"))
    }

    /// Reads the entry for `key`, expired or not
    ///
    /// A missing file is `Ok(None)`; an unreadable or corrupt one is an error.
    pub fn load(&self, key: &str) -> Result<Option<CachedData>, CacheError> {
        let bytes = match fs::read(self.entry_path(key)) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Writes the entry through a sibling temp file so readers never see a
    /// partial document
    pub fn store(
        &self,
        key: &str,
        events: &[NormalizedEvent],
        ttl: std::time::Duration,
    ) -> Result<CachedData, CacheError> {
        let lifetime = Duration::from_std(ttl).map_err(|_| CacheError::InvalidTtl(ttl))?;
        let cached_at = Utc::now();
        let expires_at = cached_at
            .checked_add_signed(lifetime)
            .ok_or(CacheError::InvalidTtl(ttl))?;
        let entry = CachedData {
            events: events.to_vec(),
            cached_at,
            expires_at,
        };

        fs::create_dir_all(&self.cache_dir)?;
        let path = self.entry_path(key);
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, serde_json::to_vec(&entry)?)?;
        fs::rename(&staging, &path)?;
        Ok(entry)
    }

    /// Removes the file for `key`; a missing file counts as removed
    pub fn remove(&self, key: &str) -> Result<(), CacheError> {
        match fs::remove_file(self.entry_path(key)) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}

impl Cache for CacheManager {
    fn get(&self, key: &str) -> Result<Option<Vec<NormalizedEvent>>, CacheError> {
        let Some(entry) = self.load(key)? else {
            return Ok(None);
        };
        if entry.is_expired_at(Utc::now()) {
            debug!(target: "events_block::cache", key, "disk entry expired");
            return Ok(None);
        }
        Ok(Some(entry.events))
    }

    fn set(
        &self,
        key: &str,
        value: &[NormalizedEvent],
        ttl: std::time::Duration,
    ) -> Result<(), CacheError> {
        self.store(key, value, ttl).map(|_| ())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.remove(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;
    use tempfile::TempDir;

    const DAY: StdDuration = StdDuration::from_secs(24 * 60 * 60);

    fn store_in_tempdir() -> (CacheManager, TempDir) {
        let dir = TempDir::new().expect("temp dir");
        (CacheManager::with_dir(dir.path().to_path_buf()), dir)
    }

    fn poetry_night() -> Vec<NormalizedEvent> {
        vec![NormalizedEvent {
            title: "Poetry Night".to_string(),
            date: "March, 3, 2026".to_string(),
            venue: "Library".to_string(),
            organizer: String::new(),
            featured_image: String::new(),
            link: "https://events.example.com/poetry".to_string(),
        }]
    }

    #[test]
    fn test_store_writes_one_json_file_per_key() {
        let (cache, dir) = store_in_tempdir();

        cache.store("events_abc", &poetry_night(), DAY).expect("store");

        let path = dir.path().join("events_abc.json");
        let content = fs::read_to_string(&path).expect("entry file");
        assert!(content.contains("Poetry Night"));
        assert!(content.contains("expires_at"));
        assert!(!dir.path().join("events_abc.json.tmp").exists());
    }

    #[test]
    fn test_get_round_trips_a_fresh_entry() {
        let (cache, _dir) = store_in_tempdir();

        cache.set("fresh", &poetry_night(), DAY).expect("set");

        assert_eq!(cache.get("fresh").expect("get"), Some(poetry_night()));
    }

    #[test]
    fn test_missing_key_reads_as_absent() {
        let (cache, _dir) = store_in_tempdir();

        assert_eq!(cache.load("nope").expect("load"), None);
        assert_eq!(cache.get("nope").expect("get"), None);
    }

    #[test]
    fn test_expired_entry_stays_on_disk_but_reads_as_absent() {
        let (cache, _dir) = store_in_tempdir();

        let entry = cache
            .store("stale", &poetry_night(), StdDuration::ZERO)
            .expect("store");

        assert!(entry.is_expired_at(entry.cached_at));
        assert!(cache.load("stale").expect("load").is_some());
        assert_eq!(cache.get("stale").expect("get"), None);
    }

    #[test]
    fn test_corrupt_entry_is_an_encoding_error() {
        let (cache, dir) = store_in_tempdir();
        fs::write(dir.path().join("broken.json"), "{not json").expect("write");

        assert!(matches!(cache.get("broken"), Err(CacheError::Encoding(_))));
    }

    #[test]
    fn test_delete_removes_entry_and_tolerates_missing() {
        let (cache, dir) = store_in_tempdir();

        cache.set("doomed", &poetry_night(), DAY).expect("set");
        cache.delete("doomed").expect("delete");
        assert!(!dir.path().join("doomed.json").exists());

        cache.delete("never_written").expect("missing key deletes cleanly");
    }

    #[test]
    fn test_store_creates_nested_directory() {
        let dir = TempDir::new().expect("temp dir");
        let nested = dir.path().join("a").join("b");
        let cache = CacheManager::with_dir(nested.clone());

        cache.set("k", &poetry_night(), DAY).expect("set");

        assert!(nested.join("k.json").exists());
    }

    #[test]
    fn test_store_records_cached_at_and_expiry() {
        let (cache, _dir) = store_in_tempdir();

        let before = Utc::now();
        let entry = cache.store("timed", &poetry_night(), DAY).expect("store");
        let after = Utc::now();

        assert!(entry.cached_at >= before && entry.cached_at <= after);
        assert_eq!(entry.expires_at - entry.cached_at, Duration::days(1));
    }

    #[test]
    fn test_unrepresentable_ttl_is_rejected() {
        let (cache, _dir) = store_in_tempdir();

        let result = cache.set("forever", &poetry_night(), StdDuration::MAX);
        assert!(matches!(result, Err(CacheError::InvalidTtl(_))));
    }

    #[test]
    fn test_set_replaces_previous_entry() {
        let (cache, _dir) = store_in_tempdir();
        let mut updated = poetry_night();
        updated[0].title = "Updated".to_string();

        cache.set("k", &poetry_night(), DAY).expect("first set");
        cache.set("k", &updated, DAY).expect("second set");

        assert_eq!(cache.get("k").expect("get"), Some(updated));
    }

    #[test]
    fn test_default_location_names_the_project() {
        if let Some(cache) = CacheManager::new() {
            assert!(cache.cache_dir().to_string_lossy().contains("events-block"));
        }
    }
}
