// =============================================================================
// File-backed Provider Cache — same-calendar-day freshness
// =============================================================================
//
// Each provider client owns one cache directory; entries are keyed by symbol
// (`{SYMBOL}.json`). An entry is fresh when the file's mtime falls on the
// same UTC calendar day as the caller's `today`. Writes go through a sibling
// tmp file and rename, so concurrent readers always see a complete payload.
// Cache writes happen only after a successful fetch — failures never poison
// the cache.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

/// Symbol-keyed JSON cache with same-day freshness.
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{}.json", symbol.trim().to_uppercase()))
    }

    /// Load the cached value for `symbol` when its mtime is on the same UTC
    /// calendar day as `today`. Any I/O or parse problem is treated as a
    /// cache miss.
    pub fn load_if_fresh<T: DeserializeOwned>(&self, symbol: &str, today: NaiveDate) -> Option<T> {
        let path = self.path_for(symbol);
        let meta = std::fs::metadata(&path).ok()?;
        let modified = meta.modified().ok()?;
        let modified_date = DateTime::<Utc>::from(modified).date_naive();
        if modified_date != today {
            debug!(symbol, path = %path.display(), "cache entry stale");
            return None;
        }

        let content = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<T>(&content) {
            Ok(value) => {
                debug!(symbol, path = %path.display(), "cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(symbol, error = %e, "cache entry unparseable — treating as miss");
                None
            }
        }
    }

    /// Store a value for `symbol` via tmp + rename.
    pub fn store<T: Serialize>(&self, symbol: &str, value: &T) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create cache dir {}", self.dir.display()))?;

        let path = self.path_for(symbol);
        let tmp = path.with_extension("json.tmp");

        let content = serde_json::to_string(value).context("failed to serialise cache entry")?;
        std::fs::write(&tmp, content)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("failed to rename {}", tmp.display()))?;

        debug!(symbol, path = %path.display(), "cache entry stored");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Entry {
        value: f64,
    }

    #[test]
    fn store_then_load_same_day() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        let today = Utc::now().date_naive();

        cache.store("spy", &Entry { value: 42.0 }).unwrap();
        let loaded: Option<Entry> = cache.load_if_fresh("SPY", today);
        assert_eq!(loaded, Some(Entry { value: 42.0 }));
    }

    #[test]
    fn load_miss_for_other_day() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        cache.store("SPY", &Entry { value: 1.0 }).unwrap();

        // A file written "today" is stale for tomorrow's run.
        let tomorrow = Utc::now().date_naive() + chrono::Days::new(1);
        let loaded: Option<Entry> = cache.load_if_fresh("SPY", tomorrow);
        assert!(loaded.is_none());
    }

    #[test]
    fn load_miss_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        let loaded: Option<Entry> = cache.load_if_fresh("NVDA", Utc::now().date_naive());
        assert!(loaded.is_none());
    }

    #[test]
    fn unparseable_entry_is_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        std::fs::write(dir.path().join("SPY.json"), "not json").unwrap();
        let loaded: Option<Entry> = cache.load_if_fresh("SPY", Utc::now().date_naive());
        assert!(loaded.is_none());
    }

    #[test]
    fn symbol_key_is_uppercased() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        cache.store("nvda", &Entry { value: 7.0 }).unwrap();
        assert!(dir.path().join("NVDA.json").exists());
    }
}
