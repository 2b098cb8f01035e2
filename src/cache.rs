//! Stage caches.
//!
//! Stages 2 and 3 are the expensive scraping passes; their record lists are
//! written as JSON under `<cache-dir>/<scholar-id>/` right after completion.
//! Loading is lenient: a missing or unreadable file just means re-scraping.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Citing-record cache file (stage 2 output)
pub const CITING_RECORDS_FILE: &str = "citing_records.json";

/// Affiliation-record cache file (stage 3 output)
pub const AFFILIATION_RECORDS_FILE: &str = "affiliation_records.json";

/// Per-scholar cache directory.
pub struct StageCache {
    dir: PathBuf,
}

impl StageCache {
    pub fn new(cache_dir: &Path, scholar_id: &str) -> Self {
        Self {
            dir: cache_dir.join(scholar_id),
        }
    }

    /// The per-scholar directory; outputs (CSV, map) land here too.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Save a stage's records. Empty lists are not written.
    pub fn save<T: Serialize>(&self, name: &str, records: &[T]) -> Result<()> {
        if records.is_empty() {
            debug!(name = name, "Skipping empty stage cache");
            return Ok(());
        }
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path(name);
        let content = serde_json::to_string(records)?;
        std::fs::write(&path, content)?;
        info!(count = records.len(), path = %path.display(), "Saved stage cache");
        Ok(())
    }

    /// Load a stage's records; None when missing or unreadable.
    pub fn load<T: DeserializeOwned>(&self, name: &str) -> Option<Vec<T>> {
        let path = self.path(name);
        if !path.exists() {
            return None;
        }
        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Vec<T>>(&content) {
                Ok(records) => {
                    info!(count = records.len(), path = %path.display(), "Loaded stage cache");
                    Some(records)
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Ignoring unreadable stage cache");
                    None
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable stage cache");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::citations::CitingRecord;

    fn citing(author_id: &str) -> CitingRecord {
        CitingRecord {
            author_id: author_id.to_string(),
            citing_paper: "Citing".to_string(),
            cited_paper: "Cited".to_string(),
        }
    }

    #[test]
    fn test_save_and_load() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cache = StageCache::new(dir.path(), "j8xkbCIAAAAJ");

        let records = vec![citing("AAAA"), citing("BBBB")];
        cache.save(CITING_RECORDS_FILE, &records)?;

        let loaded: Vec<CitingRecord> = cache.load(CITING_RECORDS_FILE).expect("cache present");
        assert_eq!(loaded, records);
        Ok(())
    }

    #[test]
    fn test_empty_not_written() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cache = StageCache::new(dir.path(), "someone");

        cache.save::<CitingRecord>(CITING_RECORDS_FILE, &[])?;
        assert!(!cache.path(CITING_RECORDS_FILE).exists());
        Ok(())
    }

    #[test]
    fn test_load_missing() {
        let cache = StageCache::new(Path::new("/nonexistent"), "nobody");
        assert!(cache.load::<CitingRecord>(CITING_RECORDS_FILE).is_none());
    }

    #[test]
    fn test_load_corrupt() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cache = StageCache::new(dir.path(), "someone");
        std::fs::create_dir_all(cache.dir())?;
        std::fs::write(cache.path(CITING_RECORDS_FILE), "not json")?;

        assert!(cache.load::<CitingRecord>(CITING_RECORDS_FILE).is_none());
        Ok(())
    }
}
