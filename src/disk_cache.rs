//! On-disk status-line records, one JSON file per repository and branch.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::config::CacheConfig;
use crate::error::Result;

/// A rendered status-line summary and when it was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCacheRecord {
    pub fetched_at_unix: i64,
    pub summary: String,
}

impl StatusCacheRecord {
    /// Returns true if the record is no older than `max_age` at `now_unix`.
    ///
    /// Records dated in the future are never fresh.
    pub fn is_within(&self, max_age: Duration, now_unix: i64) -> bool {
        let age = now_unix - self.fetched_at_unix;
        age >= 0 && (age as u64) <= max_age.as_secs()
    }

    /// Returns true if the record is older than `max_age` at `now_unix`.
    pub fn is_expired(&self, max_age: Duration, now_unix: i64) -> bool {
        let age = now_unix - self.fetched_at_unix;
        age > 0 && (age as u64) > max_age.as_secs()
    }
}

/// Directory of status-line records.
#[derive(Debug, Clone)]
pub struct DiskStatusCache {
    dir: PathBuf,
}

impl DiskStatusCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Uses the configured directory, or the per-user cache directory.
    pub fn from_config(config: &CacheConfig) -> Option<Self> {
        config
            .status_line_dir
            .clone()
            .or_else(Self::default_dir)
            .map(Self::new)
    }

    /// `<user cache dir>/wt-pr-status/status-line`.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::cache_dir().map(|dir| dir.join("wt-pr-status").join("status-line"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Hex SHA-256 of `repo|branch`.
    pub fn key(repo_root: &Path, branch: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(repo_root.to_string_lossy().as_bytes());
        hasher.update(b"|");
        hasher.update(branch.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn path_for(&self, repo_root: &Path, branch: &str) -> PathBuf {
        self.dir.join(format!("{}.json", Self::key(repo_root, branch)))
    }

    /// Reads the record for a branch, if one exists.
    pub fn read(&self, repo_root: &Path, branch: &str) -> Result<Option<StatusCacheRecord>> {
        let path = self.path_for(repo_root, branch);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&contents)?))
    }

    /// Reads the record only if it is within `max_age`. Unreadable or corrupt
    /// files count as missing.
    pub fn read_within(
        &self,
        repo_root: &Path,
        branch: &str,
        max_age: Duration,
        now_unix: i64,
    ) -> Option<StatusCacheRecord> {
        match self.read(repo_root, branch) {
            Ok(Some(record)) if record.is_within(max_age, now_unix) => Some(record),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(branch = %branch, error = %e, "ignoring unreadable status-line record");
                None
            }
        }
    }

    /// Writes a record atomically via a temp file in the same directory.
    pub fn write(
        &self,
        repo_root: &Path,
        branch: &str,
        summary: &str,
        now_unix: i64,
    ) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let record = StatusCacheRecord {
            fetched_at_unix: now_unix,
            summary: summary.to_string(),
        };

        let mut file = NamedTempFile::new_in(&self.dir)?;
        file.write_all(&serde_json::to_vec(&record)?)?;
        file.flush()?;
        file.persist(self.path_for(repo_root, branch))
            .map_err(|e| e.error)?;
        Ok(())
    }

    /// Deletes records older than `max_age`. Files that do not parse are left
    /// alone. Returns the number of records removed.
    pub fn prune(&self, max_age: Duration, now_unix: i64) -> Result<usize> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Ok(contents) = std::fs::read_to_string(&path) else {
                continue;
            };
            let Ok(record) = serde_json::from_str::<StatusCacheRecord>(&contents) else {
                continue;
            };
            if !record.is_expired(max_age, now_unix) {
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                // Another renderer got there first.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }
}
