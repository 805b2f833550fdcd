//! Timestamped snapshots of the backup file, with retention
//!
//! Snapshot names are `backup-<UTC stamp>.json` with a microsecond stamp, so
//! lexicographic order is creation order. A new stamp is always later than
//! the newest existing one, even if the clock moved backwards.

use crate::error::CoreError;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};
use walkdir::WalkDir;

const SNAPSHOT_PREFIX: &str = "backup-";
const SNAPSHOT_SUFFIX: &str = ".json";
const STAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.6fZ";
/// Second-resolution stamps written by older backup tools
const LEGACY_STAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

/// A retained snapshot file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub path: PathBuf,
    pub taken_at: Option<DateTime<Utc>>,
    pub size_bytes: u64,
}

impl SnapshotEntry {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Writes and rotates snapshots in one directory
#[derive(Debug, Clone)]
pub struct SnapshotManager {
    dir: PathBuf,
    max_snapshots: usize,
    max_retries: u32,
    retry_delay: Duration,
}

impl SnapshotManager {
    pub fn new(dir: PathBuf, max_snapshots: usize) -> Self {
        Self {
            dir,
            max_snapshots,
            max_retries: 3,
            retry_delay: Duration::from_millis(100),
        }
    }

    pub fn with_retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_snapshots(&self) -> usize {
        self.max_snapshots
    }

    /// Copy the backup file to a new snapshot. Call [`prune`](Self::prune)
    /// afterwards to enforce retention.
    ///
    /// Returns `Ok(None)` when there is no backup file yet or retention is 0.
    pub async fn create(&self, backup_path: &Path) -> Result<Option<PathBuf>, CoreError> {
        self.create_at(backup_path, Utc::now()).await
    }

    pub async fn create_at(
        &self,
        backup_path: &Path,
        now: DateTime<Utc>,
    ) -> Result<Option<PathBuf>, CoreError> {
        if self.max_snapshots == 0 || !backup_path.exists() {
            return Ok(None);
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CoreError::DirectoryCreate {
                path: self.dir.clone(),
                source: e,
            })?;

        let dest = self.next_path(now);
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                sleep(self.retry_delay * attempt).await;
            }
            match tokio::fs::copy(backup_path, &dest).await {
                Ok(_) => {
                    debug!(path = %dest.display(), "Snapshot written");
                    return Ok(Some(dest));
                }
                Err(e) => {
                    warn!(attempt, path = %dest.display(), error = %e, "Snapshot write attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(CoreError::SnapshotWrite {
            path: dest,
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempt made".to_string()),
        })
    }

    /// Delete the oldest snapshots beyond the retention limit
    pub fn prune(&self) -> usize {
        let snapshots = self.list();
        let excess = snapshots.len().saturating_sub(self.max_snapshots);
        let mut removed = 0;

        for entry in snapshots.into_iter().take(excess) {
            match std::fs::remove_file(&entry.path) {
                Ok(()) => removed += 1,
                Err(e) => {
                    warn!(path = %entry.path.display(), error = %e, "Failed to remove old snapshot");
                }
            }
        }

        if removed > 0 {
            debug!(removed, kept = self.max_snapshots, "Pruned snapshots");
        }
        removed
    }

    /// Retained snapshots, oldest first
    pub fn list(&self) -> Vec<SnapshotEntry> {
        if !self.dir.is_dir() {
            return Vec::new();
        }

        let mut entries: Vec<SnapshotEntry> = WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                let name = e.file_name().to_str()?.to_string();
                let stamp = parse_stamp(&name)?;
                Some(SnapshotEntry {
                    path: e.path().to_path_buf(),
                    taken_at: stamp,
                    size_bytes: e.metadata().map(|m| m.len()).unwrap_or(0),
                })
            })
            .collect();

        entries.sort_by(|a, b| {
            a.taken_at
                .cmp(&b.taken_at)
                .then_with(|| a.path.cmp(&b.path))
        });
        entries
    }

    pub fn latest(&self) -> Option<SnapshotEntry> {
        self.list().pop()
    }

    /// Snapshot path for `now`, strictly after every existing snapshot
    fn next_path(&self, now: DateTime<Utc>) -> PathBuf {
        let newest = self.list().into_iter().filter_map(|e| e.taken_at).max();
        let mut stamp = match newest {
            Some(newest) if newest >= now => newest + ChronoDuration::microseconds(1),
            _ => now,
        };

        loop {
            let path = self.dir.join(format!(
                "{SNAPSHOT_PREFIX}{}{SNAPSHOT_SUFFIX}",
                stamp.format(STAMP_FORMAT)
            ));
            if !path.exists() {
                return path;
            }
            stamp += ChronoDuration::microseconds(1);
        }
    }
}

/// `Some(stamp)` for a snapshot file name; `Some(None)` if it is a snapshot
/// whose stamp cannot be read; `None` for unrelated files
fn parse_stamp(name: &str) -> Option<Option<DateTime<Utc>>> {
    let stamp = name
        .strip_prefix(SNAPSHOT_PREFIX)?
        .strip_suffix(SNAPSHOT_SUFFIX)?;
    let parsed = NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(stamp, LEGACY_STAMP_FORMAT))
        .ok()
        .map(|naive| naive.and_utc());
    Some(parsed)
}
