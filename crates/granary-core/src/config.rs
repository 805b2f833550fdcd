//! Runtime configuration for the meeting store

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Cache location used by the desktop app on macOS, relative to home
const DEFAULT_CACHE_RELATIVE: &str = "Library/Application Support/Granola/cache-v3.json";
const BACKUP_FILE_NAME: &str = "backup.json";
const SNAPSHOT_DIR_NAME: &str = "snapshots";

/// Configuration for the meeting store
#[derive(Debug, Clone)]
pub struct GranaryConfig {
    /// Source cache file (read-only)
    pub cache_path: PathBuf,

    /// Directory holding `backup.json` and `snapshots/`
    pub backup_dir: PathBuf,

    /// Snapshot retention count
    pub max_snapshots: usize,

    /// File I/O retry count
    pub retry_count: u32,

    /// Base delay between retries
    pub retry_delay: Duration,
}

impl Default for GranaryConfig {
    fn default() -> Self {
        Self {
            cache_path: default_cache_path(),
            backup_dir: default_backup_dir(),
            max_snapshots: 10,
            retry_count: 3,
            retry_delay: Duration::from_millis(100),
        }
    }
}

impl GranaryConfig {
    /// Defaults with `~` expanded in any explicitly given path
    pub fn new(cache_path: Option<PathBuf>, backup_dir: Option<PathBuf>) -> Self {
        let mut config = Self::default();
        if let Some(path) = cache_path {
            config.cache_path = expand_tilde(&path);
        }
        if let Some(dir) = backup_dir {
            config.backup_dir = expand_tilde(&dir);
        }
        config
    }

    pub fn with_max_snapshots(mut self, max_snapshots: usize) -> Self {
        self.max_snapshots = max_snapshots;
        self
    }

    pub fn with_retries(mut self, retry_count: u32, retry_delay: Duration) -> Self {
        self.retry_count = retry_count;
        self.retry_delay = retry_delay;
        self
    }

    pub fn backup_path(&self) -> PathBuf {
        self.backup_dir.join(BACKUP_FILE_NAME)
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.backup_dir.join(SNAPSHOT_DIR_NAME)
    }
}

pub fn default_cache_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(DEFAULT_CACHE_RELATIVE))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_RELATIVE))
}

pub fn default_backup_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local").join("share")))
        .map(|dir| dir.join("granary"))
        .unwrap_or_else(|| PathBuf::from(".granary"))
}

/// Expand a leading `~` to the home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GranaryConfig::default();
        assert_eq!(config.max_snapshots, 10);
        assert_eq!(config.retry_count, 3);
        assert_eq!(config.retry_delay, Duration::from_millis(100));
        assert!(config.cache_path.ends_with("Granola/cache-v3.json"));
        assert!(config.backup_dir.ends_with("granary"));
    }

    #[test]
    fn test_derived_paths() {
        let config = GranaryConfig::new(None, Some(PathBuf::from("/tmp/granary-test")));
        assert_eq!(
            config.backup_path(),
            PathBuf::from("/tmp/granary-test/backup.json")
        );
        assert_eq!(
            config.snapshot_dir(),
            PathBuf::from("/tmp/granary-test/snapshots")
        );
    }

    #[test]
    fn test_expand_tilde() {
        let absolute = PathBuf::from("/var/data/cache.json");
        assert_eq!(expand_tilde(&absolute), absolute);

        if let Some(home) = dirs::home_dir() {
            assert_eq!(
                expand_tilde(Path::new("~/cache.json")),
                home.join("cache.json")
            );
        }
        // Not a home reference
        assert_eq!(
            expand_tilde(Path::new("~other/cache.json")),
            PathBuf::from("~other/cache.json")
        );
    }
}
