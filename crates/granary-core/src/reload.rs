//! Change detection for the source cache file
//!
//! Polling only: the store asks the watcher on every query whether the
//! source moved on since the last successful ingestion.

use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::trace;

/// Cheap fingerprint of the source file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceSignal {
    Present {
        modified: Option<SystemTime>,
        len: u64,
    },
    Missing,
}

impl SourceSignal {
    pub async fn probe(path: &Path) -> Self {
        match tokio::fs::metadata(path).await {
            Ok(meta) => SourceSignal::Present {
                modified: meta.modified().ok(),
                len: meta.len(),
            },
            Err(_) => SourceSignal::Missing,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, SourceSignal::Missing)
    }
}

/// Result of a change check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeStatus {
    Unchanged,
    Changed(SourceSignal),
}

/// Tracks the last committed signal for one source file
#[derive(Debug)]
pub struct ReloadWatcher {
    source: PathBuf,
    committed: Option<SourceSignal>,
}

impl ReloadWatcher {
    /// A watcher with nothing committed; the first check always reports a change
    pub fn new(source: PathBuf) -> Self {
        Self {
            source,
            committed: None,
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn committed(&self) -> Option<SourceSignal> {
        self.committed
    }

    pub async fn check(&self) -> ChangeStatus {
        let current = SourceSignal::probe(&self.source).await;
        if self.committed == Some(current) {
            trace!(path = %self.source.display(), "Source unchanged");
            ChangeStatus::Unchanged
        } else {
            ChangeStatus::Changed(current)
        }
    }

    /// Record `signal` as ingested. Only call after the state derived from
    /// it has been published.
    pub fn commit(&mut self, signal: SourceSignal) {
        self.committed = Some(signal);
    }

    /// Forget the committed signal so the next check reports a change
    pub fn invalidate(&mut self) {
        self.committed = None;
    }
}
