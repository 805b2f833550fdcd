//! Published meeting state and the reload pipeline
//!
//! The published value is an `Arc<PublishedState>` behind a
//! parking_lot::RwLock and is replaced wholesale after each successful merge.
//! A tokio Mutex around the `ReloadWatcher` serializes the pipeline, so at
//! most one merge runs at a time. Query entry points refresh first and then
//! read, which means a request that arrives during a merge waits for it.

use crate::analytics::{DateRange, PatternAnalyzer, PatternKind, PatternOutcome};
use crate::config::GranaryConfig;
use crate::error::{CoreError, DegradedState};
use crate::event::{EventBus, StoreEvent};
use crate::merge::{merge, MergeStats};
use crate::models::{BackupFile, BackupMetadata, BackupStore};
use crate::parsers::CacheParser;
use crate::query::{MeetingLookup, NotesLookup, QueryEngine, SearchOutcome, TranscriptLookup};
use crate::reload::{ChangeStatus, ReloadWatcher};
use crate::snapshots::{SnapshotEntry, SnapshotManager};
use chrono::{TimeZone, Utc};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// One immutable, queryable version of the backup
#[derive(Debug, Clone, Default)]
pub struct PublishedState {
    pub store: BackupStore,
    /// `None` until a backup file has been loaded or written
    pub metadata: Option<BackupMetadata>,
    /// Stats of the merge that produced this state
    pub last_merge: Option<MergeStats>,
}

/// What a refresh did
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// Source unchanged since the last successful ingestion
    Unchanged,
    Merged(MergeStats),
    /// Source file absent; the backup keeps being served
    SourceMissing,
    /// Pipeline failed; the previous state keeps being served
    Failed(String),
}

/// Owner of the published state, the backup file and the reload pipeline
pub struct MeetingStore {
    config: GranaryConfig,

    parser: CacheParser,

    snapshots: SnapshotManager,

    /// Current published state (atomic pointer swap)
    published: RwLock<Arc<PublishedState>>,

    /// Single-writer lock; also holds the last committed source signal
    writer: Mutex<ReloadWatcher>,

    degraded_state: RwLock<DegradedState>,

    event_bus: EventBus,
}

impl MeetingStore {
    /// Open the store, loading `backup.json` if present
    ///
    /// A corrupt backup falls back to the newest readable snapshot, then to
    /// an empty store if the source cache is readable; the corrupt file is
    /// moved aside and a state restored from a snapshot is written back as
    /// the new backup. Fails only when none of these are available.
    pub async fn open(config: GranaryConfig) -> Result<Self, CoreError> {
        let parser = CacheParser::new().with_retries(config.retry_count, config.retry_delay);
        let snapshots = SnapshotManager::new(config.snapshot_dir(), config.max_snapshots)
            .with_retries(config.retry_count, config.retry_delay);
        let backup_path = config.backup_path();
        let mut restored = false;

        let initial = match load_backup_file(&backup_path).await {
            Ok(Some(file)) => {
                info!(
                    path = %backup_path.display(),
                    meetings = file.store.meeting_count(),
                    "Loaded backup"
                );
                PublishedState {
                    store: file.store,
                    metadata: Some(file.backup_metadata),
                    last_merge: None,
                }
            }
            Ok(None) => {
                debug!(path = %backup_path.display(), "No backup yet, starting empty");
                PublishedState::default()
            }
            Err(e) => {
                warn!(error = %e, "Backup unreadable, looking for a fallback");
                let state = recover_state(&snapshots, &parser, &config, &backup_path).await?;
                quarantine_backup(&backup_path).await;
                restored = state.metadata.is_some();
                state
            }
        };

        let store = Self {
            writer: Mutex::new(ReloadWatcher::new(config.cache_path.clone())),
            config,
            parser,
            snapshots,
            published: RwLock::new(Arc::new(initial)),
            degraded_state: RwLock::new(DegradedState::Healthy),
            event_bus: EventBus::default_capacity(),
        };

        if restored {
            store.persist_restored(&backup_path).await;
        }
        Ok(store)
    }

    pub fn config(&self) -> &GranaryConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn degraded_state(&self) -> DegradedState {
        self.degraded_state.read().clone()
    }

    /// Last published state; never waits for an in-flight merge
    pub fn current(&self) -> Arc<PublishedState> {
        Arc::clone(&self.published.read())
    }

    pub fn list_snapshots(&self) -> Vec<SnapshotEntry> {
        self.snapshots.list()
    }

    /// Re-ingest the source if it changed since the last successful merge
    pub async fn refresh(&self) -> RefreshOutcome {
        let mut watcher = self.writer.lock().await;
        self.refresh_locked(&mut watcher).await
    }

    /// Re-ingest the source even if its signal is unchanged
    pub async fn force_refresh(&self) -> RefreshOutcome {
        let mut watcher = self.writer.lock().await;
        watcher.invalidate();
        self.refresh_locked(&mut watcher).await
    }

    pub async fn search(&self, query: &str, limit: usize) -> SearchOutcome {
        self.refresh().await;
        let state = self.current();
        QueryEngine::new(&state.store).search(query, limit)
    }

    pub async fn get_meeting(&self, id: &str) -> MeetingLookup {
        self.refresh().await;
        let state = self.current();
        QueryEngine::new(&state.store).get_meeting(id)
    }

    pub async fn get_transcript(&self, id: &str) -> TranscriptLookup {
        self.refresh().await;
        let state = self.current();
        QueryEngine::new(&state.store).get_transcript(id)
    }

    pub async fn get_notes(&self, id: &str) -> NotesLookup {
        self.refresh().await;
        let state = self.current();
        QueryEngine::new(&state.store).get_notes(id)
    }

    pub async fn analyze_patterns<Tz: TimeZone>(
        &self,
        kind: PatternKind,
        range: DateRange,
        tz: Tz,
    ) -> PatternOutcome {
        self.refresh().await;
        let state = self.current();
        PatternAnalyzer::new(&state.store, tz).analyze(kind, range)
    }

    async fn refresh_locked(&self, watcher: &mut ReloadWatcher) -> RefreshOutcome {
        let signal = match watcher.check().await {
            ChangeStatus::Unchanged => return RefreshOutcome::Unchanged,
            ChangeStatus::Changed(signal) => signal,
        };

        if signal.is_missing() {
            warn!(
                path = %self.config.cache_path.display(),
                "Source cache missing, serving backup"
            );
            self.set_degraded(DegradedState::Stale {
                reason: "source cache file is missing".to_string(),
            });
            watcher.commit(signal);
            return RefreshOutcome::SourceMissing;
        }

        self.event_bus.publish(StoreEvent::ReloadStarted);

        match self.run_pipeline().await {
            Ok(stats) => {
                watcher.commit(signal);
                self.set_degraded(DegradedState::Healthy);
                self.event_bus.publish(StoreEvent::BackupMerged(stats));
                RefreshOutcome::Merged(stats)
            }
            Err(e) => {
                warn!(error = %e, "Reload failed, serving previous state");
                let reason = e.to_string();
                self.set_degraded(DegradedState::Stale {
                    reason: reason.clone(),
                });
                self.event_bus
                    .publish(StoreEvent::ReloadFailed(reason.clone()));
                RefreshOutcome::Failed(reason)
            }
        }
    }

    /// Parse, snapshot, merge, persist, publish
    async fn run_pipeline(&self) -> Result<MergeStats, CoreError> {
        let cache_path = &self.config.cache_path;
        let snapshot = self.parser.read(cache_path).await?;

        for warning in &snapshot.report.warnings {
            debug!(%warning, "Skipped cache entry");
        }

        let current = self.current();
        let outcome = merge(&current.store, &snapshot);
        let backup_path = self.config.backup_path();

        let backup_exists = tokio::fs::try_exists(&backup_path).await.unwrap_or(false);
        if !outcome.changed && current.metadata.is_some() && backup_exists {
            debug!(meetings = outcome.stats.meetings_after, "Merge produced no changes");
            return Ok(outcome.stats);
        }

        self.write_snapshot(&backup_path).await;

        let file = BackupFile::new(
            outcome.store,
            cache_path.display().to_string(),
            current.metadata.as_ref(),
            Utc::now(),
        );
        self.write_backup(&file, &backup_path).await?;

        info!(
            meetings = outcome.stats.meetings_after,
            new = outcome.stats.new_meetings,
            updated = outcome.stats.updated_meetings,
            preserved = outcome.stats.preserved_meetings,
            "Backup merged"
        );

        let BackupFile {
            backup_metadata,
            store,
        } = file;
        *self.published.write() = Arc::new(PublishedState {
            store,
            metadata: Some(backup_metadata),
            last_merge: Some(outcome.stats),
        });

        Ok(outcome.stats)
    }

    /// Write a snapshot-restored state back to `backup.json`
    async fn persist_restored(&self, backup_path: &Path) {
        let state = self.current();
        let Some(metadata) = state.metadata.clone() else {
            return;
        };
        let file = BackupFile {
            backup_metadata: metadata,
            store: state.store.clone(),
        };

        match self.write_backup(&file, backup_path).await {
            Ok(()) => info!(
                path = %backup_path.display(),
                meetings = file.store.meeting_count(),
                "Restored backup written"
            ),
            Err(e) => warn!(error = %e, "Could not write restored backup, will retry on next merge"),
        }
    }

    /// Snapshot the pre-merge backup; failures never block the merge
    async fn write_snapshot(&self, backup_path: &Path) {
        match self.snapshots.create(backup_path).await {
            Ok(Some(path)) => {
                self.event_bus.publish(StoreEvent::SnapshotWritten(path));
                let snapshots = self.snapshots.clone();
                let pruned = match tokio::task::spawn_blocking(move || snapshots.prune()).await {
                    Ok(pruned) => pruned,
                    Err(e) => {
                        warn!(error = %e, "Snapshot pruning task failed");
                        0
                    }
                };
                if pruned > 0 {
                    self.event_bus.publish(StoreEvent::SnapshotsPruned(pruned));
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Snapshot failed, continuing with merge"),
        }
    }

    /// Write `backup.json` through a temp file and rename
    async fn write_backup(&self, file: &BackupFile, backup_path: &Path) -> Result<(), CoreError> {
        let json = serde_json::to_string_pretty(file).map_err(|e| CoreError::Serialize {
            what: "backup file",
            source: e,
        })?;

        let dir = &self.config.backup_dir;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| CoreError::DirectoryCreate {
                path: dir.clone(),
                source: e,
            })?;

        let tmp_path = backup_path.with_extension("json.tmp");
        let mut last_error = None;

        for attempt in 0..=self.config.retry_count {
            if attempt > 0 {
                sleep(self.config.retry_delay * attempt).await;
            }
            let result = async {
                tokio::fs::write(&tmp_path, json.as_bytes()).await?;
                tokio::fs::rename(&tmp_path, backup_path).await
            }
            .await;

            match result {
                Ok(()) => {
                    debug!(path = %backup_path.display(), bytes = json.len(), "Backup written");
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, path = %backup_path.display(), error = %e, "Backup write attempt failed");
                    last_error = Some(e);
                }
            }
        }

        let _ = tokio::fs::remove_file(&tmp_path).await;
        Err(CoreError::FileWrite {
            path: backup_path.to_path_buf(),
            source: last_error
                .unwrap_or_else(|| std::io::Error::other("no write attempt made")),
        })
    }

    fn set_degraded(&self, state: DegradedState) {
        let mut current = self.degraded_state.write();
        if *current != state {
            debug!(?state, "Degraded state changed");
            *current = state;
        }
    }
}

/// `Ok(None)` when the file does not exist
async fn load_backup_file(path: &Path) -> Result<Option<BackupFile>, CoreError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(CoreError::BackupCorrupt {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
        }
    };

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| CoreError::BackupCorrupt {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Newest readable snapshot, else empty if the source is readable
async fn recover_state(
    snapshots: &SnapshotManager,
    parser: &CacheParser,
    config: &GranaryConfig,
    backup_path: &Path,
) -> Result<PublishedState, CoreError> {
    for entry in snapshots.list().into_iter().rev() {
        match load_backup_file(&entry.path).await {
            Ok(Some(file)) => {
                warn!(
                    snapshot = %entry.path.display(),
                    meetings = file.store.meeting_count(),
                    "Restored from snapshot"
                );
                return Ok(PublishedState {
                    store: file.store,
                    metadata: Some(file.backup_metadata),
                    last_merge: None,
                });
            }
            Ok(None) => {}
            Err(e) => debug!(error = %e, "Snapshot unusable"),
        }
    }

    match parser.read(&config.cache_path).await {
        Ok(_) => {
            warn!("No usable snapshot, rebuilding backup from the source cache");
            Ok(PublishedState::default())
        }
        Err(e) => {
            warn!(error = %e, "Source cache unreadable");
            Err(CoreError::BackupUnrecoverable {
                path: backup_path.to_path_buf(),
            })
        }
    }
}

/// Move a corrupt backup out of the way so the next write starts clean
async fn quarantine_backup(backup_path: &Path) {
    let stamp = Utc::now().format("%Y%m%dT%H%M%SZ");
    let mut target = backup_path.as_os_str().to_owned();
    target.push(format!(".corrupt-{stamp}"));
    let target = PathBuf::from(target);

    match tokio::fs::rename(backup_path, &target).await {
        Ok(()) => warn!(path = %target.display(), "Moved corrupt backup aside"),
        Err(e) => warn!(error = %e, "Could not move corrupt backup aside"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    fn test_config(dir: &TempDir) -> GranaryConfig {
        GranaryConfig::new(
            Some(dir.path().join("cache-v3.json")),
            Some(dir.path().join("backup")),
        )
        .with_max_snapshots(3)
        .with_retries(1, Duration::from_millis(1))
    }

    fn write_cache(config: &GranaryConfig, body: &str) {
        std::fs::write(&config.cache_path, body).unwrap();
    }

    const ONE_MEETING: &str = r#"{
        "documents": {
            "m1": {"title": "Weekly Sync", "created_at": "2026-01-05T10:00:00Z", "people": [{"name": "Alice"}]}
        },
        "transcripts": {},
        "documentPanels": {}
    }"#;

    #[tokio::test]
    async fn test_open_empty_and_first_refresh() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir);
        write_cache(&config, ONE_MEETING);

        let store = MeetingStore::open(config.clone()).await.unwrap();
        assert!(store.current().store.is_empty());

        let outcome = store.refresh().await;
        let RefreshOutcome::Merged(stats) = outcome else {
            panic!("expected merge, got {outcome:?}");
        };
        assert_eq!(stats.new_meetings, 1);
        assert!(config.backup_path().exists());
        // First merge has no prior backup to snapshot
        assert!(store.list_snapshots().is_empty());

        assert_eq!(store.refresh().await, RefreshOutcome::Unchanged);
        assert!(store.degraded_state().is_healthy());
    }

    #[tokio::test]
    async fn test_query_entry_point_refreshes() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir);
        write_cache(&config, ONE_MEETING);

        let store = MeetingStore::open(config).await.unwrap();
        assert!(matches!(store.get_meeting("m1").await, MeetingLookup::Found(_)));
        assert_eq!(store.get_meeting("zzz").await, MeetingLookup::NotFound);
    }

    #[tokio::test]
    async fn test_corrupt_source_serves_stale() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir);
        write_cache(&config, ONE_MEETING);

        let store = MeetingStore::open(config.clone()).await.unwrap();
        store.refresh().await;

        write_cache(&config, "{ not json at all");
        let outcome = store.refresh().await;
        assert!(matches!(outcome, RefreshOutcome::Failed(_)));
        assert!(store.degraded_state().is_degraded());
        assert_eq!(store.current().store.meeting_count(), 1);

        // Not committed, so the next call retries
        assert!(matches!(store.refresh().await, RefreshOutcome::Failed(_)));

        write_cache(&config, ONE_MEETING.replace("Weekly Sync", "Weekly Sync v2").as_str());
        assert!(matches!(store.refresh().await, RefreshOutcome::Merged(_)));
        assert!(store.degraded_state().is_healthy());
    }

    #[tokio::test]
    async fn test_missing_source_keeps_backup() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir);
        write_cache(&config, ONE_MEETING);

        let store = MeetingStore::open(config.clone()).await.unwrap();
        store.refresh().await;
        std::fs::remove_file(&config.cache_path).unwrap();

        assert_eq!(store.refresh().await, RefreshOutcome::SourceMissing);
        assert_eq!(store.current().store.meeting_count(), 1);
    }

    #[tokio::test]
    async fn test_reopen_loads_backup() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir);
        write_cache(&config, ONE_MEETING);

        {
            let store = MeetingStore::open(config.clone()).await.unwrap();
            store.refresh().await;
        }
        std::fs::remove_file(&config.cache_path).unwrap();

        let reopened = MeetingStore::open(config).await.unwrap();
        let state = reopened.current();
        assert_eq!(state.store.meeting_count(), 1);
        assert!(state.metadata.is_some());
    }

    #[tokio::test]
    async fn test_corrupt_backup_without_fallback_is_unrecoverable() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir);
        std::fs::create_dir_all(&config.backup_dir).unwrap();
        std::fs::write(config.backup_path(), "garbage").unwrap();

        let result = MeetingStore::open(config).await;
        assert!(matches!(result, Err(CoreError::BackupUnrecoverable { .. })));
    }

    #[tokio::test]
    async fn test_corrupt_backup_with_source_starts_empty() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir);
        write_cache(&config, ONE_MEETING);
        std::fs::create_dir_all(&config.backup_dir).unwrap();
        std::fs::write(config.backup_path(), "garbage").unwrap();

        let store = MeetingStore::open(config.clone()).await.unwrap();
        assert!(store.current().store.is_empty());
        assert!(!config.backup_path().exists());

        let moved_aside = std::fs::read_dir(&config.backup_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().starts_with("backup.json.corrupt-"));
        assert!(moved_aside);

        assert!(matches!(store.refresh().await, RefreshOutcome::Merged(_)));
        assert_eq!(store.current().store.meeting_count(), 1);
    }

    const TWO_MEETINGS: &str = r#"{
        "documents": {
            "m1": {"title": "Weekly Sync", "created_at": "2026-01-05T10:00:00Z", "people": [{"name": "Alice"}]},
            "m2": {"title": "Roadmap Review", "created_at": "2026-01-06T10:00:00Z", "people": [{"name": "Bob"}]}
        },
        "transcripts": {},
        "documentPanels": {}
    }"#;

    #[tokio::test]
    async fn test_restored_backup_survives_restart() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir);
        write_cache(&config, ONE_MEETING);

        {
            let store = MeetingStore::open(config.clone()).await.unwrap();
            store.refresh().await;
            write_cache(&config, TWO_MEETINGS);
            store.refresh().await;
            assert_eq!(store.list_snapshots().len(), 1);
        }

        std::fs::write(config.backup_path(), "garbage").unwrap();
        std::fs::remove_file(&config.cache_path).unwrap();

        {
            let store = MeetingStore::open(config.clone()).await.unwrap();
            assert!(matches!(store.get_meeting("m1").await, MeetingLookup::Found(_)));
            assert!(config.backup_path().exists());
        }

        let reopened = MeetingStore::open(config).await.unwrap();
        assert!(matches!(reopened.get_meeting("m1").await, MeetingLookup::Found(_)));
        assert!(reopened.current().metadata.is_some());
    }

    #[tokio::test]
    async fn test_unchanged_merge_rewrites_missing_backup() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir);
        write_cache(&config, ONE_MEETING);

        let store = MeetingStore::open(config.clone()).await.unwrap();
        store.refresh().await;
        std::fs::remove_file(config.backup_path()).unwrap();

        assert!(matches!(store.force_refresh().await, RefreshOutcome::Merged(_)));
        let file = load_backup_file(&config.backup_path()).await.unwrap().unwrap();
        assert_eq!(file.store.meeting_count(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_failure_still_commits_merge() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir);
        write_cache(&config, ONE_MEETING);

        let store = MeetingStore::open(config.clone()).await.unwrap();
        store.refresh().await;

        // A plain file where the snapshot directory should be
        std::fs::write(config.snapshot_dir(), "not a directory").unwrap();
        write_cache(&config, TWO_MEETINGS);

        let outcome = store.refresh().await;
        assert!(matches!(outcome, RefreshOutcome::Merged(_)), "got {outcome:?}");
        assert!(store.degraded_state().is_healthy());
        assert!(store.list_snapshots().is_empty());

        let file = load_backup_file(&config.backup_path()).await.unwrap().unwrap();
        assert!(file.store.meetings.contains_key("m2"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_queries_share_one_merge() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir);
        write_cache(&config, ONE_MEETING);

        let store = Arc::new(MeetingStore::open(config.clone()).await.unwrap());
        store.refresh().await;
        let mut events = store.event_bus().subscribe();

        write_cache(&config, TWO_MEETINGS);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.search("roadmap", 10).await })
            })
            .collect();

        for handle in handles {
            let outcome = handle.await.unwrap();
            assert!(outcome.hits().iter().any(|hit| hit.meeting.id == "m2"));
        }

        let mut merged = 0;
        let mut snapshots = 0;
        while let Ok(event) = events.try_recv() {
            match event {
                StoreEvent::BackupMerged(_) => merged += 1,
                StoreEvent::SnapshotWritten(_) => snapshots += 1,
                _ => {}
            }
        }
        assert_eq!(merged, 1);
        assert_eq!(snapshots, 1);
        assert_eq!(store.list_snapshots().len(), 1);
    }
}
