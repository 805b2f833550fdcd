//! Event bus for granary using tokio::broadcast
//!
//! Provides a publish-subscribe mechanism for store updates.

use crate::merge::MergeStats;
use std::path::PathBuf;
use tokio::sync::broadcast;

/// Events emitted by the meeting store
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// Source change detected, pipeline starting
    ReloadStarted,
    /// A merge was published
    BackupMerged(MergeStats),
    /// Pre-merge snapshot written
    SnapshotWritten(PathBuf),
    /// Old snapshots removed by retention
    SnapshotsPruned(usize),
    /// Pipeline failed; previous state still served
    ReloadFailed(String),
}

/// Event bus for broadcasting store events
///
/// Uses tokio::broadcast for multi-consumer support.
pub struct EventBus {
    sender: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Create with default capacity (64 events)
    pub fn default_capacity() -> Self {
        Self::new(64)
    }

    pub fn publish(&self, event: StoreEvent) {
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::default_capacity()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}
