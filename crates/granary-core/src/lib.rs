//! granary-core - Core library for granary
//!
//! Provides the cache parser, merge engine, snapshots, published store,
//! queries and pattern analysis over a local meeting-notes cache.

pub mod analytics;
pub mod config;
pub mod error;
pub mod event;
pub mod merge;
pub mod models;
pub mod parsers;
pub mod query;
pub mod reload;
pub mod snapshots;
pub mod store;
pub mod text;

pub use analytics::{DateRange, PatternAnalyzer, PatternKind, PatternOutcome};
pub use config::GranaryConfig;
pub use error::{CoreError, DegradedState, ParseReport};
pub use event::{EventBus, StoreEvent};
pub use merge::{merge, MergeOutcome, MergeStats};
pub use query::{MeetingLookup, NotesLookup, QueryEngine, SearchOutcome, TranscriptLookup};
pub use snapshots::{SnapshotEntry, SnapshotManager};
pub use store::{MeetingStore, PublishedState, RefreshOutcome};
