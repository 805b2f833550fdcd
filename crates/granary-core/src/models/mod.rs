//! Data models for granary

pub mod backup;
pub mod meeting;

pub use backup::{BackupFile, BackupMetadata, BackupStore, CacheSnapshot, BACKUP_FORMAT_VERSION};
pub use meeting::{
    MeetingNotes, MeetingRecord, NoteDocument, NoteKind, TranscriptRecord, TranscriptSegment,
    UNTITLED,
};
