//! Non-destructive merge of a cache snapshot into the backup store
//!
//! Rules, applied per meeting id found in the snapshot:
//! - unknown id: inserted as-is
//! - known id: each field is replaced only by a non-empty value; when the
//!   incoming record is older than the stored one, or carries no
//!   `updated_at` while the stored one does, it may only fill fields that
//!   are still empty
//! - transcripts: replaced only by a non-empty segment list at least as long
//! - notes: per kind, replaced only by non-empty content that is not older
//!
//! Ids that exist only in the backup pass through untouched. The result is
//! a new `BackupStore`; the input is never mutated.

use crate::models::{
    BackupStore, CacheSnapshot, MeetingNotes, MeetingRecord, NoteDocument, NoteKind,
    TranscriptRecord,
};
use serde::Serialize;
use std::collections::BTreeSet;

/// Counts describing one merge, keyed on meeting ids
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub meetings_before: usize,
    pub meetings_after: usize,
    /// In the snapshot, not previously backed up
    pub new_meetings: usize,
    /// In both the snapshot and the backup
    pub updated_meetings: usize,
    /// Only in the backup (evicted from the source cache)
    pub preserved_meetings: usize,
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub store: BackupStore,
    pub stats: MergeStats,
    /// False when the merge reproduced the existing store exactly
    pub changed: bool,
}

/// Fold `snapshot` into a copy of `existing`
pub fn merge(existing: &BackupStore, snapshot: &CacheSnapshot) -> MergeOutcome {
    let mut store = existing.clone();

    for (id, incoming) in &snapshot.meetings {
        match store.meetings.get_mut(id) {
            Some(current) => merge_meeting(current, incoming),
            None => {
                store.meetings.insert(id.clone(), incoming.clone());
            }
        }
    }

    for (id, incoming) in &snapshot.transcripts {
        match store.transcripts.get_mut(id) {
            Some(current) => merge_transcript(current, incoming),
            None => {
                store.transcripts.insert(id.clone(), incoming.clone());
            }
        }
    }

    for (id, incoming) in &snapshot.notes {
        if !incoming.has_content() {
            continue;
        }
        let current = store.notes.entry(id.clone()).or_default();
        for kind in [NoteKind::AiSummary, NoteKind::RawNotes] {
            if let Some(doc) = incoming.get(kind) {
                merge_note(current.slot_mut(kind), doc);
            }
        }
    }

    let touched: BTreeSet<&String> = snapshot
        .meetings
        .keys()
        .chain(snapshot.transcripts.keys())
        .chain(snapshot.notes.keys())
        .collect();
    for id in touched {
        if let Some(meeting) = store.meetings.get_mut(id.as_str()) {
            meeting.has_transcript = store
                .transcripts
                .get(id.as_str())
                .is_some_and(|t| !t.is_empty());
            meeting.has_notes = store
                .notes
                .get(id.as_str())
                .is_some_and(MeetingNotes::has_content);
        }
    }

    let stats = compute_stats(existing, snapshot, &store);
    let changed = store != *existing;

    MergeOutcome {
        store,
        stats,
        changed,
    }
}

fn compute_stats(
    existing: &BackupStore,
    snapshot: &CacheSnapshot,
    merged: &BackupStore,
) -> MergeStats {
    let updated = snapshot
        .meetings
        .keys()
        .filter(|id| existing.meetings.contains_key(id.as_str()))
        .count();

    MergeStats {
        meetings_before: existing.meetings.len(),
        meetings_after: merged.meetings.len(),
        new_meetings: snapshot.meetings.len() - updated,
        updated_meetings: updated,
        preserved_meetings: existing.meetings.len() - updated,
    }
}

/// Replace `current` with `incoming` unless that would lose information
fn merge_field<T: Clone>(
    current: &mut T,
    incoming: &T,
    stale: bool,
    is_empty: impl Fn(&T) -> bool,
) {
    if is_empty(incoming) {
        return;
    }
    if stale && !is_empty(current) {
        return;
    }
    *current = incoming.clone();
}

fn merge_meeting(current: &mut MeetingRecord, incoming: &MeetingRecord) {
    let stale = match (current.updated_at, incoming.updated_at) {
        (Some(have), Some(new)) => new < have,
        (Some(_), None) => true,
        (None, _) => false,
    };

    merge_field(&mut current.title, &incoming.title, stale, |t| t.trim().is_empty());
    merge_field(&mut current.created_at, &incoming.created_at, stale, Option::is_none);
    merge_field(&mut current.participants, &incoming.participants, stale, Vec::is_empty);
    merge_field(&mut current.meeting_type, &incoming.meeting_type, stale, |t| {
        t.as_deref().map_or(true, |s| s.trim().is_empty())
    });
    current.updated_at = current.updated_at.max(incoming.updated_at);
}

fn merge_transcript(current: &mut TranscriptRecord, incoming: &TranscriptRecord) {
    if !incoming.is_empty() && incoming.segments.len() >= current.segments.len() {
        current.segments = incoming.segments.clone();
    }
}

fn merge_note(slot: &mut Option<NoteDocument>, incoming: &NoteDocument) {
    if incoming.content.trim().is_empty() {
        return;
    }
    if let Some(current) = slot.as_ref() {
        let older = matches!(
            (current.created_at, incoming.created_at),
            (Some(have), Some(new)) if new < have
        );
        if older && !current.content.trim().is_empty() {
            return;
        }
    }
    *slot = Some(incoming.clone());
}
