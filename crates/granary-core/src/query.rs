//! Read-only queries over a published backup store
//!
//! Every lookup returns a typed outcome; absence is a variant, never an error.

use crate::models::{BackupStore, MeetingRecord, NoteDocument, TranscriptRecord};
use crate::text::{token_set, tokenize};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;

pub const DEFAULT_SEARCH_LIMIT: usize = 10;
pub const MAX_SEARCH_LIMIT: usize = 50;

/// Which field satisfied the query; lower ranks first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Title,
    Participant,
    Transcript,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub tier: MatchTier,
    pub meeting: MeetingRecord,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Results(Vec<SearchHit>),
    NoResults,
}

impl SearchOutcome {
    pub fn hits(&self) -> &[SearchHit] {
        match self {
            SearchOutcome::Results(hits) => hits,
            SearchOutcome::NoResults => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MeetingLookup {
    Found(MeetingRecord),
    NotFound,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptLookup {
    Found {
        meeting: MeetingRecord,
        transcript: TranscriptRecord,
    },
    /// The meeting exists but no transcript text was ever captured
    Unavailable,
    NotFound,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotesLookup {
    Found {
        meeting: MeetingRecord,
        note: NoteDocument,
    },
    Empty,
    NotFound,
}

/// Clamp a requested result count into `1..=MAX_SEARCH_LIMIT`
pub fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_SEARCH_LIMIT)
}

/// Queries over one immutable store value
pub struct QueryEngine<'a> {
    store: &'a BackupStore,
}

impl<'a> QueryEngine<'a> {
    pub fn new(store: &'a BackupStore) -> Self {
        Self { store }
    }

    /// Tiered token search
    ///
    /// A meeting matches a tier when every query token appears among the
    /// tokens of that field. Results are ordered by tier, then newest
    /// `created_at` (undated last), then id.
    pub fn search(&self, query: &str, limit: usize) -> SearchOutcome {
        let terms: HashSet<String> = tokenize(query).into_iter().collect();
        if terms.is_empty() {
            return SearchOutcome::NoResults;
        }

        let mut hits: Vec<SearchHit> = self
            .store
            .meetings
            .values()
            .filter_map(|meeting| {
                self.match_tier(meeting, &terms).map(|tier| SearchHit {
                    tier,
                    meeting: meeting.clone(),
                })
            })
            .collect();

        if hits.is_empty() {
            return SearchOutcome::NoResults;
        }

        hits.sort_by(rank_order);
        hits.truncate(clamp_limit(limit));
        SearchOutcome::Results(hits)
    }

    pub fn get_meeting(&self, id: &str) -> MeetingLookup {
        match self.store.meeting(id) {
            Some(meeting) => MeetingLookup::Found(meeting.clone()),
            None => MeetingLookup::NotFound,
        }
    }

    pub fn get_transcript(&self, id: &str) -> TranscriptLookup {
        let Some(meeting) = self.store.meeting(id) else {
            return TranscriptLookup::NotFound;
        };
        match self.store.transcript(id) {
            Some(transcript) if !transcript.is_empty() => TranscriptLookup::Found {
                meeting: meeting.clone(),
                transcript: transcript.clone(),
            },
            _ => TranscriptLookup::Unavailable,
        }
    }

    /// Notes for a meeting, AI summary preferred over raw notes
    pub fn get_notes(&self, id: &str) -> NotesLookup {
        let Some(meeting) = self.store.meeting(id) else {
            return NotesLookup::NotFound;
        };
        match self.store.notes(id).and_then(|notes| notes.preferred()) {
            Some(note) => NotesLookup::Found {
                meeting: meeting.clone(),
                note: note.clone(),
            },
            None => NotesLookup::Empty,
        }
    }

    fn match_tier(&self, meeting: &MeetingRecord, terms: &HashSet<String>) -> Option<MatchTier> {
        if terms.is_subset(&token_set(&meeting.title)) {
            return Some(MatchTier::Title);
        }

        let participant_tokens: HashSet<String> = meeting
            .participants
            .iter()
            .flat_map(|p| tokenize(p))
            .collect();
        if terms.is_subset(&participant_tokens) {
            return Some(MatchTier::Participant);
        }

        let transcript = self.store.transcript(&meeting.id)?;
        if terms.is_subset(&token_set(&transcript.full_text())) {
            return Some(MatchTier::Transcript);
        }
        None
    }
}

fn rank_order(a: &SearchHit, b: &SearchHit) -> Ordering {
    a.tier
        .cmp(&b.tier)
        .then_with(|| match (a.meeting.created_at, b.meeting.created_at) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.meeting.id.cmp(&b.meeting.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MeetingNotes, NoteKind, TranscriptSegment};
    use chrono::{TimeZone, Utc};

    fn meeting(id: &str, title: &str, day: Option<u32>, participants: &[&str]) -> MeetingRecord {
        let mut m = MeetingRecord::new(id);
        m.title = title.to_string();
        m.created_at = day.map(|d| Utc.with_ymd_and_hms(2026, 1, d, 10, 0, 0).unwrap());
        m.participants = participants.iter().map(|p| p.to_string()).collect();
        m
    }

    fn transcript(id: &str, lines: &[&str]) -> TranscriptRecord {
        TranscriptRecord {
            meeting_id: id.to_string(),
            segments: lines
                .iter()
                .map(|text| TranscriptSegment {
                    speaker: None,
                    text: text.to_string(),
                    timestamp: None,
                })
                .collect(),
        }
    }

    fn sample_store() -> BackupStore {
        let mut store = BackupStore::default();
        for m in [
            meeting("m1", "Alice 1:1", Some(5), &["Alice Smith", "Bob"]),
            meeting("m2", "Roadmap review", Some(9), &["Alice Smith"]),
            meeting("m3", "Planning", Some(12), &["Carol"]),
            meeting("m4", "Standup", None, &["Alice Jones"]),
            meeting("m5", "Budget", Some(2), &["Dave"]),
        ] {
            store.meetings.insert(m.id.clone(), m);
        }
        store
            .transcripts
            .insert("m3".into(), transcript("m3", &["Alice will send the deck"]));
        store
            .transcripts
            .insert("m5".into(), transcript("m5", &[]));
        store
    }

    fn ids(outcome: &SearchOutcome) -> Vec<&str> {
        outcome.hits().iter().map(|h| h.meeting.id.as_str()).collect()
    }

    #[test]
    fn test_search_ranks_by_tier_then_recency() {
        let store = sample_store();
        let engine = QueryEngine::new(&store);

        let outcome = engine.search("alice", 10);
        assert_eq!(ids(&outcome), vec!["m1", "m2", "m4", "m3"]);

        let tiers: Vec<MatchTier> = outcome.hits().iter().map(|h| h.tier).collect();
        assert_eq!(
            tiers,
            vec![
                MatchTier::Title,
                MatchTier::Participant,
                MatchTier::Participant,
                MatchTier::Transcript
            ]
        );
    }

    #[test]
    fn test_search_requires_all_tokens() {
        let store = sample_store();
        let engine = QueryEngine::new(&store);

        assert_eq!(ids(&engine.search("Alice Smith", 10)), vec!["m2", "m1"]);
        assert_eq!(engine.search("alice zebra", 10), SearchOutcome::NoResults);
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let store = sample_store();
        let engine = QueryEngine::new(&store);
        assert_eq!(engine.search("ROADMAP", 10), engine.search("roadmap", 10));
        assert_eq!(ids(&engine.search("ROADMAP", 10)), vec!["m2"]);
    }

    #[test]
    fn test_search_empty_query() {
        let store = sample_store();
        let engine = QueryEngine::new(&store);
        assert_eq!(engine.search("", 10), SearchOutcome::NoResults);
        assert_eq!(engine.search("  ?! ", 10), SearchOutcome::NoResults);
    }

    #[test]
    fn test_search_limit_clamped() {
        let store = sample_store();
        let engine = QueryEngine::new(&store);

        assert_eq!(engine.search("alice", 0).hits().len(), 1);
        assert_eq!(engine.search("alice", 2).hits().len(), 2);
        assert_eq!(clamp_limit(500), MAX_SEARCH_LIMIT);
    }

    #[test]
    fn test_search_is_deterministic() {
        let store = sample_store();
        let engine = QueryEngine::new(&store);
        let first = engine.search("alice", 10);
        for _ in 0..5 {
            assert_eq!(engine.search("alice", 10), first);
        }
    }

    #[test]
    fn test_get_meeting() {
        let store = sample_store();
        let engine = QueryEngine::new(&store);

        assert!(matches!(engine.get_meeting("m1"), MeetingLookup::Found(m) if m.title == "Alice 1:1"));
        assert_eq!(engine.get_meeting("nope"), MeetingLookup::NotFound);
    }

    #[test]
    fn test_transcript_not_found_vs_unavailable() {
        let store = sample_store();
        let engine = QueryEngine::new(&store);

        assert!(matches!(
            engine.get_transcript("m3"),
            TranscriptLookup::Found { transcript, .. } if transcript.segments.len() == 1
        ));
        // Meeting known, no transcript ever captured
        assert_eq!(engine.get_transcript("m1"), TranscriptLookup::Unavailable);
        // Present but empty
        assert_eq!(engine.get_transcript("m5"), TranscriptLookup::Unavailable);
        assert_eq!(engine.get_transcript("ghost"), TranscriptLookup::NotFound);
    }

    #[test]
    fn test_notes_prefer_ai_summary() {
        let mut store = sample_store();
        let mut notes = MeetingNotes::default();
        notes.insert(NoteDocument {
            meeting_id: "m1".into(),
            kind: NoteKind::RawNotes,
            created_at: None,
            content: "scribbles".into(),
        });
        store.notes.insert("m1".into(), notes.clone());

        let engine = QueryEngine::new(&store);
        assert!(matches!(
            engine.get_notes("m1"),
            NotesLookup::Found { note, .. } if note.kind == NoteKind::RawNotes
        ));

        notes.insert(NoteDocument {
            meeting_id: "m1".into(),
            kind: NoteKind::AiSummary,
            created_at: None,
            content: "Decisions: ship it".into(),
        });
        store.notes.insert("m1".into(), notes);

        let engine = QueryEngine::new(&store);
        assert!(matches!(
            engine.get_notes("m1"),
            NotesLookup::Found { note, .. } if note.content == "Decisions: ship it"
        ));
        assert_eq!(engine.get_notes("m2"), NotesLookup::Empty);
        assert_eq!(engine.get_notes("ghost"), NotesLookup::NotFound);
    }
}
