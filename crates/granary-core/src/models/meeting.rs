//! Meeting, transcript and note records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Title shown for meetings the source left untitled
pub const UNTITLED: &str = "Untitled Meeting";

/// Metadata for one meeting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingRecord {
    pub id: String,

    /// Empty when the source has no title (never defaulted, so merges can fill it later)
    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    /// Last modification stamp reported by the source application
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub participants: Vec<String>,

    #[serde(default)]
    pub meeting_type: Option<String>,

    #[serde(default)]
    pub has_transcript: bool,

    #[serde(default)]
    pub has_notes: bool,
}

impl MeetingRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            created_at: None,
            updated_at: None,
            participants: Vec::new(),
            meeting_type: None,
            has_transcript: false,
            has_notes: false,
        }
    }

    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            UNTITLED
        } else {
            &self.title
        }
    }
}

/// One utterance in a transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    #[serde(default)]
    pub speaker: Option<String>,
    pub text: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Transcript of a meeting, segments in chronological order
///
/// A record with zero segments means "the source listed a transcript but it
/// was empty", which is distinct from having no record at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptRecord {
    pub meeting_id: String,
    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,
}

impl TranscriptRecord {
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Distinct speakers in order of first appearance
    pub fn speakers(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Some(speaker) = segment.speaker.as_deref() {
                if !seen.contains(&speaker) {
                    seen.push(speaker);
                }
            }
        }
        seen
    }

    /// All segment text joined by single spaces
    pub fn full_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Where a note's content came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteKind {
    /// Generated summary panels
    AiSummary,
    /// Notes typed inline on the meeting document
    RawNotes,
}

impl NoteKind {
    pub fn label(&self) -> &'static str {
        match self {
            NoteKind::AiSummary => "AI summary",
            NoteKind::RawNotes => "Meeting notes",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteDocument {
    pub meeting_id: String,
    pub kind: NoteKind,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    pub content: String,
}

/// Candidate note sources for one meeting, at most one per kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingNotes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_summary: Option<NoteDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_notes: Option<NoteDocument>,
}

impl MeetingNotes {
    pub fn get(&self, kind: NoteKind) -> Option<&NoteDocument> {
        match kind {
            NoteKind::AiSummary => self.ai_summary.as_ref(),
            NoteKind::RawNotes => self.raw_notes.as_ref(),
        }
    }

    pub fn slot_mut(&mut self, kind: NoteKind) -> &mut Option<NoteDocument> {
        match kind {
            NoteKind::AiSummary => &mut self.ai_summary,
            NoteKind::RawNotes => &mut self.raw_notes,
        }
    }

    /// Insert a document into the slot for its kind, replacing any previous one
    pub fn insert(&mut self, doc: NoteDocument) {
        let kind = doc.kind;
        *self.slot_mut(kind) = Some(doc);
    }

    /// Highest-priority note with content: AI summary first, then raw notes
    pub fn preferred(&self) -> Option<&NoteDocument> {
        [NoteKind::AiSummary, NoteKind::RawNotes]
            .into_iter()
            .filter_map(|kind| self.get(kind))
            .find(|doc| !doc.content.trim().is_empty())
    }

    pub fn has_content(&self) -> bool {
        self.preferred().is_some()
    }
}
