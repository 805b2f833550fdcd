//! Parser for the meeting application's local cache file
//!
//! The cache comes in two encodings:
//! - flat: `{"documents": {...}, "transcripts": {...}, "documentPanels": {...}}`
//! - nested: `{"cache": "<json string>"}` where the string decodes to
//!   `{"state": {<flat payload>}}` (or the flat payload directly)
//!
//! Both are reduced to the same `CacheSnapshot`. Individual entries that
//! cannot be interpreted are skipped and recorded in the snapshot's report.

use crate::error::{CoreError, ParseReport};
use crate::models::{
    CacheSnapshot, MeetingNotes, MeetingRecord, NoteDocument, NoteKind, TranscriptRecord,
    TranscriptSegment,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, trace, warn};

const DOCUMENTS: &str = "documents";
const TRANSCRIPTS: &str = "transcripts";
const PANELS: &str = "documentPanels";

/// Key holding the JSON-encoded payload in the nested encoding
const WRAPPER_KEY: &str = "cache";

/// On-disk encoding, detected by probing the top-level object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEncoding {
    Flat,
    Nested,
}

impl CacheEncoding {
    pub fn detect(root: &Map<String, Value>) -> Self {
        match root.get(WRAPPER_KEY) {
            Some(Value::String(_)) => CacheEncoding::Nested,
            _ => CacheEncoding::Flat,
        }
    }

    /// Reduce the top-level object to the flat payload
    fn unwrap(self, mut root: Map<String, Value>) -> Result<Map<String, Value>, CoreError> {
        match self {
            CacheEncoding::Flat => Ok(root),
            CacheEncoding::Nested => {
                let Some(Value::String(inner)) = root.remove(WRAPPER_KEY) else {
                    return Err(CoreError::CacheFormat {
                        message: format!("'{WRAPPER_KEY}' is not a string"),
                    });
                };
                let decoded: Value =
                    serde_json::from_str(&inner).map_err(|e| CoreError::CacheFormat {
                        message: format!("nested payload is not valid JSON: {e}"),
                    })?;
                let Value::Object(mut decoded) = decoded else {
                    return Err(CoreError::CacheFormat {
                        message: "nested payload is not an object".to_string(),
                    });
                };
                match decoded.remove("state") {
                    Some(Value::Object(state)) => Ok(state),
                    Some(_) => Err(CoreError::CacheFormat {
                        message: "nested 'state' is not an object".to_string(),
                    }),
                    None => Ok(decoded),
                }
            }
        }
    }
}

/// Parser for the source cache file, with retry for files caught mid-write
pub struct CacheParser {
    max_retries: u32,
    retry_delay: Duration,
}

impl Default for CacheParser {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(100),
        }
    }
}

impl CacheParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    /// Read and parse the cache file
    ///
    /// Retries on read or decode failure since the application may be
    /// rewriting the file. A missing file is returned immediately.
    pub async fn read(&self, path: &Path) -> Result<CacheSnapshot, CoreError> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!(attempt, "Retrying cache parse after delay");
                sleep(self.retry_delay * attempt).await;
            }

            match self.try_read(path).await {
                Ok(snapshot) => return Ok(snapshot),
                Err(e @ CoreError::FileNotFound { .. }) => return Err(e),
                Err(e) => {
                    warn!(attempt, error = %e, "Cache parse attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| CoreError::FileNotFound {
            path: path.to_path_buf(),
        }))
    }

    async fn try_read(&self, path: &Path) -> Result<CacheSnapshot, CoreError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CoreError::from_read(path, e))?;
        parse_cache(&content, path)
    }
}

/// Parse cache text into a snapshot
///
/// `origin` is only used to label errors.
pub fn parse_cache(content: &str, origin: &Path) -> Result<CacheSnapshot, CoreError> {
    let root: Value = serde_json::from_str(content).map_err(|e| CoreError::JsonParse {
        path: origin.to_path_buf(),
        message: e.to_string(),
        source: e,
    })?;

    let Value::Object(root) = root else {
        return Err(CoreError::CacheFormat {
            message: "top-level value is not an object".to_string(),
        });
    };

    let encoding = CacheEncoding::detect(&root);
    trace!(?encoding, "Detected cache encoding");
    let payload = encoding.unwrap(root)?;

    Ok(interpret_payload(&payload))
}

/// Build a snapshot from the flat payload
fn interpret_payload(payload: &Map<String, Value>) -> CacheSnapshot {
    let mut report = ParseReport::new();

    let documents = section(payload, DOCUMENTS, &mut report);
    let transcripts_raw = section(payload, TRANSCRIPTS, &mut report);
    let panels = section(payload, PANELS, &mut report);

    let mut meetings = BTreeMap::new();
    let mut notes: BTreeMap<String, MeetingNotes> = BTreeMap::new();

    for (id, value) in documents {
        report.record_entry();
        match parse_meeting(id, value) {
            Ok(meeting) => {
                if let Some(raw) = extract_raw_notes(value) {
                    notes.entry(id.clone()).or_default().insert(NoteDocument {
                        meeting_id: id.clone(),
                        kind: NoteKind::RawNotes,
                        created_at: meeting.created_at,
                        content: raw,
                    });
                }
                meetings.insert(id.clone(), meeting);
            }
            Err(message) => report.skip(DOCUMENTS, id, message),
        }
    }

    for (id, value) in panels {
        report.record_entry();
        match parse_panels(id, value) {
            Ok(Some((content, created_at))) => {
                let created_at =
                    created_at.or_else(|| meetings.get(id).and_then(|m| m.created_at));
                notes.entry(id.clone()).or_default().insert(NoteDocument {
                    meeting_id: id.clone(),
                    kind: NoteKind::AiSummary,
                    created_at,
                    content,
                });
            }
            Ok(None) => {}
            Err(message) => report.skip(PANELS, id, message),
        }
    }

    let mut transcripts = BTreeMap::new();
    for (id, value) in transcripts_raw {
        report.record_entry();
        match parse_transcript(id, value) {
            Ok(Some(transcript)) => {
                transcripts.insert(id.clone(), transcript);
            }
            Ok(None) => {}
            Err(message) => report.skip(TRANSCRIPTS, id, message),
        }
    }

    for (id, meeting) in meetings.iter_mut() {
        meeting.has_transcript = transcripts.get(id).is_some_and(|t| !t.is_empty());
        meeting.has_notes = notes.get(id).is_some_and(|n| n.has_content());
    }

    if report.has_warnings() {
        warn!(
            skipped = report.entries_skipped,
            seen = report.entries_seen,
            "Skipped malformed cache entries"
        );
    }
    debug!(
        meetings = meetings.len(),
        transcripts = transcripts.len(),
        notes = notes.len(),
        "Parsed cache snapshot"
    );

    CacheSnapshot {
        meetings,
        transcripts,
        notes,
        report,
    }
}

/// Borrow a top-level collection, recording a warning if it has the wrong shape
fn section<'a>(
    payload: &'a Map<String, Value>,
    name: &'static str,
    report: &mut ParseReport,
) -> impl Iterator<Item = (&'a String, &'a Value)> {
    let entries = match payload.get(name) {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(map),
        Some(_) => {
            report.skip(name, "*", "collection is not an object");
            None
        }
    };
    entries.into_iter().flat_map(|map| map.iter())
}

fn parse_meeting(id: &str, value: &Value) -> Result<MeetingRecord, String> {
    let Value::Object(doc) = value else {
        return Err("document is not an object".to_string());
    };

    let mut meeting = MeetingRecord::new(id);
    meeting.title = optional_str(doc, "title")?.unwrap_or_default().trim().to_string();
    meeting.created_at = parse_timestamp(doc.get("created_at"))
        .map_err(|e| format!("invalid created_at: {e}"))?;
    meeting.updated_at = parse_timestamp(doc.get("updated_at"))
        .map_err(|e| format!("invalid updated_at: {e}"))?;
    meeting.meeting_type = optional_str(doc, "type")?
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    meeting.participants = extract_participants(doc.get("people"));

    Ok(meeting)
}

fn optional_str<'a>(doc: &'a Map<String, Value>, key: &str) -> Result<Option<&'a str>, String> {
    match doc.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(format!("'{key}' is not a string")),
    }
}

/// Parse an RFC 3339 timestamp, or a naive ISO timestamp taken as UTC
pub(crate) fn parse_timestamp(value: Option<&Value>) -> Result<Option<DateTime<Utc>>, String> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Ok(Some(dt.with_timezone(&Utc)));
            }
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .map(|naive| Some(naive.and_utc()))
                .map_err(|_| format!("'{s}' is not a timestamp"))
        }
        Some(other) => Err(format!("expected string, got {other}")),
    }
}

/// Participant names from `people`, either a list or `{creator, attendees}`
fn extract_participants(people: Option<&Value>) -> Vec<String> {
    let mut candidates: Vec<&Value> = Vec::new();
    match people {
        Some(Value::Array(list)) => candidates.extend(list),
        Some(Value::Object(obj)) => {
            if let Some(creator) = obj.get("creator") {
                candidates.push(creator);
            }
            if let Some(Value::Array(attendees)) = obj.get("attendees") {
                candidates.extend(attendees);
            }
        }
        _ => {}
    }

    let mut names: Vec<String> = Vec::new();
    for person in candidates {
        let name = match person {
            Value::String(s) => Some(s.as_str()),
            Value::Object(p) => p
                .get("name")
                .and_then(Value::as_str)
                .or_else(|| {
                    p.get("details")
                        .and_then(|d| d.get("person"))
                        .and_then(|d| d.get("name"))
                        .and_then(|n| n.get("fullName"))
                        .and_then(Value::as_str)
                }),
            _ => None,
        };
        if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
            if !names.iter().any(|existing| existing == name) {
                names.push(name.to_string());
            }
        }
    }
    names
}

/// Inline notes on a document: plain, then markdown, then the structured tree,
/// followed by any overview/summary strings
fn extract_raw_notes(value: &Value) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();

    let inline = ["notes_plain", "notes_markdown"]
        .iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| value.get("notes").map(extract_structured_text))
        .filter(|s| !s.is_empty());
    parts.extend(inline);

    for (key, label) in [("overview", "Overview"), ("summary", "Summary")] {
        if let Some(text) = value.get(key).and_then(Value::as_str).map(str::trim) {
            if !text.is_empty() {
                parts.push(format!("{label}: {text}"));
            }
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}

/// Flatten a rich-text tree (`{type, text, content: [...]}` nodes) to plain text
///
/// Inline runs inside a paragraph or heading are concatenated; block nodes
/// are separated by newlines.
pub(crate) fn extract_structured_text(node: &Value) -> String {
    fn walk(node: &Value) -> String {
        let Value::Object(obj) = node else {
            return String::new();
        };
        let kind = obj.get("type").and_then(Value::as_str).unwrap_or("");
        if kind == "text" {
            return obj
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
        }
        if kind == "hardBreak" {
            return "\n".to_string();
        }
        let Some(Value::Array(children)) = obj.get("content") else {
            return String::new();
        };
        let texts = children.iter().map(walk);
        if matches!(kind, "paragraph" | "heading") {
            texts.collect::<String>()
        } else {
            texts
                .filter(|t| !t.trim().is_empty())
                .collect::<Vec<_>>()
                .join("\n")
        }
    }

    walk(node).trim().to_string()
}

/// AI summary text from a meeting's panels, with the earliest panel timestamp
fn parse_panels(
    id: &str,
    value: &Value,
) -> Result<Option<(String, Option<DateTime<Utc>>)>, String> {
    let panels = match value {
        Value::Null => return Ok(None),
        Value::Object(panels) => panels,
        _ => return Err(format!("panels for {id} are not an object")),
    };

    let mut texts = Vec::new();
    let mut earliest: Option<DateTime<Utc>> = None;
    for (panel_id, panel) in panels {
        let Some(content) = panel.get("content") else {
            trace!(panel_id, "Panel has no content");
            continue;
        };
        let text = match content {
            Value::String(s) => s.trim().to_string(),
            other => extract_structured_text(other),
        };
        if text.is_empty() {
            continue;
        }
        texts.push(text);
        if let Ok(Some(ts)) = parse_timestamp(panel.get("created_at")) {
            earliest = Some(earliest.map_or(ts, |e| e.min(ts)));
        }
    }

    if texts.is_empty() {
        Ok(None)
    } else {
        Ok(Some((texts.join("\n\n"), earliest)))
    }
}

fn parse_transcript(id: &str, value: &Value) -> Result<Option<TranscriptRecord>, String> {
    let segments = match value {
        Value::Null => return Ok(None),
        Value::Array(items) => {
            let mut segments = Vec::with_capacity(items.len());
            let mut dropped = 0usize;
            for item in items {
                match parse_segment(item) {
                    Some(segment) if segment.text.is_empty() => {}
                    Some(segment) => segments.push(segment),
                    None => dropped += 1,
                }
            }
            if dropped > 0 {
                trace!(id, dropped, "Dropped malformed transcript segments");
                if segments.is_empty() {
                    return Err(format!("{dropped} malformed segments and no usable text"));
                }
            }
            if segments.iter().all(|s| s.timestamp.is_some()) {
                segments.sort_by_key(|s| s.timestamp);
            }
            segments
        }
        Value::Object(obj) => {
            let text = ["content", "text", "transcript"]
                .iter()
                .filter_map(|key| obj.get(*key).and_then(Value::as_str))
                .map(str::trim)
                .find(|s| !s.is_empty());
            let speaker = obj
                .get("speakers")
                .and_then(Value::as_array)
                .and_then(|s| s.first())
                .and_then(Value::as_str)
                .map(str::to_string);
            text.map(|text| TranscriptSegment {
                speaker,
                text: text.to_string(),
                timestamp: None,
            })
            .into_iter()
            .collect()
        }
        _ => return Err("transcript is neither a segment list nor an object".to_string()),
    };

    Ok(Some(TranscriptRecord {
        meeting_id: id.to_string(),
        segments,
    }))
}

fn parse_segment(item: &Value) -> Option<TranscriptSegment> {
    let Value::Object(seg) = item else {
        return None;
    };
    let text = seg.get("text")?.as_str()?.trim().to_string();
    let speaker = ["speaker", "source"]
        .iter()
        .filter_map(|key| seg.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string);
    let timestamp = parse_timestamp(seg.get("start_timestamp"))
        .ok()
        .flatten()
        .or_else(|| parse_timestamp(seg.get("timestamp")).ok().flatten());

    Some(TranscriptSegment {
        speaker,
        text,
        timestamp,
    })
}
