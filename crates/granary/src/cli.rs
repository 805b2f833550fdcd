//! Output formatting for granary subcommands
//!
//! Every formatter renders a typed core outcome as human text or JSON.
//! Absence states use fixed messages.

use chrono::{DateTime, TimeZone, Utc};
use comfy_table::{Cell, Color, ContentArrangement, Row, Table};
use granary_core::analytics::{FrequencyReport, RankedCount};
use granary_core::models::{MeetingRecord, NoteDocument, TranscriptRecord};
use granary_core::query::SearchHit;
use granary_core::{
    MeetingLookup, MergeStats, NotesLookup, PatternOutcome, RefreshOutcome, SearchOutcome,
    SnapshotEntry, StoreEvent, TranscriptLookup,
};
use serde_json::json;
use std::path::Path;

pub const NO_DATA: &str = "No meeting data available";

pub fn meeting_not_found(id: &str) -> String {
    format!("Meeting '{id}' not found")
}

pub fn no_search_results(query: &str) -> String {
    format!("No meetings found matching '{query}'")
}

pub fn no_transcript(id: &str) -> String {
    format!("No transcript available for meeting '{id}'")
}

pub fn no_notes(id: &str) -> String {
    format!("No notes found for meeting '{id}'")
}

// ============================================================================
// Queries
// ============================================================================

pub fn format_search<Tz: TimeZone>(
    query: &str,
    outcome: &SearchOutcome,
    has_data: bool,
    json: bool,
    tz: &Tz,
) -> String {
    if json {
        return to_json(&json!({
            "query": query,
            "results": outcome.hits(),
        }));
    }

    if !has_data {
        return NO_DATA.to_string();
    }

    let hits = match outcome {
        SearchOutcome::Results(hits) => hits,
        SearchOutcome::NoResults => return no_search_results(query),
    };

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("ID").fg(Color::Cyan),
        Cell::new("Title").fg(Color::Cyan),
        Cell::new("Date").fg(Color::Cyan),
        Cell::new("Participants").fg(Color::Cyan),
        Cell::new("Match").fg(Color::Cyan),
    ]);

    for SearchHit { tier, meeting } in hits {
        let participants = truncate(&meeting.participants.join(", "), 40);
        let date = format_date(meeting.created_at, tz);
        let tier = format!("{tier:?}").to_lowercase();
        table.add_row(Row::from(vec![
            meeting.id.as_str(),
            &truncate(meeting.display_title(), 40),
            &date,
            &participants,
            &tier,
        ]));
    }

    format!(
        "Found {} meeting(s) matching '{}':\n{}",
        hits.len(),
        query,
        table
    )
}

pub fn format_meeting<Tz: TimeZone>(id: &str, lookup: &MeetingLookup, json: bool, tz: &Tz) -> String {
    let meeting = match lookup {
        MeetingLookup::Found(meeting) => meeting,
        MeetingLookup::NotFound if json => return not_found_json(id, "meeting_not_found"),
        MeetingLookup::NotFound => return meeting_not_found(id),
    };

    if json {
        return to_json(meeting);
    }

    let mut lines = vec![format!("# {}", meeting.display_title())];
    lines.push(format!("ID:           {}", meeting.id));
    lines.push(format!("Date:         {}", format_date(meeting.created_at, tz)));
    if !meeting.participants.is_empty() {
        lines.push(format!("Participants: {}", meeting.participants.join(", ")));
    }
    if let Some(kind) = &meeting.meeting_type {
        lines.push(format!("Type:         {kind}"));
    }
    lines.push(format!("Transcript:   {}", availability(meeting.has_transcript)));
    lines.push(format!("Notes:        {}", availability(meeting.has_notes)));
    lines.join("\n")
}

pub fn format_transcript(id: &str, lookup: &TranscriptLookup, json: bool) -> String {
    let (meeting, transcript) = match lookup {
        TranscriptLookup::Found {
            meeting,
            transcript,
        } => (meeting, transcript),
        TranscriptLookup::Unavailable if json => return not_found_json(id, "transcript_unavailable"),
        TranscriptLookup::Unavailable => return no_transcript(id),
        TranscriptLookup::NotFound if json => return not_found_json(id, "meeting_not_found"),
        TranscriptLookup::NotFound => return meeting_not_found(id),
    };

    if json {
        return to_json(transcript);
    }

    render_transcript(meeting, transcript)
}

fn render_transcript(meeting: &MeetingRecord, transcript: &TranscriptRecord) -> String {
    let mut lines = vec![format!("# Transcript: {}", meeting.display_title())];
    let speakers = transcript.speakers();
    if !speakers.is_empty() {
        lines.push(format!("Speakers: {}", speakers.join(", ")));
    }
    lines.push(String::new());

    for segment in &transcript.segments {
        let mut line = String::new();
        if let Some(ts) = segment.timestamp {
            line.push_str(&format!("[{}] ", ts.format("%H:%M:%S")));
        }
        if let Some(speaker) = &segment.speaker {
            line.push_str(&format!("{speaker}: "));
        }
        line.push_str(&segment.text);
        lines.push(line);
    }
    lines.join("\n")
}

pub fn format_notes<Tz: TimeZone>(id: &str, lookup: &NotesLookup, json: bool, tz: &Tz) -> String {
    let (meeting, note) = match lookup {
        NotesLookup::Found { meeting, note } => (meeting, note),
        NotesLookup::Empty if json => return not_found_json(id, "notes_empty"),
        NotesLookup::Empty => return no_notes(id),
        NotesLookup::NotFound if json => return not_found_json(id, "meeting_not_found"),
        NotesLookup::NotFound => return meeting_not_found(id),
    };

    if json {
        return to_json(note);
    }

    render_note(meeting, note, tz)
}

fn render_note<Tz: TimeZone>(meeting: &MeetingRecord, note: &NoteDocument, tz: &Tz) -> String {
    format!(
        "# Notes: {} ({})\nCreated: {}\n\n{}",
        meeting.display_title(),
        note.kind.label(),
        format_date(note.created_at, tz),
        note.content
    )
}

// ============================================================================
// Patterns
// ============================================================================

pub fn format_patterns(outcome: &PatternOutcome, has_data: bool, top: usize, json: bool) -> String {
    if json {
        return to_json(outcome);
    }

    if !has_data {
        return NO_DATA.to_string();
    }

    match outcome {
        PatternOutcome::Participants(report) => format!(
            "Participant analysis ({} meetings)\n{}",
            report.meeting_count,
            ranked_table("Participant", "Meetings", &report.ranking, top)
        ),
        PatternOutcome::Topics(report) => format!(
            "Topic analysis ({} meetings)\n{}",
            report.meeting_count,
            ranked_table("Topic", "Mentions", &report.topics, top)
        ),
        PatternOutcome::Frequency(report) => format_frequency(report),
        PatternOutcome::Empty => "No meetings found for analysis".to_string(),
    }
}

fn ranked_table(label: &str, unit: &str, ranking: &[RankedCount], top: usize) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new(label).fg(Color::Cyan),
        Cell::new(unit).fg(Color::Cyan),
    ]);
    for entry in ranking.iter().take(top) {
        table.add_row(Row::from(vec![entry.name.clone(), entry.count.to_string()]));
    }
    table
}

fn format_frequency(report: &FrequencyReport) -> String {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Month").fg(Color::Cyan),
        Cell::new("Meetings").fg(Color::Cyan),
    ]);
    for month in &report.months {
        table.add_row(Row::from(vec![month.month.clone(), month.count.to_string()]));
    }

    let mut out = format!(
        "Meeting frequency ({} meetings)\n{}\nAverage per month: {:.1}",
        report.total, table, report.average_per_month
    );
    if report.undated > 0 {
        out.push_str(&format!("\nUndated meetings (not bucketed): {}", report.undated));
    }
    out
}

// ============================================================================
// Backup maintenance
// ============================================================================

pub fn format_refresh(outcome: &RefreshOutcome, meeting_count: usize, source: &Path, json: bool) -> String {
    if json {
        let value = match outcome {
            RefreshOutcome::Merged(stats) => json!({"status": "merged", "stats": stats}),
            RefreshOutcome::Unchanged => json!({"status": "unchanged", "meetings": meeting_count}),
            RefreshOutcome::SourceMissing => {
                json!({"status": "source_missing", "source": source.display().to_string()})
            }
            RefreshOutcome::Failed(reason) => json!({"status": "failed", "reason": reason}),
        };
        return to_json(&value);
    }

    match outcome {
        RefreshOutcome::Merged(stats) => format_merge_stats(stats),
        RefreshOutcome::Unchanged => format!("Backup is up to date ({meeting_count} meetings)"),
        RefreshOutcome::SourceMissing => format!(
            "Source cache not found at {}; backup left unchanged ({meeting_count} meetings)",
            source.display()
        ),
        RefreshOutcome::Failed(reason) => format!("Backup failed: {reason}"),
    }
}

fn format_merge_stats(stats: &MergeStats) -> String {
    [
        "Backup merged".to_string(),
        format!("  Meetings before: {}", stats.meetings_before),
        format!("  Meetings after:  {}", stats.meetings_after),
        format!("  New:             {}", stats.new_meetings),
        format!("  Updated:         {}", stats.updated_meetings),
        format!("  Preserved:       {}", stats.preserved_meetings),
    ]
    .join("\n")
}

pub fn format_snapshots(entries: &[SnapshotEntry], json: bool) -> String {
    if json {
        let values: Vec<_> = entries
            .iter()
            .map(|e| {
                json!({
                    "path": e.path.display().to_string(),
                    "taken_at": e.taken_at,
                    "size_bytes": e.size_bytes,
                })
            })
            .collect();
        return to_json(&values);
    }

    if entries.is_empty() {
        return "No snapshots yet.".to_string();
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Snapshot").fg(Color::Cyan),
        Cell::new("Taken (UTC)").fg(Color::Cyan),
        Cell::new("Size").fg(Color::Cyan),
    ]);
    for entry in entries {
        let taken = entry
            .taken_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(Row::from(vec![
            entry.file_name(),
            taken,
            format_size(entry.size_bytes),
        ]));
    }
    table.to_string()
}

/// One line per store event, for `watch`
pub fn format_event(event: &StoreEvent) -> String {
    let now = Utc::now().format("%H:%M:%S");
    let body = match event {
        StoreEvent::ReloadStarted => "source changed, reloading".to_string(),
        StoreEvent::BackupMerged(stats) => format!(
            "merged: {} meetings ({} new, {} updated, {} preserved)",
            stats.meetings_after, stats.new_meetings, stats.updated_meetings, stats.preserved_meetings
        ),
        StoreEvent::SnapshotWritten(path) => format!("snapshot written: {}", path.display()),
        StoreEvent::SnapshotsPruned(count) => format!("pruned {count} old snapshot(s)"),
        StoreEvent::ReloadFailed(reason) => format!("reload failed, serving previous backup: {reason}"),
    };
    format!("[{now}] {body}")
}

// ============================================================================
// Utilities
// ============================================================================

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

fn not_found_json(id: &str, status: &str) -> String {
    to_json(&json!({"status": status, "id": id}))
}

fn availability(flag: bool) -> &'static str {
    if flag {
        "available"
    } else {
        "none"
    }
}

fn format_date<Tz: TimeZone>(ts: Option<DateTime<Utc>>, tz: &Tz) -> String {
    ts.map(|t| t.with_timezone(tz).naive_local().format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn format_size(bytes: u64) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1_024 {
        format!("{:.1} KB", bytes as f64 / 1_024.0)
    } else {
        format!("{bytes} B")
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max - 1).collect::<String>() + "…"
    }
}

// ============================================================================
// Tests
// ============================================================================
