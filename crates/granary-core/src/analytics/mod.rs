//! Cross-meeting pattern analysis
//!
//! Participant ranking, monthly frequency and title topics over the
//! meetings of a backup store, optionally restricted to a date range.

use chrono::{NaiveDate, TimeZone};
use serde::Serialize;

use crate::models::{BackupStore, MeetingRecord};

pub mod frequency;
pub mod participants;
pub mod topics;

#[cfg(test)]
mod tests;

pub use frequency::{analyze_frequency, FrequencyReport, MonthCount};
pub use participants::{analyze_participants, ParticipantReport};
pub use topics::{analyze_topics, TopicReport, STOPWORDS};

/// Inclusive calendar-date bounds, evaluated in the caller's time zone
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    /// No bounds: every meeting, dated or not
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn is_bounded(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }

    /// Whether the meeting's local creation date falls inside the range.
    /// Undated meetings only pass an unbounded range.
    pub fn contains<Tz: TimeZone>(&self, meeting: &MeetingRecord, tz: &Tz) -> bool {
        if !self.is_bounded() {
            return true;
        }
        let Some(created) = meeting.created_at else {
            return false;
        };
        let date = created.with_timezone(tz).date_naive();
        self.start.map_or(true, |start| date >= start) && self.end.map_or(true, |end| date <= end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Participants,
    Frequency,
    Topics,
}

/// A name (participant or topic) with the number of meetings or mentions
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedCount {
    pub name: String,
    pub count: usize,
}

impl RankedCount {
    pub fn new(name: impl Into<String>, count: usize) -> Self {
        Self {
            name: name.into(),
            count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "pattern", rename_all = "snake_case")]
pub enum PatternOutcome {
    Participants(ParticipantReport),
    Frequency(FrequencyReport),
    Topics(TopicReport),
    /// Nothing to analyze after filtering
    Empty,
}

/// Count descending, then name ascending
pub(crate) fn rank(counts: impl IntoIterator<Item = (String, usize)>) -> Vec<RankedCount> {
    let mut ranked: Vec<RankedCount> = counts
        .into_iter()
        .map(|(name, count)| RankedCount { name, count })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    ranked
}

/// Pattern queries over one store, in a fixed time zone
pub struct PatternAnalyzer<'a, Tz: TimeZone> {
    store: &'a BackupStore,
    tz: Tz,
}

impl<'a, Tz: TimeZone> PatternAnalyzer<'a, Tz> {
    pub fn new(store: &'a BackupStore, tz: Tz) -> Self {
        Self { store, tz }
    }

    pub fn analyze(&self, kind: PatternKind, range: DateRange) -> PatternOutcome {
        let meetings = self.filtered(range);
        if meetings.is_empty() {
            return PatternOutcome::Empty;
        }

        match kind {
            PatternKind::Participants => analyze_participants(&meetings)
                .map(PatternOutcome::Participants)
                .unwrap_or(PatternOutcome::Empty),
            PatternKind::Frequency => analyze_frequency(&meetings, &self.tz)
                .map(PatternOutcome::Frequency)
                .unwrap_or(PatternOutcome::Empty),
            PatternKind::Topics => analyze_topics(&meetings)
                .map(PatternOutcome::Topics)
                .unwrap_or(PatternOutcome::Empty),
        }
    }

    fn filtered(&self, range: DateRange) -> Vec<&'a MeetingRecord> {
        self.store
            .meetings
            .values()
            .filter(|m| range.contains(m, &self.tz))
            .collect()
    }
}
