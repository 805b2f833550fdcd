//! Participant ranking

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

use super::{rank, RankedCount};
use crate::models::MeetingRecord;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticipantReport {
    /// Meetings considered (after filtering)
    pub meeting_count: usize,
    pub ranking: Vec<RankedCount>,
}

/// Meetings attended per participant, counted once per meeting
///
/// Returns `None` when no meeting lists any participant.
pub fn analyze_participants(meetings: &[&MeetingRecord]) -> Option<ParticipantReport> {
    let mut counts: HashMap<String, usize> = HashMap::new();

    for meeting in meetings {
        let distinct: BTreeSet<&str> = meeting
            .participants
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect();
        for name in distinct {
            *counts.entry(name.to_string()).or_insert(0) += 1;
        }
    }

    if counts.is_empty() {
        return None;
    }

    Some(ParticipantReport {
        meeting_count: meetings.len(),
        ranking: rank(counts),
    })
}
