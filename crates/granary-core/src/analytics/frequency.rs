//! Monthly meeting frequency
//!
//! Buckets are calendar months in the caller's time zone, so a meeting at
//! 23:30 UTC on the 31st may land in the next month locally.

use chrono::{Datelike, TimeZone};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::MeetingRecord;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthCount {
    /// `YYYY-MM`
    pub month: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrequencyReport {
    /// Ascending by month, non-empty months only
    pub months: Vec<MonthCount>,
    /// Meetings placed in a bucket
    pub total: usize,
    /// Meetings without a creation time, never bucketed
    pub undated: usize,
    /// Mean over the months listed
    pub average_per_month: f64,
}

/// Returns `None` when no meeting can be bucketed.
pub fn analyze_frequency<Tz: TimeZone>(
    meetings: &[&MeetingRecord],
    tz: &Tz,
) -> Option<FrequencyReport> {
    let mut buckets: BTreeMap<String, usize> = BTreeMap::new();
    let mut undated = 0;

    for meeting in meetings {
        match meeting.created_at {
            Some(created) => {
                let local = created.with_timezone(tz);
                let key = format!("{:04}-{:02}", local.year(), local.month());
                *buckets.entry(key).or_insert(0) += 1;
            }
            None => undated += 1,
        }
    }

    if buckets.is_empty() {
        return None;
    }

    let total: usize = buckets.values().sum();
    let average_per_month = total as f64 / buckets.len() as f64;

    Some(FrequencyReport {
        months: buckets
            .into_iter()
            .map(|(month, count)| MonthCount { month, count })
            .collect(),
        total,
        undated,
        average_per_month,
    })
}
