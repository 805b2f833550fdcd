//! Title keyword ranking

use serde::Serialize;
use std::collections::HashMap;

use super::{rank, RankedCount};
use crate::models::MeetingRecord;
use crate::text::tokenize;

/// Words too generic to count as a topic
pub const STOPWORDS: &[&str] = &[
    "about", "and", "are", "call", "for", "from", "meeting", "meetings", "our", "sync", "the",
    "this", "with", "you", "your",
];

const MIN_TOPIC_LEN: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicReport {
    pub meeting_count: usize,
    /// Token mentions across titles, most frequent first
    pub topics: Vec<RankedCount>,
}

fn is_topic(token: &str) -> bool {
    token.chars().count() >= MIN_TOPIC_LEN
        && !token.chars().all(|c| c.is_numeric())
        && !STOPWORDS.contains(&token)
}

/// Returns `None` when no title yields a topic token.
pub fn analyze_topics(meetings: &[&MeetingRecord]) -> Option<TopicReport> {
    let mut counts: HashMap<String, usize> = HashMap::new();

    for meeting in meetings {
        for token in tokenize(&meeting.title) {
            if is_topic(&token) {
                *counts.entry(token).or_insert(0) += 1;
            }
        }
    }

    if counts.is_empty() {
        return None;
    }

    Some(TopicReport {
        meeting_count: meetings.len(),
        topics: rank(counts),
    })
}
