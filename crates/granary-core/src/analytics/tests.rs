//! Unit tests for analytics module

use super::*;
use chrono::{FixedOffset, TimeZone, Utc};

use crate::models::MeetingRecord;

fn meeting(id: &str, title: &str, created: Option<(i32, u32, u32)>, people: &[&str]) -> MeetingRecord {
    let mut m = MeetingRecord::new(id);
    m.title = title.to_string();
    m.created_at = created.map(|(y, mo, d)| Utc.with_ymd_and_hms(y, mo, d, 15, 0, 0).unwrap());
    m.participants = people.iter().map(|p| p.to_string()).collect();
    m
}

fn store_of(meetings: Vec<MeetingRecord>) -> BackupStore {
    let mut store = BackupStore::default();
    for m in meetings {
        store.meetings.insert(m.id.clone(), m);
    }
    store
}

fn sample_store() -> BackupStore {
    store_of(vec![
        meeting("a", "Weekly Sync", Some((2026, 1, 5)), &["Alice", "Bob"]),
        meeting("b", "Weekly Planning", Some((2026, 1, 19)), &["Alice", "Carol"]),
        meeting("c", "1:1 Review", Some((2026, 2, 3)), &["Bob", "Alice"]),
        meeting("d", "Hiring debrief", Some((2026, 3, 10)), &["Dana"]),
        meeting("e", "Untimed chat", None, &["Erin"]),
    ])
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// ============================================================================
// DateRange
// ============================================================================

#[test]
fn test_range_inclusive_bounds() {
    let m = meeting("x", "t", Some((2026, 1, 5)), &[]);
    assert!(DateRange::new(Some(date(2026, 1, 5)), Some(date(2026, 1, 5))).contains(&m, &Utc));
    assert!(!DateRange::new(Some(date(2026, 1, 6)), None).contains(&m, &Utc));
    assert!(!DateRange::new(None, Some(date(2026, 1, 4))).contains(&m, &Utc));
}

#[test]
fn test_range_uses_local_date() {
    // 15:00 UTC on Jan 5 is already Jan 6 at UTC+10
    let m = meeting("x", "t", Some((2026, 1, 5)), &[]);
    let tz = FixedOffset::east_opt(10 * 3600).unwrap();
    let jan6 = DateRange::new(Some(date(2026, 1, 6)), Some(date(2026, 1, 6)));
    assert!(jan6.contains(&m, &tz));
    assert!(!jan6.contains(&m, &Utc));
}

#[test]
fn test_undated_only_in_unbounded_range() {
    let m = meeting("x", "t", None, &[]);
    assert!(DateRange::unbounded().contains(&m, &Utc));
    assert!(!DateRange::new(Some(date(2000, 1, 1)), None).contains(&m, &Utc));
}

// ============================================================================
// Participants
// ============================================================================

#[test]
fn test_participants_ranked_by_count_then_name() {
    let store = sample_store();
    let analyzer = PatternAnalyzer::new(&store, Utc);

    let PatternOutcome::Participants(report) =
        analyzer.analyze(PatternKind::Participants, DateRange::unbounded())
    else {
        panic!("expected participants report");
    };

    assert_eq!(report.meeting_count, 5);
    assert_eq!(
        report.ranking,
        vec![
            RankedCount::new("Alice", 3),
            RankedCount::new("Bob", 2),
            RankedCount::new("Carol", 1),
            RankedCount::new("Dana", 1),
            RankedCount::new("Erin", 1),
        ]
    );
}

#[test]
fn test_participant_counted_once_per_meeting() {
    let store = store_of(vec![meeting(
        "a",
        "Pairing",
        Some((2026, 1, 1)),
        &["Alice", "Alice", " Alice "],
    )]);
    let analyzer = PatternAnalyzer::new(&store, Utc);

    let PatternOutcome::Participants(report) =
        analyzer.analyze(PatternKind::Participants, DateRange::unbounded())
    else {
        panic!("expected participants report");
    };
    assert_eq!(report.ranking, vec![RankedCount::new("Alice", 1)]);
}

#[test]
fn test_ranking_is_stable() {
    let store = sample_store();
    let analyzer = PatternAnalyzer::new(&store, Utc);
    let first = analyzer.analyze(PatternKind::Participants, DateRange::unbounded());
    for _ in 0..5 {
        assert_eq!(
            analyzer.analyze(PatternKind::Participants, DateRange::unbounded()),
            first
        );
    }
}

// ============================================================================
// Frequency
// ============================================================================

#[test]
fn test_frequency_monthly_buckets() {
    let store = sample_store();
    let analyzer = PatternAnalyzer::new(&store, Utc);

    let PatternOutcome::Frequency(report) =
        analyzer.analyze(PatternKind::Frequency, DateRange::unbounded())
    else {
        panic!("expected frequency report");
    };

    let months: Vec<(&str, usize)> = report
        .months
        .iter()
        .map(|m| (m.month.as_str(), m.count))
        .collect();
    assert_eq!(months, vec![("2026-01", 2), ("2026-02", 1), ("2026-03", 1)]);
    assert_eq!(report.total, 4);
    assert_eq!(report.undated, 1);
    assert!((report.average_per_month - 4.0 / 3.0).abs() < 1e-9);
}

#[test]
fn test_frequency_respects_time_zone() {
    let mut m = MeetingRecord::new("late");
    m.created_at = Some(Utc.with_ymd_and_hms(2026, 1, 31, 23, 30, 0).unwrap());
    let store = store_of(vec![m]);

    let tz = FixedOffset::east_opt(3600).unwrap();
    let PatternOutcome::Frequency(report) =
        PatternAnalyzer::new(&store, tz).analyze(PatternKind::Frequency, DateRange::unbounded())
    else {
        panic!("expected frequency report");
    };
    assert_eq!(report.months[0].month, "2026-02");
}

#[test]
fn test_frequency_range_is_subset() {
    let store = sample_store();
    let analyzer = PatternAnalyzer::new(&store, Utc);

    let total_of = |range: DateRange| match analyzer.analyze(PatternKind::Frequency, range) {
        PatternOutcome::Frequency(report) => report.total,
        _ => 0,
    };

    let unbounded = total_of(DateRange::unbounded());
    let ranges = [
        DateRange::new(Some(date(2026, 1, 1)), Some(date(2026, 1, 31))),
        DateRange::new(Some(date(2026, 2, 1)), None),
        DateRange::new(None, Some(date(2025, 12, 31))),
        DateRange::new(Some(date(2026, 3, 1)), Some(date(2026, 1, 1))),
    ];
    for range in ranges {
        assert!(total_of(range) <= unbounded, "{range:?}");
    }
    assert_eq!(total_of(ranges[0]), 2);
}

// ============================================================================
// Topics
// ============================================================================

#[test]
fn test_topics_weekly_ranks_first() {
    let store = store_of(vec![
        meeting("a", "Weekly Sync", None, &[]),
        meeting("b", "Weekly Planning", None, &[]),
        meeting("c", "1:1 Review", None, &[]),
    ]);
    let analyzer = PatternAnalyzer::new(&store, Utc);

    let PatternOutcome::Topics(report) = analyzer.analyze(PatternKind::Topics, DateRange::unbounded())
    else {
        panic!("expected topics report");
    };

    assert_eq!(
        report.topics,
        vec![
            RankedCount::new("weekly", 2),
            RankedCount::new("planning", 1),
            RankedCount::new("review", 1),
        ]
    );
}

#[test]
fn test_topics_drop_stopwords_and_numbers() {
    let store = store_of(vec![meeting("a", "Call with the 2026 Q1 board", None, &[])]);
    let analyzer = PatternAnalyzer::new(&store, Utc);

    let PatternOutcome::Topics(report) = analyzer.analyze(PatternKind::Topics, DateRange::unbounded())
    else {
        panic!("expected topics report");
    };
    assert_eq!(report.topics, vec![RankedCount::new("board", 1)]);
}

// ============================================================================
// Empty outcomes
// ============================================================================

#[test]
fn test_empty_store_is_empty_for_every_kind() {
    let store = BackupStore::default();
    let analyzer = PatternAnalyzer::new(&store, Utc);
    for kind in [PatternKind::Participants, PatternKind::Frequency, PatternKind::Topics] {
        assert_eq!(analyzer.analyze(kind, DateRange::unbounded()), PatternOutcome::Empty);
    }
}

#[test]
fn test_filter_excluding_everything_is_empty() {
    let store = sample_store();
    let analyzer = PatternAnalyzer::new(&store, Utc);
    let range = DateRange::new(Some(date(2030, 1, 1)), None);
    for kind in [PatternKind::Participants, PatternKind::Frequency, PatternKind::Topics] {
        assert_eq!(analyzer.analyze(kind, range), PatternOutcome::Empty);
    }
}
