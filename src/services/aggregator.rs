//! Folds raw attendance cards into per-day summaries.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tracing::warn;

use crate::model::attendance::{
    AttendanceDetail, AttendanceRecord, AttendanceStatus, DailySummary, SubjectSummary,
};

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%d-%b-%Y", "%d %b %Y"];

/// Parses a timestamp or date string down to its calendar day.
/// Offset-carrying timestamps are bucketed by their UTC date.
pub fn parse_day(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }

    DATE_TIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
        .map(|dt| dt.date())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(raw, f).ok())
        })
}

/// Resolves the day a record belongs to: `start_time` first, then the last
/// token of `date_formatted`, then `today`.
fn resolve_day(record: &AttendanceRecord, today: NaiveDate) -> NaiveDate {
    let from_start = record.start_time.as_deref().and_then(parse_day);
    let from_formatted = || {
        record
            .date_formatted
            .as_deref()
            .and_then(|f| f.split_whitespace().last())
            .and_then(parse_day)
    };

    from_start.or_else(from_formatted).unwrap_or_else(|| {
        warn!(
            start_time = ?record.start_time,
            date_formatted = ?record.date_formatted,
            "Unparseable attendance date, bucketing under today"
        );
        today
    })
}

/// Groups records by calendar day, sorted ascending. Every input record ends
/// up as exactly one detail entry.
pub fn aggregate_daily(records: &[AttendanceRecord], today: NaiveDate) -> Vec<DailySummary> {
    let mut by_day: BTreeMap<NaiveDate, DailySummary> = BTreeMap::new();

    for record in records {
        let day = resolve_day(record, today);
        let bucket = by_day.entry(day).or_insert_with(|| DailySummary {
            date: day.format("%Y-%m-%d").to_string(),
            present: 0,
            absent: 0,
            leave: 0,
            details: Vec::new(),
        });

        match record.state {
            AttendanceStatus::Present => bucket.present += 1,
            AttendanceStatus::Absent => bucket.absent += 1,
            AttendanceStatus::Leave => bucket.leave += 1,
            AttendanceStatus::Unknown => {}
        }

        let time = record.start_time.clone().unwrap_or_default();
        let formatted = record
            .date_formatted
            .clone()
            .unwrap_or_else(|| time.clone());

        bucket.details.push(AttendanceDetail {
            time,
            status: record.state,
            formatted,
        });
    }

    by_day.into_values().collect()
}

pub fn summarize_subject(records: &[AttendanceRecord], today: NaiveDate) -> SubjectSummary {
    let count = |status: AttendanceStatus| records.iter().filter(|r| r.state == status).count() as u32;

    SubjectSummary {
        total_present: count(AttendanceStatus::Present),
        total_absent: count(AttendanceStatus::Absent),
        total_leave: count(AttendanceStatus::Leave),
        daily: aggregate_daily(records, today),
    }
}
