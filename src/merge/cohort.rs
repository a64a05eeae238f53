//! Cohort resolution for raw submission records
//!
//! Every record must be assigned a school-year cohort before it may be
//! grouped for merging. Resolution tries, in order:
//!
//! 1. The explicit `assessment_date` field on the record
//! 2. An 8-digit `YYYYMMDD` date embedded in the session key
//!
//! Dates map to school years under the August–July boundary rule. A record
//! that resolves through neither path stays `Unknown` and is excluded from
//! merging (logged, never fatal).

use crate::types::{Cohort, RawRecord, SchoolYear};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Field both sources use for the explicit assessment date
pub const ASSESSMENT_DATE_FIELD: &str = "assessment_date";

/// 8-digit date run inside a session key, e.g. "PS014 STU882 20250312094133"
static SESSION_KEY_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(20\d{2})(\d{2})(\d{2})").expect("valid session key date regex"));

/// Resolve a record's cohort, or `None` when no usable date exists.
pub fn resolve_cohort(record: &RawRecord) -> Option<SchoolYear> {
    if let Some(date) = explicit_date(record) {
        return Some(SchoolYear::from_date(date));
    }
    if let Some(key) = record.session_key.as_deref() {
        if let Some(date) = date_from_session_key(key) {
            debug!(
                session_key = key,
                %date,
                "cohort resolved from session key"
            );
            return Some(SchoolYear::from_date(date));
        }
    }
    None
}

/// Resolve and stamp the cohort onto the record in place.
pub fn stamp_cohort(record: &mut RawRecord) {
    record.cohort = match resolve_cohort(record) {
        Some(year) => Cohort::Year(year),
        None => Cohort::Unknown,
    };
}

fn explicit_date(record: &RawRecord) -> Option<NaiveDate> {
    let field = record.fields.get(ASSESSMENT_DATE_FIELD)?;
    if !field.is_present() {
        return None;
    }
    let text = field.value.as_ref()?.normalized();
    parse_date(&text)
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    for format in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }
    None
}

/// Extract the first valid `YYYYMMDD` date from a session key.
///
/// Candidate runs are validated as real calendar dates; an id segment that
/// happens to start with "20" but encodes month 13 is skipped rather than
/// mis-resolving the cohort.
pub fn date_from_session_key(key: &str) -> Option<NaiveDate> {
    for caps in SESSION_KEY_DATE.captures_iter(key) {
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let day: u32 = caps[3].parse().ok()?;
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            return Some(date);
        }
    }
    None
}
