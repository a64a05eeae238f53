//! Cross-source record merging
//!
//! Combines raw per-submission records from the form-submission and
//! survey-export sources into canonical per-(student, cohort) merged
//! records.
//!
//! # Merge rules
//!
//! - Cohorts are resolved before grouping; unresolved records are skipped
//!   and logged, never fatal
//! - Grouping is scoped to the (student, cohort) pair — records from
//!   different cohorts are never combined, even for the same student
//! - Field resolution is "earliest non-empty wins": candidates are ordered
//!   by source timestamp (primary collector first on exact ties) and the
//!   first present value takes the field; later present values are logged
//!   as conflicts and ignored
//! - `0`/`"0"` are present values, not empty ones

pub mod cohort;

use crate::types::{
    Cohort, FieldName, MergedRecord, RawRecord, ResolvedValue, ScalarValue, SchoolYear, Source,
    StudentId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Why a raw record was excluded from the merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No usable date in the record or its session key
    UnresolvedCohort,
    /// No resolvable student id
    MissingStudentId,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::UnresolvedCohort => write!(f, "unresolved cohort"),
            SkipReason::MissingStudentId => write!(f, "missing student id"),
        }
    }
}

/// Audit entry for a record excluded from the merge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeSkip {
    pub reason: SkipReason,
    pub source: Source,
    pub source_timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<StudentId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
}

/// Audit entry for a field where more than one present value competed
///
/// Informational only — the override is already resolved by the time the
/// entry is written, and a conflict never fails a merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictEntry {
    pub student_id: StudentId,
    pub cohort: SchoolYear,
    pub field: FieldName,
    pub chosen_source: Source,
    pub chosen_at: DateTime<Utc>,
    /// Sources whose later (or tied) values were ignored
    pub losing_sources: Vec<(Source, DateTime<Utc>)>,
}

/// Everything a merge call produces: canonical records plus audit trails
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeOutcome {
    /// Merged records, ordered by (cohort, student id)
    pub records: Vec<MergedRecord>,
    pub conflicts: Vec<ConflictEntry>,
    pub skips: Vec<MergeSkip>,
}

/// Cross-source record merger
///
/// Pure function of its inputs: no shared state, safe to invoke
/// concurrently.
pub struct RecordMerger;

impl RecordMerger {
    /// Merge raw records from both sources into canonical per-(student,
    /// cohort) records.
    pub fn merge(source_a: Vec<RawRecord>, source_b: Vec<RawRecord>) -> MergeOutcome {
        let total = source_a.len() + source_b.len();
        let mut outcome = MergeOutcome::default();

        // Resolve cohorts and drop records that cannot participate.
        // Keyed cohort-first so output order is (cohort, student id).
        let mut groups: BTreeMap<(SchoolYear, StudentId), Vec<RawRecord>> = BTreeMap::new();
        for mut record in source_a.into_iter().chain(source_b) {
            cohort::stamp_cohort(&mut record);

            let student_id = match record.student_id.clone().filter(|id| !id.0.trim().is_empty()) {
                Some(id) => id,
                None => {
                    warn!(
                        source = %record.source,
                        session_key = record.session_key.as_deref().unwrap_or(""),
                        "skipping record with no resolvable student id"
                    );
                    outcome.skips.push(MergeSkip {
                        reason: SkipReason::MissingStudentId,
                        source: record.source,
                        source_timestamp: record.source_timestamp,
                        student_id: None,
                        session_key: record.session_key.clone(),
                    });
                    continue;
                }
            };

            let year = match record.cohort {
                Cohort::Year(year) => year,
                Cohort::Unknown => {
                    warn!(
                        source = %record.source,
                        student_id = %student_id,
                        "skipping record with unresolved cohort"
                    );
                    outcome.skips.push(MergeSkip {
                        reason: SkipReason::UnresolvedCohort,
                        source: record.source,
                        source_timestamp: record.source_timestamp,
                        student_id: Some(student_id),
                        session_key: record.session_key.clone(),
                    });
                    continue;
                }
            };

            groups.entry((year, student_id)).or_default().push(record);
        }

        for ((year, student_id), records) in groups {
            let merged = Self::merge_group(&student_id, year, records, &mut outcome.conflicts);
            outcome.records.push(merged);
        }

        info!(
            input_records = total,
            merged = outcome.records.len(),
            conflicts = outcome.conflicts.len(),
            skipped = outcome.skips.len(),
            "merge complete"
        );
        outcome
    }

    /// Resolve every field of one (student, cohort) group.
    fn merge_group(
        student_id: &StudentId,
        cohort: SchoolYear,
        records: Vec<RawRecord>,
        conflicts: &mut Vec<ConflictEntry>,
    ) -> MergedRecord {
        // Candidate lists per field, each candidate tagged with its
        // record's timestamp and source.
        let mut candidates: BTreeMap<FieldName, Vec<(DateTime<Utc>, Source, ScalarValue)>> =
            BTreeMap::new();
        for record in &records {
            for (name, field) in &record.fields {
                if !field.is_present() {
                    continue;
                }
                let value = match field.value.as_ref() {
                    Some(v) => v.clone(),
                    None => continue,
                };
                candidates.entry(name.clone()).or_default().push((
                    record.source_timestamp,
                    record.source,
                    value,
                ));
            }
        }

        let mut merged = MergedRecord::new(student_id.clone(), cohort);
        for (name, mut values) in candidates {
            values.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.tie_rank().cmp(&b.1.tie_rank())));

            let (won_at, winner, value) = values.remove(0);
            if !values.is_empty() {
                debug!(
                    student_id = %student_id,
                    field = %name,
                    winner = %winner,
                    overridden = values.len(),
                    "field conflict resolved by earliest non-empty value"
                );
                conflicts.push(ConflictEntry {
                    student_id: student_id.clone(),
                    cohort,
                    field: name.clone(),
                    chosen_source: winner,
                    chosen_at: won_at,
                    losing_sources: values.iter().map(|(ts, src, _)| (*src, *ts)).collect(),
                });
            }

            merged.fields.insert(
                name,
                ResolvedValue {
                    value,
                    winning_source: winner,
                    winning_timestamp: won_at,
                },
            );
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldValue;
    use chrono::TimeZone;

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, 1, hour, 0, 0).unwrap()
    }

    fn rec(source: Source, hour: u32) -> RawRecord {
        RawRecord::new(source, ts(hour))
            .with_student("stu-1")
            .with_field(cohort::ASSESSMENT_DATE_FIELD, FieldValue::text("2024-10-01"))
    }

    #[test]
    fn test_earliest_non_empty_wins() {
        let a = rec(Source::FormSubmission, 2).with_field("q1", FieldValue::text("later"));
        let b = rec(Source::SurveyExport, 1).with_field("q1", FieldValue::text("earlier"));

        let outcome = RecordMerger::merge(vec![a], vec![b]);
        assert_eq!(outcome.records.len(), 1);
        let resolved = outcome.records[0].field("q1").unwrap();
        assert_eq!(resolved.value.normalized(), "earlier");
        assert_eq!(resolved.winning_source, Source::SurveyExport);
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.conflicts[0].chosen_source, Source::SurveyExport);
    }

    #[test]
    fn test_earlier_null_is_skipped_not_a_win() {
        // Field present as "0" at t=1, absent at t=0 from the other
        // source: the null must not count as an earlier win.
        let a = rec(Source::FormSubmission, 0).with_field("q1", FieldValue::absent());
        let b = rec(Source::SurveyExport, 1).with_field("q1", FieldValue::text("0"));

        let outcome = RecordMerger::merge(vec![a], vec![b]);
        let resolved = outcome.records[0].field("q1").unwrap();
        assert_eq!(resolved.value.normalized(), "0");
        assert_eq!(resolved.winning_source, Source::SurveyExport);
        // Only one present candidate, so no conflict either
        assert!(outcome.conflicts.is_empty());
    }

    #[test]
    fn test_tie_prefers_form_submission() {
        let a = rec(Source::FormSubmission, 1).with_field("q1", FieldValue::text("form"));
        let b = rec(Source::SurveyExport, 1).with_field("q1", FieldValue::text("survey"));

        let outcome = RecordMerger::merge(vec![a], vec![b]);
        let resolved = outcome.records[0].field("q1").unwrap();
        assert_eq!(resolved.value.normalized(), "form");
        assert_eq!(outcome.conflicts.len(), 1);
    }

    #[test]
    fn test_cross_cohort_never_merged() {
        let a = RawRecord::new(Source::FormSubmission, ts(1))
            .with_student("stu-1")
            .with_field(cohort::ASSESSMENT_DATE_FIELD, FieldValue::text("2024-10-01"))
            .with_field("q1", FieldValue::text("year-one"));
        let b = RawRecord::new(Source::FormSubmission, ts(2))
            .with_student("stu-1")
            .with_field(cohort::ASSESSMENT_DATE_FIELD, FieldValue::text("2025-10-01"))
            .with_field("q2", FieldValue::text("year-two"));

        let outcome = RecordMerger::merge(vec![a, b], vec![]);
        assert_eq!(outcome.records.len(), 2);
        let first = &outcome.records[0];
        let second = &outcome.records[1];
        assert_eq!(first.cohort, SchoolYear(2024));
        assert_eq!(second.cohort, SchoolYear(2025));
        assert!(first.field("q2").is_none());
        assert!(second.field("q1").is_none());
    }

    #[test]
    fn test_malformed_and_unresolved_records_logged_not_fatal() {
        let no_id = RawRecord::new(Source::FormSubmission, ts(1))
            .with_field(cohort::ASSESSMENT_DATE_FIELD, FieldValue::text("2024-10-01"));
        let no_cohort = RawRecord::new(Source::SurveyExport, ts(2)).with_student("stu-2");
        let good = rec(Source::FormSubmission, 3).with_field("q1", FieldValue::text("1"));

        let outcome = RecordMerger::merge(vec![no_id, good], vec![no_cohort]);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.skips.len(), 2);
        assert!(outcome
            .skips
            .iter()
            .any(|s| s.reason == SkipReason::MissingStudentId));
        assert!(outcome
            .skips
            .iter()
            .any(|s| s.reason == SkipReason::UnresolvedCohort));
    }

    #[test]
    fn test_blank_student_id_treated_as_missing() {
        let blank = RawRecord::new(Source::FormSubmission, ts(1))
            .with_student("   ")
            .with_field(cohort::ASSESSMENT_DATE_FIELD, FieldValue::text("2024-10-01"));
        let outcome = RecordMerger::merge(vec![blank], vec![]);
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.skips[0].reason, SkipReason::MissingStudentId);
    }

    #[test]
    fn test_output_ordered_by_cohort_then_student() {
        let mk = |id: &str, date: &str| {
            RawRecord::new(Source::FormSubmission, ts(1))
                .with_student(id)
                .with_field(cohort::ASSESSMENT_DATE_FIELD, FieldValue::text(date))
        };
        let outcome = RecordMerger::merge(
            vec![
                mk("b", "2025-09-01"),
                mk("a", "2025-09-01"),
                mk("z", "2024-09-01"),
            ],
            vec![],
        );
        let order: Vec<_> = outcome
            .records
            .iter()
            .map(|r| (r.cohort.0, r.student_id.as_str().to_string()))
            .collect();
        assert_eq!(
            order,
            vec![
                (2024, "z".to_string()),
                (2025, "a".to_string()),
                (2025, "b".to_string())
            ]
        );
    }
}
