//! Common test utilities and helpers
#![allow(dead_code)] // not every test binary uses every helper

use chrono::{DateTime, TimeZone, Utc};
use dokimasia::{
    FieldValue, MergedRecord, Question, RawRecord, ResolvedValue, ScalarValue, SchoolYear, Source,
    StudentId, TaskDefinition, TaskId, TerminationRule,
};

/// Explicit assessment-date field name used by both sources
pub const DATE_FIELD: &str = "assessment_date";

/// Initialize tracing output for tests; honors RUST_LOG
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// A timestamp inside the 2024/25 school year
pub fn ts(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 10, 1, hour, 0, 0).unwrap()
}

/// Raw record for the 2024/25 cohort with an explicit assessment date
pub fn raw(source: Source, student: &str, hour: u32) -> RawRecord {
    RawRecord::new(source, ts(hour))
        .with_student(student)
        .with_field(DATE_FIELD, FieldValue::text("2024-10-01"))
}

/// Merged record populated with already-resolved text answers
pub fn merged(student: &str, cohort: SchoolYear, answers: &[(&str, &str)]) -> MergedRecord {
    let mut record = MergedRecord::new(StudentId::new(student), cohort);
    for (field, value) in answers {
        record.fields.insert(
            field.to_string(),
            ResolvedValue {
                value: ScalarValue::Text(value.to_string()),
                winning_source: Source::FormSubmission,
                winning_timestamp: ts(9),
            },
        );
    }
    record
}

/// Task of `n` scored questions (`<id>_q1` ... `<id>_qN`, correct answer
/// "1") under the given termination rule
pub fn scored_task(id: &str, n: usize, termination: TerminationRule) -> TaskDefinition {
    TaskDefinition {
        task_id: TaskId::new(id),
        title: id.to_uppercase(),
        questions: (0..n)
            .map(|i| Question::scored(format!("{id}_q{}", i + 1), "1"))
            .collect(),
        termination,
        shared_window: None,
    }
}

/// Fill a task's answers from per-question outcomes: correct, incorrect,
/// or skipped (no field written)
pub fn answer_prefix(record: &mut MergedRecord, task: &str, outcomes: &[Option<bool>]) {
    for (i, outcome) in outcomes.iter().enumerate() {
        let field = format!("{task}_q{}", i + 1);
        let value = match outcome {
            Some(true) => "1",
            Some(false) => "9",
            None => continue,
        };
        record.fields.insert(
            field,
            ResolvedValue {
                value: ScalarValue::Text(value.to_string()),
                winning_source: Source::FormSubmission,
                winning_timestamp: ts(9),
            },
        );
    }
}

/// Parse a compact answer pattern: 'c' correct, 'x' incorrect, '.' skipped
pub fn pattern(encoded: &str) -> Vec<Option<bool>> {
    encoded.chars()
        .map(|ch| match ch {
            'c' => Some(true),
            'x' => Some(false),
            '.' => None,
            other => panic!("bad pattern char: {other}"),
        })
        .collect()
}
