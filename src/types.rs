//! Core data types for the Dokimasia validation engine
//!
//! This module defines the fundamental data structures used throughout the
//! engine: raw submission records as delivered by the two collection
//! sources, presence-typed field values, cohort (school-year) identifiers,
//! and the merged per-student records the validator consumes.
//!
//! Presence is modeled explicitly as `Option<ScalarValue>` — a numeric or
//! string `0` is a real, present value (several scored questions use `0`
//! as a meaningful "not observed" response). Nothing in this crate relies
//! on truthiness.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Name of a submission field / question column, as exported by the sources.
pub type FieldName = String;

/// Unique identifier for a student
///
/// Wraps the raw id string to avoid mixing student ids with task or set
/// ids elsewhere in the system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentId(pub String);

impl StudentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StudentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an assessment task
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a task set
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SetId(pub String);

impl SetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Data-collection source a raw record came from
///
/// `FormSubmission` is the primary collector; `SurveyExport` is the
/// secondary export pipeline. On exact timestamp ties during merge, the
/// primary collector wins (and the tie is logged).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    FormSubmission,
    SurveyExport,
}

impl Source {
    /// Sort rank used to break exact timestamp ties (primary first)
    pub(crate) fn tie_rank(&self) -> u8 {
        match self {
            Source::FormSubmission => 0,
            Source::SurveyExport => 1,
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::FormSubmission => write!(f, "form_submission"),
            Source::SurveyExport => write!(f, "survey_export"),
        }
    }
}

/// A raw scalar as delivered by either source
///
/// Both collectors export loosely typed data: the form source delivers
/// everything as strings, the survey export mixes strings and numbers.
/// `normalized()` folds both into one comparable text form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Text(String),
    Number(f64),
}

impl ScalarValue {
    /// Canonical text form: trimmed, with integral floats rendered
    /// without a fractional part (`1.0` -> `"1"`).
    pub fn normalized(&self) -> String {
        match self {
            ScalarValue::Text(s) => s.trim().to_string(),
            ScalarValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
        }
    }

    /// Whether this scalar counts as empty under the merge presence rule.
    ///
    /// Only a whitespace-only string is empty. `0` and `"0"` are present.
    pub fn is_empty(&self) -> bool {
        match self {
            ScalarValue::Text(s) => s.trim().is_empty(),
            ScalarValue::Number(_) => false,
        }
    }
}

impl From<&str> for ScalarValue {
    fn from(s: &str) -> Self {
        ScalarValue::Text(s.to_string())
    }
}

impl From<f64> for ScalarValue {
    fn from(n: f64) -> Self {
        ScalarValue::Number(n)
    }
}

/// One field of a raw record: the scalar plus the structured metadata some
/// sources attach to answers (display label, control type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FieldValue {
    pub value: Option<ScalarValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl FieldValue {
    /// A bare text value with no metadata
    pub fn text(s: impl Into<String>) -> Self {
        Self {
            value: Some(ScalarValue::Text(s.into())),
            label: None,
            kind: None,
        }
    }

    /// A bare numeric value with no metadata
    pub fn number(n: f64) -> Self {
        Self {
            value: Some(ScalarValue::Number(n)),
            label: None,
            kind: None,
        }
    }

    /// An explicitly absent value (null/undefined in the source export)
    pub fn absent() -> Self {
        Self::default()
    }

    /// Presence under the merge rule: a value exists and is not a
    /// whitespace-only string. `0`/`"0"` are present.
    pub fn is_present(&self) -> bool {
        self.value.as_ref().map(|v| !v.is_empty()).unwrap_or(false)
    }

    /// Normalize one answer as exported by either source.
    ///
    /// The form source wraps answers in objects (`{"answer": ..,
    /// "text": .., "type": ..}`, preferring `answer` over `text`); the
    /// survey export delivers bare scalars. Everything else (arrays,
    /// objects with neither key) is treated as absent.
    pub fn from_answer_json(raw: &serde_json::Value) -> Self {
        match raw {
            serde_json::Value::String(s) => FieldValue::text(s.clone()),
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => FieldValue::number(f),
                None => FieldValue::absent(),
            },
            serde_json::Value::Bool(b) => FieldValue::text(if *b { "1" } else { "0" }),
            serde_json::Value::Object(map) => {
                let scalar = map
                    .get("answer")
                    .filter(|v| !v.is_null())
                    .or_else(|| map.get("text").filter(|v| !v.is_null()));
                let mut field = match scalar {
                    Some(inner) => Self::from_answer_json(inner),
                    None => FieldValue::absent(),
                };
                field.label = map
                    .get("label")
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_string);
                field.kind = map
                    .get("type")
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_string);
                field
            }
            _ => FieldValue::absent(),
        }
    }
}

/// School year under the August–July boundary rule
///
/// `SchoolYear(2024)` covers August 2024 through July 2025 and is labeled
/// "2024/25".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchoolYear(pub i32);

impl SchoolYear {
    /// Resolve the school year containing `date`: August or later belongs
    /// to the year that just started, January–July to the previous one.
    pub fn from_date(date: NaiveDate) -> Self {
        if date.month() >= 8 {
            SchoolYear(date.year())
        } else {
            SchoolYear(date.year() - 1)
        }
    }

    /// Display label, e.g. "2024/25"
    pub fn label(&self) -> String {
        format!("{}/{:02}", self.0, (self.0 + 1) % 100)
    }
}

impl std::fmt::Display for SchoolYear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Cohort of a raw record: the resolved school year, or `Unknown` when
/// neither the explicit date field nor the session key yields a date.
/// Unknown-cohort records are excluded from merging and logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "year")]
pub enum Cohort {
    Year(SchoolYear),
    Unknown,
}

impl Cohort {
    pub fn year(&self) -> Option<SchoolYear> {
        match self {
            Cohort::Year(y) => Some(*y),
            Cohort::Unknown => None,
        }
    }
}

impl std::fmt::Display for Cohort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cohort::Year(y) => write!(f, "{}", y),
            Cohort::Unknown => write!(f, "unknown"),
        }
    }
}

/// One raw submission record as delivered by a collection source
///
/// Transient input: produced by the fetch collaborators, consumed once per
/// merge call. `cohort` starts `Unknown` and is resolved by the merger
/// before grouping. `session_key` is the secondary encoded identifier that
/// anchors record identity in the collection pipeline; its embedded date
/// is the fallback input to cohort resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    pub source: Source,
    pub student_id: Option<StudentId>,
    #[serde(default = "unknown_cohort")]
    pub cohort: Cohort,
    pub fields: HashMap<FieldName, FieldValue>,
    pub source_timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
}

fn unknown_cohort() -> Cohort {
    Cohort::Unknown
}

impl RawRecord {
    pub fn new(source: Source, source_timestamp: DateTime<Utc>) -> Self {
        Self {
            source,
            student_id: None,
            cohort: Cohort::Unknown,
            fields: HashMap::new(),
            source_timestamp,
            session_key: None,
        }
    }

    pub fn with_student(mut self, id: impl Into<String>) -> Self {
        self.student_id = Some(StudentId::new(id));
        self
    }

    pub fn with_session_key(mut self, key: impl Into<String>) -> Self {
        self.session_key = Some(key.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }
}

/// A field value after cross-source resolution: the winning scalar plus
/// where and when it was collected. Produced once at merge time, consumed
/// uniformly thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedValue {
    pub value: ScalarValue,
    pub winning_source: Source,
    pub winning_timestamp: DateTime<Utc>,
}

/// Canonical per-(student, cohort) record after merging
///
/// Invariant: never combines raw records whose resolved cohorts differ —
/// a student id appearing in two cohorts yields two independent merged
/// records. Fields are kept in a `BTreeMap` so serialized audit output is
/// deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedRecord {
    pub student_id: StudentId,
    pub cohort: SchoolYear,
    pub fields: BTreeMap<FieldName, ResolvedValue>,
}

impl MergedRecord {
    pub fn new(student_id: StudentId, cohort: SchoolYear) -> Self {
        Self {
            student_id,
            cohort,
            fields: BTreeMap::new(),
        }
    }

    /// Resolved value for a field, if one survived the merge
    pub fn field(&self, name: &str) -> Option<&ResolvedValue> {
        self.fields.get(name)
    }

    /// Normalized answer text for a field. Merge only admits present
    /// values, so `Some` here is always non-empty.
    pub fn answer_text(&self, name: &str) -> Option<String> {
        self.fields.get(name).map(|r| r.value.normalized())
    }
}
