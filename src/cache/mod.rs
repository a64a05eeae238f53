//! Bulk validation-cache building
//!
//! Runs the task validator across a population of students, aggregates
//! per-student results into set completion summaries, and writes the
//! entries to an injectable cache store.
//!
//! # Design
//!
//! - Per-student validation is pure and embarrassingly parallel: a bounded
//!   pool of workers pulls students from a shared queue and funnels
//!   finished entries to one aggregator over a channel
//! - Cancellation is cooperative, checked between student units; entries
//!   already produced are still written when a build is cancelled
//! - The store receives one batched write per build; the builder never
//!   auto-refreshes — callers read with a TTL check and decide when to
//!   rebuild
//! - Rebuilds are full-replace over the requested student subset and
//!   idempotent for identical inputs

pub mod store;

use crate::catalog::{SetDefinition, TaskCatalog};
use crate::error::{EngineError, Result};
use crate::types::{MergedRecord, SchoolYear, SetId, StudentId, TaskId};
use crate::validator::{TaskValidationResult, TaskValidator};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use store::{read_with_ttl, CacheRead, CacheStore, MemoryStore};

/// Completion status of a task set for one student
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetStatus {
    /// Every applicable member task is complete
    Complete,
    /// Some applicable member has answers but the set is not fully done
    Incomplete,
    /// No applicable member has any answered question
    NotStarted,
}

/// Cached validation results for one student
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentValidationCacheEntry {
    pub student_id: StudentId,
    pub cohort: SchoolYear,
    pub per_task_results: BTreeMap<TaskId, TaskValidationResult>,
    pub set_completion: BTreeMap<SetId, SetStatus>,
    pub built_at: DateTime<Utc>,
}

/// One student to validate: the id plus the cohort scoping which merged
/// record may match
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StudentRef {
    pub student_id: StudentId,
    pub cohort: SchoolYear,
}

impl StudentRef {
    pub fn new(id: impl Into<String>, cohort: SchoolYear) -> Self {
        Self {
            student_id: StudentId::new(id),
            cohort,
        }
    }
}

/// Builder tuning knobs supplied by the caller
#[derive(Debug, Clone, Default)]
pub struct BuilderOptions {
    /// Worker pool size; defaults to available parallelism
    pub workers: Option<usize>,
}

/// Audit summary of one bulk build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    pub build_id: Uuid,
    /// Students requested
    pub requested: usize,
    /// Entries produced and written
    pub built: usize,
    /// Students with no matching merged record
    pub skipped_no_record: usize,
    /// Whether the build was cancelled before finishing the population
    pub cancelled: bool,
}

/// Bulk validation-cache builder over an injectable store
pub struct ValidationCacheBuilder<S: CacheStore> {
    catalog: Arc<TaskCatalog>,
    store: Arc<S>,
    options: BuilderOptions,
}

enum WorkerMessage {
    Built(Box<StudentValidationCacheEntry>),
    NoRecord(StudentId),
}

impl<S: CacheStore> ValidationCacheBuilder<S> {
    pub fn new(catalog: Arc<TaskCatalog>, store: Arc<S>) -> Self {
        Self {
            catalog,
            store,
            options: BuilderOptions::default(),
        }
    }

    pub fn with_options(mut self, options: BuilderOptions) -> Self {
        self.options = options;
        self
    }

    /// Build (or rebuild) cache entries for the requested students.
    ///
    /// Full-replace over the requested subset: every student that matches
    /// a merged record gets a fresh entry; previously cached entries for
    /// other students are untouched. Single-student failures never abort
    /// the batch, and cancellation preserves entries already produced.
    pub async fn build(
        &self,
        students: Vec<StudentRef>,
        pool: Vec<MergedRecord>,
        cancel: &CancellationToken,
    ) -> Result<BuildReport> {
        let build_id = Uuid::new_v4();
        let requested = students.len();

        // Single-cohort populations are matched by id against a pool
        // filtered to that cohort, defending against flat global pools
        // that carry other cohorts for the same student. Mixed
        // populations match the (id, cohort) pair exactly.
        let single_cohort = Self::single_cohort(&students);
        if let Some(year) = single_cohort {
            debug!(build_id = %build_id, cohort = %year, "single-cohort build");
        }

        let pool = Arc::new(pool);
        let records: Arc<HashMap<(StudentId, SchoolYear), usize>> = Arc::new(
            pool.iter()
                .enumerate()
                .filter(|(_, r)| single_cohort.map(|y| r.cohort == y).unwrap_or(true))
                .map(|(i, r)| ((r.student_id.clone(), r.cohort), i))
                .collect(),
        );

        let queue = Arc::new(Mutex::new(students));
        let (tx, mut rx) = mpsc::unbounded_channel::<WorkerMessage>();

        let workers = self
            .options
            .workers
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(4)
            })
            .max(1)
            .min(requested.max(1));

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let queue = Arc::clone(&queue);
            let pool = Arc::clone(&pool);
            let records = Arc::clone(&records);
            let catalog = Arc::clone(&self.catalog);
            let tx = tx.clone();
            let cancel = cancel.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let student = match queue.lock().expect("student queue poisoned").pop() {
                        Some(s) => s,
                        None => break,
                    };
                    let key = (student.student_id.clone(), student.cohort);
                    let message = match records.get(&key) {
                        Some(&idx) => WorkerMessage::Built(Box::new(build_entry(
                            &catalog, &pool[idx],
                        ))),
                        None => WorkerMessage::NoRecord(student.student_id),
                    };
                    if tx.send(message).is_err() {
                        break;
                    }
                    // Validation is pure CPU work; yield so cancellation
                    // and sibling workers get a look-in between units.
                    tokio::task::yield_now().await;
                }
            }));
        }
        drop(tx);

        let mut entries = Vec::new();
        let mut skipped = 0usize;
        while let Some(message) = rx.recv().await {
            match message {
                WorkerMessage::Built(entry) => entries.push(*entry),
                WorkerMessage::NoRecord(id) => {
                    warn!(build_id = %build_id, student_id = %id, "no merged record for student");
                    skipped += 1;
                }
            }
        }
        for handle in handles {
            handle
                .await
                .map_err(|e| EngineError::WorkerJoin(e.to_string()))?;
        }

        let built = entries.len();
        self.store.put_many(entries).await?;

        let cancelled = cancel.is_cancelled();
        info!(
            build_id = %build_id,
            requested,
            built,
            skipped_no_record = skipped,
            cancelled,
            "validation cache build finished"
        );
        Ok(BuildReport {
            build_id,
            requested,
            built,
            skipped_no_record: skipped,
            cancelled,
        })
    }

    /// Drop one student's entry; the next build recreates it.
    pub async fn invalidate(&self, student: &StudentId) -> Result<()> {
        self.store.invalidate(student).await
    }

    fn single_cohort(students: &[StudentRef]) -> Option<SchoolYear> {
        let first = students.first()?.cohort;
        students
            .iter()
            .all(|s| s.cohort == first)
            .then_some(first)
    }
}

/// Validate one student and fold the results into a cache entry.
fn build_entry(catalog: &TaskCatalog, record: &MergedRecord) -> StudentValidationCacheEntry {
    let per_task_results = TaskValidator::validate_all_tasks(catalog, record);
    let set_completion = compute_set_completion(catalog, &per_task_results, record);
    StudentValidationCacheEntry {
        student_id: record.student_id.clone(),
        cohort: record.cohort,
        per_task_results,
        set_completion,
        built_at: Utc::now(),
    }
}

/// Set-level completion: a set is complete iff all of its applicable
/// members are complete, not started iff none of them has any answered
/// question (or nothing applies), incomplete otherwise.
fn compute_set_completion(
    catalog: &TaskCatalog,
    results: &BTreeMap<TaskId, TaskValidationResult>,
    record: &MergedRecord,
) -> BTreeMap<SetId, SetStatus> {
    catalog
        .sets()
        .iter()
        .map(|set| (set.set_id.clone(), set_status(catalog, set, results, record)))
        .collect()
}

fn set_status(
    catalog: &TaskCatalog,
    set: &SetDefinition,
    results: &BTreeMap<TaskId, TaskValidationResult>,
    record: &MergedRecord,
) -> SetStatus {
    let applicable: Vec<&TaskValidationResult> = set
        .members
        .iter()
        .filter(|member| {
            member
                .condition
                .as_ref()
                .map(|cond| {
                    record
                        .answer_text(&cond.field)
                        .map(|v| v.trim() == cond.equals.trim())
                        .unwrap_or(false)
                })
                .unwrap_or(true)
        })
        .filter_map(|member| TaskValidator::result_for(catalog, results, &member.task_id))
        .collect();

    if applicable.is_empty() || applicable.iter().all(|r| !r.is_started()) {
        SetStatus::NotStarted
    } else if applicable.iter().all(|r| r.is_complete()) {
        SetStatus::Complete
    } else {
        SetStatus::Incomplete
    }
}
