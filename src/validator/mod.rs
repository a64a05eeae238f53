//! Task validation
//!
//! Given one merged record and one task definition, computes how many
//! questions count, how many were answered and correct, and whether the
//! response pattern represents early termination, a timeout, or genuine
//! incompletion.
//!
//! # Pipeline
//!
//! 1. Score every question (three-state: correct / incorrect / unanswered)
//! 2. Run the task's termination rule (exhaustive match on the rule kind)
//! 3. Apply the uniform truncation policy
//! 4. Flag data-quality anomalies (post-termination answers, gaps)
//!
//! `validate_all_tasks` orchestrates the full battery for a student,
//! combining shared-window pairs and isolating per-task failures: a
//! missing definition taints only its own entry, never the batch.

pub mod scoring;
pub mod termination;

use crate::catalog::{TaskCatalog, TaskDefinition, TerminationRule};
use crate::types::{FieldName, MergedRecord, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

pub use termination::{StageOutcome, TerminationPoint, WindowOutcome};

/// Scoring state of a single question within a validated task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionResult {
    pub question_id: FieldName,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
    /// Falls past the termination/timeout index; not counted in totals
    pub excluded_by_termination: bool,
}

/// Completion/accuracy/termination result for one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskValidationResult {
    pub task_id: TaskId,
    /// Questions that count: the full list, or `termination_index + 1`
    /// once a termination/timeout point is decided
    pub total_questions: usize,
    /// Non-null answers within the counted range
    pub answered_questions: usize,
    pub correct_answers: usize,
    pub terminated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination_stage: Option<usize>,
    pub timed_out: bool,
    /// Data-quality flag only: answers past the termination point never
    /// change the truncated totals
    pub has_post_termination_answers: bool,
    pub has_missing_data_gap: bool,
    /// Per-task failure tag (e.g. a task id with no catalog definition);
    /// the rest of the batch is unaffected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub questions: Vec<QuestionResult>,
}

impl TaskValidationResult {
    /// Error-tagged placeholder for a task id with no catalog definition.
    pub fn missing_definition(task_id: TaskId) -> Self {
        Self {
            task_id,
            total_questions: 0,
            answered_questions: 0,
            correct_answers: 0,
            terminated: false,
            termination_index: None,
            termination_stage: None,
            timed_out: false,
            has_post_termination_answers: false,
            has_missing_data_gap: false,
            error: Some("missing task definition".to_string()),
            questions: Vec::new(),
        }
    }

    /// Whether the task's record is complete: every counted question has
    /// an answer and no gap interrupts the run. A timed-out task with a
    /// clean run is complete — the window closing is a normal end.
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
            && self.total_questions > 0
            && self.answered_questions == self.total_questions
            && !self.has_missing_data_gap
    }

    /// Whether the student answered anything at all.
    pub fn is_started(&self) -> bool {
        self.answered_questions > 0
    }
}

/// Task validator
///
/// Pure function of its inputs: no shared state, safe to invoke
/// concurrently per student.
pub struct TaskValidator;

impl TaskValidator {
    /// Validate one task against one merged record.
    pub fn validate_task(task: &TaskDefinition, record: &MergedRecord) -> TaskValidationResult {
        let answers: Vec<Option<String>> = task
            .questions
            .iter()
            .map(|q| record.answer_text(&q.id).filter(|a| !a.trim().is_empty()))
            .collect();
        let correctness: Vec<Option<bool>> = task
            .questions
            .iter()
            .zip(&answers)
            .map(|(q, a)| scoring::score_question(q, a.as_deref()))
            .collect();
        let answered: Vec<bool> = answers.iter().map(|a| a.is_some()).collect();

        let mut result = TaskValidationResult {
            task_id: task.task_id.clone(),
            total_questions: task.questions.len(),
            answered_questions: answered.iter().filter(|&&a| a).count(),
            correct_answers: correctness.iter().filter(|c| **c == Some(true)).count(),
            terminated: false,
            termination_index: None,
            termination_stage: None,
            timed_out: false,
            has_post_termination_answers: false,
            has_missing_data_gap: false,
            error: None,
            questions: task
                .questions
                .iter()
                .zip(&answers)
                .zip(&correctness)
                .map(|((q, a), c)| QuestionResult {
                    question_id: q.id.clone(),
                    student_answer: a.clone(),
                    is_correct: *c,
                    excluded_by_termination: false,
                })
                .collect(),
        };

        let cutoff = match &task.termination {
            TerminationRule::StageGates { stages } => {
                let point = termination::evaluate_stage_gates(&correctness, stages);
                if let Some(p) = point {
                    result.terminated = true;
                    result.termination_stage = p.stage;
                }
                point.map(|p| p.index)
            }
            TerminationRule::ConsecutiveIncorrect { threshold } => {
                let point = termination::evaluate_consecutive_incorrect(&correctness, *threshold);
                result.terminated = point.is_some();
                point.map(|p| p.index)
            }
            TerminationRule::ScreenerSubset {
                question_ids,
                threshold,
            } => {
                let positions: Vec<usize> = question_ids
                    .iter()
                    .filter_map(|id| task.questions.iter().position(|q| &q.id == id))
                    .collect();
                let point =
                    termination::evaluate_screener_subset(&correctness, &positions, *threshold);
                result.terminated = point.is_some();
                point.map(|p| p.index)
            }
            TerminationRule::TimedWindow => match termination::evaluate_timed_window(&answered) {
                WindowOutcome::NotStarted => None,
                WindowOutcome::Complete { gap } => {
                    result.has_missing_data_gap = gap;
                    None
                }
                WindowOutcome::TimedOut { index } => {
                    result.timed_out = true;
                    Some(index)
                }
                WindowOutcome::MissingData { .. } => {
                    result.has_missing_data_gap = true;
                    None
                }
            },
        };

        if let Some(index) = cutoff {
            Self::truncate(&mut result, &answered, &correctness, index);
            debug!(
                task_id = %task.task_id,
                index,
                timed_out = result.timed_out,
                "task truncated"
            );
        }

        result
    }

    /// Apply the uniform truncation policy at `index`: totals count only
    /// `[0, index]`, later answers become a data-quality flag.
    fn truncate(
        result: &mut TaskValidationResult,
        answered: &[bool],
        correctness: &[Option<bool>],
        index: usize,
    ) {
        result.termination_index = Some(index);
        result.total_questions = index + 1;
        result.answered_questions = answered[..=index].iter().filter(|&&a| a).count();
        result.correct_answers = correctness[..=index]
            .iter()
            .filter(|c| **c == Some(true))
            .count();
        result.has_post_termination_answers = answered[index + 1..].iter().any(|&a| a);
        for q in result.questions.iter_mut().skip(index + 1) {
            q.excluded_by_termination = true;
        }
    }

    /// Validate every task in the catalog for one student.
    ///
    /// Shared-window pairs are combined under the primary task's id; the
    /// partner does not appear separately. Set members referencing task
    /// ids absent from the catalog yield error-tagged entries.
    pub fn validate_all_tasks(
        catalog: &TaskCatalog,
        record: &MergedRecord,
    ) -> BTreeMap<TaskId, TaskValidationResult> {
        // Partner tasks are absorbed into their primaries, not reported
        // on their own.
        let absorbed: HashSet<&TaskId> = catalog
            .tasks()
            .iter()
            .filter_map(|t| t.shared_window.as_ref())
            .collect();

        let mut results = BTreeMap::new();
        for task in catalog.tasks() {
            if absorbed.contains(&task.task_id) {
                continue;
            }
            let mut result = Self::validate_task(task, record);

            if let Some(partner_id) = &task.shared_window {
                match catalog.get(partner_id) {
                    Some(partner) => {
                        let partner_result = Self::validate_task(partner, record);
                        result = Self::combine_shared_window(result, partner_result);
                    }
                    None => {
                        warn!(
                            task_id = %task.task_id,
                            partner = %partner_id,
                            "shared window partner missing from catalog; using primary alone"
                        );
                    }
                }
            }

            results.insert(task.task_id.clone(), result);
        }

        // Error-tag set members that point at nothing in the catalog.
        for set in catalog.sets() {
            for member in &set.members {
                let known =
                    results.contains_key(&member.task_id) || absorbed.contains(&member.task_id);
                if !known {
                    warn!(
                        set_id = %set.set_id,
                        task_id = %member.task_id,
                        "set member has no task definition"
                    );
                    results.insert(
                        member.task_id.clone(),
                        TaskValidationResult::missing_definition(member.task_id.clone()),
                    );
                }
            }
        }

        results
    }

    /// Combine the two halves of a shared timed window into one result:
    /// summed totals, OR-ed flags, concatenated question breakdowns.
    fn combine_shared_window(
        primary: TaskValidationResult,
        partner: TaskValidationResult,
    ) -> TaskValidationResult {
        let mut questions = primary.questions;
        questions.extend(partner.questions);
        TaskValidationResult {
            task_id: primary.task_id,
            total_questions: primary.total_questions + partner.total_questions,
            answered_questions: primary.answered_questions + partner.answered_questions,
            correct_answers: primary.correct_answers + partner.correct_answers,
            terminated: primary.terminated || partner.terminated,
            termination_index: primary.termination_index,
            termination_stage: primary.termination_stage,
            timed_out: primary.timed_out || partner.timed_out,
            has_post_termination_answers: primary.has_post_termination_answers
                || partner.has_post_termination_answers,
            has_missing_data_gap: primary.has_missing_data_gap || partner.has_missing_data_gap,
            error: primary.error.or(partner.error),
            questions,
        }
    }

    /// Result for a task id, resolving absorbed shared-window partners to
    /// their primary's combined entry.
    pub fn result_for<'a>(
        catalog: &TaskCatalog,
        results: &'a BTreeMap<TaskId, TaskValidationResult>,
        task_id: &TaskId,
    ) -> Option<&'a TaskValidationResult> {
        if let Some(result) = results.get(task_id) {
            return Some(result);
        }
        catalog
            .shared_window_primary(task_id)
            .and_then(|primary| results.get(&primary.task_id))
    }
}
