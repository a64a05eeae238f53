//! Task catalog: immutable assessment schemas
//!
//! The catalog is the boundary object supplied by the schema-loading
//! collaborator: the ordered question list of every task, its scoring
//! semantics, its termination rule, and the set definitions that bundle
//! tasks into reportable groups. Loaded once per run and treated as
//! read-only static data thereafter.
//!
//! Termination configuration is a closed sum type with a typed payload per
//! algorithm, dispatched by exhaustive match — there is no string-keyed
//! rule lookup anywhere.

use crate::error::{EngineError, Result};
use crate::types::{FieldName, SetId, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// Scoring semantics of one question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum QuestionKind {
    /// Free answer compared against a correct answer (trimmed exact match)
    Scored { correct_answer: String },
    /// Multiple choice: the stored answer may be an option index which is
    /// mapped through `options` before comparison; an answer that is not
    /// an option index is compared as a literal label
    Choice {
        correct_answer: String,
        options: BTreeMap<String, String>,
    },
    /// Matrix cell: correct iff the answer normalizes to `1`
    MatrixCell,
    /// Unscored engagement marker: "correct" iff the answer is affirmative
    Binary,
}

/// One question of a task, keyed by the field name both sources use
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: FieldName,
    #[serde(flatten)]
    pub kind: QuestionKind,
}

impl Question {
    pub fn scored(id: impl Into<String>, correct: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: QuestionKind::Scored {
                correct_answer: correct.into(),
            },
        }
    }

    pub fn matrix_cell(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: QuestionKind::MatrixCell,
        }
    }

    pub fn binary(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: QuestionKind::Binary,
        }
    }
}

/// One block of a stage-gated task: `questions` consecutive questions that
/// must yield at least `threshold` correct answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageGate {
    pub questions: usize,
    pub threshold: u32,
}

/// Termination rule of a task, one variant per algorithm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "rule")]
pub enum TerminationRule {
    /// Ordered blocks with per-block correctness thresholds; terminate
    /// when a block can no longer mathematically reach its threshold
    StageGates { stages: Vec<StageGate> },
    /// Terminate when this many incorrect answers occur in a row
    ConsecutiveIncorrect { threshold: u32 },
    /// A named screener subset must be fully answered; terminate if its
    /// correct count falls below the threshold
    ScreenerSubset {
        question_ids: Vec<FieldName>,
        threshold: u32,
    },
    /// Fixed-duration task: no termination config, timeout detection only
    TimedWindow,
}

/// Immutable definition of one assessment task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub task_id: TaskId,
    pub title: String,
    pub questions: Vec<Question>,
    pub termination: TerminationRule,
    /// Partner task sharing this task's timed window; the partner's
    /// results are combined into this one during validation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_window: Option<TaskId>,
}

/// Condition gating a set member on a student attribute
///
/// The member applies only when the student's merged attribute field
/// equals `equals` (trimmed comparison). Used for task variants, e.g. a
/// language-specific form selected by the student's instruction language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberCondition {
    pub field: FieldName,
    pub equals: String,
}

/// One member task of a set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetMember {
    pub task_id: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<MemberCondition>,
}

/// A named bundle of tasks reported as a single completion status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetDefinition {
    pub set_id: SetId,
    pub title: String,
    pub members: Vec<SetMember>,
}

/// The full task catalog: ordered tasks plus set definitions, with an id
/// index for lookup
#[derive(Debug, Clone)]
pub struct TaskCatalog {
    tasks: Vec<TaskDefinition>,
    sets: Vec<SetDefinition>,
    index: HashMap<TaskId, usize>,
}

/// Serialized catalog shape as shipped by the schema collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogFile {
    tasks: Vec<TaskDefinition>,
    #[serde(default)]
    sets: Vec<SetDefinition>,
}

impl TaskCatalog {
    /// Build a catalog from task and set definitions, validating the
    /// pieces against each other.
    ///
    /// Load-time errors: duplicate task ids, stage gates that do not
    /// partition their task's question list, screener subsets naming
    /// unknown questions. A `shared_window` pointing at an unknown task
    /// only warns — validation degrades to the primary's own result.
    pub fn new(tasks: Vec<TaskDefinition>, sets: Vec<SetDefinition>) -> Result<Self> {
        let mut index = HashMap::new();
        for (i, task) in tasks.iter().enumerate() {
            if index.insert(task.task_id.clone(), i).is_some() {
                return Err(EngineError::Catalog(format!(
                    "duplicate task id: {}",
                    task.task_id
                )));
            }
        }

        for task in &tasks {
            match &task.termination {
                TerminationRule::StageGates { stages } => {
                    let covered: usize = stages.iter().map(|s| s.questions).sum();
                    if covered != task.questions.len() {
                        return Err(EngineError::Catalog(format!(
                            "task {}: stage gates cover {} questions but the task has {}",
                            task.task_id,
                            covered,
                            task.questions.len()
                        )));
                    }
                }
                TerminationRule::ScreenerSubset { question_ids, .. } => {
                    for id in question_ids {
                        if !task.questions.iter().any(|q| &q.id == id) {
                            return Err(EngineError::Catalog(format!(
                                "task {}: screener subset names unknown question {}",
                                task.task_id, id
                            )));
                        }
                    }
                }
                TerminationRule::ConsecutiveIncorrect { .. } | TerminationRule::TimedWindow => {}
            }

            if let Some(partner) = &task.shared_window {
                if !index.contains_key(partner) {
                    warn!(
                        task_id = %task.task_id,
                        partner = %partner,
                        "shared window names an unknown partner task"
                    );
                }
            }
        }

        Ok(Self { tasks, sets, index })
    }

    /// Load a catalog from its JSON representation.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(json)?;
        Self::new(file.tasks, file.sets)
    }

    /// Look up a task definition by id.
    pub fn get(&self, id: &TaskId) -> Option<&TaskDefinition> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    /// Tasks in catalog order.
    pub fn tasks(&self) -> &[TaskDefinition] {
        &self.tasks
    }

    /// Set definitions in catalog order.
    pub fn sets(&self) -> &[SetDefinition] {
        &self.sets
    }

    /// If `id` is absorbed into another task's shared window, the
    /// absorbing (primary) task.
    pub fn shared_window_primary(&self, id: &TaskId) -> Option<&TaskDefinition> {
        self.tasks
            .iter()
            .find(|t| t.shared_window.as_ref() == Some(id))
    }
}
