//! Per-question scoring
//!
//! Scoring happens before any termination rule is applied, and every
//! question lands in one of three states: correct (`Some(true)`),
//! incorrect (`Some(false)`), or unanswered (`None`). An unanswered
//! question is never correct and never incorrect.
//!
//! A present `0`/`"0"` answer is an answered, scorable response — several
//! scored questions use it as a meaningful "not observed" value.

use crate::catalog::{Question, QuestionKind};

/// Affirmative markers accepted by binary (engagement) questions
const AFFIRMATIVE: [&str; 4] = ["1", "y", "yes", "true"];

/// Score one question against a normalized answer.
///
/// `answer` is the merged record's normalized text for the question's
/// field, `None` when the student never answered. Returns the three-state
/// correctness.
pub fn score_question(question: &Question, answer: Option<&str>) -> Option<bool> {
    let answer = answer.map(str::trim).filter(|a| !a.is_empty())?;

    let correct = match &question.kind {
        QuestionKind::Scored { correct_answer } => answer == correct_answer.trim(),
        QuestionKind::Choice {
            correct_answer,
            options,
        } => {
            // Stored answers are usually option indices; anything else is
            // compared as a literal label (free-text fallback controls).
            let mapped = options.get(answer).map(String::as_str).unwrap_or(answer);
            mapped.trim() == correct_answer.trim()
        }
        QuestionKind::MatrixCell => answer == "1",
        QuestionKind::Binary => AFFIRMATIVE.iter().any(|m| answer.eq_ignore_ascii_case(m)),
    };
    Some(correct)
}
