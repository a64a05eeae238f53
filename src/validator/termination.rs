//! Termination and timeout state machines
//!
//! Each machine is a pure function over the per-question scoring slices
//! (`correctness[i]` is the three-state result of question `i`). A machine
//! decides where counting stops, not how totals are truncated — the
//! validator applies the uniform truncation policy afterwards.
//!
//! Termination means the remaining outcome is already mathematically
//! determined; a block whose outcome is still open is `Undetermined`,
//! which is an ordinary value, not an error.

use crate::catalog::StageGate;
use tracing::debug;

/// Index and stage of a decided termination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminationPoint {
    /// Last question index that still counts (0-based)
    pub index: usize,
    /// Stage (block) index that forced termination, for stage-gated tasks
    pub stage: Option<usize>,
}

/// Three-way outcome of one stage-gate block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// The block already has enough correct answers
    Passed,
    /// The block can no longer reach its threshold
    Failed,
    /// Still open: unanswered questions could push it over the threshold
    Undetermined,
}

/// Evaluate one block: `max_possible` is current correct plus questions
/// that could still become correct.
pub fn stage_outcome(correct: u32, unanswered: u32, threshold: u32) -> StageOutcome {
    if correct >= threshold {
        StageOutcome::Passed
    } else if correct + unanswered < threshold {
        StageOutcome::Failed
    } else {
        StageOutcome::Undetermined
    }
}

/// Stage-gated termination: walk the blocks in order and terminate at the
/// end of the first block that is mathematically failed. `Undetermined`
/// blocks neither pass nor terminate; evaluation continues.
pub fn evaluate_stage_gates(
    correctness: &[Option<bool>],
    stages: &[StageGate],
) -> Option<TerminationPoint> {
    let mut start = 0usize;
    for (stage_idx, gate) in stages.iter().enumerate() {
        let end = (start + gate.questions).min(correctness.len());
        let block = &correctness[start..end];
        let correct = block.iter().filter(|c| **c == Some(true)).count() as u32;
        let unanswered = block.iter().filter(|c| c.is_none()).count() as u32;

        match stage_outcome(correct, unanswered, gate.threshold) {
            StageOutcome::Failed => {
                debug!(
                    stage = stage_idx,
                    correct,
                    unanswered,
                    threshold = gate.threshold,
                    "stage gate mathematically failed"
                );
                return Some(TerminationPoint {
                    index: end.saturating_sub(1),
                    stage: Some(stage_idx),
                });
            }
            StageOutcome::Passed | StageOutcome::Undetermined => {}
        }
        start = end;
    }
    None
}

/// Consecutive-incorrect termination: the counter increments on incorrect
/// answers and resets on a correct or unanswered (skipped) question.
/// Terminates at the index where the counter first reaches the threshold.
pub fn evaluate_consecutive_incorrect(
    correctness: &[Option<bool>],
    threshold: u32,
) -> Option<TerminationPoint> {
    if threshold == 0 {
        return None;
    }
    let mut streak = 0u32;
    for (i, outcome) in correctness.iter().enumerate() {
        match outcome {
            Some(false) => {
                streak += 1;
                if streak >= threshold {
                    return Some(TerminationPoint {
                        index: i,
                        stage: None,
                    });
                }
            }
            Some(true) | None => streak = 0,
        }
    }
    None
}

/// Screener-subset termination: the named subset (given here as positions
/// in the ordered question list) must be fully answered before evaluation;
/// if it is, and fewer than `threshold` of its questions are correct,
/// terminate at the subset's last question index. A partially answered
/// subset never terminates.
pub fn evaluate_screener_subset(
    correctness: &[Option<bool>],
    positions: &[usize],
    threshold: u32,
) -> Option<TerminationPoint> {
    if positions.is_empty() {
        return None;
    }
    let fully_answered = positions
        .iter()
        .all(|&p| correctness.get(p).map(|c| c.is_some()).unwrap_or(false));
    if !fully_answered {
        return None;
    }
    let correct = positions
        .iter()
        .filter(|&&p| correctness.get(p) == Some(&Some(true)))
        .count() as u32;
    if correct < threshold {
        let last = positions.iter().copied().max().unwrap_or(0);
        debug!(correct, threshold, index = last, "screener threshold missed");
        Some(TerminationPoint {
            index: last,
            stage: None,
        })
    } else {
        None
    }
}

/// Outcome of a fixed-duration (timed-window) task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowOutcome {
    /// No question answered at all
    NotStarted,
    /// The last question was answered; the window ran to the end
    Complete { gap: bool },
    /// A gap-free answered run followed only by unanswered questions:
    /// the window closed at `index`
    TimedOut { index: usize },
    /// An answer appears after a gap but the run never reaches the final
    /// question: neither timed out nor complete, just missing data
    MissingData { last_answered: usize },
}

/// Detect timeout for a timed-window task from the per-question answered
/// flags. A timeout requires a clean run: every question up to the last
/// answered one answered, everything after it untouched. A gap before the
/// last answer is reported either way, but it blocks the timeout reading.
pub fn evaluate_timed_window(answered: &[bool]) -> WindowOutcome {
    let last = match answered.iter().rposition(|&a| a) {
        Some(i) => i,
        None => return WindowOutcome::NotStarted,
    };
    let gap = answered[..last].iter().any(|&a| !a);

    if last == answered.len() - 1 {
        WindowOutcome::Complete { gap }
    } else if gap {
        WindowOutcome::MissingData { last_answered: last }
    } else {
        WindowOutcome::TimedOut { index: last }
    }
}
