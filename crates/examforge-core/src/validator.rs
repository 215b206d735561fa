//! Pre-submission completion summary.
//!
//! Submission is never blocked; a low completion rate only asks the student
//! to confirm before a manual submit.

use serde::{Deserialize, Serialize};

use crate::model::Answer;

/// Below this completion rate a manual submit needs confirmation.
pub const LOW_COMPLETION_THRESHOLD: f64 = 0.5;

/// Completion statistics for an answer snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionSummary {
    pub answered_count: usize,
    pub question_count: usize,
    /// Fraction of questions answered, in [0, 1].
    pub completion_rate: f64,
    /// Always true.
    pub can_submit: bool,
    /// True when `completion_rate` is below [`LOW_COMPLETION_THRESHOLD`].
    pub show_warning: bool,
    /// 1-based indices of unanswered questions.
    pub unanswered_indices: Vec<usize>,
    pub message: String,
}

/// Summarize an answer snapshot against the assessment's question count.
///
/// Slots missing from a short snapshot count as unanswered.
pub fn summarize(answers: &[Answer], question_count: usize) -> SubmissionSummary {
    let unanswered_indices: Vec<usize> = (0..question_count)
        .filter(|&i| !answers.get(i).is_some_and(Answer::is_answered))
        .map(|i| i + 1)
        .collect();
    let answered_count = question_count - unanswered_indices.len();

    let completion_rate = if question_count == 0 {
        1.0
    } else {
        answered_count as f64 / question_count as f64
    };
    let show_warning = completion_rate < LOW_COMPLETION_THRESHOLD;
    let percent = (completion_rate * 100.0).round() as u32;

    let message = if show_warning {
        format!(
            "You have only answered {percent}% of the questions. Are you sure you want to submit?"
        )
    } else if unanswered_indices.is_empty() {
        format!("All {question_count} questions answered. Ready to submit.")
    } else {
        format!(
            "You have answered {answered_count} of {question_count} questions ({percent}%)."
        )
    };

    SubmissionSummary {
        answered_count,
        question_count,
        completion_rate,
        can_submit: true,
        show_warning,
        unanswered_indices,
        message,
    }
}
