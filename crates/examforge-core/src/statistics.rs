//! Multi-attempt aggregation and per-question statistics.
//!
//! The session scores one attempt; combining attempts under an assessment's
//! `score_method` and `attempt_limit` happens here, on the caller's side.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::attempt::StudentAttempt;
use crate::model::ScoreMethod;
use crate::review::AttemptReview;

/// Combine the scores of completed attempts. Empty input yields `None`.
pub fn aggregate_attempt_scores(scores: &[f64], method: ScoreMethod) -> Option<f64> {
    if scores.is_empty() {
        return None;
    }
    let value = match method {
        ScoreMethod::Highest => scores.iter().copied().fold(f64::MIN, f64::max),
        ScoreMethod::Lowest => scores.iter().copied().fold(f64::MAX, f64::min),
        ScoreMethod::Average => scores.iter().sum::<f64>() / scores.len() as f64,
    };
    Some(value)
}

/// Whether another attempt may begin. `attempt_limit` of -1 is unlimited.
pub fn can_start_attempt(attempt_limit: i32, completed_attempts: usize) -> bool {
    if attempt_limit < 0 {
        return true;
    }
    completed_attempts < attempt_limit as usize
}

/// Fraction of reviews in which each question was answered correctly.
///
/// Reviews with fewer items than the longest one count the missing
/// questions as incorrect.
pub fn question_correct_rates(reviews: &[AttemptReview]) -> Vec<f64> {
    let total = reviews.iter().map(|r| r.items.len()).max().unwrap_or(0);
    if reviews.is_empty() {
        return vec![0.0; total];
    }
    (0..total)
        .map(|i| {
            let correct = reviews
                .iter()
                .filter(|r| r.items.get(i).is_some_and(|item| item.correct))
                .count();
            correct as f64 / reviews.len() as f64
        })
        .collect()
}

/// Summary of one student's attempts at one assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentSummary {
    pub student_id: String,
    pub completed_attempts: usize,
    /// Combined score under the assessment's score method.
    pub final_score: Option<f64>,
    /// Whether the attempt limit allows another try.
    pub can_retry: bool,
}

/// Group completed attempts by student and combine their scores.
pub fn summarize_students(
    attempts: &[StudentAttempt],
    method: ScoreMethod,
    attempt_limit: i32,
) -> Vec<StudentSummary> {
    let mut by_student: HashMap<&str, Vec<f64>> = HashMap::new();
    for attempt in attempts.iter().filter(|a| a.completed) {
        by_student
            .entry(attempt.student_id.as_str())
            .or_default()
            .push(attempt.score);
    }

    let mut summaries: Vec<StudentSummary> = by_student
        .into_iter()
        .map(|(student_id, scores)| StudentSummary {
            student_id: student_id.to_string(),
            completed_attempts: scores.len(),
            final_score: aggregate_attempt_scores(&scores, method),
            can_retry: can_start_attempt(attempt_limit, scores.len()),
        })
        .collect();
    summaries.sort_by(|a, b| a.student_id.cmp(&b.student_id));
    summaries
}
