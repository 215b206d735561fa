//! Per-question correctness and aggregate scoring.
//!
//! These predicates are the only place correctness is decided. The submission
//! path and the review path both call [`is_correct`], so a reviewed attempt
//! always agrees with the score recorded at submission.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::attempt::{AttemptReport, QuestionReport};
use crate::error::{ExamError, ExamResult};
use crate::model::{Answer, AssessType, Question};

/// A free-text answer is correct when the rubric rate reaches this value.
pub const FREE_TEXT_PASS_RATE: f64 = 0.7;

/// Result of scoring one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreCard {
    /// Correctness per question, aligned with the definition.
    pub per_question: Vec<bool>,
    pub correct_count: usize,
    /// Aggregate score in [0, 100]. `None` for free-text assessments, whose
    /// score is supplied by the rubric grader.
    pub score: Option<f64>,
}

impl ScoreCard {
    /// Per-question report entries for locally graded questions.
    pub fn to_report(&self) -> AttemptReport {
        let mut report = AttemptReport::default();
        for (index, &correct) in self.per_question.iter().enumerate() {
            report.insert(
                index,
                QuestionReport {
                    correct,
                    rate: None,
                    explanation: None,
                },
            );
        }
        report
    }
}

/// Exact set equality; no credit for subsets or supersets.
pub fn multi_choice_correct(correct: &BTreeSet<u32>, answer: &Answer) -> bool {
    answer
        .selected_indices()
        .is_some_and(|submitted| !correct.is_empty() && submitted == *correct)
}

pub fn single_choice_correct(correct: u32, answer: &Answer) -> bool {
    answer.single_index() == Some(correct)
}

/// Compare the text of the chosen option, not its position.
pub fn true_false_correct(choices: &[String], correct_text: &str, answer: &Answer) -> bool {
    answer
        .single_index()
        .and_then(|index| usize::try_from(index).ok()?.checked_sub(1))
        .and_then(|i| choices.get(i))
        .is_some_and(|chosen| chosen.trim() == correct_text.trim())
}

/// Threshold a stored rubric rate. A missing rate is incorrect.
pub fn free_text_correct(rate: Option<f64>) -> bool {
    rate.is_some_and(|r| r >= FREE_TEXT_PASS_RATE)
}

/// Decide whether `answer` is correct for `question`.
///
/// Free-text correctness comes from the stored grading report; the text
/// itself is never re-graded here.
pub fn is_correct(question: &Question, answer: &Answer, stored: Option<&QuestionReport>) -> bool {
    match question {
        Question::MultiChoice { correct_answer, .. } => {
            multi_choice_correct(correct_answer, answer)
        }
        Question::SingleChoice { correct_answer, .. } => {
            single_choice_correct(*correct_answer, answer)
        }
        Question::TrueFalse {
            choices,
            correct_answer,
            ..
        } => true_false_correct(choices, correct_answer, answer),
        Question::FreeText { .. } => free_text_correct(stored.and_then(|r| r.rate)),
    }
}

/// `round(100 * correct / total)`; zero questions score zero.
pub fn aggregate_score(correct: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (100.0 * correct as f64 / total as f64).round()
}

/// Score an attempt.
///
/// `answers` may be shorter than `questions`; missing slots are unanswered.
/// `report` is only consulted for free-text questions.
pub fn score(
    assess_type: AssessType,
    questions: &[Question],
    answers: &[Answer],
    report: &AttemptReport,
) -> ExamResult<ScoreCard> {
    let unanswered = Answer::Unanswered;
    let mut per_question = Vec::with_capacity(questions.len());

    for (index, question) in questions.iter().enumerate() {
        if question.kind() != assess_type {
            return Err(ExamError::QuestionKindMismatch {
                index,
                expected: assess_type,
                found: question.kind(),
            });
        }
        let answer = answers.get(index).unwrap_or(&unanswered);
        per_question.push(is_correct(question, answer, report.get(index)));
    }

    let correct_count = per_question.iter().filter(|&&c| c).count();
    let score = assess_type
        .is_auto_gradable()
        .then(|| aggregate_score(correct_count, questions.len()));

    tracing::debug!(
        %assess_type,
        total = questions.len(),
        correct_count,
        ?score,
        "scored attempt"
    );

    Ok(ScoreCard {
        per_question,
        correct_count,
        score,
    })
}
