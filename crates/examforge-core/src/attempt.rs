//! Persisted attempt records and their per-question grading report.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::Answer;

/// Grading detail for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionReport {
    /// Whether the answer was judged correct.
    pub correct: bool,
    /// Rubric rate in [0, 1], present for free-text questions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    /// Grader explanation, present for free-text questions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Per-question grading detail keyed by 0-based question index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptReport {
    pub questions: BTreeMap<usize, QuestionReport>,
}

impl AttemptReport {
    pub fn get(&self, index: usize) -> Option<&QuestionReport> {
        self.questions.get(&index)
    }

    pub fn insert(&mut self, index: usize, report: QuestionReport) {
        self.questions.insert(index, report);
    }

    /// Stored rubric rate for a question, if any.
    pub fn rate(&self, index: usize) -> Option<f64> {
        self.get(index).and_then(|r| r.rate)
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

/// One student's persisted pass through an assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAttempt {
    /// Unique attempt identifier.
    pub id: Uuid,
    /// The assessment this attempt belongs to.
    pub parent_assess_id: String,
    /// Who took the attempt.
    #[serde(default)]
    pub student_id: String,
    /// Answers aligned 1:1 with the assessment's questions.
    #[serde(default)]
    pub answers: Vec<Answer>,
    /// Set once, when the attempt is submitted.
    #[serde(default)]
    pub completed: bool,
    /// Aggregate score in [0, 100].
    #[serde(default)]
    pub score: f64,
    /// Per-question grading detail.
    #[serde(default)]
    pub report: AttemptReport,
    /// Last write time.
    pub updated_at: DateTime<Utc>,
}

impl StudentAttempt {
    /// A fresh, incomplete attempt with every slot unanswered.
    pub fn new(parent_assess_id: &str, student_id: &str, question_count: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_assess_id: parent_assess_id.to_string(),
            student_id: student_id.to_string(),
            answers: vec![Answer::Unanswered; question_count],
            completed: false,
            score: 0.0,
            report: AttemptReport::default(),
            updated_at: Utc::now(),
        }
    }

    /// Save the attempt as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize attempt")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write attempt to {}", path.display()))?;
        Ok(())
    }

    /// Load an attempt from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read attempt from {}", path.display()))?;
        let attempt: StudentAttempt =
            serde_json::from_str(&content).context("failed to parse attempt JSON")?;
        Ok(attempt)
    }
}

/// Clamp a score into [0, 100]; NaN becomes 0.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 100.0)
    }
}
