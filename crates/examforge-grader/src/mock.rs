//! Mock grader for testing and offline use.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use examforge_core::traits::{GradeRequest, RubricGrade, RubricGrader};

/// A deterministic rubric grader that never leaves the process.
///
/// Answers containing a configured keyword get that keyword's rate; anything
/// else gets the default rate.
pub struct MockGrader {
    /// Map of answer substring → rate.
    keywords: HashMap<String, f64>,
    default_rate: f64,
    call_count: AtomicU32,
    last_request: Mutex<Option<GradeRequest>>,
}

impl MockGrader {
    pub fn new(keywords: HashMap<String, f64>, default_rate: f64) -> Self {
        Self {
            keywords,
            default_rate,
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// A mock that grades every answer the same.
    pub fn with_fixed_rate(rate: f64) -> Self {
        Self::new(HashMap::new(), rate)
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn last_request(&self) -> Option<GradeRequest> {
        self.last_request
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl RubricGrader for MockGrader {
    fn name(&self) -> &str {
        "mock"
    }

    async fn grade(&self, request: &GradeRequest) -> anyhow::Result<RubricGrade> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *self.last_request.lock().unwrap_or_else(|e| e.into_inner()) = Some(request.clone());

        let answer = request.answer.to_lowercase();
        let matched = self
            .keywords
            .iter()
            .filter(|(keyword, _)| answer.contains(&keyword.to_lowercase()))
            .max_by(|a, b| a.1.total_cmp(b.1));

        let grade = match matched {
            Some((keyword, rate)) => RubricGrade {
                rate: *rate,
                explanation: format!("answer mentions '{keyword}'"),
            },
            None => RubricGrade {
                rate: self.default_rate,
                explanation: "no rubric keyword matched".to_string(),
            },
        };
        Ok(grade.normalized())
    }
}
