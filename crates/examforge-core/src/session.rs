//! Attempt session orchestrator.
//!
//! Owns one answer store and one session clock, drives the periodic tick, and
//! runs the submission path: validator, scoring (or rubric grading for
//! free-text), then persistence. At most one submission is accepted per
//! attempt: whichever of manual submit or expiry first moves the clock into a
//! terminal state wins, and the other becomes a no-op.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::answers::{AnswerSnapshot, AnswerStore};
use crate::attempt::{clamp_score, AttemptReport, QuestionReport, StudentAttempt};
use crate::clock::{Clock, ClockEvent, SessionClock, SessionState, DEFAULT_TICK_INTERVAL};
use crate::error::{ExamError, ExamResult};
use crate::model::{Answer, AssessType, AssessmentDefinition, Question};
use crate::scoring;
use crate::traits::{AttemptRepository, GradeRequest, RubricGrade, RubricGrader};
use crate::validator::{summarize, SubmissionSummary};

/// Configuration for an attempt session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Cadence of the periodic clock check.
    pub tick_interval: Duration,
    /// Maximum concurrent rubric grading calls.
    pub grading_parallelism: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            grading_parallelism: 4,
        }
    }
}

/// What caused a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitTrigger {
    Manual,
    Expired,
}

/// Result of a manual submit request.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// The attempt was graded and persisted.
    Submitted(StudentAttempt),
    /// Completion is low; call again with `confirmed = true` to proceed.
    NeedsConfirmation(SubmissionSummary),
    /// The session had already reached a terminal state.
    Ignored,
}

/// Session event reporting trait.
pub trait SessionObserver: Send + Sync {
    fn on_warning(&self, remaining: Duration);
    fn on_expired(&self);
    fn on_submitted(&self, attempt: &StudentAttempt, trigger: SubmitTrigger);
    fn on_submit_failed(&self, error: &ExamError);
}

/// No-op session observer.
pub struct NoopObserver;

impl SessionObserver for NoopObserver {
    fn on_warning(&self, _: Duration) {}
    fn on_expired(&self) {}
    fn on_submitted(&self, _: &StudentAttempt, _: SubmitTrigger) {}
    fn on_submit_failed(&self, _: &ExamError) {}
}

struct SessionInner {
    store: AnswerStore,
    clock: SessionClock,
}

/// One student's live attempt at one assessment.
pub struct AttemptSession {
    id: Uuid,
    student_id: String,
    definition: Arc<AssessmentDefinition>,
    time: Arc<dyn Clock>,
    repository: Arc<dyn AttemptRepository>,
    grader: Option<Arc<dyn RubricGrader>>,
    observer: Arc<dyn SessionObserver>,
    config: SessionConfig,
    inner: Mutex<SessionInner>,
    /// Signalled on manual submission to cancel the periodic check.
    closed: Arc<Notify>,
}

impl AttemptSession {
    /// Open a session in the `NotStarted` state.
    ///
    /// Fails if any question does not match the assessment type.
    pub fn new(
        definition: Arc<AssessmentDefinition>,
        student_id: &str,
        time: Arc<dyn Clock>,
        repository: Arc<dyn AttemptRepository>,
    ) -> ExamResult<Self> {
        definition.check_question_kinds()?;
        let inner = SessionInner {
            store: AnswerStore::new(definition.question_count()),
            clock: SessionClock::new(definition.time_limit_minutes()),
        };
        Ok(Self {
            id: Uuid::new_v4(),
            student_id: student_id.to_string(),
            definition,
            time,
            repository,
            grader: None,
            observer: Arc::new(NoopObserver),
            config: SessionConfig::default(),
            inner: Mutex::new(inner),
            closed: Arc::new(Notify::new()),
        })
    }

    pub fn with_grader(mut self, grader: Arc<dyn RubricGrader>) -> Self {
        self.grader = Some(grader);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn definition(&self) -> &AssessmentDefinition {
        &self.definition
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> SessionState {
        self.lock().clock.state()
    }

    /// Time left, for timed sessions.
    pub fn remaining(&self) -> Option<Duration> {
        let now = self.time.now();
        self.lock().clock.remaining(now)
    }

    pub fn elapsed(&self) -> Duration {
        let now = self.time.now();
        self.lock().clock.elapsed(now)
    }

    /// Begin the attempt. Starting a running session again is a no-op.
    pub fn start(&self) -> ExamResult<()> {
        if self.definition.assess_type == AssessType::FreeText && self.grader.is_none() {
            return Err(ExamError::Grading(
                "free-text assessment requires a rubric grader".into(),
            ));
        }
        let now = self.time.now();
        let mut inner = self.lock();
        if inner.clock.state().is_terminal() {
            return Err(ExamError::SessionClosed);
        }
        if inner.clock.start(now) {
            tracing::info!(
                attempt = %self.id,
                assessment = %self.definition.id,
                time_limit_minutes = ?self.definition.time_limit_minutes(),
                "attempt started"
            );
        }
        Ok(())
    }

    /// Record an answer for a 0-based question index.
    pub fn answer(&self, index: usize, answer: Answer) -> ExamResult<()> {
        let mut inner = self.lock();
        match inner.clock.state() {
            SessionState::NotStarted => return Err(ExamError::NotStarted),
            SessionState::Expired | SessionState::Submitted => {
                return Err(ExamError::SessionClosed)
            }
            SessionState::Running => {}
        }
        if !self.definition.allows_answer_change() {
            let current = inner.store.get(index);
            if current.is_answered() && *current != answer {
                return Err(ExamError::AnswerChangeNotAllowed(index));
            }
        }
        inner.store.set(index, answer)
    }

    /// Reset a question to unanswered, subject to the answer-change policy.
    pub fn clear_answer(&self, index: usize) -> ExamResult<()> {
        let mut inner = self.lock();
        match inner.clock.state() {
            SessionState::NotStarted => return Err(ExamError::NotStarted),
            SessionState::Expired | SessionState::Submitted => {
                return Err(ExamError::SessionClosed)
            }
            SessionState::Running => {}
        }
        if !self.definition.allows_answer_change() && inner.store.get(index).is_answered() {
            return Err(ExamError::AnswerChangeNotAllowed(index));
        }
        inner.store.clear(index);
        Ok(())
    }

    /// The answer currently held for a question.
    pub fn current_answer(&self, index: usize) -> Answer {
        self.lock().store.get(index).clone()
    }

    pub fn snapshot(&self) -> AnswerSnapshot {
        self.lock().store.snapshot()
    }

    /// Completion summary for the confirmation dialog.
    pub fn summary(&self) -> SubmissionSummary {
        let snapshot = self.snapshot();
        summarize(snapshot.as_slice(), self.definition.question_count())
    }

    /// Periodic check. Returns the persisted attempt if this tick expired
    /// the session and submitted it.
    pub async fn tick(&self) -> ExamResult<Option<StudentAttempt>> {
        let now = self.time.now();
        let (events, snapshot) = {
            let mut inner = self.lock();
            let events = inner.clock.tick(now);
            let snapshot = events
                .contains(&ClockEvent::Expired)
                .then(|| inner.store.snapshot());
            (events, snapshot)
        };

        for event in &events {
            match event {
                ClockEvent::Warning { remaining } => {
                    tracing::info!(
                        attempt = %self.id,
                        remaining_secs = remaining.as_secs(),
                        "time running out"
                    );
                    self.observer.on_warning(*remaining);
                }
                ClockEvent::Expired => {
                    tracing::info!(attempt = %self.id, "time limit reached, submitting");
                    self.observer.on_expired();
                }
            }
        }

        match snapshot {
            Some(snapshot) => self
                .finish(snapshot, SubmitTrigger::Expired)
                .await
                .map(Some),
            None => Ok(None),
        }
    }

    /// Manual submit. Low completion requires `confirmed`.
    pub async fn submit(&self, confirmed: bool) -> ExamResult<SubmitOutcome> {
        let snapshot = {
            let mut inner = self.lock();
            match inner.clock.state() {
                SessionState::NotStarted => return Err(ExamError::NotStarted),
                SessionState::Expired | SessionState::Submitted => {
                    tracing::debug!(attempt = %self.id, "submit ignored, session already closed");
                    return Ok(SubmitOutcome::Ignored);
                }
                SessionState::Running => {}
            }

            let summary = summarize(
                inner.store.snapshot().as_slice(),
                self.definition.question_count(),
            );
            if summary.show_warning && !confirmed {
                return Ok(SubmitOutcome::NeedsConfirmation(summary));
            }

            if !inner.clock.submit_manually() {
                return Ok(SubmitOutcome::Ignored);
            }
            self.closed.notify_one();
            inner.store.snapshot()
        };

        self.finish(snapshot, SubmitTrigger::Manual)
            .await
            .map(SubmitOutcome::Submitted)
    }

    /// Grade and persist a frozen snapshot. Called exactly once per session.
    async fn finish(
        &self,
        snapshot: AnswerSnapshot,
        trigger: SubmitTrigger,
    ) -> ExamResult<StudentAttempt> {
        let result = self.grade_and_persist(&snapshot).await;
        match &result {
            Ok(attempt) => {
                tracing::info!(
                    attempt = %attempt.id,
                    score = attempt.score,
                    ?trigger,
                    "attempt submitted"
                );
                self.observer.on_submitted(attempt, trigger);
            }
            Err(e) => {
                tracing::error!(attempt = %self.id, ?trigger, "submission failed: {e}");
                self.observer.on_submit_failed(e);
            }
        }
        result
    }

    async fn grade_and_persist(&self, snapshot: &AnswerSnapshot) -> ExamResult<StudentAttempt> {
        let definition = &self.definition;
        let summary = summarize(snapshot.as_slice(), definition.question_count());
        tracing::debug!(
            attempt = %self.id,
            answered = summary.answered_count,
            total = summary.question_count,
            "grading attempt"
        );

        let (report, score) = if definition.assess_type.is_auto_gradable() {
            let card = scoring::score(
                definition.assess_type,
                &definition.questions,
                snapshot.as_slice(),
                &AttemptReport::default(),
            )?;
            (card.to_report(), card.score.unwrap_or(0.0))
        } else {
            self.grade_free_text(snapshot).await?
        };

        let attempt = StudentAttempt {
            id: self.id,
            parent_assess_id: definition.id.clone(),
            student_id: self.student_id.clone(),
            answers: snapshot.to_vec(),
            completed: true,
            score: clamp_score(score),
            report,
            updated_at: self.time.now(),
        };

        self.repository
            .upsert(&attempt)
            .await
            .map_err(|e| ExamError::Persistence(format!("{e:#}")))?;

        Ok(attempt)
    }

    /// Send every answered free-text question to the rubric grader.
    async fn grade_free_text(&self, snapshot: &AnswerSnapshot) -> ExamResult<(AttemptReport, f64)> {
        let grader = self
            .grader
            .as_ref()
            .ok_or_else(|| ExamError::Grading("no rubric grader configured".into()))?;
        let semaphore = Arc::new(Semaphore::new(self.config.grading_parallelism.max(1)));
        let mut futures = FuturesUnordered::new();

        for (index, question) in self.definition.questions.iter().enumerate() {
            let Question::FreeText {
                question: prompt,
                rubric,
            } = question
            else {
                continue;
            };
            let Some(text) = snapshot.get(index).text() else {
                continue;
            };
            let request = GradeRequest {
                question: prompt.clone(),
                rubric: rubric.clone(),
                answer: text.to_string(),
            };
            let grader = Arc::clone(grader);
            let semaphore = Arc::clone(&semaphore);
            futures.push(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| anyhow::anyhow!("semaphore closed"))?;
                let grade = grader.grade(&request).await?;
                Ok::<_, anyhow::Error>((index, grade.normalized()))
            });
        }

        let mut grades = vec![
            RubricGrade {
                rate: 0.0,
                explanation: "No answer submitted.".into(),
            };
            self.definition.question_count()
        ];
        while let Some(result) = futures.next().await {
            let (index, grade) = result.map_err(|e| ExamError::Grading(format!("{e:#}")))?;
            grades[index] = grade;
        }

        let mut report = AttemptReport::default();
        for (index, grade) in grades.iter().enumerate() {
            report.insert(
                index,
                QuestionReport {
                    correct: scoring::free_text_correct(Some(grade.rate)),
                    rate: Some(grade.rate),
                    explanation: Some(grade.explanation.clone()),
                },
            );
        }
        let score = grader.overall_score(&grades);
        tracing::debug!(grader = grader.name(), score, "free-text grading complete");
        Ok((report, score))
    }

    /// Spawn the periodic check on the tokio runtime.
    ///
    /// The task stops once the session reaches a terminal state or is
    /// dropped, and immediately on manual submission. Dropping the handle
    /// cancels it as well. An expiry submission already in flight is only
    /// interrupted by [`TickerHandle::stop`] or a drop.
    pub fn spawn_ticker(self: &Arc<Self>) -> TickerHandle {
        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.config.tick_interval;
        let closed = Arc::clone(&self.closed);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = closed.notified() => {
                        tracing::debug!("ticker cancelled by manual submission");
                        break;
                    }
                }
                let Some(session) = weak.upgrade() else {
                    break;
                };
                if session.state().is_terminal() {
                    break;
                }
                match session.tick().await {
                    Ok(Some(_)) => break,
                    Ok(None) => {}
                    Err(e) => {
                        tracing::error!(attempt = %session.id, "auto-submit failed: {e}");
                        break;
                    }
                }
            }
        });
        TickerHandle { handle }
    }
}

/// Handle to a running ticker. Dropping it cancels the task.
pub struct TickerHandle {
    handle: JoinHandle<()>,
}

impl TickerHandle {
    pub fn stop(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for TickerHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    use crate::clock::ManualClock;
    use crate::model::{RubricItem, SessionPolicy};
    use crate::repository::InMemoryAttemptRepository;
    use crate::traits::AttemptRepository as _;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        ))
    }

    fn single_choice(count: usize, policy: Option<SessionPolicy>) -> Arc<AssessmentDefinition> {
        Arc::new(AssessmentDefinition {
            id: "capitals".into(),
            name: "Capitals".into(),
            description: String::new(),
            assess_type: AssessType::SingleChoice,
            questions: (0..count)
                .map(|i| Question::SingleChoice {
                    question: format!("Question {}", i + 1),
                    choices: vec!["a".into(), "b".into(), "c".into()],
                    correct_answer: 2,
                })
                .collect(),
            policy,
        })
    }

    fn timed(minutes: u32) -> Option<SessionPolicy> {
        Some(SessionPolicy {
            time_limited: true,
            time_limit: minutes,
            ..Default::default()
        })
    }

    #[derive(Default)]
    struct RecordingObserver {
        warnings: AtomicU32,
        expired: AtomicU32,
        submitted: AtomicU32,
        failed: AtomicU32,
    }

    impl SessionObserver for RecordingObserver {
        fn on_warning(&self, _: Duration) {
            self.warnings.fetch_add(1, Ordering::Relaxed);
        }
        fn on_expired(&self) {
            self.expired.fetch_add(1, Ordering::Relaxed);
        }
        fn on_submitted(&self, _: &StudentAttempt, _: SubmitTrigger) {
            self.submitted.fetch_add(1, Ordering::Relaxed);
        }
        fn on_submit_failed(&self, _: &ExamError) {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Holds every write until the gate is opened.
    #[derive(Default)]
    struct GatedRepository {
        inner: InMemoryAttemptRepository,
        gate: Notify,
    }

    #[async_trait]
    impl AttemptRepository for GatedRepository {
        async fn upsert(&self, attempt: &StudentAttempt) -> anyhow::Result<()> {
            self.gate.notified().await;
            self.inner.upsert(attempt).await
        }

        async fn load(&self, id: Uuid) -> anyhow::Result<Option<StudentAttempt>> {
            self.inner.load(id).await
        }

        async fn list_for_assessment(&self, assess_id: &str) -> anyhow::Result<Vec<StudentAttempt>> {
            self.inner.list_for_assessment(assess_id).await
        }
    }

    struct KeywordGrader;

    #[async_trait]
    impl RubricGrader for KeywordGrader {
        fn name(&self) -> &str {
            "keyword"
        }

        async fn grade(&self, request: &GradeRequest) -> anyhow::Result<RubricGrade> {
            let rate = if request.answer.contains("owner") { 0.9 } else { 0.3 };
            Ok(RubricGrade {
                rate,
                explanation: format!("graded '{}'", request.answer),
            })
        }
    }

    #[tokio::test]
    async fn timeout_submits_exactly_once() {
        let time = clock();
        let repo = Arc::new(InMemoryAttemptRepository::new());
        let observer = Arc::new(RecordingObserver::default());
        let session = AttemptSession::new(single_choice(4, timed(1)), "s1", time.clone(), repo.clone())
            .unwrap()
            .with_observer(observer.clone());
        session.start().unwrap();
        session.answer(0, Answer::Choice(2)).unwrap();

        let mut submissions = Vec::new();
        for _ in 0..61 {
            time.advance(Duration::from_secs(1));
            if let Some(attempt) = session.tick().await.unwrap() {
                submissions.push(attempt);
            }
        }

        assert_eq!(submissions.len(), 1);
        assert_eq!(repo.upsert_count(), 1);
        assert_eq!(session.state(), SessionState::Expired);
        assert_eq!(observer.expired.load(Ordering::Relaxed), 1);
        assert_eq!(observer.warnings.load(Ordering::Relaxed), 1);
        assert_eq!(observer.submitted.load(Ordering::Relaxed), 1);

        let attempt = &submissions[0];
        assert!(attempt.completed);
        assert_eq!(attempt.score, 25.0);
        assert_eq!(attempt.answers.len(), 4);
    }

    #[tokio::test]
    async fn expiry_bypasses_low_completion_confirmation() {
        let time = clock();
        let repo = Arc::new(InMemoryAttemptRepository::new());
        let session =
            AttemptSession::new(single_choice(10, timed(1)), "s1", time.clone(), repo.clone()).unwrap();
        session.start().unwrap();
        assert!(session.summary().show_warning);

        time.advance(Duration::from_secs(61));
        let attempt = session.tick().await.unwrap().expect("expiry should submit");
        assert_eq!(attempt.score, 0.0);
        assert_eq!(repo.upsert_count(), 1);
    }

    #[tokio::test]
    async fn manual_submit_and_expiry_in_same_tick() {
        let time = clock();
        let repo = Arc::new(InMemoryAttemptRepository::new());
        let session =
            AttemptSession::new(single_choice(2, timed(1)), "s1", time.clone(), repo.clone()).unwrap();
        session.start().unwrap();
        session.answer(0, Answer::Choice(2)).unwrap();
        session.answer(1, Answer::Choice(1)).unwrap();

        time.advance(Duration::from_secs(61));
        let (manual, expired) = tokio::join!(session.submit(true), session.tick());
        let manual = manual.unwrap();
        let expired = expired.unwrap();

        let manual_won = matches!(manual, SubmitOutcome::Submitted(_));
        let expiry_won = expired.is_some();
        assert!(manual_won ^ expiry_won, "exactly one submission must win");
        assert_eq!(repo.upsert_count(), 1);
        assert!(session.state().is_terminal());
    }

    #[tokio::test]
    async fn manual_submit_then_expiry_is_noop() {
        let time = clock();
        let repo = Arc::new(InMemoryAttemptRepository::new());
        let session =
            AttemptSession::new(single_choice(1, timed(1)), "s1", time.clone(), repo.clone()).unwrap();
        session.start().unwrap();
        session.answer(0, Answer::Choice(2)).unwrap();

        let outcome = session.submit(false).await.unwrap();
        let SubmitOutcome::Submitted(attempt) = outcome else {
            panic!("expected submission, got {outcome:?}");
        };
        assert_eq!(attempt.score, 100.0);

        time.advance(Duration::from_secs(120));
        assert!(session.tick().await.unwrap().is_none());
        assert!(matches!(
            session.submit(true).await.unwrap(),
            SubmitOutcome::Ignored
        ));
        assert_eq!(repo.upsert_count(), 1);
        assert_eq!(session.state(), SessionState::Submitted);
    }

    #[tokio::test]
    async fn low_completion_needs_confirmation() {
        let repo = Arc::new(InMemoryAttemptRepository::new());
        let session = AttemptSession::new(single_choice(10, None), "s1", clock(), repo.clone()).unwrap();
        session.start().unwrap();
        session.answer(0, Answer::Choice(2)).unwrap();
        session.answer(1, Answer::Choice(1)).unwrap();

        match session.submit(false).await.unwrap() {
            SubmitOutcome::NeedsConfirmation(summary) => {
                assert!(summary.message.contains("20%"));
                assert_eq!(summary.unanswered_indices.len(), 8);
            }
            other => panic!("expected confirmation request, got {other:?}"),
        }
        assert_eq!(session.state(), SessionState::Running);
        assert_eq!(repo.upsert_count(), 0);

        let outcome = session.submit(true).await.unwrap();
        let SubmitOutcome::Submitted(attempt) = outcome else {
            panic!("expected submission, got {outcome:?}");
        };
        assert_eq!(attempt.score, 10.0);
        assert!(repo.load(attempt.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn answers_are_locked_after_submission() {
        let repo = Arc::new(InMemoryAttemptRepository::new());
        let session = AttemptSession::new(single_choice(1, None), "s1", clock(), repo).unwrap();
        assert!(matches!(
            session.answer(0, Answer::Choice(1)),
            Err(ExamError::NotStarted)
        ));
        session.start().unwrap();
        session.answer(0, Answer::Choice(1)).unwrap();
        session.submit(true).await.unwrap();

        assert!(matches!(
            session.answer(0, Answer::Choice(2)),
            Err(ExamError::SessionClosed)
        ));
        assert!(matches!(session.start(), Err(ExamError::SessionClosed)));
    }

    #[tokio::test]
    async fn answer_change_policy_is_enforced() {
        let policy = Some(SessionPolicy {
            allow_answer_change: false,
            ..Default::default()
        });
        let repo = Arc::new(InMemoryAttemptRepository::new());
        let session = AttemptSession::new(single_choice(2, policy), "s1", clock(), repo).unwrap();
        session.start().unwrap();

        session.answer(0, Answer::Choice(1)).unwrap();
        // Re-sending the same answer is not a change.
        session.answer(0, Answer::Choice(1)).unwrap();
        assert!(matches!(
            session.answer(0, Answer::Choice(2)),
            Err(ExamError::AnswerChangeNotAllowed(0))
        ));
        assert_eq!(session.current_answer(0), Answer::Choice(1));
        assert!(matches!(
            session.answer(5, Answer::Choice(1)),
            Err(ExamError::SlotOutOfRange { index: 5, len: 2 })
        ));
    }

    #[tokio::test]
    async fn clear_answer_follows_change_policy() {
        let repo = Arc::new(InMemoryAttemptRepository::new());
        let session = AttemptSession::new(single_choice(2, None), "s1", clock(), repo.clone()).unwrap();
        assert!(matches!(session.clear_answer(0), Err(ExamError::NotStarted)));
        session.start().unwrap();
        session.answer(0, Answer::Choice(2)).unwrap();
        session.clear_answer(0).unwrap();
        assert_eq!(session.current_answer(0), Answer::Unanswered);
        assert_eq!(session.summary().answered_count, 0);

        let locked = Some(SessionPolicy {
            allow_answer_change: false,
            ..Default::default()
        });
        let session = AttemptSession::new(single_choice(2, locked), "s2", clock(), repo).unwrap();
        session.start().unwrap();
        // Clearing an empty slot changes nothing.
        session.clear_answer(1).unwrap();
        session.answer(0, Answer::Choice(1)).unwrap();
        assert!(matches!(
            session.clear_answer(0),
            Err(ExamError::AnswerChangeNotAllowed(0))
        ));
        assert_eq!(session.current_answer(0), Answer::Choice(1));
    }

    #[tokio::test]
    async fn input_while_expiry_is_persisting_is_a_noop() {
        let time = clock();
        let repo = Arc::new(GatedRepository::default());
        let session = Arc::new(
            AttemptSession::new(single_choice(1, timed(1)), "s1", time.clone(), repo.clone())
                .unwrap(),
        );
        session.start().unwrap();
        session.answer(0, Answer::Choice(2)).unwrap();
        time.advance(Duration::from_secs(61));

        let expiry = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.tick().await }
        });
        while session.state() != SessionState::Expired {
            tokio::task::yield_now().await;
        }

        // The expiry has won but its write is still pending.
        assert!(matches!(
            session.answer(0, Answer::Choice(1)),
            Err(ExamError::SessionClosed)
        ));
        assert!(matches!(
            session.submit(true).await.unwrap(),
            SubmitOutcome::Ignored
        ));
        assert_eq!(repo.inner.upsert_count(), 0);

        repo.gate.notify_one();
        let attempt = expiry
            .await
            .unwrap()
            .unwrap()
            .expect("expiry should submit");
        assert_eq!(attempt.answers, vec![Answer::Choice(2)]);
        assert_eq!(attempt.score, 100.0);
        assert_eq!(repo.inner.upsert_count(), 1);
    }

    #[tokio::test]
    async fn persistence_failure_is_terminal() {
        let repo = Arc::new(InMemoryAttemptRepository::failing());
        let observer = Arc::new(RecordingObserver::default());
        let session = AttemptSession::new(single_choice(1, None), "s1", clock(), repo.clone())
            .unwrap()
            .with_observer(observer.clone());
        session.start().unwrap();
        session.answer(0, Answer::Choice(2)).unwrap();

        let err = session.submit(true).await.unwrap_err();
        assert!(matches!(err, ExamError::Persistence(_)));
        assert_eq!(observer.failed.load(Ordering::Relaxed), 1);
        assert_eq!(session.state(), SessionState::Submitted);

        // No second submission is accepted, so nothing is retried.
        assert!(matches!(
            session.submit(true).await.unwrap(),
            SubmitOutcome::Ignored
        ));
        assert_eq!(repo.upsert_count(), 1);
    }

    #[tokio::test]
    async fn untimed_session_never_self_submits() {
        let time = clock();
        let repo = Arc::new(InMemoryAttemptRepository::new());
        let session = AttemptSession::new(single_choice(1, None), "s1", time.clone(), repo.clone()).unwrap();
        session.start().unwrap();

        time.advance(Duration::from_secs(86_400));
        assert!(session.tick().await.unwrap().is_none());
        assert_eq!(session.state(), SessionState::Running);
        assert_eq!(session.elapsed(), Duration::from_secs(86_400));
        assert_eq!(session.remaining(), None);
        assert_eq!(repo.upsert_count(), 0);
    }

    #[tokio::test]
    async fn free_text_uses_rubric_grader() {
        let definition = Arc::new(AssessmentDefinition {
            id: "essay".into(),
            name: "Essay".into(),
            description: String::new(),
            assess_type: AssessType::FreeText,
            questions: vec![
                Question::FreeText {
                    question: "Explain ownership.".into(),
                    rubric: vec![RubricItem {
                        weight: 1.0,
                        point: "single owner".into(),
                    }],
                },
                Question::FreeText {
                    question: "Explain borrowing.".into(),
                    rubric: vec![],
                },
                Question::FreeText {
                    question: "Explain lifetimes.".into(),
                    rubric: vec![],
                },
            ],
            policy: None,
        });
        let repo = Arc::new(InMemoryAttemptRepository::new());

        let without_grader =
            AttemptSession::new(definition.clone(), "s1", clock(), repo.clone()).unwrap();
        assert!(matches!(without_grader.start(), Err(ExamError::Grading(_))));

        let session = AttemptSession::new(definition, "s1", clock(), repo.clone())
            .unwrap()
            .with_grader(Arc::new(KeywordGrader));
        session.start().unwrap();
        session
            .answer(0, Answer::Text("each value has one owner".into()))
            .unwrap();
        session.answer(1, Answer::Text("references".into())).unwrap();

        let SubmitOutcome::Submitted(attempt) = session.submit(true).await.unwrap() else {
            panic!("expected submission");
        };
        assert!(attempt.report.get(0).unwrap().correct);
        assert_eq!(attempt.report.rate(0), Some(0.9));
        assert!(!attempt.report.get(1).unwrap().correct);
        assert_eq!(attempt.report.rate(2), Some(0.0));
        // Mean rate of (0.9, 0.3, 0.0) as supplied by the grader.
        assert!((attempt.score - 40.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn mismatched_definition_is_rejected() {
        let definition = Arc::new(AssessmentDefinition {
            id: "mixed".into(),
            name: "Mixed".into(),
            description: String::new(),
            assess_type: AssessType::MultiChoice,
            questions: vec![Question::SingleChoice {
                question: "Pick".into(),
                choices: vec!["a".into()],
                correct_answer: 1,
            }],
            policy: None,
        });
        let repo = Arc::new(InMemoryAttemptRepository::new());
        let err = AttemptSession::new(definition, "s1", clock(), repo)
            .err()
            .expect("mismatch should fail");
        assert!(err.is_configuration_error());
    }

    #[tokio::test]
    async fn multi_choice_submission_scores_exact_sets() {
        let definition = Arc::new(AssessmentDefinition {
            id: "primes".into(),
            name: "Primes".into(),
            description: String::new(),
            assess_type: AssessType::MultiChoice,
            questions: vec![
                Question::MultiChoice {
                    question: "Which are prime?".into(),
                    choices: vec!["2".into(), "4".into(), "5".into()],
                    correct_answer: BTreeSet::from([1, 3]),
                },
                Question::MultiChoice {
                    question: "Which are even?".into(),
                    choices: vec!["2".into(), "4".into(), "5".into()],
                    correct_answer: BTreeSet::from([1, 2]),
                },
            ],
            policy: None,
        });
        let repo = Arc::new(InMemoryAttemptRepository::new());
        let session = AttemptSession::new(definition, "s1", clock(), repo).unwrap();
        session.start().unwrap();
        session
            .answer(0, Answer::Choices(BTreeSet::from([1, 3])))
            .unwrap();
        session
            .answer(1, Answer::Choices(BTreeSet::from([1, 2, 3])))
            .unwrap();

        let SubmitOutcome::Submitted(attempt) = session.submit(false).await.unwrap() else {
            panic!("expected submission");
        };
        assert_eq!(attempt.score, 50.0);
        assert!(attempt.report.get(0).unwrap().correct);
        assert!(!attempt.report.get(1).unwrap().correct);
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_auto_submits_and_stops() {
        let time = clock();
        let repo = Arc::new(InMemoryAttemptRepository::new());
        let session = Arc::new(
            AttemptSession::new(single_choice(2, timed(1)), "s1", time.clone(), repo.clone())
                .unwrap(),
        );
        session.start().unwrap();
        let ticker = session.spawn_ticker();

        time.advance(Duration::from_secs(61));
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(session.state(), SessionState::Expired);
        assert_eq!(repo.upsert_count(), 1);
        assert!(ticker.is_finished());
    }

    #[tokio::test]
    async fn manual_submit_cancels_ticker() {
        let repo = Arc::new(InMemoryAttemptRepository::new());
        let session = Arc::new(
            AttemptSession::new(single_choice(1, timed(30)), "s1", clock(), repo.clone())
                .unwrap()
                .with_config(SessionConfig {
                    tick_interval: Duration::from_secs(3600),
                    ..Default::default()
                }),
        );
        session.start().unwrap();
        session.answer(0, Answer::Choice(2)).unwrap();
        let ticker = session.spawn_ticker();
        tokio::task::yield_now().await;
        assert!(!ticker.is_finished());

        session.submit(false).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while !ticker.is_finished() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("ticker should stop without waiting for its next interval");
        assert_eq!(repo.upsert_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_ticker_never_fires() {
        let time = clock();
        let repo = Arc::new(InMemoryAttemptRepository::new());
        let session = Arc::new(
            AttemptSession::new(single_choice(2, timed(1)), "s1", time.clone(), repo.clone())
                .unwrap(),
        );
        session.start().unwrap();
        drop(session.spawn_ticker());

        time.advance(Duration::from_secs(61));
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(session.state(), SessionState::Running);
        assert_eq!(repo.upsert_count(), 0);
    }
}
