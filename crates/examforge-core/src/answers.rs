//! The in-progress answer sheet for one attempt.

use std::sync::Arc;

use crate::error::{ExamError, ExamResult};
use crate::model::Answer;

static UNANSWERED: Answer = Answer::Unanswered;

/// Ordered, index-addressed answers for one attempt. Slots are 0-based.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerStore {
    slots: Vec<Answer>,
}

impl AnswerStore {
    /// An empty store with `question_count` unanswered slots.
    pub fn new(question_count: usize) -> Self {
        Self {
            slots: vec![Answer::Unanswered; question_count],
        }
    }

    /// Rebuild a store from persisted answers, padding to `question_count`.
    ///
    /// Longer sequences are kept as they are.
    pub fn from_answers(mut answers: Vec<Answer>, question_count: usize) -> Self {
        if answers.len() < question_count {
            answers.resize(question_count, Answer::Unanswered);
        }
        Self { slots: answers }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Overwrite a slot unconditionally.
    pub fn set(&mut self, index: usize, value: Answer) -> ExamResult<()> {
        let len = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(ExamError::SlotOutOfRange { index, len })?;
        *slot = value;
        Ok(())
    }

    /// Reset a slot to unanswered. Out-of-range indices are ignored.
    pub fn clear(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = Answer::Unanswered;
        }
    }

    /// The answer in a slot; the unanswered sentinel if never set or out of range.
    pub fn get(&self, index: usize) -> &Answer {
        self.slots.get(index).unwrap_or(&UNANSWERED)
    }

    pub fn answered_count(&self) -> usize {
        self.slots.iter().filter(|a| a.is_answered()).count()
    }

    /// An immutable copy for grading.
    pub fn snapshot(&self) -> AnswerSnapshot {
        AnswerSnapshot {
            answers: Arc::from(self.slots.clone()),
        }
    }
}

/// A frozen copy of an [`AnswerStore`]. Cheap to clone.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerSnapshot {
    answers: Arc<[Answer]>,
}

impl AnswerSnapshot {
    pub fn as_slice(&self) -> &[Answer] {
        &self.answers
    }

    pub fn get(&self, index: usize) -> &Answer {
        self.answers.get(index).unwrap_or(&UNANSWERED)
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    pub fn to_vec(&self) -> Vec<Answer> {
        self.answers.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_slots_are_unanswered() {
        let store = AnswerStore::new(3);
        assert_eq!(store.len(), 3);
        assert_eq!(store.get(0), &Answer::Unanswered);
        assert_eq!(store.get(99), &Answer::Unanswered);
        assert_eq!(store.answered_count(), 0);
    }

    #[test]
    fn set_overwrites() {
        let mut store = AnswerStore::new(2);
        store.set(0, Answer::Choice(1)).unwrap();
        store.set(0, Answer::Choice(3)).unwrap();
        assert_eq!(store.get(0), &Answer::Choice(3));
        assert_eq!(store.answered_count(), 1);

        store.clear(0);
        assert_eq!(store.get(0), &Answer::Unanswered);
    }

    #[test]
    fn set_out_of_range_is_rejected() {
        let mut store = AnswerStore::new(2);
        let err = store.set(2, Answer::Choice(1)).unwrap_err();
        assert!(matches!(err, ExamError::SlotOutOfRange { index: 2, len: 2 }));
        assert_eq!(store.answered_count(), 0);
    }

    #[test]
    fn snapshot_is_isolated_from_later_writes() {
        let mut store = AnswerStore::new(2);
        store.set(1, Answer::Text("first".into())).unwrap();
        let snapshot = store.snapshot();
        store.set(1, Answer::Text("second".into())).unwrap();

        assert_eq!(snapshot.get(1), &Answer::Text("first".into()));
        assert_eq!(store.get(1), &Answer::Text("second".into()));
    }

    #[test]
    fn from_answers_pads_but_never_truncates() {
        let padded = AnswerStore::from_answers(vec![Answer::Choice(1)], 3);
        assert_eq!(padded.len(), 3);
        assert_eq!(padded.get(2), &Answer::Unanswered);

        let long = AnswerStore::from_answers(vec![Answer::Choice(1); 4], 2);
        assert_eq!(long.len(), 4);
    }
}
