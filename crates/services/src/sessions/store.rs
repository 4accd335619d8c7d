use chrono::{DateTime, Utc};
use quiz_core::model::{
    AnswerMap, AnswerValue, Attempt, QuestionId, TimerState, TimerTransition,
};

use super::progress::SessionProgress;
use crate::error::SessionError;

/// Answers captured for a draft save, tagged with the revision they reflect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftSnapshot {
    pub attempt: Attempt,
    pub answers: AnswerMap,
    pub revision: u64,
}

//
// ─── STORE ─────────────────────────────────────────────────────────────────────
//

/// Single source of truth for one quiz-taking screen.
///
/// Owns the attempt, the answer map, the countdown, the dirty flag and the
/// focus-loss count. Once the attempt is submitted every mutator returns
/// `SessionError::Submitted` and leaves the state untouched.
#[derive(Debug, Clone)]
pub struct SessionStore {
    attempt: Attempt,
    answers: AnswerMap,
    revision: u64,
    timer: TimerState,
    dirty: bool,
    last_saved_at: Option<DateTime<Utc>>,
    focus_losses: u32,
    current_index: usize,
    question_count: usize,
}

impl SessionStore {
    #[must_use]
    pub fn new(attempt: Attempt, question_count: usize, timer: TimerState) -> Self {
        Self {
            attempt,
            answers: AnswerMap::new(),
            revision: 0,
            timer,
            dirty: false,
            last_saved_at: None,
            focus_losses: 0,
            current_index: 0,
            question_count,
        }
    }

    /// Seed answers restored from a saved draft. They count as persisted.
    #[must_use]
    pub fn with_saved_answers(mut self, answers: AnswerMap) -> Self {
        self.answers = answers;
        self
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.attempt.is_submitted() {
            return Err(SessionError::Submitted);
        }
        Ok(())
    }

    /// Overwrite the answer for `question_id` and mark the map dirty.
    ///
    /// Returns the new answer revision.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Submitted` after submission.
    pub fn record_answer(
        &mut self,
        question_id: QuestionId,
        value: AnswerValue,
    ) -> Result<u64, SessionError> {
        self.ensure_open()?;
        self.answers.record(question_id, value);
        self.revision += 1;
        self.dirty = true;
        Ok(self.revision)
    }

    /// # Errors
    ///
    /// Returns `SessionError::Submitted` after submission.
    pub fn start_timer(&mut self) -> Result<TimerTransition, SessionError> {
        self.ensure_open()?;
        Ok(self.timer.start())
    }

    /// Count down one second; at zero the timer expires for good.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Submitted` after submission.
    pub fn tick_timer(&mut self) -> Result<TimerTransition, SessionError> {
        self.ensure_open()?;
        Ok(self.timer.tick())
    }

    /// # Errors
    ///
    /// Returns `SessionError::Submitted` after submission.
    pub fn pause_timer(&mut self) -> Result<TimerTransition, SessionError> {
        self.ensure_open()?;
        Ok(self.timer.pause())
    }

    /// # Errors
    ///
    /// Returns `SessionError::Submitted` after submission.
    pub fn resume_timer(&mut self) -> Result<TimerTransition, SessionError> {
        self.ensure_open()?;
        Ok(self.timer.resume())
    }

    /// Clear the dirty flag and remember when the save happened.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Submitted` after submission.
    pub fn mark_saved(&mut self, at: DateTime<Utc>) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.dirty = false;
        self.last_saved_at = Some(at);
        Ok(())
    }

    /// Like `mark_saved`, but keeps the dirty flag when answers changed after
    /// `revision` was captured. Returns whether the store is now clean.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Submitted` after submission.
    pub fn mark_saved_revision(
        &mut self,
        revision: u64,
        at: DateTime<Utc>,
    ) -> Result<bool, SessionError> {
        self.ensure_open()?;
        self.last_saved_at = Some(at);
        if revision == self.revision {
            self.dirty = false;
        }
        Ok(!self.dirty)
    }

    /// # Errors
    ///
    /// Returns `SessionError::Submitted` after submission.
    pub fn record_focus_loss(&mut self) -> Result<u32, SessionError> {
        self.ensure_open()?;
        self.focus_losses = self.focus_losses.saturating_add(1);
        Ok(self.focus_losses)
    }

    /// Freeze the session. A running countdown stops where it is; the persisted
    /// submission carries the answers, so the store is clean afterwards.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Submitted` on a second call.
    pub fn mark_submitted(&mut self, at: DateTime<Utc>) -> Result<TimerTransition, SessionError> {
        self.attempt.submit(at)?;
        self.dirty = false;
        Ok(self.timer.pause())
    }

    // ─── Navigation ────────────────────────────────────────────────────────────

    /// # Errors
    ///
    /// Returns `SessionError::QuestionOutOfRange` for an index past the last question.
    pub fn go_to_question(&mut self, index: usize) -> Result<usize, SessionError> {
        self.ensure_open()?;
        if index >= self.question_count {
            return Err(SessionError::QuestionOutOfRange {
                index,
                count: self.question_count,
            });
        }
        self.current_index = index;
        Ok(index)
    }

    /// Move forward, staying on the last question.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Submitted` after submission.
    pub fn next_question(&mut self) -> Result<usize, SessionError> {
        self.ensure_open()?;
        if self.current_index + 1 < self.question_count {
            self.current_index += 1;
        }
        Ok(self.current_index)
    }

    /// Move back, staying on the first question.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Submitted` after submission.
    pub fn previous_question(&mut self) -> Result<usize, SessionError> {
        self.ensure_open()?;
        self.current_index = self.current_index.saturating_sub(1);
        Ok(self.current_index)
    }

    // ─── Reads ─────────────────────────────────────────────────────────────────

    #[must_use]
    pub fn attempt(&self) -> &Attempt {
        &self.attempt
    }

    #[must_use]
    pub fn answers(&self) -> &AnswerMap {
        &self.answers
    }

    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    #[must_use]
    pub fn timer(&self) -> TimerState {
        self.timer
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[must_use]
    pub fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        self.last_saved_at
    }

    #[must_use]
    pub fn focus_losses(&self) -> u32 {
        self.focus_losses
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    #[must_use]
    pub fn is_submitted(&self) -> bool {
        self.attempt.is_submitted()
    }

    /// Answers to persist, or `None` when there is nothing unsaved.
    #[must_use]
    pub fn draft_snapshot(&self) -> Option<DraftSnapshot> {
        if !self.dirty || self.is_submitted() {
            return None;
        }
        Some(DraftSnapshot {
            attempt: self.attempt.clone(),
            answers: self.answers.clone(),
            revision: self.revision,
        })
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        SessionProgress {
            total: self.question_count,
            answered: self.answers.len(),
            current_index: self.current_index,
            timer: self.timer,
            dirty: self.dirty,
            last_saved_at: self.last_saved_at,
            focus_losses: self.focus_losses,
            is_submitted: self.is_submitted(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use quiz_core::model::{AttemptId, QuizId, TimerStatus, UserId};
    use quiz_core::time::fixed_now;

    fn store(limit: u32) -> SessionStore {
        let attempt = Attempt::start(AttemptId::new(1), QuizId::new(1), UserId::new(1), fixed_now());
        SessionStore::new(attempt, 3, TimerState::new(limit))
    }

    fn choice(v: &str) -> AnswerValue {
        AnswerValue::Choice(v.into())
    }

    #[test]
    fn last_write_per_question_wins() {
        let mut store = store(60);
        let writes = [(1, "a"), (2, "x"), (1, "b"), (1, "c"), (2, "y"), (3, "q")];
        for (q, v) in writes {
            store.record_answer(QuestionId::new(q), choice(v)).unwrap();
        }

        assert_eq!(store.answers().len(), 3);
        assert_eq!(store.answers().get(QuestionId::new(1)), Some(&choice("c")));
        assert_eq!(store.answers().get(QuestionId::new(2)), Some(&choice("y")));
        assert_eq!(store.answers().get(QuestionId::new(3)), Some(&choice("q")));
        assert_eq!(store.revision(), 6);
        assert!(store.is_dirty());
    }

    #[test]
    fn tick_at_one_second_expires_and_stops() {
        let mut store = store(1);
        store.start_timer().unwrap();

        assert!(store.tick_timer().unwrap().expired());
        assert_eq!(store.timer().status(), TimerStatus::Expired);
        assert!(!store.tick_timer().unwrap().expired());
        assert_eq!(store.timer().remaining_secs(), 0);
    }

    #[test]
    fn pause_resume_keeps_remaining() {
        let mut store = store(10);
        store.start_timer().unwrap();
        store.tick_timer().unwrap();
        store.pause_timer().unwrap();
        store.resume_timer().unwrap();

        assert_eq!(store.timer().remaining_secs(), 9);
        assert_eq!(store.timer().status(), TimerStatus::Running);
    }

    #[test]
    fn stale_save_keeps_dirty() {
        let mut store = store(10);
        let rev = store.record_answer(QuestionId::new(1), choice("a")).unwrap();
        store.record_answer(QuestionId::new(2), choice("b")).unwrap();

        assert!(!store.mark_saved_revision(rev, fixed_now()).unwrap());
        assert!(store.is_dirty());
        assert_eq!(store.last_saved_at(), Some(fixed_now()));

        store.mark_saved(fixed_now()).unwrap();
        assert!(!store.is_dirty());
        assert!(store.draft_snapshot().is_none());
    }

    #[test]
    fn submitted_store_rejects_mutation() {
        let mut store = store(10);
        store.record_answer(QuestionId::new(1), choice("a")).unwrap();
        store.mark_submitted(fixed_now() + Duration::minutes(1)).unwrap();

        assert!(matches!(
            store.record_answer(QuestionId::new(1), choice("b")),
            Err(SessionError::Submitted)
        ));
        assert!(matches!(store.tick_timer(), Err(SessionError::Submitted)));
        assert!(matches!(store.record_focus_loss(), Err(SessionError::Submitted)));
        assert!(matches!(
            store.mark_submitted(fixed_now() + Duration::minutes(2)),
            Err(SessionError::Submitted)
        ));
        assert_eq!(store.answers().get(QuestionId::new(1)), Some(&choice("a")));
        assert!(!store.is_dirty());
    }

    #[test]
    fn submit_stops_running_timer() {
        let mut store = store(10);
        store.start_timer().unwrap();
        store.tick_timer().unwrap();

        let transition = store.mark_submitted(fixed_now()).unwrap();
        assert_eq!(transition.to, TimerStatus::Paused);
        assert_eq!(store.timer().remaining_secs(), 9);
        assert!(store.is_submitted());
    }

    #[test]
    fn navigation_is_bounded() {
        let mut store = store(10);
        assert_eq!(store.previous_question().unwrap(), 0);
        assert_eq!(store.next_question().unwrap(), 1);
        assert_eq!(store.go_to_question(2).unwrap(), 2);
        assert_eq!(store.next_question().unwrap(), 2);
        assert!(matches!(
            store.go_to_question(3),
            Err(SessionError::QuestionOutOfRange { index: 3, count: 3 })
        ));
    }

    #[test]
    fn restored_answers_are_clean() {
        let mut saved = AnswerMap::new();
        saved.record(QuestionId::new(1), choice("a"));
        let store = store(10).with_saved_answers(saved);

        assert!(!store.is_dirty());
        assert_eq!(store.progress().answered, 1);
    }
}
