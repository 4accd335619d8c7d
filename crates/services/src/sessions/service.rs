use std::sync::Arc;

use quiz_core::model::{
    AnswerValue, Attempt, CurrentUser, QuestionId, QuizDetail, QuizId, TimerState,
};
use storage::repository::{AttemptRepository, DraftRepository, QuizRepository, Storage};
use tracing::info;

use super::handle::SessionHandle;
use super::store::SessionStore;
use crate::Clock;
use crate::error::SessionError;

/// A started attempt: the quiz being taken plus the handle to its store.
#[derive(Clone)]
pub struct QuizSession {
    quiz: Arc<QuizDetail>,
    handle: SessionHandle,
}

impl QuizSession {
    #[must_use]
    pub fn quiz(&self) -> &QuizDetail {
        &self.quiz
    }

    #[must_use]
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// Record an answer after checking it belongs to this quiz and fits the question.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownQuestion`, `SessionError::InvalidAnswer`, or
    /// `SessionError::Submitted` once the attempt is closed.
    pub fn answer(&self, question_id: QuestionId, value: AnswerValue) -> Result<u64, SessionError> {
        let question = self
            .quiz
            .question(question_id)
            .ok_or(SessionError::UnknownQuestion(question_id))?;
        if !question.accepts(&value) {
            return Err(SessionError::InvalidAnswer(question_id));
        }
        self.handle.record_answer(question_id, value)
    }
}

/// Starts and submits quiz attempts against the attempt and draft services.
#[derive(Clone)]
pub struct QuizSessionService {
    clock: Clock,
    quizzes: Arc<dyn QuizRepository>,
    attempts: Arc<dyn AttemptRepository>,
    drafts: Arc<dyn DraftRepository>,
}

impl QuizSessionService {
    #[must_use]
    pub fn new(
        clock: Clock,
        quizzes: Arc<dyn QuizRepository>,
        attempts: Arc<dyn AttemptRepository>,
        drafts: Arc<dyn DraftRepository>,
    ) -> Self {
        Self {
            clock,
            quizzes,
            attempts,
            drafts,
        }
    }

    #[must_use]
    pub fn from_storage(clock: Clock, storage: &Storage) -> Self {
        Self::new(
            clock,
            Arc::clone(&storage.quizzes),
            Arc::clone(&storage.attempts),
            Arc::clone(&storage.drafts),
        )
    }

    /// Swap the draft backend, e.g. for the remote draft store.
    #[must_use]
    pub fn with_drafts(mut self, drafts: Arc<dyn DraftRepository>) -> Self {
        self.drafts = drafts;
        self
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }

    #[must_use]
    pub fn drafts(&self) -> Arc<dyn DraftRepository> {
        Arc::clone(&self.drafts)
    }

    /// Open the quiz for `user`, resuming an in-progress attempt when there is one.
    ///
    /// Saved draft answers come back as already persisted, and the countdown resumes
    /// from whatever is left of the time limit since the attempt started.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::AccessDenied` for non-students,
    /// `SessionError::QuizUnavailable` for a quiz that is not published,
    /// `SessionError::AlreadySubmitted` when the user already completed it, or
    /// `SessionError::Storage` for backend failures.
    pub async fn start(
        &self,
        user: &CurrentUser,
        quiz_id: QuizId,
    ) -> Result<QuizSession, SessionError> {
        if !user.can_take_quizzes() {
            return Err(SessionError::AccessDenied);
        }

        let quiz = self.quizzes.get_quiz(quiz_id).await?;
        if !quiz.is_open() {
            return Err(SessionError::QuizUnavailable(quiz_id));
        }

        let attempt = self
            .attempts
            .fetch_or_create_attempt(quiz_id, user.id, self.clock.now())
            .await?;
        let saved = self
            .drafts
            .load_draft_answers(attempt.id())
            .await?
            .unwrap_or_default();

        let timer = self.timer_for(&quiz, &attempt);
        info!(
            attempt_id = %attempt.id(),
            quiz_id = %quiz_id,
            restored = saved.len(),
            remaining = timer.remaining_secs(),
            "quiz attempt opened"
        );

        let store = SessionStore::new(attempt, quiz.question_count(), timer).with_saved_answers(saved);
        Ok(QuizSession {
            quiz: Arc::new(quiz),
            handle: SessionHandle::new(store),
        })
    }

    fn timer_for(&self, quiz: &QuizDetail, attempt: &Attempt) -> TimerState {
        match quiz.time_limit_secs {
            Some(limit) => {
                let elapsed = self.clock.elapsed_secs_since(attempt.started_at());
                let elapsed = u32::try_from(elapsed).unwrap_or(u32::MAX);
                TimerState::new(limit.saturating_sub(elapsed))
            }
            None => TimerState::untimed(),
        }
    }

    /// Persist the final answers and close the session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Submitted` if this session was already submitted,
    /// `SessionError::AlreadySubmitted` if the attempt service closed it elsewhere, or
    /// `SessionError::Storage` for backend failures.
    pub async fn submit(&self, session: &QuizSession) -> Result<Attempt, SessionError> {
        let handle = session.handle();
        if handle.is_submitted() {
            return Err(SessionError::Submitted);
        }

        let attempt_id = handle.attempt().id();
        let answers = handle.answers();
        let now = self.clock.now();
        let attempt = self
            .attempts
            .submit_attempt(attempt_id, &answers, now)
            .await?;

        handle.mark_submitted(attempt.submitted_at().unwrap_or(now))?;
        info!(%attempt_id, answered = answers.len(), "quiz attempt submitted");
        Ok(attempt)
    }
}
