use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quiz_core::model::{
    AnswerMap, Attempt, AttemptError, AttemptId, QuizDetail, QuizId, UserId,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    /// The user already completed this quiz and reattempts are disallowed.
    #[error("attempt {attempt_id} already submitted")]
    AlreadySubmitted { attempt_id: AttemptId },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<AttemptError> for StorageError {
    fn from(err: AttemptError) -> Self {
        match err {
            AttemptError::AlreadySubmitted(attempt_id) => Self::AlreadySubmitted { attempt_id },
            other => Self::Serialization(other.to_string()),
        }
    }
}

/// Quiz definitions (questions, time limit, status).
#[async_trait]
pub trait QuizRepository: Send + Sync {
    /// Fetch a quiz by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_quiz(&self, id: QuizId) -> Result<QuizDetail, StorageError>;

    /// Persist or replace a quiz definition.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the quiz cannot be stored.
    async fn upsert_quiz(&self, quiz: &QuizDetail) -> Result<(), StorageError>;
}

/// Attempt lifecycle as provided by the attempt service.
#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// Resume the user's in-progress attempt for `quiz_id`, or start a new one.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadySubmitted` when the user already completed the quiz
    /// and it does not allow reattempts, `StorageError::NotFound` for an unknown quiz.
    async fn fetch_or_create_attempt(
        &self,
        quiz_id: QuizId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Attempt, StorageError>;

    /// Record final answers and mark the attempt submitted.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadySubmitted` on a second submission,
    /// `StorageError::NotFound` for an unknown attempt.
    async fn submit_attempt(
        &self,
        attempt_id: AttemptId,
        answers: &AnswerMap,
        submitted_at: DateTime<Utc>,
    ) -> Result<Attempt, StorageError>;

    /// Fetch an attempt by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing.
    async fn get_attempt(&self, attempt_id: AttemptId) -> Result<Attempt, StorageError>;
}

/// Draft answers saved while an attempt is in progress.
#[async_trait]
pub trait DraftRepository: Send + Sync {
    /// Overwrite the draft for `attempt_id` with `answers`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when the draft cannot be persisted.
    async fn save_draft_answers(
        &self,
        attempt_id: AttemptId,
        answers: &AnswerMap,
    ) -> Result<(), StorageError>;

    /// Load the last saved draft, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn load_draft_answers(
        &self,
        attempt_id: AttemptId,
    ) -> Result<Option<AnswerMap>, StorageError>;
}

/// What `fetch_or_create_attempt` should do given the user's latest attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AttemptResolution {
    Resume(Attempt),
    Create,
    Blocked(AttemptId),
}

pub(crate) fn resolve_latest(latest: Option<Attempt>, allow_reattempt: bool) -> AttemptResolution {
    match latest {
        Some(attempt) if !attempt.is_submitted() => AttemptResolution::Resume(attempt),
        Some(attempt) if !allow_reattempt => AttemptResolution::Blocked(attempt.id()),
        _ => AttemptResolution::Create,
    }
}

#[derive(Default)]
struct MemoryState {
    quizzes: HashMap<QuizId, QuizDetail>,
    attempts: HashMap<AttemptId, Attempt>,
    drafts: HashMap<AttemptId, AnswerMap>,
    submitted_answers: HashMap<AttemptId, AnswerMap>,
    next_attempt_id: u64,
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    /// Final answers recorded at submission time.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the attempt was never submitted.
    pub fn submitted_answers(&self, attempt_id: AttemptId) -> Result<AnswerMap, StorageError> {
        let guard = self.lock()?;
        guard
            .submitted_answers
            .get(&attempt_id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }
}

#[async_trait]
impl QuizRepository for InMemoryRepository {
    async fn get_quiz(&self, id: QuizId) -> Result<QuizDetail, StorageError> {
        let guard = self.lock()?;
        guard.quizzes.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn upsert_quiz(&self, quiz: &QuizDetail) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.quizzes.insert(quiz.id, quiz.clone());
        Ok(())
    }
}

#[async_trait]
impl AttemptRepository for InMemoryRepository {
    async fn fetch_or_create_attempt(
        &self,
        quiz_id: QuizId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Attempt, StorageError> {
        let mut guard = self.lock()?;
        let allow_reattempt = guard
            .quizzes
            .get(&quiz_id)
            .map(|quiz| quiz.allow_reattempt)
            .ok_or(StorageError::NotFound)?;

        let latest = guard
            .attempts
            .values()
            .filter(|a| a.quiz_id() == quiz_id && a.user_id() == user_id)
            .max_by_key(|a| (a.started_at(), a.id()))
            .cloned();

        match resolve_latest(latest, allow_reattempt) {
            AttemptResolution::Resume(attempt) => Ok(attempt),
            AttemptResolution::Blocked(attempt_id) => {
                Err(StorageError::AlreadySubmitted { attempt_id })
            }
            AttemptResolution::Create => {
                guard.next_attempt_id += 1;
                let attempt =
                    Attempt::start(AttemptId::new(guard.next_attempt_id), quiz_id, user_id, now);
                guard.attempts.insert(attempt.id(), attempt.clone());
                Ok(attempt)
            }
        }
    }

    async fn submit_attempt(
        &self,
        attempt_id: AttemptId,
        answers: &AnswerMap,
        submitted_at: DateTime<Utc>,
    ) -> Result<Attempt, StorageError> {
        let mut guard = self.lock()?;
        let attempt = guard
            .attempts
            .get_mut(&attempt_id)
            .ok_or(StorageError::NotFound)?;
        attempt.submit(submitted_at)?;
        let attempt = attempt.clone();

        guard.drafts.remove(&attempt_id);
        guard.submitted_answers.insert(attempt_id, answers.clone());
        Ok(attempt)
    }

    async fn get_attempt(&self, attempt_id: AttemptId) -> Result<Attempt, StorageError> {
        let guard = self.lock()?;
        guard
            .attempts
            .get(&attempt_id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }
}

#[async_trait]
impl DraftRepository for InMemoryRepository {
    async fn save_draft_answers(
        &self,
        attempt_id: AttemptId,
        answers: &AnswerMap,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        match guard.attempts.get(&attempt_id) {
            None => return Err(StorageError::NotFound),
            Some(attempt) if attempt.is_submitted() => {
                return Err(StorageError::AlreadySubmitted { attempt_id });
            }
            Some(_) => {}
        }
        guard.drafts.insert(attempt_id, answers.clone());
        Ok(())
    }

    async fn load_draft_answers(
        &self,
        attempt_id: AttemptId,
    ) -> Result<Option<AnswerMap>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.drafts.get(&attempt_id).cloned())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub quizzes: Arc<dyn QuizRepository>,
    pub attempts: Arc<dyn AttemptRepository>,
    pub drafts: Arc<dyn DraftRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self {
            quizzes: Arc::new(repo.clone()),
            attempts: Arc::new(repo.clone()),
            drafts: Arc::new(repo),
        }
    }
}
