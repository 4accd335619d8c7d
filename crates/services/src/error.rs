//! Shared error types for the services crate.

use thiserror::Error;

use quiz_core::model::{AttemptError, AttemptId, QuestionId, QuizId};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by the remote draft store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RemoteDraftError {
    #[error("draft endpoint returned status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl From<RemoteDraftError> for StorageError {
    fn from(err: RemoteDraftError) -> Self {
        StorageError::Connection(err.to_string())
    }
}

/// Errors emitted by the quiz session store and services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    /// The local session was submitted; it no longer accepts changes.
    #[error("attempt already submitted")]
    Submitted,
    /// The attempt service refused a new attempt; the caller should show results.
    #[error("attempt {attempt_id} was already submitted")]
    AlreadySubmitted { attempt_id: AttemptId },
    #[error("only students can take quizzes")]
    AccessDenied,
    #[error("quiz {0} is not open for attempts")]
    QuizUnavailable(QuizId),
    #[error("question {0} is not part of this quiz")]
    UnknownQuestion(QuestionId),
    #[error("answer does not fit question {0}")]
    InvalidAnswer(QuestionId),
    #[error("question index {index} is out of range ({count} questions)")]
    QuestionOutOfRange { index: usize, count: usize },
    #[error(transparent)]
    Attempt(AttemptError),
    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for SessionError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::AlreadySubmitted { attempt_id } => Self::AlreadySubmitted { attempt_id },
            other => Self::Storage(other),
        }
    }
}

impl From<AttemptError> for SessionError {
    fn from(err: AttemptError) -> Self {
        match err {
            AttemptError::AlreadySubmitted(_) => Self::Submitted,
            other => Self::Attempt(other),
        }
    }
}

impl SessionError {
    /// Whether the surrounding page should redirect instead of showing an inline message.
    #[must_use]
    pub fn is_redirect(&self) -> bool {
        matches!(
            self,
            SessionError::AlreadySubmitted { .. } | SessionError::AccessDenied
        )
    }
}

/// Errors emitted while assembling app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Storage(#[from] SqliteInitError),
    #[error(transparent)]
    RemoteDrafts(#[from] RemoteDraftError),
}
