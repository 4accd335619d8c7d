use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{AttemptId, QuizId, UserId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AttemptError {
    #[error("attempt {0} is already submitted")]
    AlreadySubmitted(AttemptId),

    #[error("submitted_at is before started_at")]
    InvalidTimeRange,

    #[error("attempt status and submitted_at disagree")]
    InconsistentStatus,

    #[error("invalid attempt status: {0}")]
    InvalidStatus(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Submitted,
}

impl AttemptStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Submitted => "submitted",
        }
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttemptStatus {
    type Err = AttemptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(Self::InProgress),
            "submitted" => Ok(Self::Submitted),
            other => Err(AttemptError::InvalidStatus(other.to_owned())),
        }
    }
}

/// One student's in-progress or submitted try at a quiz.
///
/// An attempt is immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    id: AttemptId,
    quiz_id: QuizId,
    user_id: UserId,
    status: AttemptStatus,
    started_at: DateTime<Utc>,
    submitted_at: Option<DateTime<Utc>>,
}

impl Attempt {
    /// Begin a new in-progress attempt.
    #[must_use]
    pub fn start(id: AttemptId, quiz_id: QuizId, user_id: UserId, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            quiz_id,
            user_id,
            status: AttemptStatus::InProgress,
            started_at,
            submitted_at: None,
        }
    }

    /// Rehydrate an attempt from storage.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::InconsistentStatus` when the status and `submitted_at`
    /// disagree, or `AttemptError::InvalidTimeRange` when it was submitted before it started.
    pub fn from_persisted(
        id: AttemptId,
        quiz_id: QuizId,
        user_id: UserId,
        status: AttemptStatus,
        started_at: DateTime<Utc>,
        submitted_at: Option<DateTime<Utc>>,
    ) -> Result<Self, AttemptError> {
        match (status, submitted_at) {
            (AttemptStatus::InProgress, None) => {}
            (AttemptStatus::Submitted, Some(at)) if at < started_at => {
                return Err(AttemptError::InvalidTimeRange);
            }
            (AttemptStatus::Submitted, Some(_)) => {}
            _ => return Err(AttemptError::InconsistentStatus),
        }

        Ok(Self {
            id,
            quiz_id,
            user_id,
            status,
            started_at,
            submitted_at,
        })
    }

    /// Mark the attempt submitted.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::AlreadySubmitted` on a second submission and
    /// `AttemptError::InvalidTimeRange` if `at` precedes the start time.
    pub fn submit(&mut self, at: DateTime<Utc>) -> Result<(), AttemptError> {
        if self.is_submitted() {
            return Err(AttemptError::AlreadySubmitted(self.id));
        }
        if at < self.started_at {
            return Err(AttemptError::InvalidTimeRange);
        }
        self.status = AttemptStatus::Submitted;
        self.submitted_at = Some(at);
        Ok(())
    }

    #[must_use]
    pub fn id(&self) -> AttemptId {
        self.id
    }

    #[must_use]
    pub fn quiz_id(&self) -> QuizId {
        self.quiz_id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn status(&self) -> AttemptStatus {
        self.status
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    #[must_use]
    pub fn is_submitted(&self) -> bool {
        self.status == AttemptStatus::Submitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn attempt() -> Attempt {
        Attempt::start(AttemptId::new(1), QuizId::new(2), UserId::new(3), fixed_now())
    }

    #[test]
    fn submit_is_one_way() {
        let mut attempt = attempt();
        attempt.submit(fixed_now() + Duration::minutes(5)).unwrap();
        assert!(attempt.is_submitted());

        let err = attempt.submit(fixed_now() + Duration::minutes(6)).unwrap_err();
        assert_eq!(err, AttemptError::AlreadySubmitted(AttemptId::new(1)));
        assert_eq!(
            attempt.submitted_at(),
            Some(fixed_now() + Duration::minutes(5))
        );
    }

    #[test]
    fn submit_before_start_is_rejected() {
        let mut attempt = attempt();
        let err = attempt.submit(fixed_now() - Duration::seconds(1)).unwrap_err();
        assert_eq!(err, AttemptError::InvalidTimeRange);
        assert!(!attempt.is_submitted());
    }

    #[test]
    fn persisted_status_must_match_timestamp() {
        let err = Attempt::from_persisted(
            AttemptId::new(1),
            QuizId::new(2),
            UserId::new(3),
            AttemptStatus::Submitted,
            fixed_now(),
            None,
        )
        .unwrap_err();
        assert_eq!(err, AttemptError::InconsistentStatus);
    }

    #[test]
    fn status_parses_from_storage_string() {
        assert_eq!("submitted".parse::<AttemptStatus>().unwrap(), AttemptStatus::Submitted);
        assert!("done".parse::<AttemptStatus>().is_err());
    }
}
