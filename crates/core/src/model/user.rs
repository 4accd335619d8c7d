use serde::{Deserialize, Serialize};

use crate::model::UserId;

/// Role flag supplied by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Instructor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: UserId,
    pub role: Role,
}

impl CurrentUser {
    #[must_use]
    pub fn student(id: UserId) -> Self {
        Self {
            id,
            role: Role::Student,
        }
    }

    #[must_use]
    pub fn instructor(id: UserId) -> Self {
        Self {
            id,
            role: Role::Instructor,
        }
    }

    /// Only students may open the quiz-taking screen.
    #[must_use]
    pub fn can_take_quizzes(&self) -> bool {
        self.role == Role::Student
    }
}
