use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::{AnswerValue, QuestionId, QuizId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizStatus {
    Draft,
    Published,
    Closed,
}

impl QuizStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            QuizStatus::Draft => "draft",
            QuizStatus::Published => "published",
            QuizStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for QuizStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuizStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            "closed" => Ok(Self::Closed),
            other => Err(format!("invalid quiz status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionKind {
    SingleChoice { options: Vec<String> },
    MultipleChoice { options: Vec<String> },
    TrueFalse,
    ShortAnswer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub prompt: String,
    pub kind: QuestionKind,
    pub points: u32,
}

impl Question {
    /// Whether `value` has the shape this question expects.
    #[must_use]
    pub fn accepts(&self, value: &AnswerValue) -> bool {
        match (&self.kind, value) {
            (QuestionKind::SingleChoice { options }, AnswerValue::Choice(choice)) => {
                options.contains(choice)
            }
            (QuestionKind::MultipleChoice { options }, AnswerValue::Choices(choices)) => {
                choices.iter().all(|c| options.contains(c))
            }
            (QuestionKind::TrueFalse, AnswerValue::Bool(_))
            | (QuestionKind::ShortAnswer, AnswerValue::Text(_)) => true,
            _ => false,
        }
    }
}

/// Quiz definition as the attempt screen sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizDetail {
    pub id: QuizId,
    pub title: String,
    pub questions: Vec<Question>,
    pub time_limit_secs: Option<u32>,
    pub status: QuizStatus,
    pub allow_reattempt: bool,
}

impl QuizDetail {
    #[must_use]
    pub fn question(&self, id: QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }

    #[must_use]
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == QuizStatus::Published
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choice_question() -> Question {
        Question {
            id: QuestionId::new(1),
            prompt: "Pick one".into(),
            kind: QuestionKind::SingleChoice {
                options: vec!["a".into(), "b".into()],
            },
            points: 1,
        }
    }

    #[test]
    fn single_choice_accepts_known_option_only() {
        let q = choice_question();
        assert!(q.accepts(&AnswerValue::Choice("a".into())));
        assert!(!q.accepts(&AnswerValue::Choice("z".into())));
        assert!(!q.accepts(&AnswerValue::Bool(true)));
    }

    #[test]
    fn multiple_choice_checks_every_option() {
        let q = Question {
            kind: QuestionKind::MultipleChoice {
                options: vec!["x".into(), "y".into()],
            },
            ..choice_question()
        };
        assert!(q.accepts(&AnswerValue::Choices(vec!["x".into(), "y".into()])));
        assert!(!q.accepts(&AnswerValue::Choices(vec!["x".into(), "w".into()])));
    }

    #[test]
    fn question_kind_json_is_tagged() {
        let json = serde_json::to_string(&QuestionKind::TrueFalse).unwrap();
        assert_eq!(json, r#"{"type":"true_false"}"#);
    }
}
