use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::QuestionId;

/// A value a student selected or typed for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerValue {
    Choice(String),
    Choices(Vec<String>),
    Text(String),
    Bool(bool),
}

/// Answers keyed by question. Writing a question twice keeps only the last value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerMap(HashMap<QuestionId, AnswerValue>);

impl AnswerMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` for `question_id`, returning the value it replaced.
    pub fn record(&mut self, question_id: QuestionId, value: AnswerValue) -> Option<AnswerValue> {
        self.0.insert(question_id, value)
    }

    #[must_use]
    pub fn get(&self, question_id: QuestionId) -> Option<&AnswerValue> {
        self.0.get(&question_id)
    }

    #[must_use]
    pub fn contains(&self, question_id: QuestionId) -> bool {
        self.0.contains_key(&question_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (QuestionId, &AnswerValue)> {
        self.0.iter().map(|(id, value)| (*id, value))
    }
}

impl FromIterator<(QuestionId, AnswerValue)> for AnswerMap {
    fn from_iter<I: IntoIterator<Item = (QuestionId, AnswerValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
