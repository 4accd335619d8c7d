mod answer;
mod attempt;
mod ids;
mod quiz;
mod settings;
mod timer;
mod user;

pub use answer::{AnswerMap, AnswerValue};
pub use attempt::{Attempt, AttemptError, AttemptStatus};
pub use ids::{AttemptId, ParseIdError, QuestionId, QuizId, UserId};
pub use quiz::{Question, QuestionKind, QuizDetail, QuizStatus};
pub use settings::{
    DEFAULT_DEBOUNCE, DEFAULT_RETRY_DELAY, DEFAULT_TICK, SessionSettings, SessionSettingsError,
};
pub use timer::{TimerState, TimerStatus, TimerTransition};
pub use user::{CurrentUser, Role};
