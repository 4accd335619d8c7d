mod handle;
mod progress;
mod screen;
mod service;
mod store;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use handle::{SaveStatus, SessionHandle};
pub use progress::SessionProgress;
pub use screen::{QuizScreen, ScreenEvent};
pub use service::{QuizSession, QuizSessionService};
pub use store::{DraftSnapshot, SessionStore};
