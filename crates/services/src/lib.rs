#![forbid(unsafe_code)]

pub mod app_services;
pub mod autosave;
pub mod error;
pub mod focus;
pub mod remote_drafts;
pub mod sessions;
pub mod timer;

pub use quiz_core::Clock;

pub use app_services::AppServices;
pub use autosave::{AutoSaveController, SaveOutcome};
pub use error::{AppServicesError, RemoteDraftError, SessionError};
pub use focus::{FocusMonitor, FocusSignal, FocusTracker};
pub use remote_drafts::{HttpDraftStore, RemoteDraftConfig};
pub use sessions::{
    DraftSnapshot, QuizScreen, QuizSession, QuizSessionService, SaveStatus, ScreenEvent,
    SessionHandle, SessionProgress, SessionStore,
};
pub use timer::TimerController;
