use thiserror::Error;

use crate::model::{AttemptError, SessionSettingsError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Attempt(#[from] AttemptError),
    #[error(transparent)]
    Settings(#[from] SessionSettingsError),
}
