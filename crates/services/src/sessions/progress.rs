use chrono::{DateTime, Utc};

use quiz_core::model::TimerState;

/// Aggregated view of an attempt in progress, useful for UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProgress {
    pub total: usize,
    pub answered: usize,
    pub current_index: usize,
    pub timer: TimerState,
    pub dirty: bool,
    pub last_saved_at: Option<DateTime<Utc>>,
    pub focus_losses: u32,
    pub is_submitted: bool,
}
