use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use quiz_core::model::{
    AnswerMap, AnswerValue, Attempt, QuestionId, TimerState, TimerTransition,
};
use tokio::sync::watch;
use tracing::debug;

use super::progress::SessionProgress;
use super::store::{DraftSnapshot, SessionStore};
use crate::error::SessionError;

/// Passive save indicator for the quiz screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    Idle,
    /// Changes are waiting for the quiet period to end.
    Pending,
    Saving,
    /// The first save failed; one retry is scheduled.
    Retrying,
    Saved { at: DateTime<Utc> },
    /// Saving gave up until the next change.
    Unsaved,
}

struct Shared {
    store: Mutex<SessionStore>,
    answers_tx: watch::Sender<u64>,
    timer_tx: watch::Sender<TimerState>,
    save_tx: watch::Sender<SaveStatus>,
}

/// Cloneable handle to the store of one quiz screen.
///
/// Every mutation goes through the handle, which publishes the answer revision,
/// the timer state and the save status on `watch` channels. Controllers
/// subscribe to those instead of polling the store.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
}

impl SessionHandle {
    #[must_use]
    pub fn new(store: SessionStore) -> Self {
        let (answers_tx, _) = watch::channel(store.revision());
        let (timer_tx, _) = watch::channel(store.timer());
        let (save_tx, _) = watch::channel(SaveStatus::Idle);
        Self {
            shared: Arc::new(Shared {
                store: Mutex::new(store),
                answers_tx,
                timer_tx,
                save_tx,
            }),
        }
    }

    fn store(&self) -> MutexGuard<'_, SessionStore> {
        self.shared
            .store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_timer(&self, transition: TimerTransition, timer: TimerState) {
        if transition.changed() {
            debug!(from = ?transition.from, to = ?transition.to, "timer status changed");
        }
        self.shared.timer_tx.send_replace(timer);
    }

    fn timer_op(
        &self,
        op: impl FnOnce(&mut SessionStore) -> Result<TimerTransition, SessionError>,
    ) -> Result<TimerTransition, SessionError> {
        let (transition, timer) = {
            let mut store = self.store();
            let transition = op(&mut *store)?;
            (transition, store.timer())
        };
        self.publish_timer(transition, timer);
        Ok(transition)
    }

    /// # Errors
    ///
    /// Returns `SessionError::Submitted` after submission.
    pub fn record_answer(
        &self,
        question_id: QuestionId,
        value: AnswerValue,
    ) -> Result<u64, SessionError> {
        let revision = self.store().record_answer(question_id, value)?;
        self.shared.answers_tx.send_replace(revision);
        Ok(revision)
    }

    /// # Errors
    ///
    /// Returns `SessionError::Submitted` after submission.
    pub fn start_timer(&self) -> Result<TimerTransition, SessionError> {
        self.timer_op(SessionStore::start_timer)
    }

    /// # Errors
    ///
    /// Returns `SessionError::Submitted` after submission.
    pub fn tick_timer(&self) -> Result<TimerTransition, SessionError> {
        self.timer_op(SessionStore::tick_timer)
    }

    /// # Errors
    ///
    /// Returns `SessionError::Submitted` after submission.
    pub fn pause_timer(&self) -> Result<TimerTransition, SessionError> {
        self.timer_op(SessionStore::pause_timer)
    }

    /// # Errors
    ///
    /// Returns `SessionError::Submitted` after submission.
    pub fn resume_timer(&self) -> Result<TimerTransition, SessionError> {
        self.timer_op(SessionStore::resume_timer)
    }

    /// # Errors
    ///
    /// Returns `SessionError::Submitted` after submission.
    pub fn mark_saved(&self, at: DateTime<Utc>) -> Result<(), SessionError> {
        self.store().mark_saved(at)
    }

    /// # Errors
    ///
    /// Returns `SessionError::Submitted` after submission.
    pub fn mark_saved_revision(
        &self,
        revision: u64,
        at: DateTime<Utc>,
    ) -> Result<bool, SessionError> {
        self.store().mark_saved_revision(revision, at)
    }

    /// # Errors
    ///
    /// Returns `SessionError::Submitted` after submission.
    pub fn record_focus_loss(&self) -> Result<u32, SessionError> {
        self.store().record_focus_loss()
    }

    /// # Errors
    ///
    /// Returns `SessionError::Submitted` on a second call.
    pub fn mark_submitted(&self, at: DateTime<Utc>) -> Result<(), SessionError> {
        self.timer_op(|store| store.mark_submitted(at))?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `SessionError::QuestionOutOfRange` for an invalid index.
    pub fn go_to_question(&self, index: usize) -> Result<usize, SessionError> {
        self.store().go_to_question(index)
    }

    /// # Errors
    ///
    /// Returns `SessionError::Submitted` after submission.
    pub fn next_question(&self) -> Result<usize, SessionError> {
        self.store().next_question()
    }

    /// # Errors
    ///
    /// Returns `SessionError::Submitted` after submission.
    pub fn previous_question(&self) -> Result<usize, SessionError> {
        self.store().previous_question()
    }

    pub fn set_save_status(&self, status: SaveStatus) {
        self.shared.save_tx.send_replace(status);
    }

    // ─── Reads ─────────────────────────────────────────────────────────────────

    #[must_use]
    pub fn attempt(&self) -> Attempt {
        self.store().attempt().clone()
    }

    #[must_use]
    pub fn answers(&self) -> AnswerMap {
        self.store().answers().clone()
    }

    #[must_use]
    pub fn timer(&self) -> TimerState {
        self.store().timer()
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.store().is_dirty()
    }

    #[must_use]
    pub fn is_submitted(&self) -> bool {
        self.store().is_submitted()
    }

    #[must_use]
    pub fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        self.store().last_saved_at()
    }

    #[must_use]
    pub fn focus_losses(&self) -> u32 {
        self.store().focus_losses()
    }

    #[must_use]
    pub fn draft_snapshot(&self) -> Option<DraftSnapshot> {
        self.store().draft_snapshot()
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        self.store().progress()
    }

    #[must_use]
    pub fn save_status(&self) -> SaveStatus {
        *self.shared.save_tx.borrow()
    }

    // ─── Subscriptions ─────────────────────────────────────────────────────────

    /// Fires once per `record_answer`, carrying the new revision.
    #[must_use]
    pub fn subscribe_answers(&self) -> watch::Receiver<u64> {
        self.shared.answers_tx.subscribe()
    }

    #[must_use]
    pub fn subscribe_timer(&self) -> watch::Receiver<TimerState> {
        self.shared.timer_tx.subscribe()
    }

    #[must_use]
    pub fn subscribe_save_status(&self) -> watch::Receiver<SaveStatus> {
        self.shared.save_tx.subscribe()
    }
}
