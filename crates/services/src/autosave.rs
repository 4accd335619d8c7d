use std::sync::Arc;
use std::time::Duration;

use quiz_core::Clock;
use quiz_core::model::SessionSettings;
use storage::repository::DraftRepository;
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::sessions::{SaveStatus, SessionHandle};

/// Result of a single save attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Nothing unsaved, no call made.
    Clean,
    Saved,
    Failed,
}

#[derive(Clone)]
struct SaveWorker {
    handle: SessionHandle,
    drafts: Arc<dyn DraftRepository>,
    clock: Clock,
    gate: Arc<AsyncMutex<()>>,
}

impl SaveWorker {
    /// One persistence call with the answers as they are right now.
    async fn save_once(&self) -> SaveOutcome {
        let _gate = self.gate.lock().await;
        let Some(draft) = self.handle.draft_snapshot() else {
            self.settle_status();
            return SaveOutcome::Clean;
        };
        let attempt_id = draft.attempt.id();

        self.handle.set_save_status(SaveStatus::Saving);
        match self.drafts.save_draft_answers(attempt_id, &draft.answers).await {
            Ok(()) => {
                let at = self.clock.now();
                match self.handle.mark_saved_revision(draft.revision, at) {
                    Ok(clean) => {
                        info!(%attempt_id, revision = draft.revision, clean, "draft answers saved");
                        let status = if clean {
                            SaveStatus::Saved { at }
                        } else {
                            SaveStatus::Pending
                        };
                        self.handle.set_save_status(status);
                    }
                    Err(err) => debug!(%attempt_id, %err, "saved draft for a closed session"),
                }
                SaveOutcome::Saved
            }
            Err(err) => {
                warn!(%attempt_id, %err, "saving draft answers failed");
                SaveOutcome::Failed
            }
        }
    }

    /// An earlier save already covered the latest edit; drop any in-flight status.
    fn settle_status(&self) {
        if matches!(
            self.handle.save_status(),
            SaveStatus::Pending | SaveStatus::Saving | SaveStatus::Retrying
        ) {
            let status = self
                .handle
                .last_saved_at()
                .map_or(SaveStatus::Idle, |at| SaveStatus::Saved { at });
            self.handle.set_save_status(status);
        }
    }

    async fn save_with_retry(&self, retry_delay: Duration) {
        if self.save_once().await != SaveOutcome::Failed {
            return;
        }

        self.handle.set_save_status(SaveStatus::Retrying);
        tokio::time::sleep(retry_delay).await;

        if self.save_once().await == SaveOutcome::Failed {
            warn!("draft answers left unsaved until the next change");
            self.handle.set_save_status(SaveStatus::Unsaved);
        }
    }
}

/// Persists dirty answers after a quiet period.
///
/// Each new answer restarts the quiet period, so bursts of edits coalesce into one
/// save of the latest answers. A failed save is retried once; after that the
/// controller waits for the next edit. Dropping the controller cancels any
/// pending save.
pub struct AutoSaveController {
    worker: SaveWorker,
    task: Option<JoinHandle<()>>,
}

impl AutoSaveController {
    /// Spawn the debounce loop on the current tokio runtime.
    #[must_use]
    pub fn spawn(
        handle: SessionHandle,
        drafts: Arc<dyn DraftRepository>,
        clock: Clock,
        settings: &SessionSettings,
    ) -> Self {
        let worker = SaveWorker {
            handle,
            drafts,
            clock,
            gate: Arc::new(AsyncMutex::new(())),
        };
        let answers_rx = worker.handle.subscribe_answers();
        let task = tokio::spawn(run(
            worker.clone(),
            answers_rx,
            settings.debounce(),
            settings.retry_delay(),
        ));
        Self {
            worker,
            task: Some(task),
        }
    }

    /// Save right away if anything is unsaved, skipping the quiet period.
    ///
    /// Used when the user navigates away. Makes a single attempt.
    pub async fn flush(&self) -> SaveOutcome {
        let outcome = self.worker.save_once().await;
        if outcome == SaveOutcome::Failed {
            self.worker.handle.set_save_status(SaveStatus::Unsaved);
        }
        outcome
    }

    pub fn shutdown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Flush pending answers, then stop the debounce loop.
    pub async fn close(mut self) -> SaveOutcome {
        self.shutdown();
        self.flush().await
    }
}

impl Drop for AutoSaveController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run(
    worker: SaveWorker,
    mut answers_rx: watch::Receiver<u64>,
    debounce: Duration,
    retry_delay: Duration,
) {
    loop {
        if answers_rx.changed().await.is_err() {
            return;
        }
        worker.handle.set_save_status(SaveStatus::Pending);

        loop {
            tokio::select! {
                () = tokio::time::sleep(debounce) => break,
                changed = answers_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
        answers_rx.borrow_and_update();

        worker.save_with_retry(retry_delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use quiz_core::model::{
        AnswerMap, AnswerValue, Attempt, AttemptId, QuestionId, QuizId, TimerState, UserId,
    };
    use quiz_core::time::{fixed_clock, fixed_now};
    use storage::repository::StorageError;
    use tokio::time::Instant;

    use crate::sessions::SessionStore;

    /// Records every save call and fails the first `failures` of them.
    #[derive(Default)]
    struct RecordingDrafts {
        calls: Mutex<Vec<(Instant, AnswerMap)>>,
        failures: Mutex<usize>,
    }

    impl RecordingDrafts {
        fn failing(failures: usize) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                failures: Mutex::new(failures),
            }
        }

        fn calls(&self) -> Vec<(Instant, AnswerMap)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DraftRepository for RecordingDrafts {
        async fn save_draft_answers(
            &self,
            _attempt_id: AttemptId,
            answers: &AnswerMap,
        ) -> Result<(), StorageError> {
            self.calls
                .lock()
                .unwrap()
                .push((Instant::now(), answers.clone()));
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(StorageError::Connection("offline".into()));
            }
            Ok(())
        }

        async fn load_draft_answers(
            &self,
            _attempt_id: AttemptId,
        ) -> Result<Option<AnswerMap>, StorageError> {
            Ok(None)
        }
    }

    /// Every save takes a second to complete.
    struct SlowDrafts;

    #[async_trait]
    impl DraftRepository for SlowDrafts {
        async fn save_draft_answers(
            &self,
            _attempt_id: AttemptId,
            _answers: &AnswerMap,
        ) -> Result<(), StorageError> {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        }

        async fn load_draft_answers(
            &self,
            _attempt_id: AttemptId,
        ) -> Result<Option<AnswerMap>, StorageError> {
            Ok(None)
        }
    }

    fn handle() -> SessionHandle {
        let attempt = Attempt::start(AttemptId::new(1), QuizId::new(1), UserId::new(1), fixed_now());
        SessionHandle::new(SessionStore::new(attempt, 3, TimerState::new(600)))
    }

    fn answer(handle: &SessionHandle, q: u64, v: &str) {
        handle
            .record_answer(QuestionId::new(q), AnswerValue::Choice(v.into()))
            .unwrap();
    }

    fn spawn(handle: &SessionHandle, drafts: &Arc<RecordingDrafts>) -> AutoSaveController {
        let drafts: Arc<dyn DraftRepository> = drafts.clone();
        AutoSaveController::spawn(handle.clone(), drafts, fixed_clock(), &SessionSettings::default())
    }

    #[tokio::test(start_paused = true)]
    async fn edits_within_window_coalesce_into_one_save() {
        let handle = handle();
        let drafts = Arc::new(RecordingDrafts::default());
        let _autosave = spawn(&handle, &drafts);
        tokio::task::yield_now().await;
        let start = Instant::now();

        answer(&handle, 1, "a");
        tokio::time::sleep(Duration::from_secs(1)).await;
        answer(&handle, 2, "b");
        tokio::time::sleep(Duration::from_secs(1)).await;
        answer(&handle, 3, "c");

        tokio::time::sleep(Duration::from_millis(2_900)).await;
        assert!(drafts.calls().is_empty());

        tokio::time::sleep(Duration::from_secs(10)).await;
        let calls = drafts.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0 - start, Duration::from_secs(5));
        assert_eq!(calls[0].1.len(), 3);

        assert!(!handle.is_dirty());
        assert_eq!(handle.last_saved_at(), Some(fixed_now()));
        assert_eq!(handle.save_status(), SaveStatus::Saved { at: fixed_now() });
    }

    #[tokio::test(start_paused = true)]
    async fn failed_save_retries_once_then_gives_up() {
        let handle = handle();
        let drafts = Arc::new(RecordingDrafts::failing(2));
        let _autosave = spawn(&handle, &drafts);
        tokio::task::yield_now().await;
        let start = Instant::now();

        answer(&handle, 1, "a");
        tokio::time::sleep(Duration::from_secs(120)).await;

        let calls = drafts.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0 - start, Duration::from_secs(3));
        assert_eq!(calls[1].0 - start, Duration::from_secs(8));
        assert!(handle.is_dirty());
        assert_eq!(handle.save_status(), SaveStatus::Unsaved);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_success_clears_dirty() {
        let handle = handle();
        let drafts = Arc::new(RecordingDrafts::failing(1));
        let _autosave = spawn(&handle, &drafts);
        tokio::task::yield_now().await;

        answer(&handle, 1, "a");
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(drafts.calls().len(), 2);
        assert!(!handle.is_dirty());
    }

    #[tokio::test(start_paused = true)]
    async fn edit_during_retry_wait_does_not_leave_status_pending() {
        let handle = handle();
        let drafts = Arc::new(RecordingDrafts::failing(1));
        let _autosave = spawn(&handle, &drafts);
        tokio::task::yield_now().await;

        answer(&handle, 1, "a");
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(handle.save_status(), SaveStatus::Retrying);
        answer(&handle, 2, "b");
        tokio::time::sleep(Duration::from_secs(60)).await;

        let calls = drafts.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].1.len(), 2);
        assert!(!handle.is_dirty());
        assert_eq!(handle.save_status(), SaveStatus::Saved { at: fixed_now() });
    }

    #[tokio::test(start_paused = true)]
    async fn edit_during_slow_save_keeps_status_pending() {
        let handle = handle();
        let drafts = Arc::new(SlowDrafts);
        let drafts: Arc<dyn DraftRepository> = drafts;
        let _autosave = AutoSaveController::spawn(
            handle.clone(),
            drafts,
            fixed_clock(),
            &SessionSettings::default(),
        );
        tokio::task::yield_now().await;

        answer(&handle, 1, "a");
        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(handle.save_status(), SaveStatus::Saving);
        answer(&handle, 2, "b");

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(handle.is_dirty());
        assert_eq!(handle.save_status(), SaveStatus::Pending);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!handle.is_dirty());
        assert_eq!(handle.save_status(), SaveStatus::Saved { at: fixed_now() });
    }

    #[tokio::test(start_paused = true)]
    async fn next_edit_after_giving_up_saves_again() {
        let handle = handle();
        let drafts = Arc::new(RecordingDrafts::failing(2));
        let _autosave = spawn(&handle, &drafts);
        tokio::task::yield_now().await;

        answer(&handle, 1, "a");
        tokio::time::sleep(Duration::from_secs(60)).await;
        answer(&handle, 2, "b");
        tokio::time::sleep(Duration::from_secs(60)).await;

        let calls = drafts.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2].1.len(), 2);
        assert!(!handle.is_dirty());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_controller_cancels_pending_save() {
        let handle = handle();
        let drafts = Arc::new(RecordingDrafts::default());
        let autosave = spawn(&handle, &drafts);
        tokio::task::yield_now().await;

        answer(&handle, 1, "a");
        tokio::time::sleep(Duration::from_secs(1)).await;
        drop(autosave);
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert!(drafts.calls().is_empty());
        assert!(handle.is_dirty());
    }

    #[tokio::test(start_paused = true)]
    async fn flush_bypasses_quiet_period() {
        let handle = handle();
        let drafts = Arc::new(RecordingDrafts::default());
        let autosave = spawn(&handle, &drafts);
        tokio::task::yield_now().await;

        answer(&handle, 1, "a");
        assert_eq!(autosave.close().await, SaveOutcome::Saved);
        assert_eq!(drafts.calls().len(), 1);
        assert!(!handle.is_dirty());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(drafts.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_without_changes_makes_no_call() {
        let handle = handle();
        let drafts = Arc::new(RecordingDrafts::default());
        let autosave = spawn(&handle, &drafts);

        assert_eq!(autosave.flush().await, SaveOutcome::Clean);
        assert!(drafts.calls().is_empty());
    }
}
