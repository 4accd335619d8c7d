use quiz_core::model::{AnswerValue, Attempt, CurrentUser, QuestionId, QuizId, SessionSettings};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use super::handle::SessionHandle;
use super::service::{QuizSession, QuizSessionService};
use crate::autosave::{AutoSaveController, SaveOutcome};
use crate::error::SessionError;
use crate::focus::{FocusMonitor, FocusSignal};
use crate::timer::TimerController;

/// Something the caller of [`QuizScreen`] should react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenEvent {
    /// Time is up; the caller decides whether to submit.
    Expired,
    FocusWarning(u32),
}

async fn expiry(slot: &mut Option<oneshot::Receiver<()>>) -> bool {
    let Some(rx) = slot.as_mut() else {
        return false;
    };
    let fired = rx.await.is_ok();
    *slot = None;
    fired
}

/// Everything the quiz-taking screen owns while it is open.
///
/// Mounting creates the session and starts the countdown, the auto-save loop and,
/// when enabled, the focus monitor. Expiry is only reported; submitting on expiry
/// is up to the caller.
pub struct QuizScreen {
    session: QuizSession,
    timer: TimerController,
    autosave: AutoSaveController,
    focus: Option<FocusMonitor>,
    expired_rx: Option<oneshot::Receiver<()>>,
    warnings_rx: mpsc::UnboundedReceiver<u32>,
}

impl QuizScreen {
    /// # Errors
    ///
    /// Returns the `SessionError` from [`QuizSessionService::start`].
    pub async fn mount(
        service: &QuizSessionService,
        user: &CurrentUser,
        quiz_id: QuizId,
        settings: &SessionSettings,
    ) -> Result<Self, SessionError> {
        let session = service.start(user, quiz_id).await?;
        Self::attach(service, session, settings)
    }

    /// Wire the controllers to an already started session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Submitted` if the session is already closed.
    pub fn attach(
        service: &QuizSessionService,
        session: QuizSession,
        settings: &SessionSettings,
    ) -> Result<Self, SessionError> {
        let handle = session.handle().clone();

        let (expired_tx, expired_rx) = oneshot::channel();
        let timer = TimerController::spawn(handle.clone(), settings.tick(), move || {
            let _ = expired_tx.send(());
        });
        let autosave =
            AutoSaveController::spawn(handle.clone(), service.drafts(), service.clock(), settings);

        let (warnings_tx, warnings_rx) = mpsc::unbounded_channel();
        let focus = settings.monitor_focus().then(|| {
            FocusMonitor::spawn(handle.clone(), move |count| {
                let _ = warnings_tx.send(count);
            })
        });

        handle.start_timer()?;
        debug!(
            attempt_id = %handle.attempt().id(),
            focus = focus.is_some(),
            "quiz screen mounted"
        );

        Ok(Self {
            session,
            timer,
            autosave,
            focus,
            expired_rx: Some(expired_rx),
            warnings_rx,
        })
    }

    #[must_use]
    pub fn session(&self) -> &QuizSession {
        &self.session
    }

    #[must_use]
    pub fn handle(&self) -> &SessionHandle {
        self.session.handle()
    }

    /// # Errors
    ///
    /// See [`QuizSession::answer`].
    pub fn answer(&self, question_id: QuestionId, value: AnswerValue) -> Result<u64, SessionError> {
        self.session.answer(question_id, value)
    }

    /// Forward a visibility or focus event from the host page.
    pub fn report_focus(&self, signal: FocusSignal) {
        if let Some(focus) = &self.focus {
            focus.report(signal);
        }
    }

    /// Resolve once the countdown expires. Returns false when the countdown stopped
    /// without expiring or the expiry was already reported. Untimed quizzes never
    /// resolve.
    ///
    /// Cancel-safe: dropping the future keeps the expiry pending.
    pub async fn wait_expired(&mut self) -> bool {
        expiry(&mut self.expired_rx).await
    }

    /// Next focus-loss warning, carrying the running count.
    pub async fn next_focus_warning(&mut self) -> Option<u32> {
        if self.focus.is_none() {
            return None;
        }
        self.warnings_rx.recv().await
    }

    /// Wait for whichever comes first: expiry or a focus warning.
    ///
    /// Returns `None` once neither can happen any more.
    pub async fn next_event(&mut self) -> Option<ScreenEvent> {
        let monitoring = self.focus.is_some();
        tokio::select! {
            true = expiry(&mut self.expired_rx) => Some(ScreenEvent::Expired),
            Some(count) = self.warnings_rx.recv(), if monitoring => {
                Some(ScreenEvent::FocusWarning(count))
            }
            else => None,
        }
    }

    /// Submit the attempt and stop every background task.
    ///
    /// The screen stays usable for reads; a failed submission leaves the tasks running.
    ///
    /// # Errors
    ///
    /// See [`QuizSessionService::submit`].
    pub async fn submit(&mut self, service: &QuizSessionService) -> Result<Attempt, SessionError> {
        let attempt = service.submit(&self.session).await?;
        self.stop();
        Ok(attempt)
    }

    fn stop(&mut self) {
        self.timer.shutdown();
        self.autosave.shutdown();
        if let Some(focus) = self.focus.as_mut() {
            focus.shutdown();
        }
    }

    /// Leave the screen: save anything unsaved right away, then dispose the tasks.
    pub async fn unmount(mut self) -> SaveOutcome {
        self.timer.shutdown();
        if let Some(focus) = self.focus.as_mut() {
            focus.shutdown();
        }
        let outcome = self.autosave.flush().await;
        self.autosave.shutdown();
        info!(attempt_id = %self.handle().attempt().id(), ?outcome, "quiz screen closed");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use quiz_core::model::{Question, QuestionKind, QuizDetail, QuizStatus, UserId};
    use quiz_core::time::fixed_clock;
    use storage::repository::{DraftRepository, InMemoryRepository, Storage};

    use crate::sessions::SaveStatus;

    fn quiz(limit: Option<u32>) -> QuizDetail {
        QuizDetail {
            id: QuizId::new(1),
            title: "Lifetimes".into(),
            questions: (1..=3)
                .map(|n| Question {
                    id: QuestionId::new(n),
                    prompt: format!("Statement {n} holds."),
                    kind: QuestionKind::TrueFalse,
                    points: 1,
                })
                .collect(),
            time_limit_secs: limit,
            status: QuizStatus::Published,
            allow_reattempt: false,
        }
    }

    fn storage(repo: &InMemoryRepository) -> Storage {
        Storage {
            quizzes: Arc::new(repo.clone()),
            attempts: Arc::new(repo.clone()),
            drafts: Arc::new(repo.clone()),
        }
    }

    async fn setup(limit: Option<u32>) -> (InMemoryRepository, QuizSessionService) {
        let repo = InMemoryRepository::new();
        let storage = storage(&repo);
        storage.quizzes.upsert_quiz(&quiz(limit)).await.unwrap();
        (repo, QuizSessionService::from_storage(fixed_clock(), &storage))
    }

    fn student() -> CurrentUser {
        CurrentUser::student(UserId::new(1))
    }

    #[tokio::test(start_paused = true)]
    async fn answers_are_saved_after_quiet_period() {
        let (repo, service) = setup(Some(600)).await;
        let screen = QuizScreen::mount(&service, &student(), QuizId::new(1), &SessionSettings::default())
            .await
            .unwrap();
        let attempt_id = screen.handle().attempt().id();

        screen.answer(QuestionId::new(1), AnswerValue::Bool(true)).unwrap();
        tokio::time::sleep(Duration::from_millis(4_500)).await;

        let draft = repo.load_draft_answers(attempt_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(draft.len(), 1);
        assert!(!screen.handle().is_dirty());
        assert!(matches!(screen.handle().save_status(), SaveStatus::Saved { .. }));
        assert_eq!(screen.handle().timer().remaining_secs(), 596);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_is_reported_and_caller_submits() {
        let (repo, service) = setup(Some(5)).await;
        let mut screen =
            QuizScreen::mount(&service, &student(), QuizId::new(1), &SessionSettings::default())
                .await
                .unwrap();
        screen.answer(QuestionId::new(2), AnswerValue::Bool(false)).unwrap();

        assert!(screen.wait_expired().await);
        assert!(!screen.wait_expired().await);

        let attempt = screen.submit(&service).await.unwrap();
        assert!(attempt.is_submitted());
        assert_eq!(repo.submitted_answers(attempt.id()).unwrap().len(), 1);
        assert!(matches!(
            screen.answer(QuestionId::new(3), AnswerValue::Bool(true)),
            Err(SessionError::Submitted)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn unmount_flushes_unsaved_answers() {
        let (repo, service) = setup(Some(600)).await;
        let screen = QuizScreen::mount(&service, &student(), QuizId::new(1), &SessionSettings::default())
            .await
            .unwrap();
        let attempt_id = screen.handle().attempt().id();

        screen.answer(QuestionId::new(1), AnswerValue::Bool(true)).unwrap();
        screen.answer(QuestionId::new(2), AnswerValue::Bool(true)).unwrap();
        assert_eq!(screen.unmount().await, SaveOutcome::Saved);

        let draft = repo.load_draft_answers(attempt_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(draft.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn focus_warnings_reach_the_caller() {
        let (_repo, service) = setup(Some(600)).await;
        let mut screen =
            QuizScreen::mount(&service, &student(), QuizId::new(1), &SessionSettings::default())
                .await
                .unwrap();

        screen.report_focus(FocusSignal::Hidden);
        screen.report_focus(FocusSignal::Blur);
        assert_eq!(screen.next_focus_warning().await, Some(1));
        assert_eq!(screen.handle().focus_losses(), 1);
        assert!(screen.handle().timer().is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn events_arrive_in_order() {
        let (_repo, service) = setup(Some(30)).await;
        let mut screen =
            QuizScreen::mount(&service, &student(), QuizId::new(1), &SessionSettings::default())
                .await
                .unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        screen.report_focus(FocusSignal::Blur);
        assert_eq!(screen.next_event().await, Some(ScreenEvent::FocusWarning(1)));
        assert_eq!(screen.next_event().await, Some(ScreenEvent::Expired));
        assert_eq!(screen.handle().timer().remaining_secs(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn resumed_attempt_past_limit_reports_expiry() {
        let (repo, service) = setup(Some(60)).await;
        service.start(&student(), QuizId::new(1)).await.unwrap();

        let mut later = fixed_clock();
        later.advance(chrono::Duration::hours(2));
        let resumed = QuizSessionService::from_storage(later, &storage(&repo));
        let mut screen =
            QuizScreen::mount(&resumed, &student(), QuizId::new(1), &SessionSettings::default())
                .await
                .unwrap();

        assert_eq!(screen.handle().timer().remaining_secs(), 0);
        let expired = tokio::time::timeout(Duration::from_secs(1), screen.wait_expired()).await;
        assert!(matches!(expired, Ok(true)));
    }

    #[tokio::test(start_paused = true)]
    async fn untimed_quiz_never_expires() {
        let (_repo, service) = setup(None).await;
        let mut screen =
            QuizScreen::mount(&service, &student(), QuizId::new(1), &SessionSettings::default())
                .await
                .unwrap();

        let expired = tokio::time::timeout(Duration::from_secs(3_600), screen.wait_expired()).await;
        assert!(expired.is_err());
    }
}
