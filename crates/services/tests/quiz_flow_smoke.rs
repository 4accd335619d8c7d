use std::time::Duration;

use quiz_core::model::{
    AnswerValue, CurrentUser, Question, QuestionId, QuestionKind, QuizDetail, QuizId, QuizStatus,
    SessionSettings, UserId,
};
use quiz_core::time::fixed_clock;
use services::{AppServices, FocusSignal, QuizScreen, SaveOutcome, SaveStatus, SessionError};
use storage::repository::QuizRepository;

fn quiz() -> QuizDetail {
    QuizDetail {
        id: QuizId::new(10),
        title: "Traits".into(),
        questions: vec![
            Question {
                id: QuestionId::new(1),
                prompt: "Pick the marker traits.".into(),
                kind: QuestionKind::MultipleChoice {
                    options: vec!["Send".into(), "Sync".into(), "Clone".into()],
                },
                points: 2,
            },
            Question {
                id: QuestionId::new(2),
                prompt: "Name the trait behind `?`.".into(),
                kind: QuestionKind::ShortAnswer,
                points: 1,
            },
        ],
        time_limit_secs: Some(120),
        status: QuizStatus::Published,
        allow_reattempt: false,
    }
}

async fn app() -> AppServices {
    let app = AppServices::in_memory(fixed_clock(), SessionSettings::default());
    app.storage().quizzes.upsert_quiz(&quiz()).await.unwrap();
    app
}

#[tokio::test(start_paused = true)]
async fn take_quiz_end_to_end() {
    let app = app().await;
    let service = app.sessions();
    let student = CurrentUser::student(UserId::new(5));

    let mut screen = QuizScreen::mount(&service, &student, QuizId::new(10), &app.settings())
        .await
        .unwrap();
    screen
        .answer(
            QuestionId::new(1),
            AnswerValue::Choices(vec!["Send".into(), "Sync".into()]),
        )
        .unwrap();
    screen
        .answer(QuestionId::new(2), AnswerValue::Text("From".into()))
        .unwrap();
    screen.report_focus(FocusSignal::Blur);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(matches!(
        screen.handle().save_status(),
        SaveStatus::Saved { .. }
    ));
    assert_eq!(screen.handle().focus_losses(), 1);

    let progress = screen.handle().progress();
    assert_eq!(progress.total, 2);
    assert_eq!(progress.answered, 2);
    assert!(!progress.dirty);

    let attempt = screen.submit(&service).await.unwrap();
    assert!(attempt.is_submitted());
    assert!(screen.handle().progress().is_submitted);
    assert_eq!(screen.unmount().await, SaveOutcome::Clean);

    let err = QuizScreen::mount(&service, &student, QuizId::new(10), &app.settings())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, SessionError::AlreadySubmitted { .. }));
}

#[tokio::test(start_paused = true)]
async fn leaving_and_returning_resumes_answers() {
    let app = app().await;
    let service = app.sessions();
    let student = CurrentUser::student(UserId::new(6));

    let screen = QuizScreen::mount(&service, &student, QuizId::new(10), &app.settings())
        .await
        .unwrap();
    screen
        .answer(QuestionId::new(2), AnswerValue::Text("Try".into()))
        .unwrap();
    assert_eq!(screen.unmount().await, SaveOutcome::Saved);

    let screen = QuizScreen::mount(&service, &student, QuizId::new(10), &app.settings())
        .await
        .unwrap();
    assert_eq!(
        screen.handle().answers().get(QuestionId::new(2)),
        Some(&AnswerValue::Text("Try".into()))
    );
    assert!(!screen.handle().is_dirty());
}

#[tokio::test]
async fn instructors_cannot_mount_the_quiz() {
    let app = app().await;
    let service = app.sessions();

    let err = QuizScreen::mount(
        &service,
        &CurrentUser::instructor(UserId::new(1)),
        QuizId::new(10),
        &app.settings(),
    )
    .await
    .err()
    .unwrap();
    assert!(matches!(err, SessionError::AccessDenied));
}
