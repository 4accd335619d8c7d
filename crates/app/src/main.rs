use std::fmt;
use std::time::Duration;

use quiz_core::model::{
    AnswerValue, CurrentUser, DEFAULT_DEBOUNCE, DEFAULT_RETRY_DELAY, DEFAULT_TICK, Question,
    QuestionId, QuestionKind, QuizId, SessionSettings, UserId,
};
use services::{AppServices, Clock, QuizScreen, RemoteDraftConfig, ScreenEvent, SessionError};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidNumber { flag: &'static str, raw: String },
    InvalidRole { raw: String },
    InvalidAnswer { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidRole { raw } => {
                write!(f, "invalid --role value: {raw} (expected student or instructor)")
            }
            ArgsError::InvalidAnswer { raw } => {
                write!(f, "invalid --answer value: {raw} (expected <question-id>=<value>)")
            }
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_number<T: std::str::FromStr>(flag: &'static str, raw: &str) -> Result<T, ArgsError> {
    raw.trim().parse().map_err(|_| ArgsError::InvalidNumber {
        flag,
        raw: raw.to_string(),
    })
}

fn env_number<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    quiz_id: QuizId,
    user: CurrentUser,
    answers: Vec<(QuestionId, String)>,
    draft_url: Option<String>,
    debounce_ms: u64,
    retry_ms: u64,
    tick_ms: u64,
    no_focus: bool,
    linger_secs: u64,
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- take [--db <sqlite_url>] [--quiz-id <id>] [--user-id <id>]");
    eprintln!("                           [--role student|instructor] [--answer <qid>=<value>]...");
    eprintln!("                           [--linger <secs>] [--draft-url <url>] [--no-focus]");
    eprintln!("                           [--debounce-ms <ms>] [--retry-ms <ms>] [--tick-ms <ms>]");
    eprintln!();
    eprintln!("Answer values: option text, comma-separated options, true/false, or free text.");
    eprintln!("Seed a quiz first with: cargo run -p storage --bin seed");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  QUIZ_DB_URL, QUIZ_ID, QUIZ_USER_ID, QUIZ_DRAFT_URL, QUIZ_DRAFT_API_KEY,");
    eprintln!("  QUIZ_DEBOUNCE_MS, QUIZ_RETRY_MS, QUIZ_TICK_MS, RUST_LOG");
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut parsed = Self {
            db_url: std::env::var("QUIZ_DB_URL")
                .unwrap_or_else(|_| "sqlite:dev.sqlite3?mode=rwc".into()),
            quiz_id: QuizId::new(env_number("QUIZ_ID").unwrap_or(1)),
            user: CurrentUser::student(UserId::new(env_number("QUIZ_USER_ID").unwrap_or(1))),
            answers: Vec::new(),
            draft_url: None,
            debounce_ms: env_number("QUIZ_DEBOUNCE_MS").unwrap_or(millis(DEFAULT_DEBOUNCE)),
            retry_ms: env_number("QUIZ_RETRY_MS").unwrap_or(millis(DEFAULT_RETRY_DELAY)),
            tick_ms: env_number("QUIZ_TICK_MS").unwrap_or(millis(DEFAULT_TICK)),
            no_focus: false,
            linger_secs: 0,
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = value;
                }
                "--quiz-id" => {
                    let value = require_value(args, "--quiz-id")?;
                    parsed.quiz_id = QuizId::new(parse_number("--quiz-id", &value)?);
                }
                "--user-id" => {
                    let value = require_value(args, "--user-id")?;
                    parsed.user.id = UserId::new(parse_number("--user-id", &value)?);
                }
                "--role" => {
                    let value = require_value(args, "--role")?;
                    parsed.user = match value.as_str() {
                        "student" => CurrentUser::student(parsed.user.id),
                        "instructor" => CurrentUser::instructor(parsed.user.id),
                        _ => return Err(ArgsError::InvalidRole { raw: value }),
                    };
                }
                "--answer" => {
                    let value = require_value(args, "--answer")?;
                    parsed.answers.push(split_answer(&value)?);
                }
                "--draft-url" => {
                    parsed.draft_url = Some(require_value(args, "--draft-url")?);
                }
                "--debounce-ms" => {
                    let value = require_value(args, "--debounce-ms")?;
                    parsed.debounce_ms = parse_number("--debounce-ms", &value)?;
                }
                "--retry-ms" => {
                    let value = require_value(args, "--retry-ms")?;
                    parsed.retry_ms = parse_number("--retry-ms", &value)?;
                }
                "--tick-ms" => {
                    let value = require_value(args, "--tick-ms")?;
                    parsed.tick_ms = parse_number("--tick-ms", &value)?;
                }
                "--linger" => {
                    let value = require_value(args, "--linger")?;
                    parsed.linger_secs = parse_number("--linger", &value)?;
                }
                "--no-focus" => parsed.no_focus = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(parsed)
    }

    /// `--draft-url` wins over `QUIZ_DRAFT_URL`; the API key always comes from the environment.
    fn remote_drafts(&self) -> Option<RemoteDraftConfig> {
        let Some(base_url) = self.draft_url.clone() else {
            return RemoteDraftConfig::from_env();
        };
        if base_url.trim().is_empty() {
            return None;
        }
        Some(RemoteDraftConfig {
            base_url,
            api_key: std::env::var("QUIZ_DRAFT_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
        })
    }

    fn settings(&self) -> Result<SessionSettings, quiz_core::Error> {
        Ok(SessionSettings::new(
            Duration::from_millis(self.debounce_ms),
            Duration::from_millis(self.retry_ms),
            Duration::from_millis(self.tick_ms),
            !self.no_focus,
        )?)
    }
}

fn split_answer(raw: &str) -> Result<(QuestionId, String), ArgsError> {
    let invalid = || ArgsError::InvalidAnswer {
        raw: raw.to_string(),
    };
    let (id, value) = raw.split_once('=').ok_or_else(invalid)?;
    let id: QuestionId = id.parse().map_err(|_| invalid())?;
    Ok((id, value.to_string()))
}

/// Interpret raw command-line text according to the question kind.
fn answer_value(question: &Question, raw: &str) -> Result<AnswerValue, ArgsError> {
    let value = match &question.kind {
        QuestionKind::SingleChoice { .. } => AnswerValue::Choice(raw.trim().to_string()),
        QuestionKind::MultipleChoice { .. } => AnswerValue::Choices(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        QuestionKind::TrueFalse => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" => AnswerValue::Bool(true),
            "false" | "f" | "no" | "n" => AnswerValue::Bool(false),
            _ => {
                return Err(ArgsError::InvalidAnswer {
                    raw: format!("{}={raw}", question.id),
                });
            }
        },
        QuestionKind::ShortAnswer => AnswerValue::Text(raw.to_string()),
    };
    Ok(value)
}

async fn take(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let settings = args.settings()?;
    let app =
        AppServices::new_sqlite(&args.db_url, Clock::system(), settings, args.remote_drafts())
            .await?;
    let service = app.sessions();

    let mut screen = match QuizScreen::mount(&service, &args.user, args.quiz_id, &settings).await {
        Ok(screen) => screen,
        Err(err @ SessionError::AlreadySubmitted { .. }) => {
            println!("{err}; nothing left to answer.");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    let quiz = screen.session().quiz().clone();
    println!(
        "{} ({} questions, {})",
        quiz.title,
        quiz.question_count(),
        quiz.time_limit_secs
            .map_or_else(|| "untimed".to_string(), |secs| format!("{secs}s limit")),
    );

    for (question_id, raw) in &args.answers {
        let question = quiz
            .question(*question_id)
            .ok_or(SessionError::UnknownQuestion(*question_id))?;
        let value = answer_value(question, raw)?;
        screen.answer(*question_id, value)?;
        info!(%question_id, "answer recorded");
    }

    if args.linger_secs > 0 {
        let linger = tokio::time::sleep(Duration::from_secs(args.linger_secs));
        tokio::pin!(linger);
        loop {
            tokio::select! {
                () = &mut linger => break,
                event = screen.next_event() => match event {
                    Some(ScreenEvent::Expired) => {
                        warn!("time is up, submitting");
                        break;
                    }
                    Some(ScreenEvent::FocusWarning(count)) => {
                        println!("Focus lost ({count} so far). Stay on the quiz page.");
                    }
                    None => {
                        (&mut linger).await;
                        break;
                    }
                },
            }
        }
    }

    let attempt = screen.submit(&service).await?;
    let progress = screen.handle().progress();
    println!(
        "Submitted attempt {} with {}/{} answered, {}s left, {} focus losses.",
        attempt.id(),
        progress.answered,
        progress.total,
        progress.timer.remaining_secs(),
        progress.focus_losses,
    );
    screen.unmount().await;
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1).peekable();
    let first = argv.peek().cloned();
    match first.as_deref() {
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some("take") => {
            argv.next();
        }
        Some(first) if !first.starts_with("--") => {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            return Err(ArgsError::UnknownArg(first.to_string()).into());
        }
        _ => {}
    }

    let args = Args::parse(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;
    take(args).await
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
