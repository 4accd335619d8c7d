use std::fmt;

use quiz_core::model::{Question, QuestionId, QuestionKind, QuizDetail, QuizId, QuizStatus};
use storage::repository::Storage;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    quiz_id: QuizId,
    title: String,
    time_limit_secs: Option<u32>,
    allow_reattempt: bool,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidQuizId { raw: String },
    InvalidTimeLimit { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidQuizId { raw } => write!(f, "invalid --quiz-id value: {raw}"),
            ArgsError::InvalidTimeLimit { raw } => write!(f, "invalid --time-limit value: {raw}"),
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

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("QUIZ_DB_URL").unwrap_or_else(|_| "sqlite:dev.sqlite3?mode=rwc".into());
        let mut quiz_id = std::env::var("QUIZ_ID")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map_or_else(|| QuizId::new(1), QuizId::new);
        let mut title = "Rust ownership basics".to_string();
        let mut time_limit_secs = Some(600);
        let mut allow_reattempt = false;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--quiz-id" => {
                    let value = require_value(&mut args, "--quiz-id")?;
                    quiz_id = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidQuizId { raw: value.clone() })?;
                }
                "--title" => {
                    title = require_value(&mut args, "--title")?;
                }
                "--time-limit" => {
                    let value = require_value(&mut args, "--time-limit")?;
                    time_limit_secs = if value == "none" {
                        None
                    } else {
                        Some(
                            value
                                .parse::<u32>()
                                .map_err(|_| ArgsError::InvalidTimeLimit { raw: value.clone() })?,
                        )
                    };
                }
                "--allow-reattempt" => allow_reattempt = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            quiz_id,
            title,
            time_limit_secs,
            allow_reattempt,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:dev.sqlite3?mode=rwc)");
    eprintln!("  --quiz-id <id>            Quiz id to upsert (default: 1)");
    eprintln!("  --title <text>            Quiz title");
    eprintln!("  --time-limit <secs|none>  Time limit in seconds (default: 600)");
    eprintln!("  --allow-reattempt         Let students retake the quiz");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  QUIZ_DB_URL, QUIZ_ID");
}

fn sample_questions() -> Vec<Question> {
    vec![
        Question {
            id: QuestionId::new(1),
            prompt: "Which keyword moves a value into a closure?".into(),
            kind: QuestionKind::SingleChoice {
                options: vec!["move".into(), "ref".into(), "static".into()],
            },
            points: 1,
        },
        Question {
            id: QuestionId::new(2),
            prompt: "A value can have many mutable borrows at once.".into(),
            kind: QuestionKind::TrueFalse,
            points: 1,
        },
        Question {
            id: QuestionId::new(3),
            prompt: "Which types implement Copy?".into(),
            kind: QuestionKind::MultipleChoice {
                options: vec!["u32".into(), "String".into(), "bool".into()],
            },
            points: 2,
        },
        Question {
            id: QuestionId::new(4),
            prompt: "Name the trait that runs code when a value goes out of scope.".into(),
            kind: QuestionKind::ShortAnswer,
            points: 2,
        },
    ]
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;
    let quiz = QuizDetail {
        id: args.quiz_id,
        title: args.title.clone(),
        questions: sample_questions(),
        time_limit_secs: args.time_limit_secs,
        status: QuizStatus::Published,
        allow_reattempt: args.allow_reattempt,
    };
    storage.quizzes.upsert_quiz(&quiz).await?;

    println!(
        "Seeded quiz {} ({} questions) into {}",
        quiz.id,
        quiz.question_count(),
        args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
