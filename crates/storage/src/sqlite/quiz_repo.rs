use quiz_core::model::{Question, QuizDetail, QuizId, QuizStatus};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, id_to_i64, quiz_id_from_i64, ser};
use crate::repository::{QuizRepository, StorageError};

fn map_quiz_row(row: &sqlx::sqlite::SqliteRow) -> Result<QuizDetail, StorageError> {
    let id = quiz_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?;
    let questions: Vec<Question> =
        serde_json::from_str(&row.try_get::<String, _>("questions").map_err(ser)?).map_err(ser)?;
    let time_limit_secs = row
        .try_get::<Option<i64>, _>("time_limit_secs")
        .map_err(ser)?
        .map(|v| u32::try_from(v).map_err(|_| ser(format!("invalid time_limit_secs: {v}"))))
        .transpose()?;
    let status: QuizStatus = row
        .try_get::<String, _>("status")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;
    let allow_reattempt = row.try_get::<i64, _>("allow_reattempt").map_err(ser)? != 0;

    Ok(QuizDetail {
        id,
        title: row.try_get("title").map_err(ser)?,
        questions,
        time_limit_secs,
        status,
        allow_reattempt,
    })
}

#[async_trait::async_trait]
impl QuizRepository for SqliteRepository {
    async fn get_quiz(&self, id: QuizId) -> Result<QuizDetail, StorageError> {
        let row = sqlx::query(
            r"
                SELECT id, title, questions, time_limit_secs, status, allow_reattempt
                FROM quizzes
                WHERE id = ?1
            ",
        )
        .bind(id_to_i64("quiz_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;

        map_quiz_row(&row)
    }

    async fn upsert_quiz(&self, quiz: &QuizDetail) -> Result<(), StorageError> {
        let questions = serde_json::to_string(&quiz.questions).map_err(ser)?;

        sqlx::query(
            r"
                INSERT INTO quizzes (id, title, questions, time_limit_secs, status, allow_reattempt)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    questions = excluded.questions,
                    time_limit_secs = excluded.time_limit_secs,
                    status = excluded.status,
                    allow_reattempt = excluded.allow_reattempt
            ",
        )
        .bind(id_to_i64("quiz_id", quiz.id.value())?)
        .bind(&quiz.title)
        .bind(questions)
        .bind(quiz.time_limit_secs.map(i64::from))
        .bind(quiz.status.as_str())
        .bind(i64::from(quiz.allow_reattempt))
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }
}
