use chrono::{DateTime, Utc};
use quiz_core::model::{AnswerMap, Attempt, AttemptId, AttemptStatus, QuizId, UserId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{answers_to_json, attempt_id_from_i64, conn, id_to_i64, map_attempt_row, ser};
use crate::repository::{AttemptRepository, AttemptResolution, StorageError, resolve_latest};

const ATTEMPT_COLUMNS: &str = "id, quiz_id, user_id, status, started_at, submitted_at";

#[async_trait::async_trait]
impl AttemptRepository for SqliteRepository {
    async fn fetch_or_create_attempt(
        &self,
        quiz_id: QuizId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Attempt, StorageError> {
        let quiz = id_to_i64("quiz_id", quiz_id.value())?;
        let user = id_to_i64("user_id", user_id.value())?;
        // Take the write lock before reading so concurrent starts serialize.
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await.map_err(conn)?;

        let allow_reattempt = sqlx::query("SELECT allow_reattempt FROM quizzes WHERE id = ?1")
            .bind(quiz)
            .fetch_optional(&mut *tx)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?
            .try_get::<i64, _>("allow_reattempt")
            .map_err(ser)?
            != 0;

        let latest = sqlx::query(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts
             WHERE quiz_id = ?1 AND user_id = ?2
             ORDER BY started_at DESC, id DESC
             LIMIT 1"
        ))
        .bind(quiz)
        .bind(user)
        .fetch_optional(&mut *tx)
        .await
        .map_err(conn)?
        .as_ref()
        .map(map_attempt_row)
        .transpose()?;

        let attempt = match resolve_latest(latest, allow_reattempt) {
            AttemptResolution::Resume(attempt) => attempt,
            AttemptResolution::Blocked(attempt_id) => {
                return Err(StorageError::AlreadySubmitted { attempt_id });
            }
            AttemptResolution::Create => {
                let res = sqlx::query(
                    r"
                        INSERT INTO attempts (quiz_id, user_id, status, started_at)
                        VALUES (?1, ?2, ?3, ?4)
                    ",
                )
                .bind(quiz)
                .bind(user)
                .bind(AttemptStatus::InProgress.as_str())
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(conn)?;
                let id = attempt_id_from_i64(res.last_insert_rowid())?;
                Attempt::start(id, quiz_id, user_id, now)
            }
        };

        tx.commit().await.map_err(conn)?;
        Ok(attempt)
    }

    async fn submit_attempt(
        &self,
        attempt_id: AttemptId,
        answers: &AnswerMap,
        submitted_at: DateTime<Utc>,
    ) -> Result<Attempt, StorageError> {
        let id = id_to_i64("attempt_id", attempt_id.value())?;
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let row = sqlx::query(&format!("SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;
        let mut attempt = map_attempt_row(&row)?;
        attempt.submit(submitted_at)?;

        sqlx::query(
            r"
                UPDATE attempts
                SET status = ?2, submitted_at = ?3, answers = ?4
                WHERE id = ?1 AND status = 'in_progress'
            ",
        )
        .bind(id)
        .bind(attempt.status().as_str())
        .bind(submitted_at)
        .bind(answers_to_json(answers)?)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        sqlx::query("DELETE FROM attempt_drafts WHERE attempt_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        tx.commit().await.map_err(conn)?;
        Ok(attempt)
    }

    async fn get_attempt(&self, attempt_id: AttemptId) -> Result<Attempt, StorageError> {
        let row = sqlx::query(&format!("SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE id = ?1"))
            .bind(id_to_i64("attempt_id", attempt_id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;

        map_attempt_row(&row)
    }
}
