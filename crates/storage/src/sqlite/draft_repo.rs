use quiz_core::model::{AnswerMap, AttemptId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{answers_from_json, answers_to_json, conn, id_to_i64, ser};
use crate::repository::{DraftRepository, StorageError};

#[async_trait::async_trait]
impl DraftRepository for SqliteRepository {
    async fn save_draft_answers(
        &self,
        attempt_id: AttemptId,
        answers: &AnswerMap,
    ) -> Result<(), StorageError> {
        let id = id_to_i64("attempt_id", attempt_id.value())?;
        let status: String = sqlx::query("SELECT status FROM attempts WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?
            .try_get("status")
            .map_err(ser)?;
        if status != "in_progress" {
            return Err(StorageError::AlreadySubmitted { attempt_id });
        }

        sqlx::query(
            r"
                INSERT INTO attempt_drafts (attempt_id, answers)
                VALUES (?1, ?2)
                ON CONFLICT(attempt_id) DO UPDATE SET answers = excluded.answers
            ",
        )
        .bind(id)
        .bind(answers_to_json(answers)?)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn load_draft_answers(
        &self,
        attempt_id: AttemptId,
    ) -> Result<Option<AnswerMap>, StorageError> {
        let row = sqlx::query("SELECT answers FROM attempt_drafts WHERE attempt_id = ?1")
            .bind(id_to_i64("attempt_id", attempt_id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        row.map(|row| {
            let raw: String = row.try_get("answers").map_err(ser)?;
            answers_from_json(&raw)
        })
        .transpose()
    }
}
