use async_trait::async_trait;
use chrono::{DateTime, Utc};
use review_core::model::{AttemptRecord, FlashcardId, LearnerId};

use super::{
    SqliteRepository,
    mapping::{conn, id_i64, map_attempt_row},
};
use crate::repository::{AttemptRepository, StorageError};

#[async_trait]
impl AttemptRepository for SqliteRepository {
    async fn find_attempt(
        &self,
        learner_id: LearnerId,
        flashcard_id: FlashcardId,
        presented_at: DateTime<Utc>,
    ) -> Result<Option<AttemptRecord>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT
                    id, learner_id, flashcard_id, rating, rated_at, presented_at,
                    interval_before, interval_after
                FROM review_attempts
                WHERE learner_id = ?1 AND flashcard_id = ?2 AND presented_at = ?3
            ",
        )
        .bind(id_i64("learner_id", learner_id.value())?)
        .bind(id_i64("flashcard_id", flashcard_id.value())?)
        .bind(presented_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_attempt_row).transpose()
    }

    async fn attempts_since(
        &self,
        learner_id: LearnerId,
        since: DateTime<Utc>,
    ) -> Result<Vec<AttemptRecord>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT
                    id, learner_id, flashcard_id, rating, rated_at, presented_at,
                    interval_before, interval_after
                FROM review_attempts
                WHERE learner_id = ?1 AND rated_at >= ?2
                ORDER BY rated_at ASC, id ASC
            ",
        )
        .bind(id_i64("learner_id", learner_id.value())?)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_attempt_row(&row)?);
        }
        Ok(out)
    }
}
