use async_trait::async_trait;
use review_core::model::{Attempt, FlashcardId, LearnerId, ReviewState};

use super::{
    SqliteRepository,
    mapping::{conn, id_i64, map_state_row, rating_to_i64},
};
use crate::repository::{AppliedRecord, ReviewPersistence, ReviewStateRepository, StorageError};

const STATE_COLUMNS: &str = r"
    learner_id, flashcard_id, interval_days, ease_factor, repetitions, lapses,
    status, last_reviewed_at, due_at, created_at, version
";

#[async_trait]
impl ReviewStateRepository for SqliteRepository {
    async fn get_state(
        &self,
        learner_id: LearnerId,
        flashcard_id: FlashcardId,
    ) -> Result<ReviewState, StorageError> {
        let sql = format!(
            "SELECT {STATE_COLUMNS} FROM review_states WHERE learner_id = ?1 AND flashcard_id = ?2"
        );
        let row = sqlx::query(&sql)
            .bind(id_i64("learner_id", learner_id.value())?)
            .bind(id_i64("flashcard_id", flashcard_id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;
        map_state_row(&row)
    }

    async fn states_for_learner(
        &self,
        learner_id: LearnerId,
    ) -> Result<Vec<ReviewState>, StorageError> {
        let sql = format!(
            "SELECT {STATE_COLUMNS} FROM review_states WHERE learner_id = ?1 ORDER BY flashcard_id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(id_i64("learner_id", learner_id.value())?)
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_state_row(&row)?);
        }
        Ok(out)
    }

    async fn insert_state_if_absent(
        &self,
        state: &ReviewState,
    ) -> Result<ReviewState, StorageError> {
        let learner = id_i64("learner_id", state.learner_id.value())?;
        let card = id_i64("flashcard_id", state.flashcard_id.value())?;

        let mut tx = self.pool.begin().await.map_err(conn)?;
        let inserted = sqlx::query(
            r"
            INSERT INTO review_states (
                learner_id, flashcard_id, interval_days, ease_factor, repetitions, lapses,
                status, last_reviewed_at, due_at, created_at, version
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(learner_id, flashcard_id) DO NOTHING
            ",
        )
        .bind(learner)
        .bind(card)
        .bind(state.interval_days)
        .bind(state.ease_factor)
        .bind(i64::from(state.repetitions))
        .bind(i64::from(state.lapses))
        .bind(state.status.as_str())
        .bind(state.last_reviewed_at)
        .bind(state.due_at)
        .bind(state.created_at)
        .bind(id_i64("version", state.version)?)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        let sql = format!(
            "SELECT {STATE_COLUMNS} FROM review_states WHERE learner_id = ?1 AND flashcard_id = ?2"
        );
        let row = sqlx::query(&sql)
            .bind(learner)
            .bind(card)
            .fetch_one(&mut *tx)
            .await
            .map_err(conn)?;
        tx.commit().await.map_err(conn)?;

        if inserted.rows_affected() > 0 {
            tracing::debug!(
                learner_id = %state.learner_id,
                flashcard_id = %state.flashcard_id,
                "bootstrapped review state"
            );
        }
        map_state_row(&row)
    }

    async fn delete_states_for_card(&self, flashcard_id: FlashcardId) -> Result<u64, StorageError> {
        let res = sqlx::query("DELETE FROM review_states WHERE flashcard_id = ?1")
            .bind(id_i64("flashcard_id", flashcard_id.value())?)
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(res.rows_affected())
    }
}

#[async_trait]
impl ReviewPersistence for SqliteRepository {
    async fn apply_review(
        &self,
        expected_version: u64,
        state: &ReviewState,
        attempt: Attempt,
    ) -> Result<AppliedRecord, StorageError> {
        if attempt.learner_id != state.learner_id || attempt.flashcard_id != state.flashcard_id {
            return Err(StorageError::Conflict);
        }

        let learner = id_i64("learner_id", state.learner_id.value())?;
        let card = id_i64("flashcard_id", state.flashcard_id.value())?;
        let expected = id_i64("version", expected_version)?;
        let version = expected_version
            .checked_add(1)
            .ok_or_else(|| StorageError::Serialization("version overflow".into()))?;
        let next = id_i64("version", version)?;

        let mut tx = self.pool.begin().await.map_err(conn)?;

        // Writing first takes the write lock before anything is read.
        let updated = sqlx::query(
            r"
            UPDATE review_states SET
                interval_days = ?3,
                ease_factor = ?4,
                repetitions = ?5,
                lapses = ?6,
                status = ?7,
                last_reviewed_at = ?8,
                due_at = ?9,
                version = ?10
            WHERE learner_id = ?1 AND flashcard_id = ?2 AND version = ?11
            ",
        )
        .bind(learner)
        .bind(card)
        .bind(state.interval_days)
        .bind(state.ease_factor)
        .bind(i64::from(state.repetitions))
        .bind(i64::from(state.lapses))
        .bind(state.status.as_str())
        .bind(state.last_reviewed_at)
        .bind(state.due_at)
        .bind(next)
        .bind(expected)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        if updated.rows_affected() == 0 {
            let duplicate = sqlx::query(
                r"
                SELECT 1 FROM review_attempts
                WHERE learner_id = ?1 AND flashcard_id = ?2 AND presented_at = ?3
                ",
            )
            .bind(learner)
            .bind(card)
            .bind(attempt.presented_at)
            .fetch_optional(&mut *tx)
            .await
            .map_err(conn)?;
            if duplicate.is_some() {
                tracing::warn!(
                    learner_id = %state.learner_id,
                    flashcard_id = %state.flashcard_id,
                    presented_at = %attempt.presented_at,
                    "duplicate attempt rejected"
                );
                return Err(StorageError::DuplicateAttempt);
            }

            let exists = sqlx::query(
                "SELECT 1 FROM review_states WHERE learner_id = ?1 AND flashcard_id = ?2",
            )
            .bind(learner)
            .bind(card)
            .fetch_optional(&mut *tx)
            .await
            .map_err(conn)?
            .is_some();

            if exists || expected_version != 0 {
                tracing::warn!(
                    learner_id = %state.learner_id,
                    flashcard_id = %state.flashcard_id,
                    expected_version,
                    "stale review state rejected"
                );
                return Err(StorageError::Stale);
            }

            sqlx::query(
                r"
                INSERT INTO review_states (
                    learner_id, flashcard_id, interval_days, ease_factor, repetitions, lapses,
                    status, last_reviewed_at, due_at, created_at, version
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                ",
            )
            .bind(learner)
            .bind(card)
            .bind(state.interval_days)
            .bind(state.ease_factor)
            .bind(i64::from(state.repetitions))
            .bind(i64::from(state.lapses))
            .bind(state.status.as_str())
            .bind(state.last_reviewed_at)
            .bind(state.due_at)
            .bind(state.created_at)
            .bind(next)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        let inserted = sqlx::query(
            r"
            INSERT INTO review_attempts (
                learner_id, flashcard_id, rating, rated_at, presented_at,
                interval_before, interval_after
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
        )
        .bind(learner)
        .bind(card)
        .bind(rating_to_i64(attempt.rating))
        .bind(attempt.rated_at)
        .bind(attempt.presented_at)
        .bind(attempt.interval_before)
        .bind(attempt.interval_after)
        .execute(&mut *tx)
        .await;

        let res = match inserted {
            Ok(res) => res,
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                tracing::warn!(
                    learner_id = %state.learner_id,
                    flashcard_id = %state.flashcard_id,
                    presented_at = %attempt.presented_at,
                    "duplicate attempt rejected"
                );
                return Err(StorageError::DuplicateAttempt);
            }
            Err(e) => return Err(conn(e)),
        };

        tx.commit().await.map_err(conn)?;

        let attempt_id = u64::try_from(res.last_insert_rowid())
            .map_err(|_| StorageError::Serialization("attempt id sign overflow".into()))?;
        tracing::debug!(
            learner_id = %state.learner_id,
            flashcard_id = %state.flashcard_id,
            attempt_id,
            version,
            "review applied"
        );
        Ok(AppliedRecord {
            attempt_id,
            version,
        })
    }
}
