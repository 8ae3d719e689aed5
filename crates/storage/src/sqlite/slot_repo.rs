use async_trait::async_trait;
use review_core::model::{LearnerId, ReviewSlot, SlotId, ensure_no_overlap};
use sqlx::{Sqlite, Transaction};

use super::{
    SqliteRepository,
    mapping::{conn, day_to_i64, id_i64, map_slot_row},
};
use crate::repository::{SlotRepository, StorageError};

#[async_trait]
impl SlotRepository for SqliteRepository {
    async fn slots_for_learner(
        &self,
        learner_id: LearnerId,
    ) -> Result<Vec<ReviewSlot>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, learner_id, day_of_week, start_time, end_time, capacity
                FROM review_slots
                WHERE learner_id = ?1
                ORDER BY day_of_week ASC, start_time ASC
            ",
        )
        .bind(id_i64("learner_id", learner_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_slot_row(&row)?);
        }
        Ok(out)
    }

    async fn get_slot(&self, id: SlotId) -> Result<ReviewSlot, StorageError> {
        let row = sqlx::query(
            r"
                SELECT id, learner_id, day_of_week, start_time, end_time, capacity
                FROM review_slots
                WHERE id = ?1
            ",
        )
        .bind(id_i64("slot_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;
        map_slot_row(&row)
    }

    async fn insert_slot(&self, slot: &ReviewSlot) -> Result<ReviewSlot, StorageError> {
        if slot.id.is_some() {
            return Err(StorageError::Conflict);
        }

        // Write first so the transaction holds the write lock during the overlap check.
        let mut tx = self.pool.begin().await.map_err(conn)?;
        let res = sqlx::query(
            r"
                INSERT INTO review_slots (learner_id, day_of_week, start_time, end_time, capacity)
                VALUES (?1, ?2, ?3, ?4, ?5)
            ",
        )
        .bind(id_i64("learner_id", slot.learner_id.value())?)
        .bind(day_to_i64(slot))
        .bind(slot.start_time)
        .bind(slot.end_time)
        .bind(slot.capacity.map(i64::from))
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        let id = u64::try_from(res.last_insert_rowid())
            .map_err(|_| StorageError::Serialization("slot id sign overflow".into()))?;
        let stored = slot.clone().with_id(SlotId::new(id));
        ensure_free(&mut tx, &stored).await?;
        tx.commit().await.map_err(conn)?;
        Ok(stored)
    }

    async fn update_slot(&self, slot: &ReviewSlot) -> Result<(), StorageError> {
        let id = slot.id.ok_or(StorageError::NotFound)?;
        let mut tx = self.pool.begin().await.map_err(conn)?;
        let res = sqlx::query(
            r"
                UPDATE review_slots SET
                    learner_id = ?2,
                    day_of_week = ?3,
                    start_time = ?4,
                    end_time = ?5,
                    capacity = ?6
                WHERE id = ?1
            ",
        )
        .bind(id_i64("slot_id", id.value())?)
        .bind(id_i64("learner_id", slot.learner_id.value())?)
        .bind(day_to_i64(slot))
        .bind(slot.start_time)
        .bind(slot.end_time)
        .bind(slot.capacity.map(i64::from))
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        ensure_free(&mut tx, slot).await?;
        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn delete_slot(&self, id: SlotId) -> Result<(), StorageError> {
        let res = sqlx::query("DELETE FROM review_slots WHERE id = ?1")
            .bind(id_i64("slot_id", id.value())?)
            .execute(&self.pool)
            .await
            .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}

/// Reject the uncommitted write if `slot` now overlaps a sibling slot.
/// Dropping the transaction on error rolls the write back.
async fn ensure_free(
    tx: &mut Transaction<'_, Sqlite>,
    slot: &ReviewSlot,
) -> Result<(), StorageError> {
    let rows = sqlx::query(
        r"
            SELECT id, learner_id, day_of_week, start_time, end_time, capacity
            FROM review_slots
            WHERE learner_id = ?1 AND day_of_week = ?2
        ",
    )
    .bind(id_i64("learner_id", slot.learner_id.value())?)
    .bind(day_to_i64(slot))
    .fetch_all(&mut **tx)
    .await
    .map_err(conn)?;

    let mut siblings = Vec::with_capacity(rows.len());
    for row in rows {
        siblings.push(map_slot_row(&row)?);
    }
    ensure_no_overlap(&siblings, slot).map_err(|existing| {
        tracing::warn!(
            learner_id = %slot.learner_id,
            error = %existing,
            "rejected overlapping slot write"
        );
        StorageError::Conflict
    })
}
