use std::sync::Arc;

use review_core::model::{LearnerId, ReviewSlot, ReviewSlotDraft, SlotId, ensure_no_overlap};
use storage::repository::SlotRepository;

use crate::error::SlotServiceError;

/// Validates and persists a learner's weekly review slots.
#[derive(Clone)]
pub struct SlotService {
    slots: Arc<dyn SlotRepository>,
}

impl SlotService {
    #[must_use]
    pub fn new(slots: Arc<dyn SlotRepository>) -> Self {
        Self { slots }
    }

    /// Slots of a learner ordered by day, then start time.
    ///
    /// # Errors
    ///
    /// Returns `SlotServiceError::Storage` if repository access fails.
    pub async fn list(&self, learner_id: LearnerId) -> Result<Vec<ReviewSlot>, SlotServiceError> {
        Ok(self.slots.slots_for_learner(learner_id).await?)
    }

    /// Validate and store a new slot.
    ///
    /// # Errors
    ///
    /// Returns `SlotServiceError::Slot` if the draft is invalid or overlaps
    /// another slot of the same learner on the same day.
    /// Returns `SlotServiceError::Storage` with `Conflict` if a concurrent
    /// write claimed the same hours first, and for other persistence failures.
    pub async fn create(
        &self,
        learner_id: LearnerId,
        draft: ReviewSlotDraft,
    ) -> Result<ReviewSlot, SlotServiceError> {
        let slot = draft.validate(learner_id)?;
        let existing = self.slots.slots_for_learner(learner_id).await?;
        ensure_no_overlap(&existing, &slot)?;

        let stored = self.slots.insert_slot(&slot).await?;
        tracing::info!(
            learner_id = %learner_id,
            slot_id = ?stored.id,
            day = %stored.day_of_week,
            start = %stored.start_time,
            end = %stored.end_time,
            "created review slot"
        );
        Ok(stored)
    }

    /// Replace an existing slot's schedule. The owning learner is kept.
    ///
    /// # Errors
    ///
    /// Returns `SlotServiceError::Storage` with `NotFound` if the slot does
    /// not exist, and `SlotServiceError::Slot` for invalid or overlapping drafts.
    pub async fn update(
        &self,
        id: SlotId,
        draft: ReviewSlotDraft,
    ) -> Result<ReviewSlot, SlotServiceError> {
        let current = self.slots.get_slot(id).await?;
        let slot = draft.validate(current.learner_id)?.with_id(id);
        let existing = self.slots.slots_for_learner(current.learner_id).await?;
        ensure_no_overlap(&existing, &slot)?;

        self.slots.update_slot(&slot).await?;
        tracing::info!(learner_id = %slot.learner_id, slot_id = %id, "updated review slot");
        Ok(slot)
    }

    /// # Errors
    ///
    /// Returns `SlotServiceError::Storage` if the slot does not exist or
    /// repository access fails.
    pub async fn delete(&self, id: SlotId) -> Result<(), SlotServiceError> {
        self.slots.delete_slot(id).await?;
        tracing::info!(slot_id = %id, "deleted review slot");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use review_core::model::SlotError;
    use storage::repository::{InMemoryRepository, StorageError};

    fn draft(day: u8, start: (u32, u32), end: (u32, u32)) -> ReviewSlotDraft {
        ReviewSlotDraft {
            day_of_week: day,
            start_time: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
            capacity: Some(5),
        }
    }

    fn service() -> SlotService {
        SlotService::new(Arc::new(InMemoryRepository::new()))
    }

    #[tokio::test]
    async fn create_rejects_overlap_on_same_day() {
        let svc = service();
        let learner = LearnerId::new(1);
        let first = svc.create(learner, draft(1, (8, 0), (8, 20))).await.unwrap();

        let err = svc
            .create(learner, draft(1, (8, 10), (8, 40)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SlotServiceError::Slot(SlotError::Overlap { existing }) if Some(existing) == first.id
        ));

        // Back-to-back and other days are fine.
        svc.create(learner, draft(1, (8, 20), (8, 40))).await.unwrap();
        svc.create(learner, draft(2, (8, 0), (8, 20))).await.unwrap();
        assert_eq!(svc.list(learner).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn create_rejects_invalid_drafts() {
        let svc = service();
        let err = svc
            .create(LearnerId::new(1), draft(7, (8, 0), (9, 0)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SlotServiceError::Slot(SlotError::InvalidDayOfWeek(7))
        ));

        let err = svc
            .create(LearnerId::new(1), draft(1, (9, 0), (8, 0)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SlotServiceError::Slot(SlotError::InvalidTimeRange { .. })
        ));
    }

    #[tokio::test]
    async fn update_moves_slot_and_checks_neighbours() {
        let svc = service();
        let learner = LearnerId::new(1);
        let morning = svc.create(learner, draft(1, (8, 0), (8, 20))).await.unwrap();
        svc.create(learner, draft(1, (9, 0), (9, 30))).await.unwrap();
        let id = morning.id.unwrap();

        let moved = svc.update(id, draft(1, (8, 10), (8, 50))).await.unwrap();
        assert_eq!(moved.start_time, NaiveTime::from_hms_opt(8, 10, 0).unwrap());

        let err = svc.update(id, draft(1, (8, 30), (9, 10))).await.unwrap_err();
        assert!(matches!(err, SlotServiceError::Slot(SlotError::Overlap { .. })));
    }

    #[tokio::test]
    async fn update_and_delete_missing_slot_report_not_found() {
        let svc = service();
        let err = svc
            .update(SlotId::new(99), draft(1, (8, 0), (9, 0)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SlotServiceError::Storage(StorageError::NotFound)
        ));
        assert!(matches!(
            svc.delete(SlotId::new(99)).await,
            Err(SlotServiceError::Storage(StorageError::NotFound))
        ));
    }
}
