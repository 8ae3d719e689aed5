use async_trait::async_trait;
use chrono::{DateTime, Utc};
use review_core::model::{
    Attempt, AttemptRecord, FlashcardId, LearnerId, ReviewSlot, ReviewState, SlotId,
    ensure_no_overlap,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("stale review state: stored version no longer matches")]
    Stale,

    #[error("attempt already recorded for this presentation")]
    DuplicateAttempt,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Outcome of a committed review write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedRecord {
    pub attempt_id: u64,
    /// Version now stored for the review state.
    pub version: u64,
}

/// Per-(learner, flashcard) review state rows.
#[async_trait]
pub trait ReviewStateRepository: Send + Sync {
    /// Fetch one state.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the pair has no state yet.
    async fn get_state(
        &self,
        learner_id: LearnerId,
        flashcard_id: FlashcardId,
    ) -> Result<ReviewState, StorageError>;

    /// All states of a learner, ordered by flashcard id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn states_for_learner(&self, learner_id: LearnerId)
    -> Result<Vec<ReviewState>, StorageError>;

    /// Store `state` unless the pair already has one, and return whatever is
    /// stored afterwards. Existing rows are never overwritten.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn insert_state_if_absent(&self, state: &ReviewState)
    -> Result<ReviewState, StorageError>;

    /// Remove every learner's state for a deleted flashcard. Attempts are kept.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn delete_states_for_card(&self, flashcard_id: FlashcardId) -> Result<u64, StorageError>;
}

/// Read side of the append-only attempt log.
#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// Look up an attempt by its idempotency key.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn find_attempt(
        &self,
        learner_id: LearnerId,
        flashcard_id: FlashcardId,
        presented_at: DateTime<Utc>,
    ) -> Result<Option<AttemptRecord>, StorageError>;

    /// Attempts of a learner rated at or after `since`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn attempts_since(
        &self,
        learner_id: LearnerId,
        since: DateTime<Utc>,
    ) -> Result<Vec<AttemptRecord>, StorageError>;
}

/// Atomic write path for one rating submission.
#[async_trait]
pub trait ReviewPersistence: Send + Sync {
    /// Persist the scheduled `state` and append `attempt` in one unit.
    ///
    /// The state is written only if the stored version equals
    /// `expected_version`; the stored version is then bumped by one. A
    /// missing row is accepted when `expected_version` is 0.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::DuplicateAttempt` if the attempt's idempotency
    /// key is already recorded, `StorageError::Stale` on a version mismatch,
    /// and `StorageError::Conflict` if the attempt does not belong to `state`.
    async fn apply_review(
        &self,
        expected_version: u64,
        state: &ReviewState,
        attempt: Attempt,
    ) -> Result<AppliedRecord, StorageError>;
}

/// Recurring weekly review slots.
#[async_trait]
pub trait SlotRepository: Send + Sync {
    /// Slots of a learner ordered by day of week, then start time.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn slots_for_learner(&self, learner_id: LearnerId)
    -> Result<Vec<ReviewSlot>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the slot does not exist.
    async fn get_slot(&self, id: SlotId) -> Result<ReviewSlot, StorageError>;

    /// Insert a new slot and return it with its assigned id.
    ///
    /// The no-overlap rule is checked again inside the write, so two
    /// concurrent creates cannot both succeed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the slot already carries an id or
    /// overlaps another slot of the same learner.
    async fn insert_slot(&self, slot: &ReviewSlot) -> Result<ReviewSlot, StorageError>;

    /// Replace an existing slot.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the slot has no id or is missing,
    /// and `StorageError::Conflict` if it would overlap another slot.
    async fn update_slot(&self, slot: &ReviewSlot) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the slot does not exist.
    async fn delete_slot(&self, id: SlotId) -> Result<(), StorageError>;
}

//
// ─── IN-MEMORY BACKEND ─────────────────────────────────────────────────────────
//

#[derive(Default)]
struct ReviewTables {
    states: HashMap<(LearnerId, FlashcardId), ReviewState>,
    attempts: Vec<AttemptRecord>,
}

impl ReviewTables {
    fn has_attempt(&self, learner: LearnerId, card: FlashcardId, presented_at: DateTime<Utc>) -> bool {
        self.attempts.iter().any(|r| {
            r.attempt.learner_id == learner
                && r.attempt.flashcard_id == card
                && r.attempt.presented_at == presented_at
        })
    }
}

#[derive(Default)]
struct SlotTable {
    last_id: u64,
    rows: BTreeMap<SlotId, ReviewSlot>,
}

impl SlotTable {
    fn ensure_free(&self, candidate: &ReviewSlot) -> Result<(), StorageError> {
        let same_learner: Vec<ReviewSlot> = self
            .rows
            .values()
            .filter(|s| s.learner_id == candidate.learner_id)
            .cloned()
            .collect();
        ensure_no_overlap(&same_learner, candidate).map_err(|_| StorageError::Conflict)
    }
}

fn slot_order(slot: &ReviewSlot) -> (u32, chrono::NaiveTime) {
    (slot.day_of_week.num_days_from_sunday(), slot.start_time)
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    reviews: Arc<Mutex<ReviewTables>>,
    slots: Arc<Mutex<SlotTable>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn reviews(&self) -> Result<std::sync::MutexGuard<'_, ReviewTables>, StorageError> {
        self.reviews
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    fn slots(&self) -> Result<std::sync::MutexGuard<'_, SlotTable>, StorageError> {
        self.slots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl ReviewStateRepository for InMemoryRepository {
    async fn get_state(
        &self,
        learner_id: LearnerId,
        flashcard_id: FlashcardId,
    ) -> Result<ReviewState, StorageError> {
        let guard = self.reviews()?;
        guard
            .states
            .get(&(learner_id, flashcard_id))
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn states_for_learner(
        &self,
        learner_id: LearnerId,
    ) -> Result<Vec<ReviewState>, StorageError> {
        let guard = self.reviews()?;
        let mut states: Vec<ReviewState> = guard
            .states
            .values()
            .filter(|s| s.learner_id == learner_id)
            .cloned()
            .collect();
        states.sort_by_key(|s| s.flashcard_id);
        Ok(states)
    }

    async fn insert_state_if_absent(
        &self,
        state: &ReviewState,
    ) -> Result<ReviewState, StorageError> {
        let mut guard = self.reviews()?;
        let stored = guard
            .states
            .entry((state.learner_id, state.flashcard_id))
            .or_insert_with(|| state.clone());
        Ok(stored.clone())
    }

    async fn delete_states_for_card(&self, flashcard_id: FlashcardId) -> Result<u64, StorageError> {
        let mut guard = self.reviews()?;
        let before = guard.states.len();
        guard.states.retain(|(_, card), _| *card != flashcard_id);
        Ok(u64::try_from(before - guard.states.len()).unwrap_or(u64::MAX))
    }
}

#[async_trait]
impl AttemptRepository for InMemoryRepository {
    async fn find_attempt(
        &self,
        learner_id: LearnerId,
        flashcard_id: FlashcardId,
        presented_at: DateTime<Utc>,
    ) -> Result<Option<AttemptRecord>, StorageError> {
        let guard = self.reviews()?;
        Ok(guard
            .attempts
            .iter()
            .find(|r| {
                r.attempt.learner_id == learner_id
                    && r.attempt.flashcard_id == flashcard_id
                    && r.attempt.presented_at == presented_at
            })
            .cloned())
    }

    async fn attempts_since(
        &self,
        learner_id: LearnerId,
        since: DateTime<Utc>,
    ) -> Result<Vec<AttemptRecord>, StorageError> {
        let guard = self.reviews()?;
        let mut out: Vec<AttemptRecord> = guard
            .attempts
            .iter()
            .filter(|r| r.attempt.learner_id == learner_id && r.attempt.rated_at >= since)
            .cloned()
            .collect();
        out.sort_by_key(|r| (r.attempt.rated_at, r.id));
        Ok(out)
    }
}

#[async_trait]
impl ReviewPersistence for InMemoryRepository {
    async fn apply_review(
        &self,
        expected_version: u64,
        state: &ReviewState,
        attempt: Attempt,
    ) -> Result<AppliedRecord, StorageError> {
        if attempt.learner_id != state.learner_id || attempt.flashcard_id != state.flashcard_id {
            return Err(StorageError::Conflict);
        }

        let mut guard = self.reviews()?;
        if guard.has_attempt(attempt.learner_id, attempt.flashcard_id, attempt.presented_at) {
            return Err(StorageError::DuplicateAttempt);
        }

        let key = (state.learner_id, state.flashcard_id);
        let stored_version = guard.states.get(&key).map_or(0, |s| s.version);
        if stored_version != expected_version {
            return Err(StorageError::Stale);
        }

        let version = expected_version + 1;
        let mut next = state.clone();
        next.version = version;
        guard.states.insert(key, next);

        let attempt_id = u64::try_from(guard.attempts.len()).unwrap_or(u64::MAX) + 1;
        guard.attempts.push(AttemptRecord {
            id: attempt_id,
            attempt,
        });

        Ok(AppliedRecord {
            attempt_id,
            version,
        })
    }
}

#[async_trait]
impl SlotRepository for InMemoryRepository {
    async fn slots_for_learner(
        &self,
        learner_id: LearnerId,
    ) -> Result<Vec<ReviewSlot>, StorageError> {
        let guard = self.slots()?;
        let mut slots: Vec<ReviewSlot> = guard
            .rows
            .values()
            .filter(|s| s.learner_id == learner_id)
            .cloned()
            .collect();
        slots.sort_by_key(slot_order);
        Ok(slots)
    }

    async fn get_slot(&self, id: SlotId) -> Result<ReviewSlot, StorageError> {
        let guard = self.slots()?;
        guard.rows.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn insert_slot(&self, slot: &ReviewSlot) -> Result<ReviewSlot, StorageError> {
        if slot.id.is_some() {
            return Err(StorageError::Conflict);
        }
        let mut guard = self.slots()?;
        guard.ensure_free(slot)?;
        guard.last_id += 1;
        let id = SlotId::new(guard.last_id);
        let stored = slot.clone().with_id(id);
        guard.rows.insert(id, stored.clone());
        Ok(stored)
    }

    async fn update_slot(&self, slot: &ReviewSlot) -> Result<(), StorageError> {
        let id = slot.id.ok_or(StorageError::NotFound)?;
        let mut guard = self.slots()?;
        if !guard.rows.contains_key(&id) {
            return Err(StorageError::NotFound);
        }
        guard.ensure_free(slot)?;
        guard.rows.insert(id, slot.clone());
        Ok(())
    }

    async fn delete_slot(&self, id: SlotId) -> Result<(), StorageError> {
        let mut guard = self.slots()?;
        guard
            .rows
            .remove(&id)
            .map(|_| ())
            .ok_or(StorageError::NotFound)
    }
}

/// Aggregates the engine repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub states: Arc<dyn ReviewStateRepository>,
    pub attempts: Arc<dyn AttemptRepository>,
    pub reviews: Arc<dyn ReviewPersistence>,
    pub slots: Arc<dyn SlotRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let states: Arc<dyn ReviewStateRepository> = Arc::new(repo.clone());
        let attempts: Arc<dyn AttemptRepository> = Arc::new(repo.clone());
        let reviews: Arc<dyn ReviewPersistence> = Arc::new(repo.clone());
        let slots: Arc<dyn SlotRepository> = Arc::new(repo);
        Self {
            states,
            attempts,
            reviews,
            slots,
        }
    }
}
