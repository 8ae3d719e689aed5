use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use review_core::{
    model::{Attempt, FlashcardId, LearnerId, Rating, ReviewState},
    queue::{QueueBuilder, ReviewQueue},
    scheduler::{ScheduledStates, Scheduler},
    time::Clock,
};
use storage::repository::{
    AttemptRepository, ReviewPersistence, ReviewStateRepository, SlotRepository, StorageError,
};

use crate::error::ReviewServiceError;

//
// ─── REQUESTS & RESULTS ────────────────────────────────────────────────────────
//

/// Knobs for one queue request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueOptions {
    /// Offer never-rated cards after the due ones.
    pub include_new: bool,
    /// Upper bound on never-rated cards per queue.
    pub max_new: Option<usize>,
}

/// A learner's rating for a card they were shown.
///
/// `presented_at` is the value handed out with the queue item and is what
/// makes a resubmission recognisable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingSubmission {
    pub learner_id: LearnerId,
    pub flashcard_id: FlashcardId,
    pub rating: Rating,
    pub presented_at: DateTime<Utc>,
    /// Version of the state the learner was shown (`QueueItem::state.version`).
    pub expected_version: u64,
}

/// What a successful submission committed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatingReceipt {
    pub state: ReviewState,
    pub attempt_id: u64,
    pub interval_before: f64,
    pub interval_after: f64,
    /// The stored state had to be repaired before scheduling.
    pub normalized: bool,
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Coordinates queue building and rating submission against storage.
#[derive(Clone)]
pub struct ReviewService {
    clock: Clock,
    scheduler: Scheduler,
    states: Arc<dyn ReviewStateRepository>,
    attempts: Arc<dyn AttemptRepository>,
    reviews: Arc<dyn ReviewPersistence>,
    slots: Arc<dyn SlotRepository>,
}

impl ReviewService {
    #[must_use]
    pub fn new(
        clock: Clock,
        scheduler: Scheduler,
        states: Arc<dyn ReviewStateRepository>,
        attempts: Arc<dyn AttemptRepository>,
        reviews: Arc<dyn ReviewPersistence>,
        slots: Arc<dyn SlotRepository>,
    ) -> Self {
        Self {
            clock,
            scheduler,
            states,
            attempts,
            reviews,
            slots,
        }
    }

    /// Override the clock (usually for deterministic testing).
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Current time according to the service's clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Build the learner's queue for the current or next slot window.
    ///
    /// Each card in `flashcards` without a state is enrolled as `new` first.
    /// The queue covers every stored state of the learner.
    ///
    /// # Errors
    ///
    /// Returns `ReviewServiceError::Storage` if repository access fails.
    pub async fn due_queue(
        &self,
        learner_id: LearnerId,
        flashcards: &[FlashcardId],
        options: QueueOptions,
    ) -> Result<ReviewQueue, ReviewServiceError> {
        let now = self.now();
        for flashcard_id in flashcards {
            let fresh = ReviewState::new(learner_id, *flashcard_id, self.scheduler.params(), now);
            self.states.insert_state_if_absent(&fresh).await?;
        }

        let states = self.states.states_for_learner(learner_id).await?;
        let slots = self.slots.slots_for_learner(learner_id).await?;

        let queue = QueueBuilder::new(now)
            .include_new(options.include_new)
            .max_new(options.max_new)
            .build(learner_id, &states, &slots);

        tracing::debug!(
            learner_id = %learner_id,
            items = queue.items.len(),
            eligible = queue.total_eligible,
            deferred = queue.deferred,
            "built review queue"
        );
        Ok(queue)
    }

    /// Apply a rating and persist the new state together with its attempt.
    ///
    /// Neither a stale state nor a duplicate is retried here; the caller
    /// decides whether to re-fetch and let the learner rate again.
    ///
    /// # Errors
    ///
    /// Returns `ReviewServiceError::DuplicateSubmission` if this presentation
    /// was already rated, `ReviewServiceError::StaleState` if the state moved
    /// past `expected_version` or a concurrent submission won, and `ReviewServiceError::Storage` on other failures.
    pub async fn submit_rating(
        &self,
        submission: RatingSubmission,
    ) -> Result<RatingReceipt, ReviewServiceError> {
        let RatingSubmission {
            learner_id,
            flashcard_id,
            rating,
            presented_at,
            expected_version,
        } = submission;

        if self
            .attempts
            .find_attempt(learner_id, flashcard_id, presented_at)
            .await?
            .is_some()
        {
            tracing::info!(
                learner_id = %learner_id,
                flashcard_id = %flashcard_id,
                %presented_at,
                "ignoring duplicate rating submission"
            );
            return Err(ReviewServiceError::DuplicateSubmission);
        }

        let now = self.now();
        let fresh = ReviewState::new(learner_id, flashcard_id, self.scheduler.params(), now);
        let current = self.states.insert_state_if_absent(&fresh).await?;
        if current.version != expected_version {
            tracing::warn!(
                learner_id = %learner_id,
                flashcard_id = %flashcard_id,
                expected_version,
                stored_version = current.version,
                "rating was made against an outdated review state"
            );
            return Err(ReviewServiceError::StaleState);
        }

        let scheduled = self.scheduler.schedule(&current, rating, now);
        if scheduled.normalized {
            tracing::warn!(
                learner_id = %learner_id,
                flashcard_id = %flashcard_id,
                interval_days = current.interval_days,
                ease_factor = current.ease_factor,
                "repaired out-of-range review state before scheduling"
            );
        }

        let attempt = Attempt {
            learner_id,
            flashcard_id,
            rating,
            rated_at: now,
            presented_at,
            interval_before: scheduled.interval_before,
            interval_after: scheduled.state.interval_days,
        };

        let applied = self
            .reviews
            .apply_review(expected_version, &scheduled.state, attempt)
            .await
            .inspect_err(|err| {
                if matches!(err, StorageError::Stale) {
                    tracing::warn!(
                        learner_id = %learner_id,
                        flashcard_id = %flashcard_id,
                        version = expected_version,
                        "rating lost a concurrent update"
                    );
                }
            })?;

        let mut state = scheduled.state;
        state.version = applied.version;
        tracing::info!(
            learner_id = %learner_id,
            flashcard_id = %flashcard_id,
            rating = %rating,
            interval_before = scheduled.interval_before,
            interval_after = state.interval_days,
            status = %state.status,
            "rating applied"
        );

        Ok(RatingReceipt {
            interval_before: scheduled.interval_before,
            interval_after: state.interval_days,
            state,
            attempt_id: applied.attempt_id,
            normalized: scheduled.normalized,
        })
    }

    /// Successor state for each rating, without persisting anything.
    ///
    /// # Errors
    ///
    /// Returns `ReviewServiceError::Storage` if repository access fails.
    pub async fn preview(
        &self,
        learner_id: LearnerId,
        flashcard_id: FlashcardId,
    ) -> Result<ScheduledStates, ReviewServiceError> {
        let now = self.now();
        let state = match self.states.get_state(learner_id, flashcard_id).await {
            Ok(state) => state,
            Err(StorageError::NotFound) => {
                ReviewState::new(learner_id, flashcard_id, self.scheduler.params(), now)
            }
            Err(err) => return Err(err.into()),
        };
        Ok(self.scheduler.preview(&state, now))
    }

    /// Drop every learner's state for a deleted flashcard. Attempts stay.
    ///
    /// # Errors
    ///
    /// Returns `ReviewServiceError::Storage` if repository access fails.
    pub async fn remove_flashcard(&self, flashcard_id: FlashcardId) -> Result<u64, ReviewServiceError> {
        let removed = self.states.delete_states_for_card(flashcard_id).await?;
        tracing::info!(flashcard_id = %flashcard_id, removed, "removed review states for flashcard");
        Ok(removed)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
