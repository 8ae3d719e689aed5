use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::model::{ParamsError, Rating, ReviewState, ReviewStatus, SchedulerParams};
use crate::time::days_to_duration;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchedulerError {
    #[error("invalid scheduler parameters: {0}")]
    InvalidParams(#[from] ParamsError),
}

//
// ─── SCHEDULED REVIEW ──────────────────────────────────────────────────────────
//

/// Result of applying one rating to a review state.
///
/// # Fields
///
/// * `state` - The successor state; `due_at` is `now + interval_days`
/// * `interval_before` - Interval of the (normalized) entry state
/// * `normalized` - Whether the entry state had to be repaired first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledReview {
    pub state: ReviewState,
    pub interval_before: f64,
    pub normalized: bool,
}

/// Successor states for every possible rating, for "next review in N days" hints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledStates {
    pub again: ReviewState,
    pub hard: ReviewState,
    pub good: ReviewState,
    pub easy: ReviewState,
}

impl ScheduledStates {
    #[must_use]
    pub fn select(&self, rating: Rating) -> &ReviewState {
        match rating {
            Rating::Again => &self.again,
            Rating::Hard => &self.hard,
            Rating::Good => &self.good,
            Rating::Easy => &self.easy,
        }
    }
}

//
// ─── SCHEDULER ─────────────────────────────────────────────────────────────────
//

/// SM-2 family interval scheduler.
///
/// Pure: the same `(state, rating, now)` always yields the same successor,
/// and nothing outside the returned value is touched. Persistence and
/// concurrency control belong to the caller.
///
/// # Examples
///
/// ```
/// # use review_core::scheduler::Scheduler;
/// # use review_core::model::{FlashcardId, LearnerId, Rating, ReviewState};
/// let scheduler = Scheduler::default();
/// let now = chrono::Utc::now();
/// let state = ReviewState::new(LearnerId::new(1), FlashcardId::new(1), scheduler.params(), now);
///
/// let next = scheduler.schedule(&state, Rating::Good, now).state;
/// assert_eq!(next.interval_days, 1.0);
/// assert_eq!(next.repetitions, 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    params: SchedulerParams,
}

impl Scheduler {
    /// Create a scheduler after validating its parameters.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidParams` if any parameter constraint fails.
    pub fn try_new(params: SchedulerParams) -> Result<Self, SchedulerError> {
        params.validate()?;
        Ok(Self { params })
    }

    #[must_use]
    pub fn params(&self) -> &SchedulerParams {
        &self.params
    }

    /// Apply `rating` to `state` at `now`.
    ///
    /// Corrupt entry states (negative interval, ease outside bounds) are
    /// repaired rather than rejected; `ScheduledReview::normalized` tells the
    /// caller so it can log the repair.
    #[must_use]
    pub fn schedule(
        &self,
        state: &ReviewState,
        rating: Rating,
        now: DateTime<Utc>,
    ) -> ScheduledReview {
        let p = &self.params;
        let (entry, normalized) = state.normalized(p);
        let interval_before = entry.interval_days;
        let first_success = entry.repetitions == 0 || entry.interval_days <= 0.0;

        let mut next = entry.clone();
        match rating {
            Rating::Again => {
                next.repetitions = 0;
                next.lapses = entry.lapses.saturating_add(1);
                next.ease_factor = p.clamp_ease(entry.ease_factor - p.again_ease_penalty);
                next.interval_days = p.learning_step_days;
            }
            Rating::Hard => {
                next.repetitions = entry.repetitions.saturating_add(1);
                next.ease_factor = p.clamp_ease(entry.ease_factor - p.hard_ease_penalty);
                next.interval_days = p.clamp_interval(
                    (entry.interval_days * p.hard_multiplier).max(p.learning_step_days),
                );
            }
            Rating::Good => {
                next.repetitions = entry.repetitions.saturating_add(1);
                let grown = if first_success {
                    p.graduation_interval_days
                } else {
                    entry.interval_days * entry.ease_factor
                };
                next.interval_days = p.clamp_interval(grown.max(entry.interval_days));
            }
            Rating::Easy => {
                next.repetitions = entry.repetitions.saturating_add(1);
                next.ease_factor = p.clamp_ease(entry.ease_factor + p.easy_ease_bonus);
                let grown = if first_success {
                    p.easy_graduation_days
                } else {
                    entry.interval_days * next.ease_factor * p.easy_multiplier
                };
                next.interval_days = p.clamp_interval(grown.max(entry.interval_days));
            }
        }

        next.status = self.derive_status(rating, next.repetitions, next.interval_days);
        next.last_reviewed_at = Some(now);
        next.due_at = Some(
            now.checked_add_signed(days_to_duration(next.interval_days))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        );

        ScheduledReview {
            state: next,
            interval_before,
            normalized,
        }
    }

    /// Compute the successor for every rating without committing to one.
    #[must_use]
    pub fn preview(&self, state: &ReviewState, now: DateTime<Utc>) -> ScheduledStates {
        ScheduledStates {
            again: self.schedule(state, Rating::Again, now).state,
            hard: self.schedule(state, Rating::Hard, now).state,
            good: self.schedule(state, Rating::Good, now).state,
            easy: self.schedule(state, Rating::Easy, now).state,
        }
    }

    fn derive_status(&self, rating: Rating, repetitions: u32, interval_days: f64) -> ReviewStatus {
        let p = &self.params;
        if rating == Rating::Again || repetitions < p.graduation_repetitions {
            return ReviewStatus::Learning;
        }
        if interval_days >= p.mastery_threshold_days && repetitions >= p.mastery_min_repetitions {
            ReviewStatus::Mastered
        } else {
            ReviewStatus::Review
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
