use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{FlashcardId, LearnerId};
use crate::model::params::SchedulerParams;

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

/// Errors raised while decoding review input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReviewError {
    #[error("invalid rating value: {0}")]
    InvalidRatingValue(u8),

    #[error("unknown rating: {0:?}")]
    UnknownRating(String),

    #[error("unknown review status: {0:?}")]
    UnknownStatus(String),
}

//
// ─── RATING ───────────────────────────────────────────────────────────────────
//

/// Four-level self-assessment submitted after answering a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    /// Forgotten. Counts as a lapse.
    Again,
    /// Recalled with significant difficulty.
    Hard,
    /// Recalled correctly.
    Good,
    /// Recalled instantly.
    Easy,
}

impl Rating {
    pub const ALL: [Rating; 4] = [Rating::Again, Rating::Hard, Rating::Good, Rating::Easy];

    /// Decode the storage encoding (0..=3).
    ///
    /// # Errors
    ///
    /// Returns `ReviewError::InvalidRatingValue` for anything outside 0..=3.
    pub fn from_u8(value: u8) -> Result<Self, ReviewError> {
        match value {
            0 => Ok(Self::Again),
            1 => Ok(Self::Hard),
            2 => Ok(Self::Good),
            3 => Ok(Self::Easy),
            _ => Err(ReviewError::InvalidRatingValue(value)),
        }
    }

    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            Rating::Again => 0,
            Rating::Hard => 1,
            Rating::Good => 2,
            Rating::Easy => 3,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Rating::Again => "again",
            Rating::Hard => "hard",
            Rating::Good => "good",
            Rating::Easy => "easy",
        }
    }

    /// Everything except `Again` counts as successful recall.
    #[must_use]
    pub fn is_success(self) -> bool {
        !matches!(self, Rating::Again)
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rating {
    type Err = ReviewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "again" => Ok(Self::Again),
            "hard" => Ok(Self::Hard),
            "good" => Ok(Self::Good),
            "easy" => Ok(Self::Easy),
            _ => Err(ReviewError::UnknownRating(s.to_owned())),
        }
    }
}

//
// ─── STATUS ───────────────────────────────────────────────────────────────────
//

/// Lifecycle stage of a card for one learner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    New,
    Learning,
    Review,
    Mastered,
}

impl ReviewStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ReviewStatus::New => "new",
            ReviewStatus::Learning => "learning",
            ReviewStatus::Review => "review",
            ReviewStatus::Mastered => "mastered",
        }
    }

    /// Parse the persisted representation.
    ///
    /// # Errors
    ///
    /// Returns `ReviewError::UnknownStatus` for unrecognised text.
    pub fn parse(s: &str) -> Result<Self, ReviewError> {
        match s {
            "new" => Ok(Self::New),
            "learning" => Ok(Self::Learning),
            "review" => Ok(Self::Review),
            "mastered" => Ok(Self::Mastered),
            other => Err(ReviewError::UnknownStatus(other.to_owned())),
        }
    }

    /// Queue ordering rank: half-learned material first, fresh material last.
    #[must_use]
    pub fn queue_priority(self) -> u8 {
        match self {
            ReviewStatus::Learning => 0,
            ReviewStatus::Review => 1,
            ReviewStatus::Mastered => 2,
            ReviewStatus::New => 3,
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── REVIEW STATE ─────────────────────────────────────────────────────────────
//

/// Spaced-repetition memory state for one (learner, flashcard) pair.
///
/// Only the scheduler produces successor states; `due_at` is always
/// `last_reviewed_at + interval_days` and is `None` until the first rating.
/// `version` is owned by the store and bumped on every successful write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewState {
    pub learner_id: LearnerId,
    pub flashcard_id: FlashcardId,
    pub interval_days: f64,
    pub ease_factor: f64,
    pub repetitions: u32,
    pub lapses: u32,
    pub status: ReviewStatus,
    pub last_reviewed_at: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub version: u64,
}

impl ReviewState {
    /// Bootstrap state for a card the learner has never rated.
    #[must_use]
    pub fn new(
        learner_id: LearnerId,
        flashcard_id: FlashcardId,
        params: &SchedulerParams,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            learner_id,
            flashcard_id,
            interval_days: 0.0,
            ease_factor: params.initial_ease,
            repetitions: 0,
            lapses: 0,
            status: ReviewStatus::New,
            last_reviewed_at: None,
            due_at: None,
            created_at: now,
            version: 0,
        }
    }

    #[must_use]
    pub fn is_new(&self) -> bool {
        self.status == ReviewStatus::New
    }

    /// Whether the card is due at `now`. Never-rated cards are not due.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_at.is_some_and(|due| due <= now)
    }

    /// How far past its due time the card is; zero when not yet due.
    #[must_use]
    pub fn overdue_by(&self, now: DateTime<Utc>) -> Duration {
        match self.due_at {
            Some(due) if due <= now => now - due,
            _ => Duration::zero(),
        }
    }

    /// Repair values that break the model invariants.
    ///
    /// Returns the repaired copy and whether anything had to change.
    #[must_use]
    pub fn normalized(&self, params: &SchedulerParams) -> (Self, bool) {
        let mut fixed = self.clone();
        fixed.interval_days = params.clamp_interval(self.interval_days);
        fixed.ease_factor = params.clamp_ease(self.ease_factor);

        let changed = fixed.interval_days.to_bits() != self.interval_days.to_bits()
            || fixed.ease_factor.to_bits() != self.ease_factor.to_bits();
        (fixed, changed)
    }
}

//
// ─── ATTEMPT ──────────────────────────────────────────────────────────────────
//

/// One rating submission. Append-only.
///
/// `(learner_id, flashcard_id, presented_at)` identifies the submission for
/// duplicate detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub learner_id: LearnerId,
    pub flashcard_id: FlashcardId,
    pub rating: Rating,
    pub rated_at: DateTime<Utc>,
    pub presented_at: DateTime<Utc>,
    pub interval_before: f64,
    pub interval_after: f64,
}

/// An attempt as persisted, with its storage id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub id: u64,
    #[serde(flatten)]
    pub attempt: Attempt,
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
