use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::model::{Attempt, Rating, ReviewState, ReviewStatus};
use crate::time::{end_of_day, start_of_day};

pub const DEFAULT_WINDOW_DAYS: u32 = 30;

/// Share of successful recalls, or the absence of any attempt to measure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RetentionRate {
    NoData,
    Rate(f64),
}

impl RetentionRate {
    #[must_use]
    pub fn from_counts(successes: u32, total: u32) -> Self {
        if total == 0 {
            Self::NoData
        } else {
            Self::Rate(f64::from(successes) / f64::from(total))
        }
    }

    #[must_use]
    pub fn value(self) -> Option<f64> {
        match self {
            Self::NoData => None,
            Self::Rate(rate) => Some(rate),
        }
    }
}

/// Attempt tally per rating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RatingCounts {
    pub again: u32,
    pub hard: u32,
    pub good: u32,
    pub easy: u32,
}

impl RatingCounts {
    pub fn record(&mut self, rating: Rating) {
        let slot = match rating {
            Rating::Again => &mut self.again,
            Rating::Hard => &mut self.hard,
            Rating::Good => &mut self.good,
            Rating::Easy => &mut self.easy,
        };
        *slot = slot.saturating_add(1);
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        self.again
            .saturating_add(self.hard)
            .saturating_add(self.good)
            .saturating_add(self.easy)
    }

    #[must_use]
    pub fn successes(&self) -> u32 {
        self.total().saturating_sub(self.again)
    }

    #[must_use]
    pub fn get(&self, rating: Rating) -> u32 {
        match rating {
            Rating::Again => self.again,
            Rating::Hard => self.hard,
            Rating::Good => self.good,
            Rating::Easy => self.easy,
        }
    }
}

/// Point-in-time learner statistics. Recomputed on demand, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsSnapshot {
    pub due_today: u32,
    pub new_count: u32,
    pub learning_count: u32,
    pub review_count: u32,
    pub mastered_count: u32,
    pub total_attempts: u32,
    pub retention: RetentionRate,
    pub rating_counts: RatingCounts,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

/// Derives an [`AnalyticsSnapshot`] from states and the attempt log.
#[derive(Debug, Clone, Copy)]
pub struct AnalyticsAggregator {
    window_days: u32,
}

impl Default for AnalyticsAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_DAYS)
    }
}

impl AnalyticsAggregator {
    #[must_use]
    pub fn new(window_days: u32) -> Self {
        Self { window_days }
    }

    #[must_use]
    pub fn window_days(&self) -> u32 {
        self.window_days
    }

    /// Earliest `rated_at` that still counts toward the window ending at `now`.
    #[must_use]
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(Duration::days(i64::from(self.window_days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    #[must_use]
    pub fn snapshot(
        &self,
        now: DateTime<Utc>,
        states: &[ReviewState],
        attempts: &[Attempt],
    ) -> AnalyticsSnapshot {
        let day_start = start_of_day(now);
        let day_end = end_of_day(now);

        let mut due_today = 0_u32;
        let mut new_count = 0_u32;
        let mut learning_count = 0_u32;
        let mut review_count = 0_u32;
        let mut mastered_count = 0_u32;

        for state in states {
            if state
                .due_at
                .is_some_and(|due| day_start <= due && due <= day_end)
            {
                due_today = due_today.saturating_add(1);
            }
            let counter = match state.status {
                ReviewStatus::New => &mut new_count,
                ReviewStatus::Learning => &mut learning_count,
                ReviewStatus::Review => &mut review_count,
                ReviewStatus::Mastered => &mut mastered_count,
            };
            *counter = counter.saturating_add(1);
        }

        let window_start = self.window_start(now);
        let mut rating_counts = RatingCounts::default();
        for attempt in attempts
            .iter()
            .filter(|a| window_start <= a.rated_at && a.rated_at <= now)
        {
            rating_counts.record(attempt.rating);
        }
        let total_attempts = rating_counts.total();

        AnalyticsSnapshot {
            due_today,
            new_count,
            learning_count,
            review_count,
            mastered_count,
            total_attempts,
            retention: RetentionRate::from_counts(rating_counts.successes(), total_attempts),
            rating_counts,
            window_start,
            window_end: now,
        }
    }
}
