use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{LearnerId, SlotId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SlotError {
    #[error("day of week must be 0 (Sunday) through 6 (Saturday), got {0}")]
    InvalidDayOfWeek(u8),

    #[error("slot start {start} must be before end {end}")]
    InvalidTimeRange { start: NaiveTime, end: NaiveTime },

    #[error("slot overlaps existing slot {existing} on the same day")]
    Overlap { existing: SlotId },
}

//
// ─── DAY OF WEEK ───────────────────────────────────────────────────────────────
//

/// Map `0..=6` (Sunday first) to a `Weekday`.
///
/// # Errors
///
/// Returns `SlotError::InvalidDayOfWeek` for values above 6.
pub fn weekday_from_index(index: u8) -> Result<Weekday, SlotError> {
    match index {
        0 => Ok(Weekday::Sun),
        1 => Ok(Weekday::Mon),
        2 => Ok(Weekday::Tue),
        3 => Ok(Weekday::Wed),
        4 => Ok(Weekday::Thu),
        5 => Ok(Weekday::Fri),
        6 => Ok(Weekday::Sat),
        other => Err(SlotError::InvalidDayOfWeek(other)),
    }
}

/// Inverse of [`weekday_from_index`].
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn weekday_index(day: Weekday) -> u8 {
    day.num_days_from_sunday() as u8
}

//
// ─── SLOT TYPES ────────────────────────────────────────────────────────────────
//

/// Unvalidated slot input, as received from the slot configuration surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSlotDraft {
    pub day_of_week: u8,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(default)]
    pub capacity: Option<u32>,
}

impl ReviewSlotDraft {
    /// Validate the draft for the given learner. The slot id is assigned by storage.
    ///
    /// # Errors
    ///
    /// Returns `SlotError` if the day index or the time range is invalid.
    pub fn validate(self, learner_id: LearnerId) -> Result<ReviewSlot, SlotError> {
        let day_of_week = weekday_from_index(self.day_of_week)?;
        if self.start_time >= self.end_time {
            return Err(SlotError::InvalidTimeRange {
                start: self.start_time,
                end: self.end_time,
            });
        }

        Ok(ReviewSlot {
            id: None,
            learner_id,
            day_of_week,
            start_time: self.start_time,
            end_time: self.end_time,
            capacity: self.capacity.filter(|c| *c > 0),
        })
    }
}

/// Recurring weekly availability window for one learner.
///
/// A `None` capacity means the window is unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSlot {
    pub id: Option<SlotId>,
    pub learner_id: LearnerId,
    pub day_of_week: Weekday,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub capacity: Option<u32>,
}

impl ReviewSlot {
    #[must_use]
    pub fn with_id(mut self, id: SlotId) -> Self {
        self.id = Some(id);
        self
    }

    /// Half-open interval overlap on the same learner and weekday.
    #[must_use]
    pub fn overlaps(&self, other: &ReviewSlot) -> bool {
        self.learner_id == other.learner_id
            && self.day_of_week == other.day_of_week
            && self.start_time < other.end_time
            && other.start_time < self.end_time
    }
}

/// Reject `candidate` if it overlaps any slot in `existing`.
///
/// A slot never conflicts with itself, so updates can pass the full list.
///
/// # Errors
///
/// Returns `SlotError::Overlap` naming the first conflicting slot.
pub fn ensure_no_overlap(existing: &[ReviewSlot], candidate: &ReviewSlot) -> Result<(), SlotError> {
    for slot in existing {
        if candidate.id.is_some() && slot.id == candidate.id {
            continue;
        }
        if slot.overlaps(candidate) {
            return Err(SlotError::Overlap {
                existing: slot.id.unwrap_or(SlotId::new(0)),
            });
        }
    }
    Ok(())
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn slot(id: u64, day: u8, start: NaiveTime, end: NaiveTime) -> ReviewSlot {
        ReviewSlotDraft {
            day_of_week: day,
            start_time: start,
            end_time: end,
            capacity: None,
        }
        .validate(LearnerId::new(1))
        .unwrap()
        .with_id(SlotId::new(id))
    }

    #[test]
    fn weekday_indices_start_on_sunday() {
        assert_eq!(weekday_from_index(0).unwrap(), Weekday::Sun);
        assert_eq!(weekday_from_index(1).unwrap(), Weekday::Mon);
        assert_eq!(weekday_index(Weekday::Sat), 6);
        assert_eq!(weekday_from_index(7), Err(SlotError::InvalidDayOfWeek(7)));
    }

    #[test]
    fn rejects_empty_or_inverted_range() {
        let draft = ReviewSlotDraft {
            day_of_week: 1,
            start_time: t(9, 0),
            end_time: t(9, 0),
            capacity: Some(3),
        };
        assert!(matches!(
            draft.validate(LearnerId::new(1)),
            Err(SlotError::InvalidTimeRange { .. })
        ));
    }

    #[test]
    fn zero_capacity_means_unbounded() {
        let slot = ReviewSlotDraft {
            day_of_week: 2,
            start_time: t(8, 0),
            end_time: t(8, 30),
            capacity: Some(0),
        }
        .validate(LearnerId::new(1))
        .unwrap();
        assert_eq!(slot.capacity, None);
    }

    #[test]
    fn overlapping_slot_on_same_day_is_rejected() {
        let existing = vec![slot(1, 1, t(8, 0), t(9, 0))];
        let candidate = slot(2, 1, t(8, 30), t(9, 30));
        assert_eq!(
            ensure_no_overlap(&existing, &candidate),
            Err(SlotError::Overlap {
                existing: SlotId::new(1)
            })
        );
    }

    #[test]
    fn touching_or_other_day_slots_are_allowed() {
        let existing = vec![slot(1, 1, t(8, 0), t(9, 0))];
        assert!(ensure_no_overlap(&existing, &slot(2, 1, t(9, 0), t(10, 0))).is_ok());
        assert!(ensure_no_overlap(&existing, &slot(3, 2, t(8, 0), t(9, 0))).is_ok());
    }

    #[test]
    fn update_does_not_conflict_with_itself() {
        let existing = vec![slot(1, 1, t(8, 0), t(9, 0))];
        let moved = slot(1, 1, t(8, 15), t(9, 15));
        assert!(ensure_no_overlap(&existing, &moved).is_ok());
    }

    #[test]
    fn other_learners_do_not_conflict() {
        let existing = vec![slot(1, 1, t(8, 0), t(9, 0))];
        let mut other = slot(2, 1, t(8, 0), t(9, 0));
        other.learner_id = LearnerId::new(2);
        assert!(ensure_no_overlap(&existing, &other).is_ok());
    }
}
