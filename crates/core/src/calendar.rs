use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::model::{ReviewSlot, SlotId};
use crate::time::at_time;

/// How many days ahead `next_occurrence_after` looks before giving up.
pub const SEARCH_HORIZON_DAYS: i64 = 14;

/// A concrete `[start, end)` occurrence of a recurring slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    pub slot_id: Option<SlotId>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub capacity: Option<u32>,
}

impl TimeWindow {
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }

    /// Maximum number of cards to present in this window; `None` is unbounded.
    #[must_use]
    pub fn capacity_limit(&self) -> Option<usize> {
        self.capacity
            .filter(|c| *c > 0)
            .map(|c| usize::try_from(c).unwrap_or(usize::MAX))
    }
}

/// Expands a learner's weekly slot template into dated windows on demand.
///
/// Slots are assumed validated and non-overlapping; nothing is merged or
/// deduplicated here. Slot times are read as UTC.
#[derive(Debug, Clone, Copy)]
pub struct SlotCalendar<'a> {
    slots: &'a [ReviewSlot],
}

impl<'a> SlotCalendar<'a> {
    #[must_use]
    pub fn new(slots: &'a [ReviewSlot]) -> Self {
        Self { slots }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Windows falling on `date`, ordered by start time.
    #[must_use]
    pub fn occurrences_on(&self, date: NaiveDate) -> Vec<TimeWindow> {
        let weekday = date.weekday();
        let mut windows: Vec<TimeWindow> = self
            .slots
            .iter()
            .filter(|slot| slot.day_of_week == weekday)
            .map(|slot| TimeWindow {
                slot_id: slot.id,
                start: at_time(date, slot.start_time),
                end: at_time(date, slot.end_time),
                capacity: slot.capacity,
            })
            .collect();
        windows.sort_by_key(|w| (w.start, w.end));
        windows
    }

    /// The soonest window starting strictly after `now`.
    ///
    /// Returns `None` when no slot occurs within the search horizon, which
    /// for a weekly template means no slot is configured, or when the
    /// horizon runs past the last representable date.
    #[must_use]
    pub fn next_occurrence_after(&self, now: DateTime<Utc>) -> Option<TimeWindow> {
        if self.slots.is_empty() {
            return None;
        }
        let today = now.date_naive();
        (0..=SEARCH_HORIZON_DAYS)
            .map_while(|offset| today.checked_add_signed(Duration::days(offset)))
            .find_map(|date| {
                self.occurrences_on(date)
                    .into_iter()
                    .find(|window| window.start > now)
            })
    }

    /// The window containing `now`, or else the next one to start.
    #[must_use]
    pub fn active_window(&self, now: DateTime<Utc>) -> Option<TimeWindow> {
        self.occurrences_on(now.date_naive())
            .into_iter()
            .find(|window| window.contains(now))
            .or_else(|| self.next_occurrence_after(now))
    }
}
