use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::calendar::{SlotCalendar, TimeWindow};
use crate::model::{FlashcardId, LearnerId, ReviewSlot, ReviewState};

/// One card offered to the learner.
///
/// `presented_at` travels back with the rating and keys duplicate detection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueItem {
    pub flashcard_id: FlashcardId,
    pub state: ReviewState,
    pub presented_at: DateTime<Utc>,
}

/// Ordered, capacity-bounded set of cards for the current or next window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewQueue {
    pub learner_id: LearnerId,
    pub items: Vec<QueueItem>,
    /// Window whose capacity bounded the queue; `None` when no slot is configured.
    pub window: Option<TimeWindow>,
    pub total_eligible: usize,
    /// Cards already rated inside the active window; they count against its capacity.
    pub served_in_window: usize,
    /// Eligible cards held back by capacity. They stay due until the next window.
    pub deferred: usize,
}

impl ReviewQueue {
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Selects and orders due cards for a learner at a given instant.
///
/// Ordering is most overdue first, then `learning` before `review` before
/// `mastered` before `new`, then ascending flashcard id.
#[derive(Debug, Clone)]
pub struct QueueBuilder {
    now: DateTime<Utc>,
    include_new: bool,
    max_new: Option<usize>,
}

impl QueueBuilder {
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            include_new: false,
            max_new: None,
        }
    }

    /// Make never-rated cards eligible alongside due ones.
    #[must_use]
    pub fn include_new(mut self, include: bool) -> Self {
        self.include_new = include;
        self
    }

    /// Cap how many never-rated cards one queue may introduce.
    #[must_use]
    pub fn max_new(mut self, max_new: Option<usize>) -> Self {
        self.max_new = max_new;
        self
    }

    /// Order the learner's eligible cards and cut them to what the active
    /// window still has room for. Inside a window, cards already rated since
    /// it opened count against its capacity.
    #[must_use]
    pub fn build(
        &self,
        learner_id: LearnerId,
        states: &[ReviewState],
        slots: &[ReviewSlot],
    ) -> ReviewQueue {
        let now = self.now;

        let mut eligible: Vec<&ReviewState> = states
            .iter()
            .filter(|s| s.learner_id == learner_id)
            .filter(|s| s.is_due(now) || (self.include_new && s.is_new()))
            .collect();

        eligible.sort_by(|a, b| {
            b.overdue_by(now)
                .cmp(&a.overdue_by(now))
                .then_with(|| a.status.queue_priority().cmp(&b.status.queue_priority()))
                .then_with(|| a.flashcard_id.cmp(&b.flashcard_id))
        });

        if let Some(max_new) = self.max_new {
            let mut seen_new = 0_usize;
            eligible.retain(|s| {
                if !s.is_new() {
                    return true;
                }
                seen_new += 1;
                seen_new <= max_new
            });
        }

        let learner_slots: Vec<ReviewSlot> = slots
            .iter()
            .filter(|slot| slot.learner_id == learner_id)
            .cloned()
            .collect();
        let window = SlotCalendar::new(&learner_slots).active_window(now);
        let served_in_window = window
            .as_ref()
            .filter(|w| w.contains(now))
            .map_or(0, |w| reviewed_between(states, learner_id, w.start, now));
        let capacity = window
            .as_ref()
            .and_then(TimeWindow::capacity_limit)
            .map_or(usize::MAX, |limit| limit.saturating_sub(served_in_window));

        let total_eligible = eligible.len();
        let items: Vec<QueueItem> = eligible
            .into_iter()
            .take(capacity)
            .map(|state| QueueItem {
                flashcard_id: state.flashcard_id,
                state: state.clone(),
                presented_at: now,
            })
            .collect();
        let deferred = total_eligible - items.len();

        ReviewQueue {
            learner_id,
            items,
            window,
            total_eligible,
            served_in_window,
            deferred,
        }
    }
}

/// Learner's cards last rated within `[from, to]`.
fn reviewed_between(
    states: &[ReviewState],
    learner_id: LearnerId,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> usize {
    states
        .iter()
        .filter(|s| s.learner_id == learner_id)
        .filter(|s| s.last_reviewed_at.is_some_and(|at| from <= at && at <= to))
        .count()
}
