mod ids;
mod params;
mod review;
mod slot;

pub use ids::{FlashcardId, LearnerId, ParseIdError, SlotId};
pub use params::{ParamsError, SchedulerParams};
pub use review::{Attempt, AttemptRecord, Rating, ReviewError, ReviewState, ReviewStatus};
pub use slot::{
    ReviewSlot, ReviewSlotDraft, SlotError, ensure_no_overlap, weekday_from_index, weekday_index,
};
