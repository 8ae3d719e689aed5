use chrono::{DateTime, NaiveTime, Utc};
use review_core::model::{
    Attempt, AttemptRecord, FlashcardId, LearnerId, Rating, ReviewSlot, ReviewState,
    ReviewStatus, SlotId, weekday_from_index, weekday_index,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn i64_to_u32(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

/// Storage encoding of ratings is 0..=3: Again=0, Hard=1, Good=2, Easy=3.
pub(crate) fn rating_to_i64(rating: Rating) -> i64 {
    i64::from(rating.as_u8())
}

pub(crate) fn rating_from_i64(value: i64) -> Result<Rating, StorageError> {
    let raw = u8::try_from(value)
        .map_err(|_| StorageError::Serialization(format!("invalid rating: {value}")))?;
    Rating::from_u8(raw).map_err(ser)
}

pub(crate) fn map_state_row(row: &SqliteRow) -> Result<ReviewState, StorageError> {
    let status: String = row.try_get("status").map_err(ser)?;
    Ok(ReviewState {
        learner_id: LearnerId::new(i64_to_u64(
            "learner_id",
            row.try_get("learner_id").map_err(ser)?,
        )?),
        flashcard_id: FlashcardId::new(i64_to_u64(
            "flashcard_id",
            row.try_get("flashcard_id").map_err(ser)?,
        )?),
        interval_days: row.try_get("interval_days").map_err(ser)?,
        ease_factor: row.try_get("ease_factor").map_err(ser)?,
        repetitions: i64_to_u32("repetitions", row.try_get("repetitions").map_err(ser)?)?,
        lapses: i64_to_u32("lapses", row.try_get("lapses").map_err(ser)?)?,
        status: ReviewStatus::parse(&status).map_err(ser)?,
        last_reviewed_at: row
            .try_get::<Option<DateTime<Utc>>, _>("last_reviewed_at")
            .map_err(ser)?,
        due_at: row.try_get::<Option<DateTime<Utc>>, _>("due_at").map_err(ser)?,
        created_at: row.try_get("created_at").map_err(ser)?,
        version: i64_to_u64("version", row.try_get("version").map_err(ser)?)?,
    })
}

pub(crate) fn map_attempt_row(row: &SqliteRow) -> Result<AttemptRecord, StorageError> {
    Ok(AttemptRecord {
        id: i64_to_u64("id", row.try_get("id").map_err(ser)?)?,
        attempt: Attempt {
            learner_id: LearnerId::new(i64_to_u64(
                "learner_id",
                row.try_get("learner_id").map_err(ser)?,
            )?),
            flashcard_id: FlashcardId::new(i64_to_u64(
                "flashcard_id",
                row.try_get("flashcard_id").map_err(ser)?,
            )?),
            rating: rating_from_i64(row.try_get("rating").map_err(ser)?)?,
            rated_at: row.try_get("rated_at").map_err(ser)?,
            presented_at: row.try_get("presented_at").map_err(ser)?,
            interval_before: row.try_get("interval_before").map_err(ser)?,
            interval_after: row.try_get("interval_after").map_err(ser)?,
        },
    })
}

pub(crate) fn map_slot_row(row: &SqliteRow) -> Result<ReviewSlot, StorageError> {
    let day: i64 = row.try_get("day_of_week").map_err(ser)?;
    let day = u8::try_from(day)
        .map_err(|_| StorageError::Serialization(format!("invalid day_of_week: {day}")))?;
    let capacity: Option<i64> = row.try_get("capacity").map_err(ser)?;

    Ok(ReviewSlot {
        id: Some(SlotId::new(i64_to_u64("id", row.try_get("id").map_err(ser)?)?)),
        learner_id: LearnerId::new(i64_to_u64(
            "learner_id",
            row.try_get("learner_id").map_err(ser)?,
        )?),
        day_of_week: weekday_from_index(day).map_err(ser)?,
        start_time: row.try_get::<NaiveTime, _>("start_time").map_err(ser)?,
        end_time: row.try_get::<NaiveTime, _>("end_time").map_err(ser)?,
        capacity: capacity.map(|c| i64_to_u32("capacity", c)).transpose()?,
    })
}

pub(crate) fn day_to_i64(slot: &ReviewSlot) -> i64 {
    i64::from(weekday_index(slot.day_of_week))
}
