use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

const SCHEMA_V1: &[&str] = &[
    r"
        CREATE TABLE IF NOT EXISTS review_states (
            learner_id INTEGER NOT NULL,
            flashcard_id INTEGER NOT NULL,
            interval_days REAL NOT NULL CHECK (interval_days >= 0),
            ease_factor REAL NOT NULL CHECK (ease_factor > 0),
            repetitions INTEGER NOT NULL CHECK (repetitions >= 0),
            lapses INTEGER NOT NULL CHECK (lapses >= 0),
            status TEXT NOT NULL
                CHECK (status IN ('new', 'learning', 'review', 'mastered')),
            last_reviewed_at TEXT,
            due_at TEXT,
            created_at TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 0 CHECK (version >= 0),
            PRIMARY KEY (learner_id, flashcard_id)
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS review_attempts (
            id INTEGER PRIMARY KEY,
            learner_id INTEGER NOT NULL,
            flashcard_id INTEGER NOT NULL,
            rating INTEGER NOT NULL CHECK (rating BETWEEN 0 AND 3),
            rated_at TEXT NOT NULL,
            presented_at TEXT NOT NULL,
            interval_before REAL NOT NULL,
            interval_after REAL NOT NULL
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS review_slots (
            id INTEGER PRIMARY KEY,
            learner_id INTEGER NOT NULL,
            day_of_week INTEGER NOT NULL CHECK (day_of_week BETWEEN 0 AND 6),
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            capacity INTEGER CHECK (capacity IS NULL OR capacity > 0),
            CHECK (start_time < end_time)
        );
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_review_states_learner_due
            ON review_states (learner_id, due_at);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_review_states_flashcard
            ON review_states (flashcard_id);
    ",
    r"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_review_attempts_presentation
            ON review_attempts (learner_id, flashcard_id, presented_at);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_review_attempts_learner_rated_at
            ON review_attempts (learner_id, rated_at);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_review_slots_learner_day
            ON review_slots (learner_id, day_of_week, start_time);
    ",
];

/// Brings the schema up to date, recording each applied version.
///
/// Version 1 holds review states, the attempt log with its idempotency
/// index, and the weekly slot template.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if is_applied(pool, 1).await? {
        tracing::debug!(version = 1, "schema already current");
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    for statement in SCHEMA_V1.iter().copied() {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    sqlx::query(
        r"
            INSERT INTO schema_migrations (version, applied_at)
            VALUES (?1, ?2)
            ON CONFLICT(version) DO NOTHING
        ",
    )
    .bind(1_i64)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    tracing::info!(version = 1, "applied schema migration");
    Ok(())
}
