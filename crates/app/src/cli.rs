use chrono::{DateTime, NaiveTime, Utc};
use clap::{Args, Parser, Subcommand};
use review_core::model::{FlashcardId, LearnerId, Rating, ReviewSlotDraft, SlotId};

/// Spaced-repetition review scheduling over a SQLite database
#[derive(Parser, Debug, Clone)]
#[command(name = "review-engine")]
#[command(about = "Schedule flashcard reviews into weekly time slots", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database url or path; overrides `REVIEW_DB_URL`
    #[arg(long, global = true, value_name = "URL")]
    pub db: Option<String>,

    /// Pretend the current time is this RFC 3339 instant
    #[arg(long, global = true, value_name = "TIMESTAMP")]
    pub now: Option<DateTime<Utc>>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show the cards to review now, limited by the active slot
    Queue {
        learner: LearnerId,
        /// Enrol these flashcards as new before building the queue
        #[arg(long = "card", value_name = "ID")]
        cards: Vec<FlashcardId>,
        #[arg(long)]
        include_new: bool,
        #[arg(long, value_name = "N")]
        max_new: Option<usize>,
    },
    /// Record a rating for a presented card
    Rate {
        learner: LearnerId,
        card: FlashcardId,
        /// again, hard, good or easy
        rating: Rating,
        /// Presentation timestamp handed out with the queue item
        #[arg(long, value_name = "TIMESTAMP")]
        presented_at: Option<DateTime<Utc>>,
        /// State version shown next to the card in `queue`
        #[arg(long, value_name = "N")]
        expected_version: u64,
    },
    /// Show the next interval for each rating without saving
    Preview { learner: LearnerId, card: FlashcardId },
    /// Manage weekly review slots
    Slots {
        #[command(subcommand)]
        action: SlotCommand,
    },
    /// Print learner statistics
    Analytics { learner: LearnerId },
    /// Remove every learner's review state for a deleted flashcard
    Forget { card: FlashcardId },
}

#[derive(Subcommand, Debug, Clone)]
pub enum SlotCommand {
    List { learner: LearnerId },
    Add {
        learner: LearnerId,
        #[command(flatten)]
        slot: SlotArgs,
    },
    Update {
        id: SlotId,
        #[command(flatten)]
        slot: SlotArgs,
    },
    Delete { id: SlotId },
}

#[derive(Args, Debug, Clone)]
pub struct SlotArgs {
    /// 0 = Sunday .. 6 = Saturday
    #[arg(long, value_name = "DAY")]
    pub day: u8,
    /// HH:MM or HH:MM:SS, UTC
    #[arg(long, value_parser = parse_time)]
    pub start: NaiveTime,
    #[arg(long, value_parser = parse_time)]
    pub end: NaiveTime,
    /// Cards per occurrence; omit or 0 for no limit
    #[arg(long)]
    pub capacity: Option<u32>,
}

impl SlotArgs {
    #[must_use]
    pub fn to_draft(&self) -> ReviewSlotDraft {
        ReviewSlotDraft {
            day_of_week: self.day,
            start_time: self.start,
            end_time: self.end,
            capacity: self.capacity,
        }
    }
}

impl Cli {
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

fn parse_time(raw: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|_| format!("invalid time '{raw}', expected HH:MM or HH:MM:SS"))
}
