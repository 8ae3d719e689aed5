mod cli;
mod config;
mod logging;
mod render;

use cli::{Cli, Command, SlotCommand};
use config::{AppConfig, prepare_sqlite_file};
use services::{Clock, EngineServices, QueueOptions, RatingSubmission};

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();
    let mut config = AppConfig::from_env()?;
    if let Some(db) = cli.db.clone() {
        config = config.with_db_url(db);
    }
    logging::init_tracing(&config.log_level);

    let clock = cli.now.map_or_else(Clock::system, Clock::fixed);

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&config.db_url)?;
    let engine = EngineServices::new_sqlite(&config.db_url, clock, config.settings.clone()).await?;
    tracing::debug!(db_url = %config.db_url, "engine ready");

    let output = match cli.command {
        Command::Queue {
            learner,
            cards,
            include_new,
            max_new,
        } => {
            let options = QueueOptions {
                include_new,
                max_new,
            };
            let queue = engine.review().due_queue(learner, &cards, options).await?;
            render::queue(&queue)
        }
        Command::Rate {
            learner,
            card,
            rating,
            presented_at,
            expected_version,
        } => {
            let submission = RatingSubmission {
                learner_id: learner,
                flashcard_id: card,
                rating,
                presented_at: presented_at.unwrap_or_else(|| clock.now()),
                expected_version,
            };
            let receipt = engine.review().submit_rating(submission).await?;
            render::receipt(&receipt)
        }
        Command::Preview { learner, card } => {
            let preview = engine.review().preview(learner, card).await?;
            render::preview(&preview)
        }
        Command::Slots { action } => match action {
            SlotCommand::List { learner } => render::slots(&engine.slots().list(learner).await?),
            SlotCommand::Add { learner, slot } => {
                render::slot(&engine.slots().create(learner, slot.to_draft()).await?)
            }
            SlotCommand::Update { id, slot } => {
                render::slot(&engine.slots().update(id, slot.to_draft()).await?)
            }
            SlotCommand::Delete { id } => {
                engine.slots().delete(id).await?;
                format!("deleted slot {id}\n")
            }
        },
        Command::Analytics { learner } => {
            render::analytics(&engine.analytics().snapshot(learner).await?)
        }
        Command::Forget { card } => {
            let removed = engine.review().remove_flashcard(card).await?;
            format!("removed {removed} review states for card {card}\n")
        }
    };

    print!("{output}");
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
