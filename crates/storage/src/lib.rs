pub mod repository;
pub mod sqlite;

pub use repository::{
    AppliedRecord, AttemptRepository, InMemoryRepository, ReviewPersistence,
    ReviewStateRepository, SlotRepository, Storage, StorageError,
};
