//! Domain layer of the review scheduling engine.
//!
//! Everything here is pure: callers load state, hand it in together with
//! `now`, and persist whatever comes back.

pub mod analytics;
pub mod calendar;
pub mod error;
pub mod model;
pub mod queue;
pub mod scheduler;
pub mod time;

pub use error::Error;
pub use time::Clock;
