#![forbid(unsafe_code)]

pub mod analytics_service;
pub mod app_services;
pub mod error;
pub mod review_service;
pub mod slot_service;

pub use review_core::Clock;

pub use analytics_service::AnalyticsService;
pub use app_services::{EngineServices, EngineSettings};
pub use error::{
    AnalyticsServiceError, EngineServicesError, ReviewServiceError, SlotServiceError,
};
pub use review_service::{QueueOptions, RatingReceipt, RatingSubmission, ReviewService};
pub use slot_service::SlotService;
