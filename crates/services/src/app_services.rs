use std::sync::Arc;

use serde::{Deserialize, Serialize};

use review_core::analytics::{AnalyticsAggregator, DEFAULT_WINDOW_DAYS};
use review_core::model::SchedulerParams;
use review_core::scheduler::Scheduler;
use storage::repository::Storage;

use crate::Clock;
use crate::analytics_service::AnalyticsService;
use crate::error::EngineServicesError;
use crate::review_service::ReviewService;
use crate::slot_service::SlotService;

/// Tunables shared by the engine services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    pub scheduler: SchedulerParams,
    pub analytics_window_days: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            scheduler: SchedulerParams::default(),
            analytics_window_days: DEFAULT_WINDOW_DAYS,
        }
    }
}

/// Assembles the review, slot and analytics services over one storage backend.
#[derive(Clone)]
pub struct EngineServices {
    review: Arc<ReviewService>,
    slots: Arc<SlotService>,
    analytics: Arc<AnalyticsService>,
}

impl EngineServices {
    /// Build services over an existing storage backend.
    ///
    /// # Errors
    ///
    /// Returns `EngineServicesError::Scheduler` if the scheduler parameters are invalid.
    pub fn new(
        storage: &Storage,
        clock: Clock,
        settings: EngineSettings,
    ) -> Result<Self, EngineServicesError> {
        let scheduler = Scheduler::try_new(settings.scheduler)?;

        let review = Arc::new(ReviewService::new(
            clock,
            scheduler,
            Arc::clone(&storage.states),
            Arc::clone(&storage.attempts),
            Arc::clone(&storage.reviews),
            Arc::clone(&storage.slots),
        ));
        let slots = Arc::new(SlotService::new(Arc::clone(&storage.slots)));
        let analytics = Arc::new(AnalyticsService::new(
            clock,
            AnalyticsAggregator::new(settings.analytics_window_days),
            Arc::clone(&storage.states),
            Arc::clone(&storage.attempts),
        ));

        Ok(Self {
            review,
            slots,
            analytics,
        })
    }

    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `EngineServicesError` if storage initialization fails or the
    /// scheduler parameters are invalid.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        settings: EngineSettings,
    ) -> Result<Self, EngineServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Self::new(&storage, clock, settings)
    }

    #[must_use]
    pub fn review(&self) -> Arc<ReviewService> {
        Arc::clone(&self.review)
    }

    #[must_use]
    pub fn slots(&self) -> Arc<SlotService> {
        Arc::clone(&self.slots)
    }

    #[must_use]
    pub fn analytics(&self) -> Arc<AnalyticsService> {
        Arc::clone(&self.analytics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use review_core::time::fixed_now;

    #[test]
    fn invalid_scheduler_params_fail_startup() {
        let mut settings = EngineSettings::default();
        settings.scheduler.ease_floor = 0.0;
        let err = EngineServices::new(&Storage::in_memory(), Clock::fixed(fixed_now()), settings);
        assert!(matches!(err, Err(EngineServicesError::Scheduler(_))));
    }

    #[test]
    fn default_settings_build() {
        let services = EngineServices::new(
            &Storage::in_memory(),
            Clock::fixed(fixed_now()),
            EngineSettings::default(),
        )
        .unwrap();
        assert_eq!(services.review().now(), fixed_now());
    }
}
