use std::sync::Arc;

use review_core::{
    analytics::{AnalyticsAggregator, AnalyticsSnapshot},
    model::{Attempt, LearnerId},
    time::Clock,
};
use storage::repository::{AttemptRepository, ReviewStateRepository};

use crate::error::AnalyticsServiceError;

/// Read-only learner statistics, recomputed on every call.
#[derive(Clone)]
pub struct AnalyticsService {
    clock: Clock,
    aggregator: AnalyticsAggregator,
    states: Arc<dyn ReviewStateRepository>,
    attempts: Arc<dyn AttemptRepository>,
}

impl AnalyticsService {
    #[must_use]
    pub fn new(
        clock: Clock,
        aggregator: AnalyticsAggregator,
        states: Arc<dyn ReviewStateRepository>,
        attempts: Arc<dyn AttemptRepository>,
    ) -> Self {
        Self {
            clock,
            aggregator,
            states,
            attempts,
        }
    }

    /// # Errors
    ///
    /// Returns `AnalyticsServiceError::Storage` if repository access fails.
    pub async fn snapshot(
        &self,
        learner_id: LearnerId,
    ) -> Result<AnalyticsSnapshot, AnalyticsServiceError> {
        let now = self.clock.now();
        let states = self.states.states_for_learner(learner_id).await?;
        let attempts: Vec<Attempt> = self
            .attempts
            .attempts_since(learner_id, self.aggregator.window_start(now))
            .await?
            .into_iter()
            .map(|record| record.attempt)
            .collect();

        let snapshot = self.aggregator.snapshot(now, &states, &attempts);
        tracing::debug!(
            learner_id = %learner_id,
            due_today = snapshot.due_today,
            attempts = snapshot.total_attempts,
            "computed analytics snapshot"
        );
        Ok(snapshot)
    }
}
