use serde::{Deserialize, Serialize};
use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ParamsError {
    #[error("ease floor must be > 0, got {0}")]
    InvalidEaseFloor(f64),

    #[error("ease ceiling ({ceiling}) must be >= ease floor ({floor})")]
    InvalidEaseBounds { floor: f64, ceiling: f64 },

    #[error("initial ease {0} lies outside the ease bounds")]
    InvalidInitialEase(f64),

    #[error("ease adjustments must be non-negative and finite")]
    InvalidEaseAdjustment,

    #[error("hard multiplier must be in (0, 1), got {0}")]
    InvalidHardMultiplier(f64),

    #[error("easy multiplier must be > 1, got {0}")]
    InvalidEasyMultiplier(f64),

    #[error("learning step must be > 0 days, got {0}")]
    InvalidLearningStep(f64),

    #[error("graduation intervals must satisfy learning step <= good <= easy")]
    InvalidGraduationIntervals,

    #[error("graduation repetitions must be >= 1")]
    InvalidGraduationRepetitions,

    #[error("mastery threshold must exceed the graduation interval, got {0}")]
    InvalidMasteryThreshold(f64),

    #[error("mastery repetitions must be >= graduation repetitions")]
    InvalidMasteryRepetitions,

    #[error("maximum interval must be >= mastery threshold, got {0}")]
    InvalidMaxInterval(f64),
}

//
// ─── PARAMETERS ────────────────────────────────────────────────────────────────
//

/// Tunable constants of the SM-2 style interval scheduler.
///
/// The defaults reproduce the classic progression for a card answered
/// `good` every time: 1 day, then `1 × 2.5`, then `2.5 × 2.5` days.
/// Every field can be overridden from configuration; missing fields fall
/// back to the default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerParams {
    pub initial_ease: f64,
    pub ease_floor: f64,
    pub ease_ceiling: f64,
    pub again_ease_penalty: f64,
    pub hard_ease_penalty: f64,
    pub easy_ease_bonus: f64,
    pub hard_multiplier: f64,
    pub easy_multiplier: f64,
    /// Interval assigned after a lapse, in days (may be fractional).
    pub learning_step_days: f64,
    /// Interval for the first `good` after `new` or a lapse.
    pub graduation_interval_days: f64,
    /// Interval for the first `easy` after `new` or a lapse.
    pub easy_graduation_days: f64,
    /// Consecutive successful ratings needed to leave `learning`.
    pub graduation_repetitions: u32,
    pub mastery_threshold_days: f64,
    pub mastery_min_repetitions: u32,
    /// Upper bound on any interval, in days.
    pub max_interval_days: f64,
}

impl Default for SchedulerParams {
    fn default() -> Self {
        Self {
            initial_ease: 2.5,
            ease_floor: 1.3,
            ease_ceiling: 4.0,
            again_ease_penalty: 0.20,
            hard_ease_penalty: 0.15,
            easy_ease_bonus: 0.15,
            hard_multiplier: 0.8,
            easy_multiplier: 1.3,
            learning_step_days: 1.0,
            graduation_interval_days: 1.0,
            easy_graduation_days: 4.0,
            graduation_repetitions: 2,
            mastery_threshold_days: 21.0,
            mastery_min_repetitions: 3,
            max_interval_days: 365.0,
        }
    }
}

impl SchedulerParams {
    /// Check every constraint between the parameters.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint as a `ParamsError`.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if !self.ease_floor.is_finite() || self.ease_floor <= 0.0 {
            return Err(ParamsError::InvalidEaseFloor(self.ease_floor));
        }
        if !self.ease_ceiling.is_finite() || self.ease_ceiling < self.ease_floor {
            return Err(ParamsError::InvalidEaseBounds {
                floor: self.ease_floor,
                ceiling: self.ease_ceiling,
            });
        }
        if !(self.ease_floor..=self.ease_ceiling).contains(&self.initial_ease) {
            return Err(ParamsError::InvalidInitialEase(self.initial_ease));
        }
        let adjustments = [
            self.again_ease_penalty,
            self.hard_ease_penalty,
            self.easy_ease_bonus,
        ];
        if adjustments.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(ParamsError::InvalidEaseAdjustment);
        }
        if !(self.hard_multiplier > 0.0 && self.hard_multiplier < 1.0) {
            return Err(ParamsError::InvalidHardMultiplier(self.hard_multiplier));
        }
        if !self.easy_multiplier.is_finite() || self.easy_multiplier <= 1.0 {
            return Err(ParamsError::InvalidEasyMultiplier(self.easy_multiplier));
        }
        if !self.learning_step_days.is_finite() || self.learning_step_days <= 0.0 {
            return Err(ParamsError::InvalidLearningStep(self.learning_step_days));
        }
        if !(self.learning_step_days <= self.graduation_interval_days
            && self.graduation_interval_days <= self.easy_graduation_days
            && self.easy_graduation_days.is_finite())
        {
            return Err(ParamsError::InvalidGraduationIntervals);
        }
        if self.graduation_repetitions == 0 {
            return Err(ParamsError::InvalidGraduationRepetitions);
        }
        if !self.mastery_threshold_days.is_finite()
            || self.mastery_threshold_days <= self.graduation_interval_days
        {
            return Err(ParamsError::InvalidMasteryThreshold(
                self.mastery_threshold_days,
            ));
        }
        if self.mastery_min_repetitions < self.graduation_repetitions {
            return Err(ParamsError::InvalidMasteryRepetitions);
        }
        if !self.max_interval_days.is_finite()
            || self.max_interval_days < self.mastery_threshold_days
            || self.max_interval_days < self.easy_graduation_days
        {
            return Err(ParamsError::InvalidMaxInterval(self.max_interval_days));
        }
        Ok(())
    }

    /// Clamp an interval into `[0, max_interval_days]`, mapping NaN to 0.
    #[must_use]
    pub fn clamp_interval(&self, days: f64) -> f64 {
        if days.is_nan() || days < 0.0 {
            return 0.0;
        }
        days.min(self.max_interval_days)
    }

    /// Clamp an ease factor into `[ease_floor, ease_ceiling]`.
    #[must_use]
    pub fn clamp_ease(&self, ease: f64) -> f64 {
        if ease.is_nan() {
            return self.ease_floor;
        }
        ease.clamp(self.ease_floor, self.ease_ceiling)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
