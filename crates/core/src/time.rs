use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Source of "now" for services, swappable for a fixed instant in tests.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    System,
    Fixed(DateTime<Utc>),
}

impl Clock {
    #[must_use]
    pub fn system() -> Self {
        Self::System
    }

    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Fixed(t) => *t,
        }
    }

    /// Move a fixed clock forward. No effect on the system clock.
    pub fn advance(&mut self, delta: Duration) {
        if let Clock::Fixed(t) = self {
            *t += delta;
        }
    }
}

/// Convert a (possibly fractional) day count into a `Duration` with
/// millisecond precision. Non-finite or negative input yields zero.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn days_to_duration(days: f64) -> Duration {
    if !days.is_finite() || days <= 0.0 {
        return Duration::zero();
    }
    // `as` saturates, so absurd inputs land on the largest representable span.
    Duration::milliseconds((days * MILLIS_PER_DAY).round() as i64)
}

/// Convert a `Duration` into fractional days.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn duration_to_days(duration: Duration) -> f64 {
    duration.num_milliseconds() as f64 / MILLIS_PER_DAY
}

/// First instant of the UTC day containing `at`.
#[must_use]
pub fn start_of_day(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Last representable instant of the UTC day containing `at`.
#[must_use]
pub fn end_of_day(at: DateTime<Utc>) -> DateTime<Utc> {
    start_of_day(at) + Duration::days(1) - Duration::nanoseconds(1)
}

/// Combine a calendar date and a wall-clock time into a UTC instant.
#[must_use]
pub fn at_time(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    date.and_time(time).and_utc()
}

/// Deterministic timestamp for tests and examples (2023-11-14T22:13:20Z, a Tuesday).
pub const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

/// Returns a deterministic `DateTime<Utc>` for tests and doc examples.
///
/// # Panics
///
/// Panics if the fixed timestamp cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(FIXED_TEST_TIMESTAMP, 0)
        .expect("fixed timestamp should be valid")
}

/// Returns a `Clock` fixed at the deterministic test timestamp.
#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::fixed(fixed_now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn fractional_days_round_trip_through_duration() {
        let d = days_to_duration(2.5);
        assert_eq!(d, Duration::hours(60));
        assert!((duration_to_days(d) - 2.5).abs() < 1e-9);
    }

    #[test]
    fn negative_and_nan_days_are_zero() {
        assert_eq!(days_to_duration(-3.0), Duration::zero());
        assert_eq!(days_to_duration(f64::NAN), Duration::zero());
    }

    #[test]
    fn day_bounds_enclose_instant() {
        let now = fixed_now();
        let start = start_of_day(now);
        let end = end_of_day(now);
        assert!(start <= now && now <= end);
        assert_eq!(start.hour(), 0);
        assert_eq!(end.hour(), 23);
        assert_eq!(end.date_naive(), now.date_naive());
    }

    #[test]
    fn fixed_clock_advances() {
        let mut clock = fixed_clock();
        clock.advance(Duration::days(1));
        assert_eq!(clock.now(), fixed_now() + Duration::days(1));

        let mut system = Clock::system();
        system.advance(Duration::days(1));
        assert!(matches!(system, Clock::System));
    }
}
