//! Hour/minute accumulation with carry and human-readable rendering.

use std::fmt;

use chrono::Duration;

/// Running total of voice time for one aggregation run.
///
/// `minutes` is always normalized below 60; overflow is carried into `hours`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DurationAccumulator {
    hours: i64,
    minutes: i64,
}

impl DurationAccumulator {
    pub const fn new() -> Self {
        Self {
            hours: 0,
            minutes: 0,
        }
    }

    /// Adds an hour/minute delta, carrying whole hours out of the minutes.
    ///
    /// Both values must be non-negative; durations are clamped before they
    /// reach the accumulator.
    pub fn add(&mut self, hours: i64, minutes: i64) {
        debug_assert!(hours >= 0 && minutes >= 0, "negative delta {hours}h {minutes}m");
        self.minutes += minutes;
        self.hours += hours + self.minutes / 60;
        self.minutes %= 60;
    }

    /// Adds an elapsed duration, truncated to whole minutes.
    ///
    /// The duration is split into whole hours and the remaining minutes.
    /// Negative durations contribute nothing.
    pub fn add_duration(&mut self, elapsed: Duration) {
        let total = elapsed.num_minutes().max(0);
        self.add(total / 60, total % 60);
    }

    pub const fn hours(&self) -> i64 {
        self.hours
    }

    pub const fn minutes(&self) -> i64 {
        self.minutes
    }

    /// Comparable total, used for ranking and the zero check.
    pub const fn total_minutes(&self) -> i64 {
        self.hours * 60 + self.minutes
    }

    pub const fn is_zero(&self) -> bool {
        self.hours == 0 && self.minutes == 0
    }
}

impl fmt::Display for DurationAccumulator {
    /// Renders e.g. "2 hours and 15 minutes", "1 hour", "0 minutes".
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return f.write_str("0 minutes");
        }

        let hours = (self.hours > 0).then(|| plural(self.hours, "hour"));
        let minutes = (self.minutes > 0).then(|| plural(self.minutes, "minute"));
        match (hours, minutes) {
            (Some(h), Some(m)) => write!(f, "{h} and {m}"),
            (Some(part), None) | (None, Some(part)) => f.write_str(&part),
            (None, None) => Ok(()),
        }
    }
}

fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("{count} {unit}")
    } else {
        format!("{count} {unit}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minutes_carry_into_hours() {
        let mut acc = DurationAccumulator::new();
        acc.add(0, 45);
        acc.add(0, 30);

        assert_eq!(acc.hours(), 1);
        assert_eq!(acc.minutes(), 15);
        assert_eq!(acc.total_minutes(), 75);
        assert_eq!(acc.to_string(), "1 hour and 15 minutes");
    }

    #[test]
    fn empty_renders_zero_minutes() {
        let acc = DurationAccumulator::new();
        assert_eq!(acc.total_minutes(), 0);
        assert_eq!(acc.to_string(), "0 minutes");
    }

    #[test]
    fn zero_components_are_omitted() {
        let mut hours_only = DurationAccumulator::new();
        hours_only.add(3, 0);
        assert_eq!(hours_only.to_string(), "3 hours");

        let mut minutes_only = DurationAccumulator::new();
        minutes_only.add(0, 1);
        assert_eq!(minutes_only.to_string(), "1 minute");

        let mut both_plural = DurationAccumulator::new();
        both_plural.add(2, 59);
        assert_eq!(both_plural.to_string(), "2 hours and 59 minutes");
    }

    #[test]
    fn carry_handles_multiple_hours_of_minutes() {
        let mut acc = DurationAccumulator::new();
        acc.add(1, 150);
        assert_eq!((acc.hours(), acc.minutes()), (3, 30));
    }

    #[test]
    fn add_duration_truncates_seconds_and_splits_hours() {
        let mut acc = DurationAccumulator::new();
        acc.add_duration(Duration::minutes(125) + Duration::seconds(59));
        assert_eq!((acc.hours(), acc.minutes()), (2, 5));
    }

    #[test]
    fn add_duration_ignores_negative_elapsed() {
        let mut acc = DurationAccumulator::new();
        acc.add_duration(Duration::minutes(-30));
        assert!(acc.is_zero());
    }
}
