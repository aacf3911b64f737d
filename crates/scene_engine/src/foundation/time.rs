//! Time management utilities

use std::time::{Duration, Instant};

/// Fires once every `interval` of monotonic time
///
/// The first call to [`IntervalTimer::tick`] always fires so a freshly created
/// consumer does its work on the first frame.
#[derive(Debug, Clone)]
pub struct IntervalTimer {
    interval: Duration,
    last_fired: Option<Instant>,
}

impl IntervalTimer {
    /// Create a timer with the given period
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fired: None,
        }
    }

    /// Current period
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Change the period; the running measurement is kept
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Force the next `tick` to fire
    pub fn expire(&mut self) {
        self.last_fired = None;
    }

    /// Time since the timer last fired, `None` before the first tick
    pub fn since_last(&self) -> Option<Duration> {
        self.last_fired.map(|at| at.elapsed())
    }

    /// Returns true (and restarts the measurement) when the interval has elapsed
    pub fn tick(&mut self) -> bool {
        let due = self.since_last().map_or(true, |elapsed| elapsed >= self.interval);
        if due {
            self.last_fired = Some(Instant::now());
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_timer_fires_first_tick_then_waits() {
        let mut timer = IntervalTimer::new(Duration::from_secs(3600));
        assert!(timer.since_last().is_none());
        assert!(timer.tick());
        assert!(!timer.tick());
        assert!(timer.since_last().is_some());
        timer.expire();
        assert!(timer.tick());
    }

    #[test]
    fn test_zero_interval_always_fires() {
        let mut timer = IntervalTimer::new(Duration::ZERO);
        assert!(timer.tick());
        assert!(timer.tick());
    }

    #[test]
    fn test_shorter_interval_applies_to_running_measurement() {
        let mut timer = IntervalTimer::new(Duration::from_secs(3600));
        assert!(timer.tick());
        timer.set_interval(Duration::ZERO);
        assert_eq!(timer.interval(), Duration::ZERO);
        assert!(timer.tick());
    }
}
