//! Time management for the simulation
//!
//! Simulation time is the timestamp (milliseconds) of the most recently
//! dispatched event. It only moves when the scheduler hands out an event and it
//! never moves backwards.

use serde::{Deserialize, Serialize};

/// Monotonic simulation clock in milliseconds
///
/// # Example
/// ```
/// use pcn_simulator_core_rs::SimClock;
///
/// let mut clock = SimClock::new();
/// assert_eq!(clock.now(), 0);
///
/// clock.advance_to(25);
/// assert_eq!(clock.now(), 25);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimClock {
    now: u64,
}

impl SimClock {
    pub fn new() -> Self {
        Self { now: 0 }
    }

    /// Current simulation time (ms)
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Move the clock to `time`
    ///
    /// # Panics
    /// Panics if `time` is earlier than the current time. The scheduler never
    /// hands out such an event, so this is a bookkeeping bug.
    pub fn advance_to(&mut self, time: u64) {
        assert!(
            time >= self.now,
            "simulation time regressed from {} to {}",
            self.now,
            time
        );
        self.now = time;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_to_same_time_is_allowed() {
        let mut clock = SimClock::new();
        clock.advance_to(10);
        clock.advance_to(10);
        assert_eq!(clock.now(), 10);
    }

    #[test]
    #[should_panic(expected = "simulation time regressed")]
    fn test_regression_panics() {
        let mut clock = SimClock::new();
        clock.advance_to(10);
        clock.advance_to(9);
    }
}
