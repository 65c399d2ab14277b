//! Narrow interfaces to the collaborators the scheduler consults every cycle:
//! a monotonic time source and the robot's disabled flag.
//!
//! Both are shared handles (`Rc` + `Cell`) because the scheduler is strictly
//! single-threaded and the same clock or mode flag is usually held by the
//! driver loop as well.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Monotonic time source.
pub trait Clock {
    /// Time elapsed since an arbitrary, fixed epoch.
    fn now(&self) -> Duration;
}

/// Robot mode query.
pub trait RobotState {
    /// Returns true while the robot is disabled.
    fn is_disabled(&self) -> bool;
}

/// Clock backed by `std::time::Instant`.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    /// Creates a clock whose epoch is now.
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }
}

/// Manually advanced clock for simulation and tests.
///
/// Clones share the same time value.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Duration>>,
}

impl ManualClock {
    /// Creates a clock reading zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the current time.
    pub fn set(&self, now: Duration) {
        self.now.set(now);
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }
}

/// Shared enabled/disabled flag.
///
/// Clones share the same flag. A new mode starts enabled.
#[derive(Debug, Clone, Default)]
pub struct RobotMode {
    disabled: Rc<Cell<bool>>,
}

impl RobotMode {
    /// Creates an enabled mode flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether the robot is disabled.
    pub fn set_disabled(&self, disabled: bool) {
        self.disabled.set(disabled);
    }
}

impl RobotState for RobotMode {
    fn is_disabled(&self) -> bool {
        self.disabled.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new();
        let view = clock.clone();

        clock.advance(Duration::from_millis(20));
        clock.advance(Duration::from_millis(20));
        assert_eq!(view.now(), Duration::from_millis(40));

        view.set(Duration::from_secs(2));
        assert_eq!(clock.now(), Duration::from_secs(2));
    }

    #[test]
    fn test_monotonic_clock_moves_forward() {
        let clock = MonotonicClock::new();
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }

    #[test]
    fn test_robot_mode() {
        let mode = RobotMode::new();
        assert!(!mode.is_disabled());

        let view = mode.clone();
        mode.set_disabled(true);
        assert!(view.is_disabled());
    }
}
