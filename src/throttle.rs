//! Pacing for warehouse job submission.
//!
//! The warehouse caps table-mutation operations per window. With `W` workers
//! each pausing for `D` after every job, at most `W / D` jobs per second are
//! submitted, so `D = (W / updates) * window` keeps the pool under the ceiling.

use std::time::Duration;

/// Delay applied by a worker after each load job, success or failure.
pub trait Throttle: Send + Sync {
    fn delay(&self) -> Duration;

    fn pause(&self) {
        let delay = self.delay();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
}

/// Constant per-job delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay(Duration);

impl FixedDelay {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self(delay)
    }

    /// `max((pool_width / updates_per_window) * window, floor)`.
    ///
    /// A zero `updates_per_window` leaves only the floor.
    #[must_use]
    pub fn for_ceiling(
        pool_width: usize,
        updates_per_window: u32,
        window: Duration,
        floor: Duration,
    ) -> Self {
        if updates_per_window == 0 {
            return Self(floor);
        }
        #[allow(clippy::cast_precision_loss)]
        let share = pool_width as f64 / f64::from(updates_per_window);
        Self(window.mul_f64(share).max(floor))
    }
}

impl Throttle for FixedDelay {
    fn delay(&self) -> Duration {
        self.0
    }
}

/// No pacing at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoThrottle;

impl Throttle for NoThrottle {
    fn delay(&self) -> Duration {
        Duration::ZERO
    }

    fn pause(&self) {}
}
