//! Fixed timestep accumulator
//!
//! ```ignore
//! let mut fixed = FixedTime::new(60);
//! // In the tick:
//! let FixedSteps { steps, .. } = fixed.tick_capped(delta, 8);
//! for _ in 0..steps {
//!     // Run physics at fixed 60 Hz
//! }
//! ```

use std::time::Duration;

/// Outcome of feeding one variable delta into a [`FixedTime`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedSteps {
    /// Fixed steps to run now
    pub steps: u32,
    /// Whole steps discarded because of the cap
    pub dropped: Duration,
}

/// Fixed timestep for deterministic updates
#[derive(Clone, Debug)]
pub struct FixedTime {
    /// Fixed timestep duration
    timestep: Duration,
    /// Accumulated time from variable frame rate
    accumulator: Duration,
}

impl FixedTime {
    /// Create new FixedTime with given frequency (Hz)
    pub fn new(hz: u32) -> Self {
        Self::from_duration(Duration::from_secs_f64(1.0 / f64::from(hz.max(1))))
    }

    /// Create with explicit timestep duration
    pub fn from_duration(timestep: Duration) -> Self {
        Self {
            timestep: timestep.max(Duration::from_nanos(1)),
            accumulator: Duration::ZERO,
        }
    }

    /// Update accumulator and return number of fixed steps to run
    pub fn tick(&mut self, delta: Duration) -> u32 {
        self.tick_capped(delta, u32::MAX).steps
    }

    /// Like [`FixedTime::tick`], but never more than `max_steps`.
    ///
    /// Whole steps beyond the cap are dropped; the fractional remainder is
    /// kept for the next tick.
    pub fn tick_capped(&mut self, delta: Duration, max_steps: u32) -> FixedSteps {
        self.accumulator += delta;

        let step_nanos = self.timestep.as_nanos();
        let available = self.accumulator.as_nanos() / step_nanos;
        let steps = available.min(u128::from(max_steps));

        self.accumulator -= Duration::from_nanos((available * step_nanos) as u64);
        FixedSteps {
            steps: steps as u32,
            dropped: Duration::from_nanos(((available - steps) * step_nanos) as u64),
        }
    }

    /// Get fixed timestep duration
    pub fn timestep(&self) -> Duration {
        self.timestep
    }

    /// Time accumulated toward the next step
    pub fn overstep(&self) -> Duration {
        self.accumulator
    }

    /// Get overstep as fraction of timestep (0.0 to 1.0)
    pub fn overstep_fraction(&self) -> f32 {
        self.accumulator.as_secs_f32() / self.timestep.as_secs_f32()
    }
}

impl Default for FixedTime {
    fn default() -> Self {
        Self::new(60) // 60 Hz default
    }
}
