//! Game clock and fixed-timestep pacing
//!
//! Time keeping for the simulation. The clock itself is a thin wrapper over
//! the platform monotonic clock; [`FixedStep`] turns its instants into a
//! whole number of logic ticks per call, clamping runaway deltas so a debug
//! pause or system stall cannot cause a catch-up burst.

use std::time::{Duration, Instant};

use tracing::debug;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Time source for the simulation
///
/// All reads come from the platform monotonic clock, so values are
/// non-decreasing and immune to wall-clock adjustments. Clock reads cannot
/// fail; a platform without a monotonic source cannot run the player at all.
pub struct GameClock;

impl GameClock {
    /// Target frames per second for the game simulation
    pub const SIMULATION_FPS: u32 = 60;

    /// The amount of time each logical frame should take
    pub const SIMULATION_TIME_STEP: Duration = Self::time_step_from_fps(Self::SIMULATION_FPS);

    /// Get the current time
    pub fn now() -> Instant {
        Instant::now()
    }

    /// Sleep for at least the specified duration
    ///
    /// Best effort: the OS may wake us late, never early.
    pub fn sleep_for(duration: Duration) {
        std::thread::sleep(duration);
    }

    /// Get the timestep for a given frames per second value
    ///
    /// One second converted to nanoseconds and divided by `fps`, truncating
    /// to whole nanoseconds. `const`, so timestep constants are computed once
    /// at compile time instead of on every frame.
    pub const fn time_step_from_fps(fps: u32) -> Duration {
        Duration::from_nanos(NANOS_PER_SEC / fps as u64)
    }

    /// Name of the underlying clock type
    pub const fn name() -> &'static str {
        "std::time::Instant"
    }

    /// Log clock identity and the configured simulation timestep
    pub fn log_clock_info() {
        debug!(
            "Clock: {} ({}fps, {:?} timestep)",
            Self::name(),
            Self::SIMULATION_FPS,
            Self::SIMULATION_TIME_STEP,
        );
    }
}

/// Fixed-timestep accumulator
///
/// Feed it `GameClock::now()` once per loop iteration; it returns how many
/// whole logic ticks have elapsed. Deltas above `max_delta` are clamped so a
/// long stall produces a bounded number of catch-up ticks.
pub struct FixedStep {
    step: Duration,
    max_delta: Duration,
    accumulator: Duration,
    last_update: Option<Instant>,
}

impl FixedStep {
    /// Create an accumulator ticking at `fps`
    pub fn new(fps: u32) -> Self {
        Self {
            step: GameClock::time_step_from_fps(fps),
            max_delta: Duration::from_millis(100),
            accumulator: Duration::ZERO,
            last_update: None,
        }
    }

    /// Advance to `now`, returning the number of whole ticks elapsed
    pub fn advance(&mut self, now: Instant) -> u32 {
        let delta = match self.last_update {
            Some(last) => {
                let d = now.saturating_duration_since(last);
                if d > self.max_delta { self.max_delta } else { d }
            }
            // First call: run exactly one tick
            None => self.step,
        };
        self.last_update = Some(now);
        self.accumulator += delta;

        let mut ticks = 0u32;
        while self.accumulator >= self.step {
            self.accumulator -= self.step;
            ticks += 1;
        }
        ticks
    }

    /// Interpolation factor for rendering between ticks (0.0..1.0)
    pub fn alpha(&self) -> f32 {
        self.accumulator.as_secs_f32() / self.step.as_secs_f32()
    }
}
