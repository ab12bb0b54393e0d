use std::time::{Duration, Instant};

/// Source of the time animation is driven by
pub trait Clock {
    /// Time since the clock started
    fn elapsed(&self) -> Duration;
}

/// Wall-clock time since creation
#[derive(Debug)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// A clock stopped at one instant
#[cfg(test)]
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedClock(pub Duration);

#[cfg(test)]
impl Clock for FixedClock {
    fn elapsed(&self) -> Duration {
        self.0
    }
}
