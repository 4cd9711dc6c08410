//! Time source used by the scanner and everything driving it.
//!
//! All waiting is a blocking sleep on the caller's thread. Going through [Clock] instead of
//! calling [std::thread::sleep] directly lets the whole pipeline run in virtual time with a
//! [ManualClock].
use std::fmt::Debug;
use std::time::{Duration, Instant};

pub trait Clock: Debug {
    /// Gets the current instant.
    fn now(&self) -> Instant;

    /// Blocks the caller for the given duration.
    fn sleep(&self, duration: Duration);
}

/// The wall clock of the host.
#[derive(Copy, Clone, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// A virtual clock that only moves when slept on or advanced explicitly.
///
/// Sleeping returns immediately after moving the clock forward, so timed loops finish
/// instantly while still observing the durations they asked for.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed: std::cell::Cell<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: std::cell::Cell::new(Duration::ZERO),
        }
    }

    /// Gets the virtual time passed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        self.elapsed.get()
    }

    pub fn advance(&self, duration: Duration) {
        self.elapsed.set(self.elapsed.get() + duration);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed.get()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
