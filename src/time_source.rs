//! Time abstraction for real and test clocks.
//!
//! The scheduler never reads the wall clock or sleeps directly; it goes
//! through a `TimeSource` handed in at construction. Production uses
//! `RealTimeSource`; tests drive the loop with `ManualTimeSource` so a
//! full day of scheduling runs in microseconds.

use std::time::Duration;

use chrono::{DateTime, Local};

pub trait TimeSource: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Local>;

    /// Block for `duration` (or account for it, in tests).
    fn sleep(&self, duration: Duration);
}

/// Production clock backed by the system time.
pub struct RealTimeSource;

impl TimeSource for RealTimeSource {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Hand-cranked clock for tests. `sleep` advances the clock instantly and
/// records the requested duration for assertions.
#[cfg(any(test, feature = "testing-support"))]
pub struct ManualTimeSource {
    now: std::sync::Mutex<DateTime<Local>>,
    slept: std::sync::Mutex<Vec<Duration>>,
}

#[cfg(any(test, feature = "testing-support"))]
impl ManualTimeSource {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            now: std::sync::Mutex::new(start),
            slept: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Durations passed to `sleep`, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }

    pub fn set(&self, now: DateTime<Local>) {
        *self.now.lock().unwrap() = now;
    }
}

#[cfg(any(test, feature = "testing-support"))]
impl TimeSource for ManualTimeSource {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock().unwrap()
    }

    fn sleep(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero());
        self.slept.lock().unwrap().push(duration);
    }
}
