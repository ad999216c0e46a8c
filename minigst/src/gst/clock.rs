// clock.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of MiniGst
//
// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline clock.
//!
//! Time is expressed in seconds (`f64`) relative to the instant the clock
//! was started. A clock that was never started reads 0 and refuses to
//! schedule waits.

use parking_lot::RwLock;
use std::time::{Duration, Instant};
use tracing::trace;

/// Result of a clock wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockReturn {
    /// The target time was reached (possibly late).
    Ok,
    /// The clock is not running; the caller must not synchronize.
    BadTime,
}

#[derive(Debug, Default)]
pub struct Clock {
    start_instant: RwLock<Option<Instant>>,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current instant as the clock epoch.
    pub fn start(&self) {
        *self.start_instant.write() = Some(Instant::now());
    }

    /// Forget the epoch. `now()` reads 0 until the next `start()`.
    pub fn stop(&self) {
        *self.start_instant.write() = None;
    }

    pub fn is_started(&self) -> bool {
        self.start_instant.read().is_some()
    }

    /// Seconds elapsed since `start()`, or 0 if the clock is stopped.
    pub fn now(&self) -> f64 {
        match *self.start_instant.read() {
            Some(start) => start.elapsed().as_secs_f64(),
            None => 0.0,
        }
    }

    /// Block the calling thread until the clock reads `target`.
    ///
    /// Returns the wait result and the jitter `now() - target` measured after
    /// waking: positive means late, negative early. A target that is already
    /// due returns immediately with a non-negative jitter.
    pub fn wait_until(&self, target: f64) -> (ClockReturn, f64) {
        if !self.is_started() {
            return (ClockReturn::BadTime, 0.0);
        }

        let current = self.now();
        let wait = target - current;
        if wait <= 0.0 {
            return (ClockReturn::Ok, -wait);
        }
        // NaN and out of range targets cannot be scheduled.
        let Ok(duration) = Duration::try_from_secs_f64(wait) else {
            trace!("Clock cannot schedule target {}", target);
            return (ClockReturn::BadTime, 0.0);
        };

        trace!("Clock waiting {:.3}s for target {:.3}s", wait, target);
        std::thread::sleep(duration);

        (ClockReturn::Ok, self.now() - target)
    }
}

impl std::fmt::Display for Clock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_started() {
            write!(f, "Clock(time={:.3}s)", self.now())
        } else {
            write!(f, "Clock(stopped)")
        }
    }
}
