// segment.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of MiniGst
//
// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};

/// Sentinel returned by [`Segment::to_running_time`] for positions outside the segment.
pub const RUNNING_TIME_NONE: f64 = -1.0;

/// Maps stream positions of an element to pipeline running time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub stop: Option<f64>,
    /// Playback rate, must be strictly positive.
    pub rate: f64,
    /// Running time accumulated by previous segments.
    pub base: f64,
}

impl Default for Segment {
    fn default() -> Self {
        Self {
            start: 0.0,
            stop: None,
            rate: 1.0,
            base: 0.0,
        }
    }
}

impl Segment {
    pub fn new(start: f64, stop: Option<f64>, rate: f64, base: f64) -> Self {
        Self {
            start,
            stop,
            rate,
            base,
        }
    }

    /// Finite bounds, a strictly positive finite rate and `stop >= start`.
    pub fn is_valid(&self) -> bool {
        self.start.is_finite()
            && self.base.is_finite()
            && self.rate.is_finite()
            && self.rate > 0.0
            && self
                .stop
                .map_or(true, |stop| stop.is_finite() && stop >= self.start)
    }

    /// Running time of `position`, or `None` when it falls outside `[start, stop]`.
    pub fn running_time(&self, position: f64) -> Option<f64> {
        if position < self.start {
            return None;
        }
        if matches!(self.stop, Some(stop) if position > stop) {
            return None;
        }
        Some((position - self.start) / self.rate + self.base)
    }

    /// Same as [`Segment::running_time`] with `-1.0` for out-of-segment positions.
    pub fn to_running_time(&self, position: f64) -> f64 {
        self.running_time(position).unwrap_or(RUNNING_TIME_NONE)
    }
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.stop {
            Some(stop) => write!(
                f,
                "Segment(start={:.3}s, stop={:.3}s, rate={}, base={:.3}s)",
                self.start, stop, self.rate, self.base
            ),
            None => write!(
                f,
                "Segment(start={:.3}s, stop=none, rate={}, base={:.3}s)",
                self.start, self.rate, self.base
            ),
        }
    }
}
