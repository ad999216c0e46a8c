// buffer.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of MiniGst
//
// SPDX-License-Identifier: GPL-3.0-only

use serde_json::Value;
use std::sync::Arc;

/// Status flags carried by a [`Buffer`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BufferFlags(u32);

impl BufferFlags {
    pub const NONE: Self = Self(0);
    /// Discontinuity in the stream (data was lost before this buffer).
    pub const DISCONT: Self = Self(1 << 0);
    /// End of stream marker.
    pub const EOS: Self = Self(1 << 1);
    /// Buffer carries a complete media segment.
    pub const SEGMENT: Self = Self(1 << 2);
    /// Buffer is not decodable by itself.
    pub const DELTA_UNIT: Self = Self(1 << 3);

    const NAMES: [(Self, &'static str); 4] = [
        (Self::DISCONT, "DISCONT"),
        (Self::EOS, "EOS"),
        (Self::SEGMENT, "SEGMENT"),
        (Self::DELTA_UNIT, "DELTA_UNIT"),
    ];

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn contains(self, flag: Self) -> bool {
        (self.0 & flag.0) == flag.0 && flag.0 != 0
    }

    #[inline]
    pub const fn insert(self, flag: Self) -> Self {
        Self(self.0 | flag.0)
    }

    #[inline]
    pub const fn remove(self, flag: Self) -> Self {
        Self(self.0 & !flag.0)
    }
}

impl std::ops::BitOr for BufferFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.insert(rhs)
    }
}

impl std::fmt::Display for BufferFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "NONE");
        }
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "{}", names.join("|"))
    }
}

/// A timestamped unit of data moving through the pipeline.
///
/// Buffers are moved by value from pad to pad. Cloning a buffer shares its
/// payload: the payload is writable only while a single holder references
/// it, and [`Buffer::payload_mut`] copies it first otherwise.
#[derive(Debug, Clone)]
pub struct Buffer {
    /// Presentation timestamp in seconds.
    pub pts: f64,
    /// Duration in seconds.
    pub duration: f64,
    /// Position of the buffer in its producer's output.
    pub sequence: u64,
    pub flags: BufferFlags,
    payload: Arc<Value>,
}

impl Buffer {
    pub fn new(pts: f64, duration: f64, payload: Value) -> Self {
        Self {
            pts,
            duration,
            sequence: 0,
            flags: BufferFlags::NONE,
            payload: Arc::new(payload),
        }
    }

    /// Terminal buffer: EOS flag set and empty payload.
    pub fn eos(pts: f64) -> Self {
        Self::new(pts, 0.0, Value::Null).with_flags(BufferFlags::EOS)
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn with_flags(mut self, flags: BufferFlags) -> Self {
        self.flags = self.flags.insert(flags);
        self
    }

    pub fn has_flag(&self, flag: BufferFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn set_flag(&mut self, flag: BufferFlags) {
        self.flags = self.flags.insert(flag);
    }

    pub fn unset_flag(&mut self, flag: BufferFlags) {
        self.flags = self.flags.remove(flag);
    }

    pub fn is_eos(&self) -> bool {
        self.has_flag(BufferFlags::EOS)
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// True when no other buffer shares this payload.
    pub fn is_writable(&self) -> bool {
        Arc::strong_count(&self.payload) == 1
    }

    /// Mutable access to the payload, copying it first if it is shared.
    pub fn payload_mut(&mut self) -> &mut Value {
        Arc::make_mut(&mut self.payload)
    }

    /// End time of the buffer (`pts + duration`).
    pub fn end(&self) -> f64 {
        self.pts + self.duration
    }
}

impl std::fmt::Display for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Buffer(seq={}, pts={:.3}s, dur={:.3}s",
            self.sequence, self.pts, self.duration
        )?;
        if !self.flags.is_empty() {
            write!(f, ", flags={}", self.flags)?;
        }
        write!(f, ")")
    }
}
