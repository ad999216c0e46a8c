// segmenter.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of MiniGst
//
// SPDX-License-Identifier: GPL-3.0-only

//! Groups incoming buffers into HLS-like segments of a target duration.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::elements::{parse_value, unknown_property, Properties};
use crate::error::{MinigstError, Result};
use crate::gst::{Buffer, BufferFlags, Element, ElementImpl, FlowReturn, Pad, StateChangeReturn};

const FACTORY: &str = "hlssegmenter";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmenterSettings {
    /// Segment length in seconds.
    pub target_duration: f64,
}

impl Default for SegmenterSettings {
    fn default() -> Self {
        Self {
            target_duration: 6.0,
        }
    }
}

impl SegmenterSettings {
    pub fn from_properties(properties: &Properties) -> Result<Self> {
        let mut settings = Self::default();
        for (key, value) in properties {
            match key.as_str() {
                "target-duration" => settings.target_duration = parse_value(FACTORY, key, value)?,
                _ => return Err(unknown_property(FACTORY, key)),
            }
        }
        Ok(settings)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SegmenterStats {
    pub segments: u64,
    pub pending_frames: usize,
    pub target_duration: f64,
}

#[derive(Default)]
struct SegmenterState {
    pending: Vec<Buffer>,
    segments: u64,
}

impl SegmenterState {
    /// Turn the pending buffers into one segment buffer.
    fn take_segment(&mut self) -> Option<Buffer> {
        let first = self.pending.first()?;
        let last = self.pending.last()?;

        let start_pts = first.pts;
        let duration = last.end() - start_pts;
        let discont = self.pending.iter().any(|b| b.has_flag(BufferFlags::DISCONT));
        let frames: Vec<Value> = self.pending.iter().map(|b| b.payload().clone()).collect();
        let num_frames = frames.len();
        let segment_num = self.segments;

        let mut segment = Buffer::new(
            start_pts,
            duration,
            json!({
                "segment_num": segment_num,
                "num_frames": num_frames,
                "duration": duration,
                "start_pts": start_pts,
                "frames": frames,
            }),
        )
        .with_sequence(segment_num)
        .with_flags(BufferFlags::SEGMENT);
        if discont {
            segment.set_flag(BufferFlags::DISCONT);
        }

        self.pending.clear();
        self.segments += 1;
        Some(segment)
    }
}

struct SegmenterShared {
    settings: SegmenterSettings,
    state: Mutex<SegmenterState>,
}

impl SegmenterShared {
    fn chain(&self, name: &str, src: &Pad, buffer: Buffer) -> FlowReturn {
        if buffer.is_eos() {
            let segment = self.state.lock().take_segment();
            if let Some(segment) = segment {
                info!("{} - flushing last segment on EOS: {}", name, segment);
                let ret = src.push(segment);
                if !matches!(ret, FlowReturn::Ok | FlowReturn::Eos) {
                    return ret;
                }
            }
            return src.push(buffer);
        }

        let segment = {
            let mut state = self.state.lock();
            if state.pending.is_empty() {
                debug!("{} - starting segment {}", name, state.segments);
            }
            state.pending.push(buffer);

            let first_pts = state.pending.first().map_or(0.0, |b| b.pts);
            let last_pts = state.pending.last().map_or(0.0, |b| b.pts);
            if last_pts - first_pts >= self.settings.target_duration {
                state.take_segment()
            } else {
                None
            }
        };

        match segment {
            Some(segment) => {
                info!("{} - segment complete: {}", name, segment);
                src.push(segment)
            }
            None => FlowReturn::Ok,
        }
    }

    fn stats(&self) -> SegmenterStats {
        let state = self.state.lock();
        SegmenterStats {
            segments: state.segments,
            pending_frames: state.pending.len(),
            target_duration: self.settings.target_duration,
        }
    }
}

struct SegmenterImpl {
    shared: Arc<SegmenterShared>,
}

impl ElementImpl for SegmenterImpl {
    fn on_paused_to_ready(&self, element: &Element) -> StateChangeReturn {
        let mut state = self.shared.state.lock();
        if !state.pending.is_empty() {
            debug!(
                "{} - dropping {} pending buffers",
                element.name(),
                state.pending.len()
            );
            state.pending.clear();
        }
        StateChangeReturn::Success
    }

    fn on_null(&self, element: &Element) -> StateChangeReturn {
        let mut state = self.shared.state.lock();
        info!("{} - total segments created: {}", element.name(), state.segments);
        state.segments = 0;
        StateChangeReturn::Success
    }

    fn stats(&self) -> Option<serde_json::Value> {
        serde_json::to_value(self.shared.stats()).ok()
    }
}

/// Handle on an HLS segmenter element.
#[derive(Clone)]
pub struct HlsSegmenter {
    element: Arc<Element>,
    shared: Arc<SegmenterShared>,
}

impl HlsSegmenter {
    pub fn new(name: &str, settings: SegmenterSettings) -> Result<Self> {
        if !(settings.target_duration.is_finite() && settings.target_duration > 0.0) {
            return Err(MinigstError::InvalidProperty(format!(
                "{}: target-duration must be positive, got {}",
                name, settings.target_duration
            )));
        }

        let shared = Arc::new(SegmenterShared {
            settings,
            state: Mutex::new(SegmenterState::default()),
        });
        let element = Element::new(
            name,
            SegmenterImpl {
                shared: Arc::clone(&shared),
            },
        );

        let src = element.create_src_pad("src");
        let chain_shared = Arc::clone(&shared);
        let chain_name = name.to_string();
        element
            .create_sink_pad("sink")
            .set_chain_function(move |_pad, buffer| chain_shared.chain(&chain_name, &src, buffer))?;

        Ok(Self { element, shared })
    }

    pub fn element(&self) -> Arc<Element> {
        Arc::clone(&self.element)
    }

    pub fn stats(&self) -> SegmenterStats {
        self.shared.stats()
    }
}
