// encoder.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of MiniGst
//
// SPDX-License-Identifier: GPL-3.0-only

//! Fake video encoder marking key units on a fixed GOP.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::elements::{parse_value, unknown_property, Properties};
use crate::error::{MinigstError, Result};
use crate::gst::{Buffer, BufferFlags, Element, ElementImpl, FlowReturn, Pad, StateChangeReturn};

const FACTORY: &str = "videoenc";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderSettings {
    /// Distance between two key units, in buffers.
    pub gop_size: u64,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self { gop_size: 30 }
    }
}

impl EncoderSettings {
    pub fn from_properties(properties: &Properties) -> Result<Self> {
        let mut settings = Self::default();
        for (key, value) in properties {
            match key.as_str() {
                "gop-size" => settings.gop_size = parse_value(FACTORY, key, value)?,
                _ => return Err(unknown_property(FACTORY, key)),
            }
        }
        Ok(settings)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EncoderStats {
    pub processed: u64,
    pub keyframes: u64,
    pub gop_size: u64,
}

struct EncoderShared {
    settings: EncoderSettings,
    processed: AtomicU64,
    keyframes: AtomicU64,
}

impl EncoderShared {
    fn chain(&self, name: &str, src: &Pad, mut buffer: Buffer) -> FlowReturn {
        if buffer.is_eos() {
            return src.push(buffer);
        }

        // Chain calls are serialized by the sink pad stream lock.
        let index = self.processed.load(Ordering::Acquire);
        let gop_index = index % self.settings.gop_size;
        let keyframe = gop_index == 0;
        if keyframe {
            buffer.unset_flag(BufferFlags::DELTA_UNIT);
        } else {
            buffer.set_flag(BufferFlags::DELTA_UNIT);
        }

        if buffer.payload().is_object() {
            if let Some(payload) = buffer.payload_mut().as_object_mut() {
                payload.insert(
                    "encoding".to_string(),
                    json!({ "keyframe": keyframe, "gop_index": gop_index }),
                );
            }
        }

        // A frame refused downstream is sent again by upstream with the same index.
        let ret = src.push(buffer);
        if ret == FlowReturn::Ok {
            self.processed.fetch_add(1, Ordering::AcqRel);
            if keyframe {
                self.keyframes.fetch_add(1, Ordering::AcqRel);
                debug!("{} - encoded IDR frame #{}", name, index);
            }
        }
        ret
    }

    fn stats(&self) -> EncoderStats {
        EncoderStats {
            processed: self.processed.load(Ordering::Acquire),
            keyframes: self.keyframes.load(Ordering::Acquire),
            gop_size: self.settings.gop_size,
        }
    }
}

struct EncoderImpl {
    shared: Arc<EncoderShared>,
}

impl ElementImpl for EncoderImpl {
    fn on_null(&self, element: &Element) -> StateChangeReturn {
        let stats = self.shared.stats();
        info!(
            "{} - encoded {} frames, {} key units",
            element.name(),
            stats.processed,
            stats.keyframes
        );
        self.shared.processed.store(0, Ordering::Release);
        self.shared.keyframes.store(0, Ordering::Release);
        StateChangeReturn::Success
    }

    fn stats(&self) -> Option<serde_json::Value> {
        serde_json::to_value(self.shared.stats()).ok()
    }
}

/// Handle on a video encoder element.
#[derive(Clone)]
pub struct VideoEncoder {
    element: Arc<Element>,
    shared: Arc<EncoderShared>,
}

impl VideoEncoder {
    pub fn new(name: &str, settings: EncoderSettings) -> Result<Self> {
        if settings.gop_size == 0 {
            return Err(MinigstError::InvalidProperty(format!(
                "{}: gop-size must be at least 1",
                name
            )));
        }

        let shared = Arc::new(EncoderShared {
            settings,
            processed: AtomicU64::new(0),
            keyframes: AtomicU64::new(0),
        });
        let element = Element::new(
            name,
            EncoderImpl {
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

    pub fn stats(&self) -> EncoderStats {
        self.shared.stats()
    }
}
