// uploadsink.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of MiniGst
//
// SPDX-License-Identifier: GPL-3.0-only

//! Sink simulating an object-store upload of every segment it renders.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::elements::{parse_bool, parse_value, unknown_property, Properties};
use crate::error::Result;
use crate::gst::{Buffer, Element, ElementImpl, FlowReturn, Pad, StateChangeReturn, SyncOutcome};

const FACTORY: &str = "uploadsink";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSinkSettings {
    pub bucket: String,
    /// Wait on the pipeline clock before rendering.
    pub sync: bool,
    /// Simulated duration of one upload.
    pub upload_delay_ms: u64,
}

impl Default for UploadSinkSettings {
    fn default() -> Self {
        Self {
            bucket: "my-bucket".to_string(),
            sync: true,
            upload_delay_ms: 17,
        }
    }
}

impl UploadSinkSettings {
    pub fn from_properties(properties: &Properties) -> Result<Self> {
        let mut settings = Self::default();
        for (key, value) in properties {
            match key.as_str() {
                "bucket" => settings.bucket = value.clone(),
                "sync" => settings.sync = parse_bool(FACTORY, key, value)?,
                "upload-delay-ms" => settings.upload_delay_ms = parse_value(FACTORY, key, value)?,
                _ => return Err(unknown_property(FACTORY, key)),
            }
        }
        Ok(settings)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UploadSinkStats {
    pub segments_uploaded: u64,
    pub buffers_rendered: u64,
    pub last_rendered_pts: f64,
    pub objects: Vec<String>,
}

struct UploadShared {
    settings: UploadSinkSettings,
    stats: Mutex<UploadSinkStats>,
}

impl UploadShared {
    fn chain(&self, pad: &Pad, buffer: Buffer) -> FlowReturn {
        let Some(element) = pad.parent() else {
            return FlowReturn::Error;
        };

        if buffer.is_eos() {
            info!("{} - received EOS", element.name());
            element.post_eos();
            return FlowReturn::Eos;
        }

        match element.sync_buffer(&buffer, self.settings.sync) {
            SyncOutcome::OutsideSegment => {
                debug!("{} - {} outside segment, dropping", element.name(), buffer);
                return FlowReturn::Ok;
            }
            SyncOutcome::Synced { jitter } if jitter > 0.0 => {
                debug!(
                    "{} - buffer late (jitter: {:+.1}ms)",
                    element.name(),
                    jitter * 1000.0
                );
            }
            SyncOutcome::Synced { jitter } => {
                debug!(
                    "{} - clock wait complete (jitter: {:+.1}ms)",
                    element.name(),
                    jitter * 1000.0
                );
            }
            SyncOutcome::Unsynced => {}
        }

        self.render(element.name(), &buffer);
        FlowReturn::Ok
    }

    fn render(&self, name: &str, buffer: &Buffer) {
        let payload = buffer.payload();
        let segment_num = payload.get("segment_num").and_then(|v| v.as_u64());

        if let Some(segment_num) = segment_num {
            let object = format!("s3://{}/segment_{}.cmfv", self.settings.bucket, segment_num);
            let num_frames = payload
                .get("num_frames")
                .and_then(|v| v.as_u64())
                .unwrap_or_default();
            info!(
                "{} - uploading {} ({} frames, {:.1}s)",
                name, object, num_frames, buffer.duration
            );
            std::thread::sleep(Duration::from_millis(self.settings.upload_delay_ms));

            let mut stats = self.stats.lock();
            stats.segments_uploaded += 1;
            stats.objects.push(object);
        } else {
            debug!("{} - processing {}", name, buffer);
        }

        let mut stats = self.stats.lock();
        stats.buffers_rendered += 1;
        stats.last_rendered_pts = buffer.pts;
    }
}

struct UploadSinkImpl {
    shared: Arc<UploadShared>,
}

impl ElementImpl for UploadSinkImpl {
    fn on_null(&self, element: &Element) -> StateChangeReturn {
        let mut stats = self.shared.stats.lock();
        info!(
            "{} - total segments uploaded: {}",
            element.name(),
            stats.segments_uploaded
        );
        *stats = UploadSinkStats::default();
        StateChangeReturn::Success
    }

    fn stats(&self) -> Option<serde_json::Value> {
        serde_json::to_value(&*self.shared.stats.lock()).ok()
    }
}

/// Handle on an upload sink element.
#[derive(Clone)]
pub struct UploadSink {
    element: Arc<Element>,
    shared: Arc<UploadShared>,
}

impl UploadSink {
    pub fn new(name: &str, settings: UploadSinkSettings) -> Result<Self> {
        let shared = Arc::new(UploadShared {
            settings,
            stats: Mutex::new(UploadSinkStats::default()),
        });
        let element = Element::new(
            name,
            UploadSinkImpl {
                shared: Arc::clone(&shared),
            },
        );

        let chain_shared = Arc::clone(&shared);
        element
            .create_sink_pad("sink")
            .set_chain_function(move |pad, buffer| chain_shared.chain(pad, buffer))?;

        Ok(Self { element, shared })
    }

    pub fn element(&self) -> Arc<Element> {
        Arc::clone(&self.element)
    }

    pub fn settings(&self) -> &UploadSinkSettings {
        &self.shared.settings
    }

    pub fn stats(&self) -> UploadSinkStats {
        self.shared.stats.lock().clone()
    }
}
