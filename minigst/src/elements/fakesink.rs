// fakesink.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of MiniGst
//
// SPDX-License-Identifier: GPL-3.0-only

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::elements::{parse_bool, unknown_property, Properties};
use crate::error::Result;
use crate::gst::{Buffer, Element, ElementImpl, FlowReturn, Pad, StateChangeReturn, SyncOutcome};

const FACTORY: &str = "fakesink";

/// Called with every buffer the sink renders, on the streaming thread.
pub type HandoffFunction = Arc<dyn Fn(&Buffer) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakeSinkSettings {
    pub sync: bool,
    /// Do not log every rendered buffer.
    pub silent: bool,
}

impl Default for FakeSinkSettings {
    fn default() -> Self {
        Self {
            sync: false,
            silent: true,
        }
    }
}

impl FakeSinkSettings {
    pub fn from_properties(properties: &Properties) -> Result<Self> {
        let mut settings = Self::default();
        for (key, value) in properties {
            match key.as_str() {
                "sync" => settings.sync = parse_bool(FACTORY, key, value)?,
                "silent" => settings.silent = parse_bool(FACTORY, key, value)?,
                _ => return Err(unknown_property(FACTORY, key)),
            }
        }
        Ok(settings)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FakeSinkStats {
    pub rendered: u64,
    pub eos_received: u64,
    pub last_pts: Option<f64>,
    /// Largest positive clock jitter seen, in seconds.
    pub max_lateness: f64,
}

struct FakeSinkShared {
    settings: FakeSinkSettings,
    stats: Mutex<FakeSinkStats>,
    handoff: RwLock<Option<HandoffFunction>>,
}

impl FakeSinkShared {
    fn chain(&self, pad: &Pad, buffer: Buffer) -> FlowReturn {
        let Some(element) = pad.parent() else {
            return FlowReturn::Error;
        };

        if buffer.is_eos() {
            debug!("{} - received EOS", element.name());
            self.stats.lock().eos_received += 1;
            element.post_eos();
            return FlowReturn::Eos;
        }

        let lateness = match element.sync_buffer(&buffer, self.settings.sync) {
            SyncOutcome::OutsideSegment => return FlowReturn::Ok,
            SyncOutcome::Synced { jitter } => jitter.max(0.0),
            SyncOutcome::Unsynced => 0.0,
        };

        if !self.settings.silent {
            info!("{} - chain {}", element.name(), buffer);
        }

        {
            let mut stats = self.stats.lock();
            stats.rendered += 1;
            stats.last_pts = Some(buffer.pts);
            stats.max_lateness = stats.max_lateness.max(lateness);
        }

        let handoff = self.handoff.read().clone();
        if let Some(handoff) = handoff {
            handoff(&buffer);
        }
        FlowReturn::Ok
    }
}

struct FakeSinkImpl {
    shared: Arc<FakeSinkShared>,
}

impl ElementImpl for FakeSinkImpl {
    fn on_null(&self, _element: &Element) -> StateChangeReturn {
        *self.shared.stats.lock() = FakeSinkStats::default();
        StateChangeReturn::Success
    }

    fn stats(&self) -> Option<serde_json::Value> {
        serde_json::to_value(*self.shared.stats.lock()).ok()
    }
}

/// Handle on a sink discarding everything it receives.
#[derive(Clone)]
pub struct FakeSink {
    element: Arc<Element>,
    shared: Arc<FakeSinkShared>,
}

impl FakeSink {
    pub fn new(name: &str, settings: FakeSinkSettings) -> Result<Self> {
        let shared = Arc::new(FakeSinkShared {
            settings,
            stats: Mutex::new(FakeSinkStats::default()),
            handoff: RwLock::new(None),
        });
        let element = Element::new(
            name,
            FakeSinkImpl {
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

    /// Install the function called with every rendered buffer.
    pub fn connect_handoff<F>(&self, func: F)
    where
        F: Fn(&Buffer) + Send + Sync + 'static,
    {
        *self.shared.handoff.write() = Some(Arc::new(func));
    }

    pub fn stats(&self) -> FakeSinkStats {
        *self.shared.stats.lock()
    }
}
