// livesource.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of MiniGst
//
// SPDX-License-Identifier: GPL-3.0-only

//! Source producing frames at a fixed rate, like a camera.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::elements::{parse_bool, parse_value, unknown_property, Properties};
use crate::error::{MinigstError, Result};
use crate::gst::{
    Buffer, BufferFlags, Element, ElementImpl, FlowReturn, Pad, PipelineContext,
    StateChangeReturn, StopToken, StreamTask, FLOW_RETRY_BACKOFF_MS, TASK_JOIN_TIMEOUT_MS,
};

const FACTORY: &str = "livesrc";

/// Longest single sleep of the pacing loop, so stop requests are noticed quickly.
const MAX_PACING_SLEEP: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveSourceSettings {
    /// Buffers per second.
    pub rate: f64,
    /// Stop with EOS after this many buffers, `None` for unlimited.
    pub num_buffers: Option<u64>,
    /// Pace output in real time and timestamp with the running time.
    pub is_live: bool,
}

impl Default for LiveSourceSettings {
    fn default() -> Self {
        Self {
            rate: 30.0,
            num_buffers: None,
            is_live: true,
        }
    }
}

impl LiveSourceSettings {
    pub fn from_properties(properties: &Properties) -> Result<Self> {
        let mut settings = Self::default();
        for (key, value) in properties {
            match key.as_str() {
                "rate" | "fps" => settings.rate = parse_value(FACTORY, key, value)?,
                "num-buffers" => {
                    let n: i64 = parse_value(FACTORY, key, value)?;
                    settings.num_buffers = u64::try_from(n).ok();
                }
                "is-live" => settings.is_live = parse_bool(FACTORY, key, value)?,
                _ => return Err(unknown_property(FACTORY, key)),
            }
        }
        Ok(settings)
    }

    fn interval(&self) -> f64 {
        1.0 / self.rate
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LiveSourceStats {
    pub emitted: u64,
    pub failed: u64,
    pub rate: f64,
}

struct SourceShared {
    settings: LiveSourceSettings,
    eos_requested: AtomicBool,
    /// Next sequence number, shared by every streaming thread of the element.
    next_sequence: AtomicU64,
    emitted: AtomicU64,
    failed: AtomicU64,
}

impl SourceShared {
    fn limit_reached(&self) -> bool {
        matches!(self.settings.num_buffers, Some(n) if self.emitted.load(Ordering::Acquire) >= n)
    }

    /// Pipeline running time when a running clock is available.
    fn running_time(context: Option<&Arc<PipelineContext>>) -> Option<f64> {
        let context = context?;
        if !context.clock().is_started() {
            return None;
        }
        Some((context.clock().now() - context.base_time()).max(0.0))
    }

    fn stream_loop(&self, name: &str, src: &Pad, stop: &StopToken) {
        let interval = self.settings.interval();
        let context = src.parent().and_then(|e| e.pipeline());
        let started = Instant::now();
        let mut next_due = 0.0;
        let mut last_end = 0.0;
        // Sequence of a refused buffer, reused by the retry.
        let mut pending_sequence = None;

        info!("{} - producing at {} buffers/s", name, self.settings.rate);

        loop {
            if stop.is_stopped() {
                debug!("{} - stop requested", name);
                return;
            }
            if self.eos_requested.load(Ordering::Acquire) || self.limit_reached() {
                break;
            }

            let elapsed = started.elapsed().as_secs_f64();
            if self.settings.is_live && elapsed < next_due {
                let wait = Duration::from_secs_f64(next_due - elapsed);
                std::thread::sleep(wait.min(MAX_PACING_SLEEP));
                continue;
            }

            let sequence = pending_sequence
                .take()
                .unwrap_or_else(|| self.next_sequence.fetch_add(1, Ordering::AcqRel));
            let pts = if self.settings.is_live {
                Self::running_time(context.as_ref()).unwrap_or(elapsed)
            } else {
                sequence as f64 * interval
            };
            let mut buffer = Buffer::new(
                pts,
                interval,
                json!({
                    "frame": sequence,
                    "timestamp": pts,
                    "content": format!("frame_{:06}", sequence),
                }),
            )
            .with_sequence(sequence);
            if sequence == 0 {
                buffer.set_flag(BufferFlags::DISCONT);
            }

            match src.push(buffer) {
                FlowReturn::Ok => {
                    let emitted = self.emitted.fetch_add(1, Ordering::AcqRel) + 1;
                    if emitted % 30 == 1 {
                        debug!("{} - pushed frame {} pts={:.3}s", name, sequence, pts);
                    }
                    next_due += interval;
                    last_end = pts + interval;
                }
                ret @ (FlowReturn::Flushing | FlowReturn::NotLinked) => {
                    let failed = self.failed.fetch_add(1, Ordering::AcqRel) + 1;
                    if failed % 10 == 1 {
                        warn!(
                            "{} - push of frame {} returned {} (failed: {})",
                            name, sequence, ret, failed
                        );
                    }
                    pending_sequence = Some(sequence);
                    std::thread::sleep(Duration::from_millis(FLOW_RETRY_BACKOFF_MS));
                    next_due = started.elapsed().as_secs_f64();
                }
                FlowReturn::Eos => {
                    info!("{} - downstream is EOS, stopping", name);
                    return;
                }
                ret @ (FlowReturn::Error | FlowReturn::NotSupported) => {
                    error!("{} - streaming stopped, reason {}", name, ret);
                    if let Some(element) = src.parent() {
                        element.post_error(format!("streaming stopped, reason {}", ret));
                    }
                    return;
                }
            }
        }

        let ret = src.push(Buffer::eos(last_end));
        info!("{} - pushed EOS ({})", name, ret);
    }

    fn stats(&self) -> LiveSourceStats {
        LiveSourceStats {
            emitted: self.emitted.load(Ordering::Acquire),
            failed: self.failed.load(Ordering::Acquire),
            rate: self.settings.rate,
        }
    }
}

struct LiveSourceImpl {
    shared: Arc<SourceShared>,
    task: Mutex<Option<StreamTask>>,
}

impl LiveSourceImpl {
    fn stop_task(&self, element: &Element) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            if !task.join(Duration::from_millis(TASK_JOIN_TIMEOUT_MS)) {
                warn!("{} - streaming task did not stop cleanly", element.name());
            }
        }
    }
}

impl ElementImpl for LiveSourceImpl {
    fn on_paused(&self, _element: &Element) -> StateChangeReturn {
        self.shared.eos_requested.store(false, Ordering::Release);
        StateChangeReturn::Success
    }

    fn on_playing(&self, element: &Element) -> StateChangeReturn {
        let Some(src) = element.src_pad() else {
            return StateChangeReturn::Failure;
        };

        let shared = Arc::clone(&self.shared);
        let name = element.name().to_string();
        let task_name = format!("{}:src", element.name());
        match StreamTask::spawn(&task_name, move |stop| {
            shared.stream_loop(&name, &src, &stop)
        }) {
            Ok(task) => *self.task.lock() = Some(task),
            Err(e) => {
                error!("{} - failed to start streaming task: {}", element.name(), e);
                return StateChangeReturn::Failure;
            }
        }

        if self.shared.settings.is_live {
            StateChangeReturn::NoPreroll
        } else {
            StateChangeReturn::Success
        }
    }

    fn on_playing_to_paused(&self, element: &Element) -> StateChangeReturn {
        info!("{} - stopping frame generation", element.name());
        self.stop_task(element);
        StateChangeReturn::Success
    }

    fn on_paused_to_ready(&self, element: &Element) -> StateChangeReturn {
        self.stop_task(element);
        StateChangeReturn::Success
    }

    fn on_null(&self, element: &Element) -> StateChangeReturn {
        let stats = self.shared.stats();
        info!(
            "{} - generated {} frames, {} failed pushes",
            element.name(),
            stats.emitted,
            stats.failed
        );
        self.shared.next_sequence.store(0, Ordering::Release);
        self.shared.emitted.store(0, Ordering::Release);
        self.shared.failed.store(0, Ordering::Release);
        StateChangeReturn::Success
    }

    fn send_eos(&self, _element: &Element) -> bool {
        let running = self
            .task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished());
        if running {
            self.shared.eos_requested.store(true, Ordering::Release);
        }
        running
    }

    fn stats(&self) -> Option<serde_json::Value> {
        serde_json::to_value(self.shared.stats()).ok()
    }
}

/// Handle on a live source element.
#[derive(Clone)]
pub struct LiveSource {
    element: Arc<Element>,
    shared: Arc<SourceShared>,
}

impl LiveSource {
    pub fn new(name: &str, settings: LiveSourceSettings) -> Result<Self> {
        if !(settings.rate.is_finite() && settings.rate > 0.0) {
            return Err(MinigstError::InvalidProperty(format!(
                "{}: rate must be positive, got {}",
                name, settings.rate
            )));
        }

        let shared = Arc::new(SourceShared {
            settings,
            eos_requested: AtomicBool::new(false),
            next_sequence: AtomicU64::new(0),
            emitted: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        });
        let element = Element::new(
            name,
            LiveSourceImpl {
                shared: Arc::clone(&shared),
                task: Mutex::new(None),
            },
        );
        element.create_src_pad("src");

        Ok(Self { element, shared })
    }

    pub fn element(&self) -> Arc<Element> {
        Arc::clone(&self.element)
    }

    pub fn settings(&self) -> LiveSourceSettings {
        self.shared.settings
    }

    pub fn stats(&self) -> LiveSourceStats {
        self.shared.stats()
    }
}
