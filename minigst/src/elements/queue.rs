// queue.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of MiniGst
//
// SPDX-License-Identifier: GPL-3.0-only

//! Bounded queue decoupling its upstream thread from downstream.
//!
//! The sink pad chain function runs on the upstream thread and only enqueues.
//! A drain task started on `Paused -> Playing` dequeues and pushes on the
//! source pad, outside the queue lock, so upstream keeps enqueueing while
//! downstream is blocked in a clock wait.

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

use crate::elements::{parse_value, unknown_property, Properties};
use crate::error::{MinigstError, Result};
use crate::gst::{
    Buffer, BufferFlags, Element, ElementImpl, FlowReturn, Pad, StateChangeReturn, StopToken,
    StreamTask, DRAIN_POLL_INTERVAL_MS, FLOW_RETRY_BACKOFF_MS, TASK_JOIN_TIMEOUT_MS,
};

const FACTORY: &str = "queue";

/// What the queue does with an incoming buffer when it is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Block the upstream thread until space frees up.
    #[default]
    Block,
    /// Drop the incoming buffer.
    DropNewest,
    /// Evict the oldest queued buffer.
    DropOldest,
}

impl std::fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverflowPolicy::Block => write!(f, "block"),
            OverflowPolicy::DropNewest => write!(f, "drop-newest"),
            OverflowPolicy::DropOldest => write!(f, "drop-oldest"),
        }
    }
}

impl std::str::FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "no" | "none" | "block" => Ok(OverflowPolicy::Block),
            "upstream" | "drop-newest" => Ok(OverflowPolicy::DropNewest),
            "downstream" | "drop-oldest" => Ok(OverflowPolicy::DropOldest),
            _ => Err(
                "Invalid leaky mode. Valid values: no, upstream, downstream, block, drop-newest, drop-oldest"
                    .to_string(),
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSettings {
    /// Maximum number of queued buffers, at least 1.
    pub max_size: usize,
    pub leaky: OverflowPolicy,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_size: 10,
            leaky: OverflowPolicy::Block,
        }
    }
}

impl QueueSettings {
    pub fn new(max_size: usize, leaky: OverflowPolicy) -> Self {
        Self { max_size, leaky }
    }

    pub fn from_properties(properties: &Properties) -> Result<Self> {
        let mut settings = Self::default();
        for (key, value) in properties {
            match key.as_str() {
                "max-size" | "max-size-buffers" => {
                    settings.max_size = parse_value(FACTORY, key, value)?
                }
                "leaky" => settings.leaky = parse_value(FACTORY, key, value)?,
                _ => return Err(unknown_property(FACTORY, key)),
            }
        }
        Ok(settings)
    }
}

/// Counter snapshot, consistent at the time it was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub accepted: u64,
    pub emitted: u64,
    pub dropped: u64,
    pub level: usize,
    pub capacity: usize,
}

struct QueueState {
    buffers: VecDeque<Buffer>,
    discont_pending: bool,
    flushing: bool,
    /// Last non-OK downstream flow; returned to upstream until the next start.
    srcresult: FlowReturn,
    accepted: u64,
    emitted: u64,
    dropped: u64,
}

struct QueueShared {
    settings: QueueSettings,
    state: Mutex<QueueState>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl QueueShared {
    fn chain(&self, name: &str, mut buffer: Buffer) -> FlowReturn {
        let mut state = self.state.lock();

        if state.flushing {
            return FlowReturn::Flushing;
        }
        if state.srcresult != FlowReturn::Ok {
            debug!("{} - refusing buffer, downstream returned {}", name, state.srcresult);
            return state.srcresult;
        }

        if buffer.is_eos() {
            debug!("{} - queueing EOS", name);
            state.buffers.push_back(buffer);
            self.not_empty.notify_one();
            return FlowReturn::Eos;
        }

        while state.buffers.len() >= self.settings.max_size {
            match self.settings.leaky {
                OverflowPolicy::DropNewest => {
                    state.dropped += 1;
                    state.discont_pending = true;
                    debug!("{} - full, dropping incoming {}", name, buffer);
                    return FlowReturn::Ok;
                }
                OverflowPolicy::DropOldest => {
                    if let Some(old) = state.buffers.pop_front() {
                        debug!("{} - full, dropping oldest {}", name, old);
                    }
                    state.dropped += 1;
                    state.discont_pending = true;
                }
                OverflowPolicy::Block => {
                    self.not_full.wait(&mut state);
                    if state.flushing {
                        return FlowReturn::Flushing;
                    }
                    if state.srcresult != FlowReturn::Ok {
                        return state.srcresult;
                    }
                }
            }
        }

        if state.discont_pending {
            buffer.set_flag(BufferFlags::DISCONT);
            state.discont_pending = false;
        }

        state.buffers.push_back(buffer);
        state.accepted += 1;
        let level = state.buffers.len();
        self.not_empty.notify_one();
        drop(state);

        if level == self.settings.max_size {
            debug!("{} - queue full ({}/{})", name, level, self.settings.max_size);
        }
        FlowReturn::Ok
    }

    /// Pop the next buffer, waiting while the queue is empty.
    /// Returns `None` once the task owning `stop` was asked to stop.
    fn pop(&self, stop: &StopToken) -> Option<Buffer> {
        let poll = Duration::from_millis(DRAIN_POLL_INTERVAL_MS);
        let mut state = self.state.lock();
        loop {
            if stop.is_stopped() {
                return None;
            }
            if let Some(buffer) = state.buffers.pop_front() {
                self.not_full.notify_one();
                return Some(buffer);
            }
            self.not_empty.wait_for(&mut state, poll);
        }
    }

    /// Put back at the head a buffer downstream refused without consuming
    /// it. Fails once the queue itself is flushing.
    fn requeue(&self, buffer: Buffer) -> bool {
        let mut state = self.state.lock();
        if state.flushing {
            return false;
        }
        state.buffers.push_front(buffer);
        true
    }

    fn is_flushing(&self) -> bool {
        self.state.lock().flushing
    }

    fn drain_loop(&self, name: &str, src: &Pad, stop: &StopToken) {
        debug!("{} - drain loop started", name);

        while let Some(buffer) = self.pop(stop) {
            let is_eos = buffer.is_eos();
            let ret = match src.try_push(buffer) {
                Ok(FlowReturn::Flushing) if !self.is_flushing() => {
                    debug!("{} - downstream flushing, buffer consumed", name);
                    continue;
                }
                Ok(ret) => ret,
                Err((FlowReturn::Flushing, buffer)) => {
                    if self.requeue(buffer) {
                        trace!("{} - downstream not active yet, retrying", name);
                        std::thread::sleep(Duration::from_millis(FLOW_RETRY_BACKOFF_MS));
                        continue;
                    }
                    FlowReturn::Flushing
                }
                Err((ret, _)) => ret,
            };
            if ret == FlowReturn::Ok && !is_eos {
                self.state.lock().emitted += 1;
            }

            if ret != FlowReturn::Ok || is_eos {
                let result = if ret == FlowReturn::Ok {
                    FlowReturn::Eos
                } else {
                    ret
                };
                {
                    let mut state = self.state.lock();
                    state.srcresult = result;
                    self.not_full.notify_all();
                }

                match result {
                    FlowReturn::Eos => info!("{} - EOS pushed, pausing drain loop", name),
                    FlowReturn::Flushing => debug!("{} - flushing, pausing", name),
                    other => {
                        error!("{} - streaming stopped, reason {}", name, other);
                        if let Some(element) = src.parent() {
                            element.post_error(format!("streaming stopped, reason {}", other));
                        }
                    }
                }
                break;
            }
        }

        debug!("{} - drain loop stopped", name);
    }

    fn stats(&self) -> QueueStats {
        let state = self.state.lock();
        QueueStats {
            accepted: state.accepted,
            emitted: state.emitted,
            dropped: state.dropped,
            level: state.buffers.len(),
            capacity: self.settings.max_size,
        }
    }
}

struct QueueImpl {
    shared: Arc<QueueShared>,
    task: Mutex<Option<StreamTask>>,
}

impl QueueImpl {
    fn stop_task(&self, element: &Element) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.request_stop();
            {
                // Taken so the wakeup cannot slip between the check and the wait in `pop`.
                let _state = self.shared.state.lock();
                self.shared.not_empty.notify_all();
            }
            if !task.join(Duration::from_millis(TASK_JOIN_TIMEOUT_MS)) {
                warn!("{} - drain task did not stop cleanly", element.name());
            }
        }
    }
}

impl ElementImpl for QueueImpl {
    fn on_paused(&self, _element: &Element) -> StateChangeReturn {
        let mut state = self.shared.state.lock();
        state.flushing = false;
        state.discont_pending = false;
        state.srcresult = FlowReturn::Ok;
        StateChangeReturn::Success
    }

    fn on_playing(&self, element: &Element) -> StateChangeReturn {
        let Some(src) = element.src_pad() else {
            return StateChangeReturn::Failure;
        };

        info!(
            "{} - starting drain task (max-size={}, leaky={})",
            element.name(),
            self.shared.settings.max_size,
            self.shared.settings.leaky
        );
        let shared = Arc::clone(&self.shared);
        let name = element.name().to_string();
        let task_name = format!("{}:drain", element.name());
        match StreamTask::spawn(&task_name, move |stop| {
            shared.drain_loop(&name, &src, &stop)
        }) {
            Ok(task) => {
                *self.task.lock() = Some(task);
                StateChangeReturn::Success
            }
            Err(e) => {
                error!("{} - failed to start drain task: {}", element.name(), e);
                StateChangeReturn::Failure
            }
        }
    }

    fn on_playing_to_paused(&self, element: &Element) -> StateChangeReturn {
        info!("{} - stopping drain task", element.name());
        self.stop_task(element);
        StateChangeReturn::Success
    }

    fn on_paused_to_ready(&self, element: &Element) -> StateChangeReturn {
        self.stop_task(element);

        let mut state = self.shared.state.lock();
        state.flushing = true;
        let discarded = state.buffers.len();
        state.buffers.clear();
        self.shared.not_full.notify_all();
        self.shared.not_empty.notify_all();
        drop(state);

        if discarded > 0 {
            debug!("{} - flushed {} queued buffers", element.name(), discarded);
        }
        StateChangeReturn::Success
    }

    fn on_null(&self, element: &Element) -> StateChangeReturn {
        let stats = self.shared.stats();
        info!(
            "{} - in: {}, out: {}, dropped: {}",
            element.name(),
            stats.accepted,
            stats.emitted,
            stats.dropped
        );

        let mut state = self.shared.state.lock();
        state.accepted = 0;
        state.emitted = 0;
        state.dropped = 0;
        StateChangeReturn::Success
    }

    fn stats(&self) -> Option<serde_json::Value> {
        serde_json::to_value(self.shared.stats()).ok()
    }
}

/// Handle on a queue element.
#[derive(Clone)]
pub struct Queue {
    element: Arc<Element>,
    shared: Arc<QueueShared>,
}

impl Queue {
    pub fn new(name: &str, settings: QueueSettings) -> Result<Self> {
        if settings.max_size == 0 {
            return Err(MinigstError::InvalidProperty(format!(
                "{}: max-size must be at least 1",
                name
            )));
        }

        let shared = Arc::new(QueueShared {
            settings,
            state: Mutex::new(QueueState {
                buffers: VecDeque::with_capacity(settings.max_size.min(1024)),
                discont_pending: false,
                flushing: true,
                srcresult: FlowReturn::Ok,
                accepted: 0,
                emitted: 0,
                dropped: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        });

        let element = Element::new(
            name,
            QueueImpl {
                shared: Arc::clone(&shared),
                task: Mutex::new(None),
            },
        );

        let chain_shared = Arc::clone(&shared);
        let chain_name = name.to_string();
        element
            .create_sink_pad("sink")
            .set_chain_function(move |_pad, buffer| chain_shared.chain(&chain_name, buffer))?;
        element.create_src_pad("src");

        Ok(Self { element, shared })
    }

    pub fn element(&self) -> Arc<Element> {
        Arc::clone(&self.element)
    }

    pub fn settings(&self) -> QueueSettings {
        self.shared.settings
    }

    pub fn stats(&self) -> QueueStats {
        self.shared.stats()
    }

    /// Number of buffers currently queued.
    pub fn level(&self) -> usize {
        self.shared.state.lock().buffers.len()
    }
}
