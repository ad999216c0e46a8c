// pipeline.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of MiniGst
//
// SPDX-License-Identifier: GPL-3.0-only

use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

use crate::error::{MinigstError, Result};
use crate::gst::clock::Clock;
use crate::gst::element::{link_many, Element, State, StateChangeReturn};
use crate::gst::event::{EventReceiver, EventSender, PipelineEvent};

/// State shared between a pipeline and its elements: clock, base time and
/// event channel. Elements only hold a weak reference to it.
pub struct PipelineContext {
    name: String,
    clock: Clock,
    base_time: Mutex<f64>,
    event_tx: EventSender,
    sinks: Mutex<HashSet<String>>,
    eos: Mutex<EosTracker>,
}

#[derive(Default)]
struct EosTracker {
    received: HashSet<String>,
    posted: bool,
}

impl PipelineContext {
    fn new(name: &str) -> Self {
        let (event_tx, _) = crate::gst::event::create_event_channel();
        Self {
            name: name.to_string(),
            clock: Clock::new(),
            base_time: Mutex::new(0.0),
            event_tx,
            sinks: Mutex::new(HashSet::new()),
            eos: Mutex::new(EosTracker::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Clock reading captured when the pipeline entered PLAYING.
    pub fn base_time(&self) -> f64 {
        *self.base_time.lock()
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.event_tx.subscribe()
    }

    /// Send `event` to subscribers. Element EOS notifications are also
    /// aggregated into a single pipeline EOS once every sink reported one.
    pub fn post(&self, event: PipelineEvent) {
        let all_sinks_eos = match &event {
            PipelineEvent::ElementEos { element } => self.record_eos(element),
            _ => false,
        };

        self.send(event);

        if all_sinks_eos {
            info!("Pipeline '{}' reached end of stream", self.name);
            self.send(PipelineEvent::Eos {
                pipeline: self.name.clone(),
            });
        }
    }

    fn send(&self, event: PipelineEvent) {
        if self.event_tx.send(event).is_err() {
            trace!("Pipeline '{}' event dropped: no receivers", self.name);
        }
    }

    fn record_eos(&self, element: &str) -> bool {
        let sinks = self.sinks.lock();
        let mut eos = self.eos.lock();
        eos.received.insert(element.to_string());
        if eos.posted || sinks.is_empty() {
            return false;
        }
        if sinks.iter().all(|s| eos.received.contains(s)) {
            eos.posted = true;
            return true;
        }
        false
    }

    fn reset_eos(&self) {
        *self.eos.lock() = EosTracker::default();
    }
}

pub struct Pipeline {
    context: Arc<PipelineContext>,
    elements: RwLock<Vec<Arc<Element>>>,
    state: RwLock<State>,
    state_lock: Mutex<()>,
    /// Element whose state change failed; PLAYING is refused until the
    /// pipeline went back to NULL.
    failed_element: Mutex<Option<String>>,
}

impl Pipeline {
    pub fn new(name: &str) -> Self {
        info!("Created pipeline '{}'", name);
        Self {
            context: Arc::new(PipelineContext::new(name)),
            elements: RwLock::new(Vec::new()),
            state: RwLock::new(State::Null),
            state_lock: Mutex::new(()),
            failed_element: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        self.context.name()
    }

    pub fn context(&self) -> &Arc<PipelineContext> {
        &self.context
    }

    pub fn clock(&self) -> &Clock {
        self.context.clock()
    }

    pub fn base_time(&self) -> f64 {
        self.context.base_time()
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.context.subscribe()
    }

    pub fn add(&self, element: Arc<Element>) -> Result<()> {
        let mut elements = self.elements.write();
        if elements.iter().any(|e| e.name() == element.name()) {
            return Err(MinigstError::DuplicateElement(element.name().to_string()));
        }
        if element.pipeline().is_some() {
            return Err(MinigstError::DuplicateElement(format!(
                "{} already belongs to a pipeline",
                element.name()
            )));
        }

        element.set_pipeline(Arc::downgrade(&self.context));
        if element.is_sink() {
            self.context.sinks.lock().insert(element.name().to_string());
        }
        info!("Pipeline '{}' added element '{}'", self.name(), element.name());
        elements.push(element);
        Ok(())
    }

    pub fn add_many<I>(&self, elements: I) -> Result<()>
    where
        I: IntoIterator<Item = Arc<Element>>,
    {
        for element in elements {
            self.add(element)?;
        }
        Ok(())
    }

    /// Remove an element and clear its pipeline back-reference.
    pub fn remove(&self, name: &str) -> Result<Arc<Element>> {
        let mut elements = self.elements.write();
        let index = elements
            .iter()
            .position(|e| e.name() == name)
            .ok_or_else(|| MinigstError::ElementNotFound(name.to_string()))?;

        let element = elements.remove(index);
        element.set_pipeline(std::sync::Weak::new());
        self.context.sinks.lock().remove(name);
        info!("Pipeline '{}' removed element '{}'", self.name(), name);
        Ok(element)
    }

    pub fn get_element(&self, name: &str) -> Option<Arc<Element>> {
        self.elements
            .read()
            .iter()
            .find(|e| e.name() == name)
            .cloned()
    }

    pub fn elements(&self) -> Vec<Arc<Element>> {
        self.elements.read().clone()
    }

    pub fn link(&self, src: &Element, dst: &Element) -> Result<()> {
        src.link(dst)
    }

    pub fn link_many(&self, elements: &[&Element]) -> Result<()> {
        link_many(elements)
    }

    pub fn state(&self) -> State {
        *self.state.read()
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.state(), State::Playing)
    }

    /// Bring every element, in registration order, to `target`.
    ///
    /// Entering PLAYING with a stopped clock starts it and fixes the base
    /// time. Reaching NULL stops the clock so the next PLAYING selects a new
    /// base time.
    pub fn set_state(&self, target: State) -> Result<StateChangeReturn> {
        let _guard = self.state_lock.lock();

        let current = self.state();
        if current == target && self.failed_element.lock().is_none() {
            return Ok(StateChangeReturn::Success);
        }

        if target == State::Playing {
            if let Some(failed) = self.failed_element.lock().as_deref() {
                return Err(MinigstError::StateChangeFailed(format!(
                    "pipeline '{}' has failed element '{}', reset it to null first",
                    self.name(),
                    failed
                )));
            }
        }

        info!(
            "Pipeline '{}' setting state {} -> {}",
            self.name(),
            current,
            target
        );

        if current <= State::Ready && target > State::Ready {
            self.context.reset_eos();
        }

        if target == State::Playing && !self.clock().is_started() {
            self.clock().start();
            let base_time = self.clock().now();
            *self.context.base_time.lock() = base_time;
            info!(
                "Pipeline '{}' base time set to {:.3}s",
                self.name(),
                base_time
            );
        }

        let mut result = StateChangeReturn::Success;
        for element in self.elements() {
            let ret = element.set_state(target);
            if !ret.is_success() {
                error!(
                    "Pipeline '{}' state change to {} failed at element '{}'",
                    self.name(),
                    target,
                    element.name()
                );
                *self.failed_element.lock() = Some(element.name().to_string());
                self.context.post(PipelineEvent::Error {
                    source: self.name().to_string(),
                    message: format!("element '{}' failed to reach {}", element.name(), target),
                });
                return Err(MinigstError::StateChangeFailed(format!(
                    "element '{}' failed to reach {} in pipeline '{}'",
                    element.name(),
                    target,
                    self.name()
                )));
            }
            result = result.merge(ret);
        }

        *self.state.write() = target;

        if target == State::Null {
            *self.failed_element.lock() = None;
            self.clock().stop();
            *self.context.base_time.lock() = 0.0;
        }

        info!("Pipeline '{}' state set to {} ({:?})", self.name(), target, result);
        self.context.post(PipelineEvent::StateChanged {
            source: self.name().to_string(),
            old_state: current,
            new_state: target,
        });

        Ok(result)
    }

    pub fn play(&self) -> Result<()> {
        self.set_state(State::Playing).map(|_| ())
    }

    pub fn pause(&self) -> Result<()> {
        self.set_state(State::Paused).map(|_| ())
    }

    pub fn stop(&self) -> Result<()> {
        self.set_state(State::Null).map(|_| ())
    }

    /// Ask every source element to end its stream. Returns true if at
    /// least one of them accepted; the pipeline EOS event follows once the
    /// EOS buffers reached every sink.
    pub fn send_eos(&self) -> bool {
        let mut accepted = false;
        for element in self.elements() {
            if element.is_source() {
                accepted |= element.send_eos();
            }
        }
        if !accepted {
            warn!("Pipeline '{}' has no source accepting EOS", self.name());
        }
        accepted
    }

    /// Running time of the pipeline in seconds, 0 unless PLAYING.
    pub fn get_position(&self) -> f64 {
        if self.state() == State::Playing {
            self.clock().now() - self.base_time()
        } else {
            0.0
        }
    }

    /// Statistics of every element that exposes some, in registration order.
    pub fn stats(&self) -> Vec<(String, serde_json::Value)> {
        self.elements()
            .iter()
            .filter_map(|e| e.stats().map(|s| (e.name().to_string(), s)))
            .collect()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        debug!("Dropping pipeline '{}'", self.name());

        let _ = self.set_state(State::Null);
        for element in self.elements.read().iter() {
            element.set_pipeline(std::sync::Weak::new());
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .elements
            .read()
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        f.debug_struct("Pipeline")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("elements", &names)
            .finish()
    }
}
