// element.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of MiniGst
//
// SPDX-License-Identifier: GPL-3.0-only

//! Elements and their lifecycle state machine.
//!
//! An [`Element`] owns its pads and walks the `Null <-> Ready <-> Paused <->
//! Playing` ladder one step at a time. Everything element-specific lives in
//! an [`ElementImpl`] whose hooks are invoked for each step.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, trace};

use crate::error::{MinigstError, Result};
use crate::gst::buffer::Buffer;
use crate::gst::clock::ClockReturn;
use crate::gst::event::PipelineEvent;
use crate::gst::pad::{Pad, PadDirection, PadMode};
use crate::gst::pipeline::PipelineContext;
use crate::gst::segment::Segment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    /// No resources allocated
    Null,
    /// Resources allocated, pads inactive
    Ready,
    /// Pads active, streaming threads stopped
    Paused,
    Playing,
}

impl State {
    /// The adjacent state one step closer to `target`.
    pub fn next_towards(self, target: State) -> State {
        use State::*;
        match self.cmp(&target) {
            std::cmp::Ordering::Less => match self {
                Null => Ready,
                Ready => Paused,
                Paused | Playing => Playing,
            },
            std::cmp::Ordering::Greater => match self {
                Playing => Paused,
                Paused => Ready,
                Ready | Null => Null,
            },
            std::cmp::Ordering::Equal => self,
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            State::Null => write!(f, "null"),
            State::Ready => write!(f, "ready"),
            State::Paused => write!(f, "paused"),
            State::Playing => write!(f, "playing"),
        }
    }
}

impl std::str::FromStr for State {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "null" => Ok(State::Null),
            "ready" => Ok(State::Ready),
            "paused" => Ok(State::Paused),
            "playing" => Ok(State::Playing),
            _ => Err("Invalid state. Valid values: null, ready, paused, playing".to_string()),
        }
    }
}

/// A single-step state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateChange {
    NullToReady,
    ReadyToPaused,
    PausedToPlaying,
    PlayingToPaused,
    PausedToReady,
    ReadyToNull,
}

impl StateChange {
    /// The transition between two adjacent states, `None` otherwise.
    pub fn between(current: State, next: State) -> Option<Self> {
        use State::*;
        match (current, next) {
            (Null, Ready) => Some(StateChange::NullToReady),
            (Ready, Paused) => Some(StateChange::ReadyToPaused),
            (Paused, Playing) => Some(StateChange::PausedToPlaying),
            (Playing, Paused) => Some(StateChange::PlayingToPaused),
            (Paused, Ready) => Some(StateChange::PausedToReady),
            (Ready, Null) => Some(StateChange::ReadyToNull),
            _ => None,
        }
    }

    pub fn current(self) -> State {
        match self {
            StateChange::NullToReady => State::Null,
            StateChange::ReadyToPaused | StateChange::ReadyToNull => State::Ready,
            StateChange::PausedToPlaying | StateChange::PausedToReady => State::Paused,
            StateChange::PlayingToPaused => State::Playing,
        }
    }

    pub fn next(self) -> State {
        match self {
            StateChange::ReadyToNull => State::Null,
            StateChange::NullToReady | StateChange::PausedToReady => State::Ready,
            StateChange::ReadyToPaused | StateChange::PlayingToPaused => State::Paused,
            StateChange::PausedToPlaying => State::Playing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateChangeReturn {
    Failure,
    Success,
    /// Accepted, completes later. Treated as success by the state machine.
    Async,
    /// Success, but the element produces live data and cannot preroll.
    NoPreroll,
}

impl StateChangeReturn {
    pub fn is_success(self) -> bool {
        !matches!(self, StateChangeReturn::Failure)
    }

    /// Combine the results of several steps or elements.
    /// Failure wins, then NoPreroll, then Async.
    pub fn merge(self, other: StateChangeReturn) -> StateChangeReturn {
        use StateChangeReturn::*;
        match (self, other) {
            (Failure, _) | (_, Failure) => Failure,
            (NoPreroll, _) | (_, NoPreroll) => NoPreroll,
            (Async, _) | (_, Async) => Async,
            _ => Success,
        }
    }
}

/// Outcome of [`Element::sync_buffer`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncOutcome {
    /// The buffer timestamp is outside the element segment; drop it.
    OutsideSegment,
    /// No clock wait was performed (sync disabled, not playing, or no running clock).
    Unsynced,
    /// Waited on the pipeline clock; positive jitter means the buffer was late.
    Synced { jitter: f64 },
}

/// Element-specific behaviour plugged into an [`Element`].
///
/// Every hook defaults to success. Pad activation on `Ready -> Paused` and
/// deactivation on `Paused -> Ready` are done by the element itself around
/// the corresponding hooks.
pub trait ElementImpl: Send + Sync + 'static {
    fn on_ready(&self, _element: &Element) -> StateChangeReturn {
        StateChangeReturn::Success
    }

    /// Called after the pads were activated.
    fn on_paused(&self, _element: &Element) -> StateChangeReturn {
        StateChangeReturn::Success
    }

    fn on_playing(&self, _element: &Element) -> StateChangeReturn {
        StateChangeReturn::Success
    }

    fn on_playing_to_paused(&self, _element: &Element) -> StateChangeReturn {
        StateChangeReturn::Success
    }

    /// Called before the pads are deactivated.
    fn on_paused_to_ready(&self, _element: &Element) -> StateChangeReturn {
        StateChangeReturn::Success
    }

    fn on_null(&self, _element: &Element) -> StateChangeReturn {
        StateChangeReturn::Success
    }

    /// Ask the element to finish its stream with an EOS buffer.
    /// Returns false when the element does not produce data on its own.
    fn send_eos(&self, _element: &Element) -> bool {
        false
    }

    /// Counters exposed to applications.
    fn stats(&self) -> Option<serde_json::Value> {
        None
    }
}

pub struct Element {
    name: String,
    weak_self: Weak<Element>,
    imp: Box<dyn ElementImpl>,
    state: RwLock<State>,
    /// Serializes `set_state` calls; never taken by streaming threads.
    state_lock: Mutex<()>,
    pads: RwLock<Vec<Arc<Pad>>>,
    segment: RwLock<Segment>,
    pipeline: RwLock<Weak<PipelineContext>>,
}

impl Element {
    pub fn new<I: ElementImpl>(name: &str, imp: I) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            name: name.to_string(),
            weak_self: weak_self.clone(),
            imp: Box::new(imp),
            state: RwLock::new(State::Null),
            state_lock: Mutex::new(()),
            pads: RwLock::new(Vec::new()),
            segment: RwLock::new(Segment::default()),
            pipeline: RwLock::new(Weak::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> State {
        *self.state.read()
    }

    pub fn stats(&self) -> Option<serde_json::Value> {
        self.imp.stats()
    }

    pub fn send_eos(&self) -> bool {
        let accepted = self.imp.send_eos(self);
        if accepted {
            info!("{} - end of stream requested", self.name);
        }
        accepted
    }

    // Pads

    pub fn create_src_pad(&self, name: &str) -> Arc<Pad> {
        self.add_pad(name, PadDirection::Src)
    }

    pub fn create_sink_pad(&self, name: &str) -> Arc<Pad> {
        self.add_pad(name, PadDirection::Sink)
    }

    fn add_pad(&self, name: &str, direction: PadDirection) -> Arc<Pad> {
        let pad = Pad::with_parent(name, direction, self.weak_self.clone(), &self.name);
        self.pads.write().push(Arc::clone(&pad));
        debug!("{} - added pad {} ({})", self.name, name, direction);
        pad
    }

    pub fn pads(&self) -> Vec<Arc<Pad>> {
        self.pads.read().clone()
    }

    pub fn pad(&self, name: &str) -> Option<Arc<Pad>> {
        self.pads.read().iter().find(|p| p.name() == name).cloned()
    }

    fn first_pad(&self, direction: PadDirection) -> Option<Arc<Pad>> {
        self.pads
            .read()
            .iter()
            .find(|p| p.direction() == direction)
            .cloned()
    }

    /// The first source pad.
    pub fn src_pad(&self) -> Option<Arc<Pad>> {
        self.first_pad(PadDirection::Src)
    }

    /// The first sink pad.
    pub fn sink_pad(&self) -> Option<Arc<Pad>> {
        self.first_pad(PadDirection::Sink)
    }

    /// Has sink pads but no source pad.
    pub fn is_sink(&self) -> bool {
        self.src_pad().is_none() && self.sink_pad().is_some()
    }

    /// Has source pads but no sink pad.
    pub fn is_source(&self) -> bool {
        self.sink_pad().is_none() && self.src_pad().is_some()
    }

    /// Link the first source pad of `self` to the first sink pad of `downstream`.
    pub fn link(&self, downstream: &Element) -> Result<()> {
        let src = self
            .src_pad()
            .ok_or_else(|| MinigstError::PadNotFound(format!("{} has no source pad", self.name)))?;
        let sink = downstream.sink_pad().ok_or_else(|| {
            MinigstError::PadNotFound(format!("{} has no sink pad", downstream.name))
        })?;
        src.link(&sink)?;
        info!("Element link: {} -> {}", self.name, downstream.name);
        Ok(())
    }

    // Pipeline back-reference, segment, bus

    pub(crate) fn set_pipeline(&self, context: Weak<PipelineContext>) {
        *self.pipeline.write() = context;
    }

    pub fn pipeline(&self) -> Option<Arc<PipelineContext>> {
        self.pipeline.read().upgrade()
    }

    pub fn segment(&self) -> Segment {
        *self.segment.read()
    }

    /// Replace the segment used by `sync_buffer`. Invalid segments are refused.
    pub fn set_segment(&self, segment: Segment) -> Result<()> {
        if !segment.is_valid() {
            return Err(MinigstError::InvalidProperty(format!(
                "{}: invalid {}",
                self.name, segment
            )));
        }
        *self.segment.write() = segment;
        Ok(())
    }

    /// Post an event on the owning pipeline's channel, if any.
    pub fn post(&self, event: PipelineEvent) {
        match self.pipeline() {
            Some(context) => context.post(event),
            None => trace!("{} - no pipeline, dropping event {:?}", self.name, event),
        }
    }

    pub fn post_error(&self, message: impl Into<String>) {
        self.post(PipelineEvent::Error {
            source: self.name.clone(),
            message: message.into(),
        });
    }

    pub fn post_eos(&self) {
        self.post(PipelineEvent::ElementEos {
            element: self.name.clone(),
        });
    }

    /// Wait on the pipeline clock until `buffer` is due.
    ///
    /// The buffer pts is mapped to running time through the element
    /// segment, offset by the pipeline base time, and waited for when `sync`
    /// is set and the element is playing.
    pub fn sync_buffer(&self, buffer: &Buffer, sync: bool) -> SyncOutcome {
        let Some(running_time) = self.segment().running_time(buffer.pts) else {
            return SyncOutcome::OutsideSegment;
        };
        if !sync || self.state() != State::Playing {
            return SyncOutcome::Unsynced;
        }
        let Some(context) = self.pipeline() else {
            return SyncOutcome::Unsynced;
        };

        let clock_time = running_time + context.base_time();
        trace!(
            "{} - waiting for clock time {:.3}s (now {:.3}s)",
            self.name,
            clock_time,
            context.clock().now()
        );
        match context.clock().wait_until(clock_time) {
            (ClockReturn::Ok, jitter) => SyncOutcome::Synced { jitter },
            (ClockReturn::BadTime, _) => SyncOutcome::Unsynced,
        }
    }

    // State machine

    /// Walk to `target` one adjacent state at a time.
    ///
    /// Stops at the first failing step and stays in the last state reached.
    pub fn set_state(&self, target: State) -> StateChangeReturn {
        let _guard = self.state_lock.lock();

        let mut current = self.state();
        if current == target {
            debug!("{} - already in {} state", self.name, target);
            return StateChangeReturn::Success;
        }

        info!("{} - state change: {} -> {}", self.name, current, target);

        let mut result = StateChangeReturn::Success;
        while current != target {
            let next = current.next_towards(target);
            let Some(transition) = StateChange::between(current, next) else {
                error!("{} - invalid state transition {} -> {}", self.name, current, next);
                return StateChangeReturn::Failure;
            };

            let ret = self.change_state(transition);
            if !ret.is_success() {
                error!(
                    "{} - state change {} -> {} failed, staying in {}",
                    self.name, current, next, current
                );
                self.post_error(format!("state change {} -> {} failed", current, next));
                return StateChangeReturn::Failure;
            }

            *self.state.write() = next;
            debug!("{} - now in {} ({:?})", self.name, next, ret);
            self.post(PipelineEvent::StateChanged {
                source: self.name.clone(),
                old_state: current,
                new_state: next,
            });

            result = result.merge(ret);
            current = next;
        }

        result
    }

    fn change_state(&self, transition: StateChange) -> StateChangeReturn {
        trace!("{} - change_state {:?}", self.name, transition);
        match transition {
            StateChange::NullToReady => self.imp.on_ready(self),
            StateChange::ReadyToPaused => {
                if !self.activate_pads(true) {
                    return StateChangeReturn::Failure;
                }
                let ret = self.imp.on_paused(self);
                if !ret.is_success() {
                    self.activate_pads(false);
                }
                ret
            }
            StateChange::PausedToPlaying => self.imp.on_playing(self),
            StateChange::PlayingToPaused => self.imp.on_playing_to_paused(self),
            StateChange::PausedToReady => {
                let ret = self.imp.on_paused_to_ready(self);
                self.activate_pads(false);
                ret
            }
            StateChange::ReadyToNull => self.imp.on_null(self),
        }
    }

    /// Activate source pads then sink pads, or deactivate all of them.
    /// A failed activation rolls every pad back to inactive.
    fn activate_pads(&self, active: bool) -> bool {
        let pads = self.pads();

        if !active {
            for pad in &pads {
                // Deactivation cannot fail.
                let _ = pad.activate(PadMode::Inactive);
            }
            return true;
        }

        let ordered = pads
            .iter()
            .filter(|p| p.direction() == PadDirection::Src)
            .chain(pads.iter().filter(|p| p.direction() == PadDirection::Sink));

        for pad in ordered {
            if let Err(e) = pad.activate(PadMode::Push) {
                error!("{} - failed to activate pad: {}", self.name, e);
                for pad in &pads {
                    let _ = pad.activate(PadMode::Inactive);
                }
                return false;
            }
        }
        true
    }
}

impl std::fmt::Debug for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Element")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("pads", &self.pads.read().len())
            .finish()
    }
}

/// Link each element to the next one.
pub fn link_many(elements: &[&Element]) -> Result<()> {
    for pair in elements.windows(2) {
        pair[0].link(pair[1])?;
    }
    Ok(())
}
