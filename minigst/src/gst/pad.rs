// pad.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of MiniGst
//
// SPDX-License-Identifier: GPL-3.0-only

//! Pads and synchronous push/chain dispatch.
//!
//! Pushing a buffer on a source pad calls the chain function of the linked
//! sink pad directly, on the caller's thread, while holding the sink pad's
//! stream lock. The chain function may push further downstream, so one push
//! returns only after the whole reachable chain has handled the buffer.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, trace};

use crate::error::{MinigstError, Result};
use crate::gst::buffer::Buffer;
use crate::gst::element::Element;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PadDirection {
    /// Outputs data.
    Src,
    /// Receives data.
    Sink,
}

impl std::fmt::Display for PadDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PadDirection::Src => write!(f, "src"),
            PadDirection::Sink => write!(f, "sink"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PadMode {
    Inactive,
    Push,
}

/// Result of pushing a buffer, returned unchanged up the call chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlowReturn {
    Ok,
    /// The pad has no peer.
    NotLinked,
    /// The pad or its peer is flushing or inactive.
    Flushing,
    /// End of stream reached downstream.
    Eos,
    Error,
    NotSupported,
}

impl FlowReturn {
    pub fn is_ok(self) -> bool {
        self == FlowReturn::Ok
    }
}

impl std::fmt::Display for FlowReturn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowReturn::Ok => write!(f, "ok"),
            FlowReturn::NotLinked => write!(f, "not-linked"),
            FlowReturn::Flushing => write!(f, "flushing"),
            FlowReturn::Eos => write!(f, "eos"),
            FlowReturn::Error => write!(f, "error"),
            FlowReturn::NotSupported => write!(f, "not-supported"),
        }
    }
}

/// Function called with every buffer delivered to a sink pad.
pub type ChainFunction = Arc<dyn Fn(&Pad, Buffer) -> FlowReturn + Send + Sync>;

/// Flow result of [`Pad::try_push`]; `Err` carries a buffer that never reached a chain function.
pub type PushResult = std::result::Result<FlowReturn, (FlowReturn, Buffer)>;

pub struct Pad {
    name: String,
    direction: PadDirection,
    parent: Weak<Element>,
    parent_name: Option<String>,
    peer: RwLock<Weak<Pad>>,
    chain_function: RwLock<Option<ChainFunction>>,
    mode: RwLock<PadMode>,
    flushing: AtomicBool,
    eos: AtomicBool,
    /// Held for the duration of every chain call on this pad.
    stream_lock: Mutex<()>,
}

impl Pad {
    /// Create a pad without a parent element.
    pub fn new(name: &str, direction: PadDirection) -> Arc<Self> {
        Arc::new(Self::build(name, direction, Weak::new(), None))
    }

    pub(crate) fn with_parent(
        name: &str,
        direction: PadDirection,
        parent: Weak<Element>,
        parent_name: &str,
    ) -> Arc<Self> {
        Arc::new(Self::build(
            name,
            direction,
            parent,
            Some(parent_name.to_string()),
        ))
    }

    fn build(
        name: &str,
        direction: PadDirection,
        parent: Weak<Element>,
        parent_name: Option<String>,
    ) -> Self {
        Self {
            name: name.to_string(),
            direction,
            parent,
            parent_name,
            peer: RwLock::new(Weak::new()),
            chain_function: RwLock::new(None),
            mode: RwLock::new(PadMode::Inactive),
            // Pads start inactive, and inactive pads refuse data.
            flushing: AtomicBool::new(true),
            eos: AtomicBool::new(false),
            stream_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> PadDirection {
        self.direction
    }

    /// `element:pad`, or the bare pad name for pads without a parent.
    pub fn full_name(&self) -> String {
        match &self.parent_name {
            Some(parent) => format!("{}:{}", parent, self.name),
            None => self.name.clone(),
        }
    }

    pub fn parent(&self) -> Option<Arc<Element>> {
        self.parent.upgrade()
    }

    pub fn peer(&self) -> Option<Arc<Pad>> {
        self.peer.read().upgrade()
    }

    pub fn is_linked(&self) -> bool {
        self.peer().is_some()
    }

    pub fn mode(&self) -> PadMode {
        *self.mode.read()
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing.load(Ordering::Acquire)
    }

    pub fn set_flushing(&self, flushing: bool) {
        self.flushing.store(flushing, Ordering::Release);
    }

    pub fn is_eos(&self) -> bool {
        self.eos.load(Ordering::Acquire)
    }

    pub fn set_eos(&self, eos: bool) {
        self.eos.store(eos, Ordering::Release);
    }

    pub fn has_chain_function(&self) -> bool {
        self.chain_function.read().is_some()
    }

    /// Register the function receiving buffers pushed into this sink pad.
    pub fn set_chain_function<F>(&self, func: F) -> Result<()>
    where
        F: Fn(&Pad, Buffer) -> FlowReturn + Send + Sync + 'static,
    {
        if self.direction != PadDirection::Sink {
            return Err(MinigstError::WrongDirection(format!(
                "{} - chain functions can only be set on sink pads",
                self.full_name()
            )));
        }
        *self.chain_function.write() = Some(Arc::new(func));
        debug!("{} - chain function set", self.full_name());
        Ok(())
    }

    /// Link this source pad to `sink`. Both sides point at each other afterwards.
    pub fn link(self: &Arc<Self>, sink: &Arc<Pad>) -> Result<()> {
        if self.direction != PadDirection::Src {
            return Err(MinigstError::WrongDirection(format!(
                "{} is not a source pad",
                self.full_name()
            )));
        }
        if sink.direction != PadDirection::Sink {
            return Err(MinigstError::WrongDirection(format!(
                "{} is not a sink pad",
                sink.full_name()
            )));
        }

        // Lock order is always source then sink.
        let mut src_peer = self.peer.write();
        let mut sink_peer = sink.peer.write();

        if src_peer.upgrade().is_some() {
            return Err(MinigstError::AlreadyLinked(self.full_name()));
        }
        if sink_peer.upgrade().is_some() {
            return Err(MinigstError::AlreadyLinked(sink.full_name()));
        }

        *src_peer = Arc::downgrade(sink);
        *sink_peer = Arc::downgrade(self);

        info!("Linked {} -> {}", self.full_name(), sink.full_name());
        Ok(())
    }

    /// Break the link with the peer, if any, on both sides.
    pub fn unlink(&self) {
        let Some(peer) = self.peer() else {
            return;
        };

        let (src, sink) = match self.direction {
            PadDirection::Src => (self, peer.as_ref()),
            PadDirection::Sink => (peer.as_ref(), self),
        };
        let mut src_peer = src.peer.write();
        let mut sink_peer = sink.peer.write();
        *src_peer = Weak::new();
        *sink_peer = Weak::new();

        info!("Unlinked {} -X- {}", src.full_name(), sink.full_name());
    }

    /// Switch the pad mode. Inactive pads are flushing; activation clears
    /// both the flushing and EOS flags.
    pub fn activate(&self, mode: PadMode) -> Result<()> {
        match mode {
            PadMode::Inactive => {
                self.set_flushing(true);
                *self.mode.write() = PadMode::Inactive;
                debug!("{} - deactivated", self.full_name());
            }
            PadMode::Push => {
                if self.direction == PadDirection::Sink && !self.has_chain_function() {
                    return Err(MinigstError::NoChainFunction(self.full_name()));
                }
                *self.mode.write() = PadMode::Push;
                self.set_eos(false);
                self.set_flushing(false);
                debug!("{} - activated in push mode", self.full_name());
            }
        }
        Ok(())
    }

    /// Push `buffer` to the peer pad and return the flow result of the
    /// downstream chain.
    pub fn push(&self, buffer: Buffer) -> FlowReturn {
        match self.try_push(buffer) {
            Ok(ret) => ret,
            Err((ret, _)) => ret,
        }
    }

    /// Like [`Pad::push`], but a buffer refused before it reached the peer's
    /// chain function is handed back with the flow result.
    pub fn try_push(&self, buffer: Buffer) -> PushResult {
        if self.direction != PadDirection::Src {
            error!("{} - can only push from source pads", self.full_name());
            return Err((FlowReturn::Error, buffer));
        }
        if self.is_flushing() || self.mode() != PadMode::Push {
            debug!("{} - pad is flushing", self.full_name());
            return Err((FlowReturn::Flushing, buffer));
        }
        if self.is_eos() {
            debug!("{} - pad is EOS", self.full_name());
            return Err((FlowReturn::Eos, buffer));
        }
        let Some(peer) = self.peer() else {
            debug!("{} - not linked", self.full_name());
            return Err((FlowReturn::NotLinked, buffer));
        };

        let is_eos = buffer.is_eos();
        trace!("PUSH {} -> {} | {}", self.full_name(), peer.full_name(), buffer);

        let ret = peer.chain(buffer)?;

        trace!("PUSH {} returned {}", self.full_name(), ret);
        if is_eos && matches!(ret, FlowReturn::Ok | FlowReturn::Eos) {
            self.set_eos(true);
        }
        Ok(ret)
    }

    fn chain(&self, buffer: Buffer) -> PushResult {
        if self.is_flushing() {
            return Err((FlowReturn::Flushing, buffer));
        }
        if self.is_eos() {
            return Err((FlowReturn::Eos, buffer));
        }

        let _stream = self.stream_lock.lock();

        // State may have changed while waiting for the stream lock.
        if self.is_flushing() || self.mode() != PadMode::Push {
            return Err((FlowReturn::Flushing, buffer));
        }
        if self.is_eos() {
            return Err((FlowReturn::Eos, buffer));
        }

        let Some(chain) = self.chain_function.read().clone() else {
            error!("{} - no chain function set", self.full_name());
            return Err((FlowReturn::Error, buffer));
        };

        let is_eos = buffer.is_eos();
        let ret = chain(self, buffer);
        if is_eos {
            self.set_eos(true);
        }
        Ok(ret)
    }
}

impl std::fmt::Debug for Pad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pad")
            .field("name", &self.full_name())
            .field("direction", &self.direction)
            .field("mode", &self.mode())
            .field("peer", &self.peer().map(|p| p.full_name()))
            .field("flushing", &self.is_flushing())
            .field("eos", &self.is_eos())
            .finish()
    }
}
