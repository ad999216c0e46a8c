// mod.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of MiniGst
//
// SPDX-License-Identifier: GPL-3.0-only

pub mod buffer;
pub mod clock;
pub mod element;
pub mod event;
pub mod pad;
pub mod pipeline;
pub mod segment;
pub mod task;

pub use buffer::{Buffer, BufferFlags};
pub use clock::{Clock, ClockReturn};
pub use element::{
    link_many, Element, ElementImpl, State, StateChange, StateChangeReturn, SyncOutcome,
};
pub use event::{create_event_channel, EventReceiver, EventSender, PipelineEvent};
pub use pad::{ChainFunction, FlowReturn, Pad, PadDirection, PadMode, PushResult};
pub use pipeline::{Pipeline, PipelineContext};
pub use segment::Segment;
pub use task::{StopToken, StreamTask};

/// Maximum time in milliseconds to wait for a streaming thread to stop
pub const TASK_JOIN_TIMEOUT_MS: u64 = 1000;

/// Interval in milliseconds at which a waiting queue drain loop re-checks for a stop request
pub const DRAIN_POLL_INTERVAL_MS: u64 = 100;

/// Back-off in milliseconds before a source retries after a FLUSHING or NOT_LINKED flow
pub const FLOW_RETRY_BACKOFF_MS: u64 = 20;

/// Capacity of the per-pipeline event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[cfg(test)]
mod buffer_tests;




#[cfg(test)]
mod pad_tests;



#[cfg(test)]
mod task_tests;
