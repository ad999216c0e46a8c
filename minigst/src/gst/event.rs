// event.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of MiniGst
//
// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};

use crate::gst::element::State;
use crate::gst::EVENT_CHANNEL_CAPACITY;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum PipelineEvent {
    /// An element or the pipeline itself completed one state step.
    #[serde(rename = "state_changed")]
    StateChanged {
        source: String,
        old_state: State,
        new_state: State,
    },
    #[serde(rename = "error")]
    Error { source: String, message: String },
    /// A sink element received the EOS buffer.
    #[serde(rename = "element_eos")]
    ElementEos { element: String },
    /// Every sink of the pipeline received EOS.
    #[serde(rename = "eos")]
    Eos { pipeline: String },
}

pub type EventSender = tokio::sync::broadcast::Sender<PipelineEvent>;
pub type EventReceiver = tokio::sync::broadcast::Receiver<PipelineEvent>;

pub fn create_event_channel() -> (EventSender, EventReceiver) {
    tokio::sync::broadcast::channel(EVENT_CHANNEL_CAPACITY)
}
