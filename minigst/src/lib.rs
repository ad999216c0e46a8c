// lib.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of MiniGst
//
// SPDX-License-Identifier: GPL-3.0-only

pub mod elements;
pub mod error;
pub mod gst;
pub mod launch;

pub use error::{MinigstError, Result};
pub use gst::{
    Buffer, BufferFlags, Element, ElementImpl, FlowReturn, Pad, PadDirection, Pipeline,
    PipelineEvent, State, StateChangeReturn,
};
pub use launch::parse_launch;
