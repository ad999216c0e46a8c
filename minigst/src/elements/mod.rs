// mod.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of MiniGst
//
// SPDX-License-Identifier: GPL-3.0-only

//! Stock elements and the factory used by launch descriptions.

pub mod encoder;
pub mod fakesink;
pub mod livesource;
pub mod queue;
pub mod segmenter;
pub mod uploadsink;

pub use encoder::{EncoderSettings, EncoderStats, VideoEncoder};
pub use fakesink::{FakeSink, FakeSinkSettings, FakeSinkStats, HandoffFunction};
pub use livesource::{LiveSource, LiveSourceSettings, LiveSourceStats};
pub use queue::{OverflowPolicy, Queue, QueueSettings, QueueStats};
pub use segmenter::{HlsSegmenter, SegmenterSettings, SegmenterStats};
pub use uploadsink::{UploadSink, UploadSinkSettings, UploadSinkStats};

use std::str::FromStr;
use std::sync::Arc;

use crate::error::{MinigstError, Result};
use crate::gst::Element;

/// `key=value` pairs in the order they were given.
pub type Properties = [(String, String)];

/// Factory names accepted by [`make`].
pub const FACTORIES: &[&str] = &[
    "livesrc",
    "queue",
    "videoenc",
    "hlssegmenter",
    "uploadsink",
    "fakesink",
];

/// Create an element from its factory name and string properties.
pub fn make(factory: &str, name: &str, properties: &Properties) -> Result<Arc<Element>> {
    let element = match factory {
        "livesrc" => LiveSource::new(name, LiveSourceSettings::from_properties(properties)?)?
            .element(),
        "queue" => Queue::new(name, QueueSettings::from_properties(properties)?)?.element(),
        "videoenc" => {
            VideoEncoder::new(name, EncoderSettings::from_properties(properties)?)?.element()
        }
        "hlssegmenter" => {
            HlsSegmenter::new(name, SegmenterSettings::from_properties(properties)?)?.element()
        }
        "uploadsink" => {
            UploadSink::new(name, UploadSinkSettings::from_properties(properties)?)?.element()
        }
        "fakesink" => FakeSink::new(name, FakeSinkSettings::from_properties(properties)?)?.element(),
        _ => return Err(MinigstError::UnknownFactory(factory.to_string())),
    };
    Ok(element)
}

pub(crate) fn parse_value<T: FromStr>(factory: &str, key: &str, value: &str) -> Result<T> {
    value.trim().parse::<T>().map_err(|_| {
        MinigstError::InvalidProperty(format!(
            "{}: cannot parse '{}' for property '{}'",
            factory, value, key
        ))
    })
}

pub(crate) fn parse_bool(factory: &str, key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(MinigstError::InvalidProperty(format!(
            "{}: '{}' is not a boolean for property '{}'",
            factory, value, key
        ))),
    }
}

pub(crate) fn unknown_property(factory: &str, key: &str) -> MinigstError {
    MinigstError::InvalidProperty(format!("{} has no property '{}'", factory, key))
}

#[cfg(test)]
mod elements_tests;
