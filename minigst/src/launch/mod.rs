// mod.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of MiniGst
//
// SPDX-License-Identifier: GPL-3.0-only

//! Building pipelines from `gst-launch`-like text descriptions.

pub mod parser;

pub use parser::{parse_description, ElementDescription};

use tracing::info;

use crate::elements;
use crate::error::Result;
use crate::gst::Pipeline;

/// Maximum accepted length of a pipeline description, in bytes.
pub const MAX_PIPELINE_DESCRIPTION_LENGTH: usize = 64 * 1024; // 64KB

/// Name given to pipelines built by [`parse_launch`].
pub const DEFAULT_PIPELINE_NAME: &str = "pipeline0";

/// Build and link a pipeline from a description such as
/// `livesrc num-buffers=5 ! queue max-size=3 ! fakesink sync=true`.
pub fn parse_launch(description: &str) -> Result<Pipeline> {
    parse_launch_with_name(DEFAULT_PIPELINE_NAME, description)
}

pub fn parse_launch_with_name(name: &str, description: &str) -> Result<Pipeline> {
    let descriptions = parse_description(description)?;

    let pipeline = Pipeline::new(name);
    let mut chain = Vec::with_capacity(descriptions.len());
    for desc in &descriptions {
        let element = elements::make(&desc.factory, &desc.name, &desc.properties)?;
        pipeline.add(std::sync::Arc::clone(&element))?;
        chain.push(element);
    }

    let refs: Vec<&crate::gst::Element> = chain.iter().map(|e| e.as_ref()).collect();
    pipeline.link_many(&refs)?;

    info!(
        "Pipeline '{}' built from description with {} elements",
        name,
        chain.len()
    );
    Ok(pipeline)
}
