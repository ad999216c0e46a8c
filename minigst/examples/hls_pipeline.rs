// hls_pipeline.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of MiniGst
//
// SPDX-License-Identifier: GPL-3.0-only

//! Live HLS chain built by hand:
//!
//! ```text
//! livesrc (30 fps) -> videoenc -> queue (leaky) -> hlssegmenter -> uploadsink
//!    thread A                          |               thread B
//! ```
//!
//! Run with: cargo run --example hls_pipeline -- [seconds]

use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use minigst::elements::{
    EncoderSettings, HlsSegmenter, LiveSource, LiveSourceSettings, OverflowPolicy, Queue,
    QueueSettings, SegmenterSettings, UploadSink, UploadSinkSettings, VideoEncoder,
};
use minigst::gst::{Element, Pipeline, PipelineEvent, State};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("minigst=info".parse()?))
        .init();

    let seconds: f64 = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => 8.0,
    };

    let source = LiveSource::new("camera", LiveSourceSettings::default())?;
    let encoder = VideoEncoder::new("encoder", EncoderSettings { gop_size: 30 })?;
    let queue = Queue::new("queue", QueueSettings::new(10, OverflowPolicy::DropNewest))?;
    let segmenter = HlsSegmenter::new(
        "segmenter",
        SegmenterSettings {
            target_duration: 2.0,
        },
    )?;
    let sink = UploadSink::new(
        "s3sink",
        UploadSinkSettings {
            bucket: "live-streams".to_string(),
            ..UploadSinkSettings::default()
        },
    )?;

    let chain = [
        source.element(),
        encoder.element(),
        queue.element(),
        segmenter.element(),
        sink.element(),
    ];
    let pipeline = Pipeline::new("hls-pipeline");
    pipeline.add_many(chain.iter().cloned())?;
    let refs: Vec<&Element> = chain.iter().map(|e| e.as_ref()).collect();
    pipeline.link_many(&refs)?;

    let mut events = pipeline.subscribe();
    pipeline.set_state(State::Playing)?;
    info!("Running for {}s", seconds);

    tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
    pipeline.send_eos();

    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        while let Ok(event) = events.recv().await {
            if matches!(event, PipelineEvent::Eos { .. }) {
                return true;
            }
        }
        false
    })
    .await
    .unwrap_or(false);
    info!("Drained: {}, position {:.3}s", drained, pipeline.get_position());

    pipeline.set_state(State::Ready)?;
    println!("camera:    {:?}", source.stats());
    println!("encoder:   {:?}", encoder.stats());
    println!("queue:     {:?}", queue.stats());
    println!("segmenter: {:?}", segmenter.stats());
    println!("s3sink:    {:?}", sink.stats());
    pipeline.set_state(State::Null)?;

    Ok(())
}
