// elements_tests.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of MiniGst
//
// SPDX-License-Identifier: GPL-3.0-only

use super::*;
use crate::error::MinigstError;
use crate::gst::{Buffer, BufferFlags, FlowReturn, Pad, PadDirection, PadMode, State};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn props(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn frame(n: u64, pts: f64) -> Buffer {
    Buffer::new(pts, 0.1, json!({ "frame": n })).with_sequence(n)
}

fn wait_for(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

/// Feed pad linked to `element`, both active, with a recording fakesink
/// downstream when the element has a source pad.
fn feed(element: &Arc<crate::gst::Element>) -> (Arc<Pad>, FakeSink, Arc<Mutex<Vec<Buffer>>>) {
    let sink = FakeSink::new("recorder", FakeSinkSettings::default()).unwrap();
    let received = Arc::new(Mutex::new(Vec::new()));
    let r = Arc::clone(&received);
    sink.connect_handoff(move |buffer| r.lock().push(buffer.clone()));

    if element.src_pad().is_some() {
        element.link(&sink.element()).unwrap();
    }
    let pad = Pad::new("feed", PadDirection::Src);
    pad.link(&element.sink_pad().unwrap()).unwrap();
    pad.activate(PadMode::Push).unwrap();

    assert!(sink.element().set_state(State::Playing).is_success());
    assert!(element.set_state(State::Playing).is_success());
    (pad, sink, received)
}

// =============================================================================
// Factory
// =============================================================================

#[test]
fn test_make_every_factory() {
    for factory in FACTORIES {
        let element = make(factory, &format!("{}0", factory), &[]).unwrap();
        assert_eq!(element.name(), format!("{}0", factory));
        assert!(element.stats().is_some());
    }
}

#[test]
fn test_make_unknown_factory() {
    assert!(matches!(
        make("x264enc", "enc", &[]),
        Err(MinigstError::UnknownFactory(_))
    ));
}

#[test]
fn test_make_unknown_property() {
    let result = make("queue", "q", &props(&[("max-bytes", "10")]));
    match result {
        Err(MinigstError::InvalidProperty(msg)) => assert!(msg.contains("max-bytes")),
        other => panic!("Expected InvalidProperty, got {:?}", other),
    }
}

#[test]
fn test_make_invalid_values() {
    assert!(make("livesrc", "s", &props(&[("rate", "fast")])).is_err());
    assert!(make("livesrc", "s", &props(&[("rate", "0")])).is_err());
    assert!(make("fakesink", "f", &props(&[("sync", "maybe")])).is_err());
    assert!(make("videoenc", "e", &props(&[("gop-size", "0")])).is_err());
    assert!(make("hlssegmenter", "h", &props(&[("target-duration", "-1")])).is_err());
}

#[test]
fn test_settings_from_properties() {
    let source = LiveSourceSettings::from_properties(&props(&[
        ("rate", "10"),
        ("num-buffers", "5"),
        ("is-live", "false"),
    ]))
    .unwrap();
    assert_eq!(source.rate, 10.0);
    assert_eq!(source.num_buffers, Some(5));
    assert!(!source.is_live);

    let unlimited = LiveSourceSettings::from_properties(&props(&[("num-buffers", "-1")])).unwrap();
    assert_eq!(unlimited.num_buffers, None);

    let upload = UploadSinkSettings::from_properties(&props(&[
        ("bucket", "media"),
        ("sync", "no"),
        ("upload-delay-ms", "0"),
    ]))
    .unwrap();
    assert_eq!(upload.bucket, "media");
    assert!(!upload.sync);
    assert_eq!(upload.upload_delay_ms, 0);
}

// =============================================================================
// Encoder
// =============================================================================

#[test]
fn test_encoder_marks_key_units() {
    let encoder = VideoEncoder::new("enc", EncoderSettings { gop_size: 2 }).unwrap();
    let (pad, _sink, received) = feed(&encoder.element());

    for n in 0..5 {
        assert_eq!(pad.push(frame(n, n as f64 * 0.1)), FlowReturn::Ok);
    }

    let received = received.lock();
    let delta: Vec<bool> = received
        .iter()
        .map(|b| b.has_flag(BufferFlags::DELTA_UNIT))
        .collect();
    assert_eq!(delta, vec![false, true, false, true, false]);
    assert_eq!(received[0].payload()["encoding"]["keyframe"], true);
    assert_eq!(received[1].payload()["encoding"]["gop_index"], 1);

    let stats = encoder.stats();
    assert_eq!(stats.processed, 5);
    assert_eq!(stats.keyframes, 3);
}

#[test]
fn test_encoder_copies_shared_payload() {
    let encoder = VideoEncoder::new("enc", EncoderSettings::default()).unwrap();
    let (pad, _sink, received) = feed(&encoder.element());

    let original = frame(0, 0.0);
    let kept = original.clone();
    assert_eq!(pad.push(original), FlowReturn::Ok);

    assert!(kept.payload().get("encoding").is_none());
    assert!(received.lock()[0].payload().get("encoding").is_some());
}

#[test]
fn test_encoder_refused_frame_keeps_its_index() {
    let encoder = VideoEncoder::new("enc", EncoderSettings { gop_size: 2 }).unwrap();
    let (pad, sink, received) = feed(&encoder.element());

    assert!(sink.element().set_state(State::Ready).is_success());
    assert_eq!(pad.push(frame(0, 0.0)), FlowReturn::Flushing);
    assert_eq!(encoder.stats().processed, 0);
    assert_eq!(encoder.stats().keyframes, 0);

    assert!(sink.element().set_state(State::Playing).is_success());
    assert_eq!(pad.push(frame(0, 0.0)), FlowReturn::Ok);
    assert!(!received.lock()[0].has_flag(BufferFlags::DELTA_UNIT));
    assert_eq!(encoder.stats().keyframes, 1);
}

#[test]
fn test_encoder_forwards_downstream_flow() {
    let encoder = VideoEncoder::new("enc", EncoderSettings::default()).unwrap();
    let (pad, _sink, _) = feed(&encoder.element());
    assert_eq!(pad.push(Buffer::eos(0.0)), FlowReturn::Eos);
    assert_eq!(encoder.stats().processed, 0);
}

// =============================================================================
// Segmenter
// =============================================================================

#[test]
fn test_segmenter_aggregates_and_flushes_on_eos() {
    let segmenter = HlsSegmenter::new(
        "seg",
        SegmenterSettings {
            target_duration: 1.0,
        },
    )
    .unwrap();
    let (pad, sink, received) = feed(&segmenter.element());

    for (n, pts) in [0.0, 0.5, 1.0, 1.5].into_iter().enumerate() {
        assert_eq!(pad.push(frame(n as u64, pts)), FlowReturn::Ok);
    }
    assert_eq!(received.lock().len(), 1);
    assert_eq!(segmenter.stats().pending_frames, 1);

    assert_eq!(pad.push(Buffer::eos(1.6)), FlowReturn::Eos);
    assert_eq!(sink.stats().eos_received, 1);

    let received = received.lock();
    assert_eq!(received.len(), 2);

    let first = &received[0];
    assert!(first.has_flag(BufferFlags::SEGMENT));
    assert_eq!(first.pts, 0.0);
    assert!((first.duration - 1.1).abs() < 1e-9);
    assert_eq!(first.payload()["segment_num"], 0);
    assert_eq!(first.payload()["num_frames"], 3);
    assert_eq!(first.payload()["frames"][2]["frame"], 2);

    let last = &received[1];
    assert_eq!(last.pts, 1.5);
    assert_eq!(last.payload()["segment_num"], 1);
    assert_eq!(last.payload()["num_frames"], 1);
    assert_eq!(segmenter.stats().segments, 2);
}

#[test]
fn test_segmenter_drops_pending_on_ready() {
    let segmenter = HlsSegmenter::new("seg", SegmenterSettings::default()).unwrap();
    let (pad, _sink, received) = feed(&segmenter.element());

    pad.push(frame(0, 0.0));
    assert_eq!(segmenter.stats().pending_frames, 1);

    segmenter.element().set_state(State::Ready);
    assert_eq!(segmenter.stats().pending_frames, 0);
    assert!(received.lock().is_empty());
}

// =============================================================================
// Sinks
// =============================================================================

#[test]
fn test_uploadsink_uploads_segments() {
    let settings = UploadSinkSettings {
        bucket: "media".to_string(),
        sync: false,
        upload_delay_ms: 0,
    };
    let sink = UploadSink::new("upload", settings).unwrap();
    let element = sink.element();
    let pad = Pad::new("feed", PadDirection::Src);
    pad.link(&element.sink_pad().unwrap()).unwrap();
    pad.activate(PadMode::Push).unwrap();
    element.set_state(State::Playing);

    let segment = Buffer::new(0.0, 6.0, json!({ "segment_num": 0, "num_frames": 180 }))
        .with_flags(BufferFlags::SEGMENT);
    assert_eq!(pad.push(segment), FlowReturn::Ok);
    assert_eq!(pad.push(frame(1, 6.5)), FlowReturn::Ok);
    assert_eq!(pad.push(Buffer::eos(7.0)), FlowReturn::Eos);

    let stats = sink.stats();
    assert_eq!(stats.segments_uploaded, 1);
    assert_eq!(stats.buffers_rendered, 2);
    assert_eq!(stats.last_rendered_pts, 6.5);
    assert_eq!(stats.objects, vec!["s3://media/segment_0.cmfv".to_string()]);

    element.set_state(State::Null);
    assert_eq!(sink.stats().segments_uploaded, 0);
}

#[test]
fn test_fakesink_drops_buffers_outside_segment() {
    let sink = FakeSink::new("sink", FakeSinkSettings::default()).unwrap();
    let element = sink.element();
    element.set_segment(crate::gst::Segment::new(1.0, None, 1.0, 0.0)).unwrap();
    let pad = Pad::new("feed", PadDirection::Src);
    pad.link(&element.sink_pad().unwrap()).unwrap();
    pad.activate(PadMode::Push).unwrap();
    element.set_state(State::Playing);

    assert_eq!(pad.push(frame(0, 0.5)), FlowReturn::Ok);
    assert_eq!(pad.push(frame(1, 1.5)), FlowReturn::Ok);
    let stats = sink.stats();
    assert_eq!(stats.rendered, 1);
    assert_eq!(stats.last_pts, Some(1.5));
}

// =============================================================================
// Live source
// =============================================================================

#[test]
fn test_livesource_num_buffers_then_eos() {
    let settings = LiveSourceSettings {
        rate: 200.0,
        num_buffers: Some(4),
        is_live: false,
    };
    let source = LiveSource::new("src", settings).unwrap();
    let sink = FakeSink::new("sink", FakeSinkSettings::default()).unwrap();
    let received = Arc::new(Mutex::new(Vec::new()));
    let r = Arc::clone(&received);
    sink.connect_handoff(move |buffer| r.lock().push(buffer.clone()));
    source.element().link(&sink.element()).unwrap();

    assert!(sink.element().set_state(State::Playing).is_success());
    assert_eq!(
        source.element().set_state(State::Playing),
        crate::gst::StateChangeReturn::Success
    );

    assert!(wait_for(Duration::from_secs(2), || sink.stats().eos_received == 1));
    let received = received.lock().clone();
    assert_eq!(received.len(), 4);
    assert!(received[0].has_flag(BufferFlags::DISCONT));
    assert!(!received[1].has_flag(BufferFlags::DISCONT));
    assert_eq!(received[3].payload()["content"], "frame_000003");
    assert!((received[2].pts - 2.0 / 200.0).abs() < 1e-9);
    assert_eq!(source.stats().emitted, 4);

    source.element().set_state(State::Null);
    sink.element().set_state(State::Null);
    assert_eq!(source.stats().emitted, 0);
}

#[test]
fn test_livesource_is_no_preroll_and_retries_when_flushing() {
    let source = LiveSource::new("src", LiveSourceSettings::default()).unwrap();
    let sink = FakeSink::new("sink", FakeSinkSettings::default()).unwrap();
    source.element().link(&sink.element()).unwrap();

    // Downstream still inactive: pushes fail with FLUSHING and are retried.
    assert_eq!(
        source.element().set_state(State::Playing),
        crate::gst::StateChangeReturn::NoPreroll
    );
    assert!(wait_for(Duration::from_secs(2), || source.stats().failed > 0));
    assert_eq!(source.stats().emitted, 0);

    sink.element().set_state(State::Playing);
    assert!(wait_for(Duration::from_secs(2), || sink.stats().rendered > 2));

    // An EOS request ends the stream through the normal data path.
    assert!(source.element().send_eos());
    assert!(wait_for(Duration::from_secs(2), || sink.stats().eos_received == 1));

    source.element().set_state(State::Null);
    sink.element().set_state(State::Null);
}

#[test]
fn test_livesource_restart_after_join_timeout_keeps_one_producer() {
    let source = LiveSource::new(
        "src",
        LiveSourceSettings {
            rate: 50.0,
            ..LiveSourceSettings::default()
        },
    )
    .unwrap();
    let sink = FakeSink::new("sink", FakeSinkSettings::default()).unwrap();
    let sequences = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&sequences);
    sink.connect_handoff(move |buffer| {
        let first = {
            let mut seen = s.lock();
            seen.push(buffer.sequence);
            seen.len() == 1
        };
        if first {
            // Outlasts the streaming task join timeout.
            std::thread::sleep(Duration::from_millis(crate::gst::TASK_JOIN_TIMEOUT_MS + 500));
        }
    });
    source.element().link(&sink.element()).unwrap();
    sink.element().set_state(State::Playing);
    source.element().set_state(State::Playing);

    assert!(wait_for(Duration::from_secs(1), || !sequences.lock().is_empty()));
    // The join times out and the stuck thread is detached.
    source.element().set_state(State::Paused);
    source.element().set_state(State::Playing);
    assert!(wait_for(Duration::from_secs(3), || sequences.lock().len() >= 10));

    source.element().set_state(State::Null);
    sink.element().set_state(State::Null);

    let sequences = sequences.lock().clone();
    assert!(
        sequences.windows(2).all(|w| w[0] < w[1]),
        "sequences not strictly increasing: {:?}",
        sequences
    );
}
