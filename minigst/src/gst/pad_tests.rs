// pad_tests.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of MiniGst
//
// SPDX-License-Identifier: GPL-3.0-only

use super::buffer::Buffer;
use super::pad::*;
use crate::error::MinigstError;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn buffer(pts: f64) -> Buffer {
    Buffer::new(pts, 0.1, json!(null))
}

/// A linked and activated src -> sink pair whose sink records pts values.
fn linked_pair() -> (Arc<Pad>, Arc<Pad>, Arc<Mutex<Vec<f64>>>) {
    let src = Pad::new("src", PadDirection::Src);
    let sink = Pad::new("sink", PadDirection::Sink);
    let received = Arc::new(Mutex::new(Vec::new()));
    let r = Arc::clone(&received);
    sink.set_chain_function(move |_pad, buf| {
        r.lock().push(buf.pts);
        FlowReturn::Ok
    })
    .unwrap();
    src.link(&sink).unwrap();
    src.activate(PadMode::Push).unwrap();
    sink.activate(PadMode::Push).unwrap();
    (src, sink, received)
}

// =============================================================================
// Linking
// =============================================================================

#[test]
fn test_link_sets_both_peers() {
    let src = Pad::new("src", PadDirection::Src);
    let sink = Pad::new("sink", PadDirection::Sink);
    src.link(&sink).unwrap();

    assert!(Arc::ptr_eq(&src.peer().unwrap(), &sink));
    assert!(Arc::ptr_eq(&sink.peer().unwrap(), &src));
}

#[test]
fn test_link_wrong_direction() {
    let a = Pad::new("a", PadDirection::Sink);
    let b = Pad::new("b", PadDirection::Sink);
    assert!(matches!(a.link(&b), Err(MinigstError::WrongDirection(_))));

    let c = Pad::new("c", PadDirection::Src);
    let d = Pad::new("d", PadDirection::Src);
    assert!(matches!(c.link(&d), Err(MinigstError::WrongDirection(_))));
}

#[test]
fn test_link_already_linked() {
    let src = Pad::new("src", PadDirection::Src);
    let sink = Pad::new("sink", PadDirection::Sink);
    let other_sink = Pad::new("other", PadDirection::Sink);
    src.link(&sink).unwrap();

    assert!(matches!(
        src.link(&other_sink),
        Err(MinigstError::AlreadyLinked(_))
    ));
    // The failed attempt left no half link behind.
    assert!(other_sink.peer().is_none());
    assert!(Arc::ptr_eq(&src.peer().unwrap(), &sink));
}

#[test]
fn test_unlink() {
    let src = Pad::new("src", PadDirection::Src);
    let sink = Pad::new("sink", PadDirection::Sink);
    src.link(&sink).unwrap();
    sink.unlink();
    assert!(!src.is_linked());
    assert!(!sink.is_linked());
}

#[test]
fn test_chain_function_only_on_sink() {
    let src = Pad::new("src", PadDirection::Src);
    let result = src.set_chain_function(|_, _| FlowReturn::Ok);
    assert!(matches!(result, Err(MinigstError::WrongDirection(_))));
}

// =============================================================================
// Activation
// =============================================================================

#[test]
fn test_new_pad_is_inactive_and_flushing() {
    let pad = Pad::new("src", PadDirection::Src);
    assert_eq!(pad.mode(), PadMode::Inactive);
    assert!(pad.is_flushing());
    assert!(!pad.is_eos());
}

#[test]
fn test_activate_sink_without_chain_fails() {
    let sink = Pad::new("sink", PadDirection::Sink);
    assert!(matches!(
        sink.activate(PadMode::Push),
        Err(MinigstError::NoChainFunction(_))
    ));
    assert_eq!(sink.mode(), PadMode::Inactive);
}

#[test]
fn test_activate_clears_eos_and_flushing() {
    let pad = Pad::new("src", PadDirection::Src);
    pad.set_eos(true);
    pad.activate(PadMode::Push).unwrap();
    assert!(!pad.is_flushing());
    assert!(!pad.is_eos());

    pad.activate(PadMode::Inactive).unwrap();
    assert!(pad.is_flushing());
}

// =============================================================================
// Push / chain
// =============================================================================

#[test]
fn test_push_delivers_to_peer() {
    let (src, _sink, received) = linked_pair();
    assert_eq!(src.push(buffer(0.0)), FlowReturn::Ok);
    assert_eq!(src.push(buffer(0.1)), FlowReturn::Ok);
    assert_eq!(*received.lock(), vec![0.0, 0.1]);
}

#[test]
fn test_push_not_linked() {
    let src = Pad::new("src", PadDirection::Src);
    src.activate(PadMode::Push).unwrap();
    assert_eq!(src.push(buffer(0.0)), FlowReturn::NotLinked);
}

#[test]
fn test_push_from_sink_pad_is_error() {
    let (_src, sink, _) = linked_pair();
    assert_eq!(sink.push(buffer(0.0)), FlowReturn::Error);
}

#[test]
fn test_push_inactive_source_is_flushing() {
    let (src, _sink, received) = linked_pair();
    src.activate(PadMode::Inactive).unwrap();
    assert_eq!(src.push(buffer(0.0)), FlowReturn::Flushing);
    assert!(received.lock().is_empty());
}

#[test]
fn test_push_to_flushing_peer() {
    let (src, sink, received) = linked_pair();
    sink.set_flushing(true);
    assert_eq!(src.push(buffer(0.0)), FlowReturn::Flushing);
    assert!(received.lock().is_empty());
}

#[test]
fn test_push_to_unactivated_peer_is_flushing() {
    let src = Pad::new("src", PadDirection::Src);
    let sink = Pad::new("sink", PadDirection::Sink);
    sink.set_chain_function(|_, _| FlowReturn::Ok).unwrap();
    src.link(&sink).unwrap();
    src.activate(PadMode::Push).unwrap();
    // Clearing the flag alone does not activate the pad.
    sink.set_flushing(false);
    assert_eq!(src.push(buffer(0.0)), FlowReturn::Flushing);
}

#[test]
fn test_try_push_hands_back_refused_buffer() {
    let (src, sink, received) = linked_pair();
    sink.set_flushing(true);

    match src.try_push(buffer(0.5)) {
        Err((FlowReturn::Flushing, returned)) => {
            assert_eq!(returned.pts, 0.5);
            assert!(returned.is_writable());
        }
        other => panic!("Expected the buffer back, got {:?}", other.map_err(|(ret, _)| ret)),
    }

    sink.set_flushing(false);
    assert!(matches!(src.try_push(buffer(0.6)), Ok(FlowReturn::Ok)));
    assert_eq!(*received.lock(), vec![0.6]);
}

#[test]
fn test_push_returns_downstream_flow() {
    let src = Pad::new("src", PadDirection::Src);
    let sink = Pad::new("sink", PadDirection::Sink);
    sink.set_chain_function(|_, _| FlowReturn::NotSupported).unwrap();
    src.link(&sink).unwrap();
    src.activate(PadMode::Push).unwrap();
    sink.activate(PadMode::Push).unwrap();
    assert_eq!(src.push(buffer(0.0)), FlowReturn::NotSupported);
}

#[test]
fn test_eos_marks_both_pads() {
    let (src, sink, received) = linked_pair();
    assert_eq!(src.push(Buffer::eos(1.0)), FlowReturn::Ok);
    assert!(src.is_eos());
    assert!(sink.is_eos());

    // Nothing flows after EOS until the pads are re-activated.
    assert_eq!(src.push(buffer(2.0)), FlowReturn::Eos);
    assert_eq!(received.lock().len(), 1);

    src.activate(PadMode::Push).unwrap();
    sink.activate(PadMode::Push).unwrap();
    assert_eq!(src.push(buffer(3.0)), FlowReturn::Ok);
}

#[test]
fn test_chain_calls_are_serialized() {
    let src = Pad::new("src", PadDirection::Src);
    let sink = Pad::new("sink", PadDirection::Sink);
    let inside = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));
    let calls = Arc::new(AtomicUsize::new(0));

    let (i, o, c) = (Arc::clone(&inside), Arc::clone(&overlaps), Arc::clone(&calls));
    sink.set_chain_function(move |_, _| {
        if i.fetch_add(1, Ordering::SeqCst) > 0 {
            o.fetch_add(1, Ordering::SeqCst);
        }
        std::thread::sleep(Duration::from_millis(2));
        i.fetch_sub(1, Ordering::SeqCst);
        c.fetch_add(1, Ordering::SeqCst);
        FlowReturn::Ok
    })
    .unwrap();
    sink.activate(PadMode::Push).unwrap();

    src.link(&sink).unwrap();
    src.activate(PadMode::Push).unwrap();

    // Two threads pushing through the same pad never run the chain concurrently.
    let pusher = {
        let src = Arc::clone(&src);
        std::thread::spawn(move || {
            for n in 0..20 {
                src.push(buffer(n as f64));
            }
        })
    };
    for n in 0..20 {
        src.push(buffer(100.0 + n as f64));
    }
    pusher.join().unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 40);
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
}

#[test]
fn test_full_name() {
    let pad = Pad::new("src", PadDirection::Src);
    assert_eq!(pad.full_name(), "src");
    assert!(pad.parent().is_none());
}
