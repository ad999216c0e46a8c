// buffer_tests.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of MiniGst
//
// SPDX-License-Identifier: GPL-3.0-only

use super::buffer::*;
use serde_json::json;

// =============================================================================
// BufferFlags tests
// =============================================================================

#[test]
fn test_flags_default_is_empty() {
    let flags = BufferFlags::default();
    assert!(flags.is_empty());
    assert_eq!(flags, BufferFlags::NONE);
    assert!(!flags.contains(BufferFlags::NONE));
}

#[test]
fn test_flags_insert_remove() {
    let flags = BufferFlags::DISCONT | BufferFlags::DELTA_UNIT;
    assert!(flags.contains(BufferFlags::DISCONT));
    assert!(flags.contains(BufferFlags::DELTA_UNIT));
    assert!(!flags.contains(BufferFlags::EOS));

    let flags = flags.remove(BufferFlags::DISCONT);
    assert!(!flags.contains(BufferFlags::DISCONT));
    assert!(flags.contains(BufferFlags::DELTA_UNIT));
}

#[test]
fn test_flags_display() {
    assert_eq!(BufferFlags::NONE.to_string(), "NONE");
    assert_eq!(BufferFlags::EOS.to_string(), "EOS");
    assert_eq!(
        (BufferFlags::DISCONT | BufferFlags::SEGMENT).to_string(),
        "DISCONT|SEGMENT"
    );
}

// =============================================================================
// Buffer tests
// =============================================================================

#[test]
fn test_buffer_new() {
    let buffer = Buffer::new(1.5, 0.5, json!({"frame": 3}));
    assert_eq!(buffer.pts, 1.5);
    assert_eq!(buffer.duration, 0.5);
    assert_eq!(buffer.end(), 2.0);
    assert_eq!(buffer.sequence, 0);
    assert!(buffer.flags.is_empty());
    assert_eq!(buffer.payload()["frame"], 3);
    assert!(!buffer.is_eos());
}

#[test]
fn test_buffer_eos() {
    let buffer = Buffer::eos(4.0);
    assert!(buffer.is_eos());
    assert_eq!(buffer.pts, 4.0);
    assert!(buffer.payload().is_null());
}

#[test]
fn test_buffer_set_unset_flag() {
    let mut buffer = Buffer::new(0.0, 0.1, json!(null)).with_sequence(7);
    buffer.set_flag(BufferFlags::DISCONT);
    assert!(buffer.has_flag(BufferFlags::DISCONT));
    buffer.unset_flag(BufferFlags::DISCONT);
    assert!(!buffer.has_flag(BufferFlags::DISCONT));
    assert_eq!(buffer.sequence, 7);
}

#[test]
fn test_buffer_copy_on_write() {
    let mut original = Buffer::new(0.0, 0.1, json!({"content": "a"}));
    assert!(original.is_writable());

    let shared = original.clone();
    assert!(!original.is_writable());
    assert!(!shared.is_writable());

    original.payload_mut()["content"] = json!("b");

    // The writer got its own copy; the other holder is untouched.
    assert_eq!(original.payload()["content"], "b");
    assert_eq!(shared.payload()["content"], "a");
    assert!(original.is_writable());
    assert!(shared.is_writable());
}

#[test]
fn test_buffer_display() {
    let buffer = Buffer::new(1.0, 0.5, json!(null))
        .with_sequence(2)
        .with_flags(BufferFlags::DISCONT);
    assert_eq!(
        buffer.to_string(),
        "Buffer(seq=2, pts=1.000s, dur=0.500s, flags=DISCONT)"
    );
}
