// task_tests.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of MiniGst
//
// SPDX-License-Identifier: GPL-3.0-only

use super::task::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_task_join() {
    let ran = Arc::new(AtomicBool::new(false));
    let r = Arc::clone(&ran);
    let task = StreamTask::spawn("worker", move |_| r.store(true, Ordering::SeqCst)).unwrap();
    assert_eq!(task.name(), "worker");
    assert!(task.join(Duration::from_secs(1)));
    assert!(ran.load(Ordering::SeqCst));
}

#[test]
fn test_task_join_timeout() {
    let stop = Arc::new(AtomicBool::new(false));
    let s = Arc::clone(&stop);
    // Ignores its stop token.
    let task = StreamTask::spawn("stuck", move |_| {
        while !s.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(5));
        }
    })
    .unwrap();

    assert!(!task.join(Duration::from_millis(30)));
    stop.store(true, Ordering::SeqCst);
}

#[test]
fn test_task_panic_is_reported() {
    let task = StreamTask::spawn("panicking", |_| panic!("boom")).unwrap();
    assert!(!task.join(Duration::from_secs(1)));
}

#[test]
fn test_task_join_requests_stop() {
    let task = StreamTask::spawn("polling", |stop| {
        while !stop.is_stopped() {
            std::thread::sleep(Duration::from_millis(2));
        }
    })
    .unwrap();
    assert!(task.join(Duration::from_secs(1)));
}

#[test]
fn test_detached_task_stays_stopped() {
    let release = Arc::new(AtomicBool::new(false));
    let seen_stop = Arc::new(AtomicBool::new(false));
    let (r, seen) = (Arc::clone(&release), Arc::clone(&seen_stop));
    let first = StreamTask::spawn("first", move |stop| {
        while !r.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(2));
        }
        seen.store(stop.is_stopped(), Ordering::SeqCst);
    })
    .unwrap();
    assert!(!first.join(Duration::from_millis(20)));

    // A new task gets a fresh token and does not revive the detached one.
    let (tx, rx) = std::sync::mpsc::channel();
    let second = StreamTask::spawn("second", move |stop| {
        let _ = tx.send(stop.is_stopped());
    })
    .unwrap();
    assert!(!rx.recv_timeout(Duration::from_secs(1)).unwrap());
    assert!(second.join(Duration::from_secs(1)));

    release.store(true, Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(50));
    assert!(seen_stop.load(Ordering::SeqCst));
}
