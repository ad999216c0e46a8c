// task.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of MiniGst
//
// SPDX-License-Identifier: GPL-3.0-only

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::Result;

const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Stop request of one task. Never shared between two tasks, so a thread
/// detached after a join timeout stays stopped when its element restarts.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// A named streaming thread owned by an element.
///
/// The thread body polls the [`StopToken`] it is given; the task only
/// bounds how long the owner waits for it to exit.
pub struct StreamTask {
    name: String,
    handle: JoinHandle<()>,
    stop: StopToken,
}

impl StreamTask {
    pub fn spawn<F>(name: &str, body: F) -> Result<Self>
    where
        F: FnOnce(StopToken) + Send + 'static,
    {
        let stop = StopToken::default();
        let token = stop.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(token))?;
        debug!("Task '{}' started", name);
        Ok(Self {
            name: name.to_string(),
            handle,
            stop,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Ask the thread to exit without waiting for it.
    pub fn request_stop(&self) {
        self.stop.stop();
    }

    /// Request a stop and wait at most `timeout` for the thread to exit.
    ///
    /// Returns false when the thread is still running after the timeout
    /// (it is detached, its token stays stopped) or when it panicked.
    pub fn join(self, timeout: Duration) -> bool {
        self.request_stop();
        if self.handle.thread().id() == thread::current().id() {
            warn!("Task '{}' cannot join itself, detaching", self.name);
            return false;
        }

        let deadline = Instant::now() + timeout;
        while !self.handle.is_finished() {
            if Instant::now() >= deadline {
                warn!(
                    "Task '{}' did not stop within {:?}, detaching",
                    self.name, timeout
                );
                return false;
            }
            thread::sleep(JOIN_POLL_INTERVAL);
        }

        match self.handle.join() {
            Ok(()) => {
                debug!("Task '{}' stopped", self.name);
                true
            }
            Err(_) => {
                warn!("Task '{}' panicked", self.name);
                false
            }
        }
    }
}
