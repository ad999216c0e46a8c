// error.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of MiniGst
//
// SPDX-License-Identifier: GPL-3.0-only

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MinigstError {
    #[error("Wrong pad direction: {0}")]
    WrongDirection(String),

    #[error("Pad already linked: {0}")]
    AlreadyLinked(String),

    #[error("Pad has no chain function: {0}")]
    NoChainFunction(String),

    #[error("Pad not found: {0}")]
    PadNotFound(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Element already in pipeline: {0}")]
    DuplicateElement(String),

    #[error("Invalid pipeline description: {0}")]
    InvalidPipeline(String),

    #[error("No such element factory: {0}")]
    UnknownFactory(String),

    #[error("Invalid property: {0}")]
    InvalidProperty(String),

    #[error("State change failed: {0}")]
    StateChangeFailed(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MinigstError>;
