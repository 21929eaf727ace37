// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event decoding contract.
//!
//! The binary wire format lives behind [`EventDecoder`]: given a file
//! path it yields a lazy, restartable sequence of decoded events. An
//! iterator that returns `Ok(None)` has merely caught up; calling
//! `next_event` again later may yield more as the writer appends.

use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("corrupt event record: {0}")]
    Corrupt(String),
    #[error("event file deleted")]
    FileDeleted,
}

/// One scalar point in an event summary.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarValue {
    pub tag: String,
    pub value: f64,
}

impl ScalarValue {
    pub fn new(tag: impl Into<String>, value: f64) -> Self {
        Self {
            tag: tag.into(),
            value,
        }
    }
}

/// One decoded event record.
#[derive(Debug, Clone, PartialEq)]
pub struct TfEvent {
    /// Seconds since the epoch at which the event was written.
    pub wall_time: f64,
    /// Writer-assigned global step.
    pub step: i64,
    /// Present on the first record of a file.
    pub file_version: Option<String>,
    /// Scalar summary payload, if any.
    pub summary: Option<Vec<ScalarValue>>,
}

impl TfEvent {
    /// A summary-bearing event.
    pub fn scalars(wall_time: f64, step: i64, values: Vec<ScalarValue>) -> Self {
        Self {
            wall_time,
            step,
            file_version: None,
            summary: Some(values),
        }
    }

    /// The file-version header event.
    pub fn file_version(wall_time: f64, version: impl Into<String>) -> Self {
        Self {
            wall_time,
            step: 0,
            file_version: Some(version.into()),
            summary: None,
        }
    }
}

/// Restartable pull-iterator over one event file.
pub trait EventIterator: Send {
    /// Next decoded event, or `Ok(None)` once caught up with the file.
    fn next_event(&mut self) -> Result<Option<TfEvent>, DecodeError>;
}

/// Factory for per-file event iterators.
pub trait EventDecoder: Send + Sync + 'static {
    fn open(&self, path: &Path) -> Result<Box<dyn EventIterator>, DecodeError>;
}
