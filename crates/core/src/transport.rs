// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport façade: the message-publishing side of the backend connection.
//!
//! Buffering and retry of published messages happen on the other side of
//! this trait; callers treat publication as fire-and-forget.

use crate::history::HistoryRow;
use crate::id::RunId;
use async_trait::async_trait;

/// Upload cadence for a published file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilePolicy {
    /// Upload immediately.
    Now,
    /// Upload on change, throttled.
    Live,
}

/// One file scheduled for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path relative to the run's files directory.
    pub path: String,
    pub policy: FilePolicy,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, policy: FilePolicy) -> Self {
        Self {
            path: path.into(),
            policy,
        }
    }
}

/// Message-publishing façade over the backend connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Schedule files for upload.
    async fn publish_files(&self, entries: &[FileEntry]);

    /// Publish one time-ordered history row for a run.
    async fn publish_history(&self, row: HistoryRow, run: &RunId);
}
