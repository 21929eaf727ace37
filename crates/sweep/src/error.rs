// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the sweep agent

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("no such command: {0}")]
    InvalidCommand(String),

    #[error("command has no run_id")]
    MissingRunId,

    #[error("run command has no program")]
    MissingProgram,

    #[error("expanded trial command is empty")]
    EmptyCommand,

    #[error("detected {failures} failed runs in the first {window_secs} seconds, shutting down")]
    Flapping { failures: usize, window_secs: u64 },

    #[error("failed to write sweep config: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error(transparent)]
    Comm(#[from] beacon_core::CommError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
