// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Metadata-plane API contracts: sweep config, agent registration,
//! heartbeats, and artifact upload preparation.

use crate::id::{AgentId, ArtifactId, RunId, SweepId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// API failure classification. Transient failures are retried by the
/// HTTP layer; fatal ones surface to the caller.
#[derive(Debug, Error)]
pub enum CommError {
    #[error("transient API error: {0}")]
    Transient(String),
    #[error("fatal API error: {0}")]
    Fatal(String),
}

/// Sweep configuration as fetched from the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Optional trial launch template, e.g.
    /// `["${env}", "${interpreter}", "${program}", "${args}"]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
}

/// Command kind dispatched by the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Run,
    Stop,
    Exit,
    /// Anything the agent doesn't recognize; replied to with an error.
    #[serde(other)]
    Unknown,
}

/// One hyperparameter assignment in a `run` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandArg {
    pub value: serde_json::Value,
}

impl CommandArg {
    pub fn new(value: impl Into<serde_json::Value>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

/// A command for the sweep agent, from the server (via heartbeat) or a
/// local caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepCommand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: CommandKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    /// Hyperparameters for this trial, in a stable order.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub args: BTreeMap<String, CommandArg>,
}

impl SweepCommand {
    pub fn exit() -> Self {
        Self {
            id: None,
            kind: CommandKind::Exit,
            run_id: None,
            program: None,
            args: BTreeMap::new(),
        }
    }

    pub fn stop(run_id: RunId) -> Self {
        Self {
            id: None,
            kind: CommandKind::Stop,
            run_id: Some(run_id),
            program: None,
            args: BTreeMap::new(),
        }
    }
}

/// Reply to a processed command. Errors are carried in `exception`
/// rather than crashing the agent loop.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
}

/// Request payload for preparing one artifact file upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSpec {
    #[serde(rename = "artifactID")]
    pub artifact_id: ArtifactId,
    pub name: String,
    pub md5: String,
}

/// Server's answer to an upload preparation. A missing `upload_url`
/// means the server already has the object.
#[derive(Debug, Clone, Default)]
pub struct PrepareResponse {
    pub birth_artifact_id: Option<ArtifactId>,
    pub upload_url: Option<String>,
    pub upload_headers: Vec<(String, String)>,
}

/// Metadata plane of the backend.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Fetch a sweep's configuration.
    async fn sweep(&self, sweep: &SweepId) -> Result<SweepConfig, CommError>;

    /// Register this host as an agent for a sweep.
    async fn register_agent(&self, hostname: &str, sweep: &SweepId) -> Result<AgentId, CommError>;

    /// Report liveness of running trials; returns queued server commands.
    async fn agent_heartbeat(
        &self,
        agent: &AgentId,
        run_status: &HashMap<RunId, bool>,
    ) -> Result<Vec<SweepCommand>, CommError>;
}

/// Upload-URL preparation for artifact file pushes.
#[async_trait]
pub trait UploadPreparer: Send + Sync {
    async fn prepare(&self, spec: UploadSpec) -> Result<PrepareResponse, CommError>;
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
