// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sweep agent main loop.
//!
//! One iteration every poll interval: drain queued local commands,
//! poll children (counting failures for flap protection), then
//! heartbeat the backend and dispatch whatever commands it pushed.
//! Local callers talk to a running agent through [`AgentHandle`];
//! command failures come back as an error payload on the reply channel
//! instead of crashing the loop.

use crate::command::{
    config_file_paths, expand_command, write_args_json, write_config_yaml, SweepVars,
    DEFAULT_COMMAND,
};
use crate::env;
use crate::error::AgentError;
use crate::process::{TrialProcess, TrialStatus};
use beacon_core::{
    Clock, CommError, CommandKind, CommandResponse, RemoteApi, RunId, SweepCommand, SweepId,
};
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Main loop cadence.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Default seconds between TERM and KILL for a stopped trial.
pub const KILL_DELAY: f64 = 30.0;
/// Flap window: failures only count this close to startup.
pub const FLAPPING_MAX_SECONDS: f64 = 60.0;
/// Failures within the window that stop the agent.
pub const FLAPPING_MAX_FAILURES: usize = 3;

const MAX_LOCAL_COMMANDS: usize = 100;
const LOCAL_COMMAND_BUFFER: usize = 128;

/// Factory for in-process trials: each `run` command gets a fresh
/// future, supervised as an abortable task.
pub type TrialFn = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub sweep_id: SweepId,
    pub hostname: String,
    /// Working directory for per-trial config files.
    pub root: PathBuf,
    /// Stop once this many trials have finished.
    pub count: Option<usize>,
    /// Seconds between TERM and KILL; env-overridable.
    pub kill_delay: f64,
    /// Seconds between "running runs" reports; 0 reports on every
    /// child completion. Env-overridable.
    pub report_interval: f64,
    pub poll_interval: Duration,
}

impl AgentSettings {
    pub fn new(sweep_id: SweepId, hostname: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            sweep_id,
            hostname: hostname.into(),
            root: root.into(),
            count: None,
            kill_delay: env::kill_delay(KILL_DELAY),
            report_interval: env::report_interval(0.0),
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }
}

struct LocalCommand {
    command: SweepCommand,
    resp: oneshot::Sender<CommandResponse>,
}

/// Client side of a running agent's local command queue.
#[derive(Clone)]
pub struct AgentHandle {
    tx: mpsc::Sender<LocalCommand>,
    next_id: Arc<AtomicU64>,
}

impl AgentHandle {
    /// Send one command and wait for its reply.
    pub async fn command(&self, mut command: SweepCommand) -> CommandResponse {
        if command.id.is_none() {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            command.id = Some(format!("local-{id}"));
        }
        let id = command.id.clone();
        let (resp_tx, resp_rx) = oneshot::channel();
        let local = LocalCommand {
            command,
            resp: resp_tx,
        };
        if self.tx.send(local).await.is_err() {
            return CommandResponse {
                id,
                exception: Some("agent is not running".to_string()),
                ..Default::default()
            };
        }
        resp_rx.await.unwrap_or_else(|_| CommandResponse {
            id,
            exception: Some("agent dropped the command".to_string()),
            ..Default::default()
        })
    }
}

pub struct Agent<A, C> {
    api: Arc<A>,
    clock: C,
    settings: AgentSettings,
    commands: mpsc::Receiver<LocalCommand>,
    handle_tx: mpsc::Sender<LocalCommand>,
    children: HashMap<RunId, TrialProcess>,
    trial_fn: Option<TrialFn>,
    sweep_command: Vec<String>,
    running: bool,
    flapped: bool,
    finished: usize,
    failed: usize,
    start_time: f64,
    last_report_time: Option<f64>,
}

impl<A, C> Agent<A, C>
where
    A: RemoteApi,
    C: Clock,
{
    pub fn new(api: Arc<A>, clock: C, settings: AgentSettings) -> Self {
        let (handle_tx, commands) = mpsc::channel(LOCAL_COMMAND_BUFFER);
        Self {
            api,
            clock,
            settings,
            commands,
            handle_tx,
            children: HashMap::new(),
            trial_fn: None,
            sweep_command: Vec::new(),
            running: false,
            flapped: false,
            finished: 0,
            failed: 0,
            start_time: 0.0,
            last_report_time: None,
        }
    }

    /// Run trials as in-process tasks instead of the configured program.
    pub fn with_trial_fn(mut self, trial_fn: TrialFn) -> Self {
        self.trial_fn = Some(trial_fn);
        self
    }

    pub fn handle(&self) -> AgentHandle {
        AgentHandle {
            tx: self.handle_tx.clone(),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Fetch the sweep config, register, and supervise until stopped.
    pub async fn run(&mut self) -> Result<(), AgentError> {
        let config = self.api.sweep(&self.settings.sweep_id).await?;
        if let Some(command) = config.command {
            if !command.is_empty() {
                self.sweep_command = command;
            }
        }
        let agent_id = self
            .api
            .register_agent(&self.settings.hostname, &self.settings.sweep_id)
            .await?;
        tracing::info!(%agent_id, sweep = %self.settings.sweep_id, "agent registered");

        self.start_time = self.clock.epoch_secs();
        self.running = true;

        while self.running {
            let locals = self.read_local_commands().await;
            for local in locals {
                let response = self.process_command(local.command).await;
                let _ = local.resp.send(response);
            }

            self.maybe_report();
            let run_status = self.poll_children();
            if !self.running {
                break;
            }
            if let Some(count) = self.settings.count {
                if self.finished >= count {
                    tracing::info!(count, "trial budget reached, stopping");
                    self.running = false;
                    continue;
                }
            }

            match self.api.agent_heartbeat(&agent_id, &run_status).await {
                Ok(commands) => {
                    for command in commands {
                        let response = self.process_command(command).await;
                        if response.exception.is_some() {
                            tracing::warn!(?response, "server command failed");
                        }
                    }
                }
                Err(CommError::Transient(msg)) => {
                    tracing::warn!(error = %msg, "heartbeat failed, will retry");
                }
                Err(err @ CommError::Fatal(_)) => {
                    self.shutdown().await;
                    return Err(err.into());
                }
            }
        }

        self.shutdown().await;
        if self.flapped {
            return Err(AgentError::Flapping {
                failures: FLAPPING_MAX_FAILURES,
                window_secs: FLAPPING_MAX_SECONDS as u64,
            });
        }
        Ok(())
    }

    /// Block up to one poll interval for the first command, then drain
    /// whatever else is queued (bounded).
    async fn read_local_commands(&mut self) -> Vec<LocalCommand> {
        let mut commands = Vec::new();
        match tokio::time::timeout(self.settings.poll_interval, self.commands.recv()).await {
            Ok(Some(command)) => commands.push(command),
            Ok(None) | Err(_) => return commands,
        }
        while commands.len() < MAX_LOCAL_COMMANDS {
            match self.commands.try_recv() {
                Ok(command) => commands.push(command),
                Err(_) => break,
            }
        }
        commands
    }

    fn maybe_report(&mut self) {
        let now = self.clock.epoch_secs();
        let due = match self.last_report_time {
            None => true,
            Some(last) => {
                self.settings.report_interval != 0.0
                    && now > last + self.settings.report_interval
            }
        };
        if due {
            let running: Vec<&RunId> = self.children.keys().collect();
            tracing::info!(?running, "running runs");
            self.last_report_time = Some(now);
        }
    }

    /// Flapping means hitting the failure budget while still inside the
    /// startup window.
    fn is_flapping(&self) -> bool {
        if env::flapping_disabled() {
            return false;
        }
        self.clock.epoch_secs() < self.start_time + FLAPPING_MAX_SECONDS
            && self.failed >= FLAPPING_MAX_FAILURES
    }

    /// Poll every child; reap finished ones. Returns the liveness map
    /// for the heartbeat.
    fn poll_children(&mut self) -> HashMap<RunId, bool> {
        let mut run_status = HashMap::new();
        let mut finished = Vec::new();
        let mut new_failures = 0;
        for (run_id, child) in self.children.iter_mut() {
            let status = child.poll();
            match status {
                TrialStatus::Running => {
                    run_status.insert(run_id.clone(), true);
                }
                TrialStatus::Exited(code) => {
                    if status.is_failure() {
                        new_failures += 1;
                    }
                    tracing::info!(%run_id, ?code, "cleaning up finished run");
                    finished.push(run_id.clone());
                }
            }
        }

        self.failed += new_failures;
        if new_failures > 0 && self.is_flapping() {
            tracing::error!(
                failures = FLAPPING_MAX_FAILURES,
                window_secs = FLAPPING_MAX_SECONDS,
                "detected repeated failed runs shortly after start, shutting down \
                 (set WANDB_AGENT_DISABLE_FLAPPING=true to disable this check)"
            );
            self.running = false;
            self.flapped = true;
        }

        for run_id in finished {
            self.children.remove(&run_id);
            self.last_report_time = None;
            self.finished += 1;
        }
        run_status
    }

    async fn process_command(&mut self, command: SweepCommand) -> CommandResponse {
        tracing::info!(kind = ?command.kind, id = ?command.id, "agent received command");
        let id = command.id.clone();
        let result = match command.kind {
            CommandKind::Run => self.command_run(&command).await,
            CommandKind::Stop => self.command_stop(&command),
            CommandKind::Exit => {
                self.command_exit();
                Ok(())
            }
            CommandKind::Unknown => Err(AgentError::InvalidCommand(
                "unrecognized command type".to_string(),
            )),
        };
        match result {
            Ok(()) => CommandResponse {
                id,
                ..Default::default()
            },
            Err(err) => {
                tracing::error!(error = %err, "exception while processing command");
                CommandResponse {
                    id,
                    exception: Some(err.to_string()),
                    ..Default::default()
                }
            }
        }
    }

    async fn command_run(&mut self, command: &SweepCommand) -> Result<(), AgentError> {
        let run_id = command.run_id.clone().ok_or(AgentError::MissingRunId)?;
        tracing::info!(
            %run_id,
            params = ?command.args.keys().collect::<Vec<_>>(),
            "agent starting run"
        );

        let (yaml_path, json_path) =
            config_file_paths(&self.settings.root, &self.settings.sweep_id, &run_id);
        write_config_yaml(&yaml_path, &command.args)?;

        let mut trial_env: HashMap<String, String> = std::env::vars().collect();
        trial_env.insert(env::SWEEP_ID.to_string(), self.settings.sweep_id.to_string());
        trial_env.insert(env::RUN_ID.to_string(), run_id.to_string());
        trial_env.insert(
            env::CONFIG_PATHS.to_string(),
            yaml_path.to_string_lossy().into_owned(),
        );

        let process = if let Some(trial_fn) = &self.trial_fn {
            TrialProcess::spawn_task((trial_fn)())
        } else {
            let program = command.program.clone().ok_or(AgentError::MissingProgram)?;
            let vars = SweepVars::new(&program, &command.args, &json_path);
            let template: Vec<String> = if self.sweep_command.is_empty() {
                DEFAULT_COMMAND.iter().map(|s| s.to_string()).collect()
            } else {
                self.sweep_command.clone()
            };
            if template.iter().any(|c| c == "${args_json_file}") {
                write_args_json(&json_path, &vars)?;
            }
            let argv = expand_command(&template, &vars);
            tracing::info!(command = ?argv, "about to run command");
            TrialProcess::spawn_command(&argv, &trial_env)?
        };

        self.children.insert(run_id, process);
        self.last_report_time = None;
        Ok(())
    }

    /// Two-stage stop: first call terminates; once the kill delay has
    /// passed, a later call kills. Calls in between are no-ops to give
    /// the trial a chance to handle the signal.
    fn command_stop(&mut self, command: &SweepCommand) -> Result<(), AgentError> {
        let run_id = command.run_id.clone().ok_or(AgentError::MissingRunId)?;
        let Some(child) = self.children.get_mut(&run_id) else {
            tracing::error!(%run_id, "run not running");
            return Ok(());
        };
        let now = self.clock.epoch_secs();
        match child.last_sigterm_time {
            None => {
                tracing::info!(%run_id, "stop");
                child.last_sigterm_time = Some(now);
                child.terminate();
            }
            Some(first) if now > first + self.settings.kill_delay => {
                tracing::info!(%run_id, "kill");
                child.kill();
            }
            Some(_) => {}
        }
        Ok(())
    }

    fn command_exit(&mut self) {
        tracing::info!("received exit command, killing runs and quitting");
        for child in self.children.values_mut() {
            child.kill();
        }
        self.running = false;
    }

    /// Normal stop: terminate every child, then wait for each.
    async fn shutdown(&mut self) {
        if !self.children.is_empty() {
            tracing::info!(count = self.children.len(), "terminating and syncing runs");
        }
        for child in self.children.values_mut() {
            child.terminate();
        }
        for (run_id, mut child) in self.children.drain() {
            let code = child.wait().await;
            tracing::debug!(%run_id, ?code, "run ended");
        }
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
