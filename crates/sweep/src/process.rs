// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervised child trials.
//!
//! A trial is either an OS subprocess or an in-process task. Subprocesses
//! get their own process group so stop/kill signals reach the whole trial
//! subtree; task trials are abortable and report completion on a one-shot
//! channel so `poll()` never blocks.

use crate::error::AgentError;
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Result of a non-blocking poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialStatus {
    Running,
    /// Finished, with the exit code when one exists.
    Exited(Option<i32>),
}

impl TrialStatus {
    /// Non-zero exit codes count against flap protection.
    pub fn is_failure(&self) -> bool {
        matches!(self, TrialStatus::Exited(Some(code)) if *code > 0)
    }
}

#[derive(Debug)]
enum TrialInner {
    Subprocess {
        child: tokio::process::Child,
    },
    Task {
        handle: JoinHandle<()>,
        done: oneshot::Receiver<()>,
        outcome: Option<TrialStatus>,
        killed: bool,
    },
}

#[derive(Debug)]
pub struct TrialProcess {
    inner: TrialInner,
    /// When the first stop was delivered; gates the TERM→KILL escalation.
    pub last_sigterm_time: Option<f64>,
}

impl TrialProcess {
    /// Spawn a subprocess trial in its own process group.
    pub fn spawn_command(
        argv: &[String],
        env: &HashMap<String, String>,
    ) -> Result<Self, AgentError> {
        let (program, args) = argv.split_first().ok_or(AgentError::EmptyCommand)?;
        let mut cmd = std::process::Command::new(program);
        cmd.args(args);
        cmd.envs(env);
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
            cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
        }
        let mut cmd = tokio::process::Command::from(cmd);
        cmd.kill_on_drop(false);
        let child = cmd.spawn()?;
        tracing::debug!(program = %program, pid = ?child.id(), "spawned trial subprocess");
        Ok(Self {
            inner: TrialInner::Subprocess { child },
            last_sigterm_time: None,
        })
    }

    /// Run a user trial function as an abortable task. Completion is
    /// posted on a one-shot channel so polls stay non-blocking.
    pub fn spawn_task<F>(trial: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            trial.await;
            let _ = done_tx.send(());
        });
        Self {
            inner: TrialInner::Task {
                handle,
                done: done_rx,
                outcome: None,
                killed: false,
            },
            last_sigterm_time: None,
        }
    }

    /// Non-blocking status check.
    pub fn poll(&mut self) -> TrialStatus {
        match &mut self.inner {
            TrialInner::Subprocess { child } => match child.try_wait() {
                Ok(Some(status)) => TrialStatus::Exited(status.code()),
                Ok(None) => TrialStatus::Running,
                Err(err) => {
                    tracing::warn!(error = %err, "trial poll failed, assuming exited");
                    TrialStatus::Exited(None)
                }
            },
            TrialInner::Task {
                handle,
                done,
                outcome,
                killed,
            } => {
                if let Some(status) = outcome {
                    return *status;
                }
                let status = match done.try_recv() {
                    Ok(()) => Some(TrialStatus::Exited(Some(0))),
                    Err(oneshot::error::TryRecvError::Empty) => None,
                    // Sender dropped without a completion token: the
                    // task was aborted or panicked.
                    Err(oneshot::error::TryRecvError::Closed) => {
                        if *killed {
                            Some(TrialStatus::Exited(None))
                        } else if handle.is_finished() {
                            Some(TrialStatus::Exited(Some(1)))
                        } else {
                            None
                        }
                    }
                };
                if let Some(status) = status {
                    *outcome = Some(status);
                    status
                } else {
                    TrialStatus::Running
                }
            }
        }
    }

    /// Block until the trial ends; returns its exit code if it has one.
    pub async fn wait(&mut self) -> Option<i32> {
        match &mut self.inner {
            TrialInner::Subprocess { child } => child.wait().await.ok().and_then(|s| s.code()),
            TrialInner::Task { handle, .. } => {
                let _ = (&mut *handle).await;
                None
            }
        }
    }

    /// Ask the trial to stop: SIGTERM to the process group on POSIX, a
    /// hard stop on Windows (which has no gentle equivalent for a
    /// detached group), abort for task trials.
    pub fn terminate(&mut self) {
        match &mut self.inner {
            TrialInner::Subprocess { child } => {
                #[cfg(unix)]
                signal_group(child, nix::sys::signal::Signal::SIGTERM);
                #[cfg(windows)]
                {
                    let _ = child.start_kill();
                }
            }
            TrialInner::Task { handle, killed, .. } => {
                handle.abort();
                *killed = true;
            }
        }
    }

    /// Kill the trial outright: SIGKILL to the process group / abort.
    pub fn kill(&mut self) {
        match &mut self.inner {
            TrialInner::Subprocess { child } => {
                #[cfg(unix)]
                signal_group(child, nix::sys::signal::Signal::SIGKILL);
                #[cfg(windows)]
                {
                    let _ = child.start_kill();
                }
            }
            TrialInner::Task { handle, killed, .. } => {
                handle.abort();
                *killed = true;
            }
        }
    }
}

/// Signal the child's whole process group (negative pid).
#[cfg(unix)]
fn signal_group(child: &tokio::process::Child, signal: nix::sys::signal::Signal) {
    let Some(pid) = child.id() else {
        return;
    };
    // Best effort: the process may already be gone.
    let _ = nix::sys::signal::kill(nix::unistd::Pid::from_raw(-(pid as i32)), signal);
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
