// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the sweep agent.

/// Set in each trial's environment: the sweep being served.
pub const SWEEP_ID: &str = "WANDB_SWEEP_ID";
/// Set in each trial's environment: its run id.
pub const RUN_ID: &str = "WANDB_RUN_ID";
/// Set in each trial's environment: path to the materialized config.
pub const CONFIG_PATHS: &str = "WANDB_CONFIG_PATHS";

const DISABLE_FLAPPING: &str = "WANDB_AGENT_DISABLE_FLAPPING";
const REPORT_INTERVAL: &str = "WANDB_AGENT_REPORT_INTERVAL";
const KILL_DELAY: &str = "WANDB_AGENT_KILL_DELAY";

fn parse_secs(var: &str) -> Option<f64> {
    std::env::var(var).ok().and_then(|s| s.parse().ok())
}

/// Flap protection is disabled with `WANDB_AGENT_DISABLE_FLAPPING=true`.
pub fn flapping_disabled() -> bool {
    std::env::var(DISABLE_FLAPPING).map(|v| v == "true").unwrap_or(false)
}

/// Seconds between "running runs" reports (default: report whenever a
/// child finishes).
pub fn report_interval(default: f64) -> f64 {
    parse_secs(REPORT_INTERVAL).unwrap_or(default)
}

/// Seconds between SIGTERM and SIGKILL for a stopped trial.
pub fn kill_delay(default: f64) -> f64 {
    parse_secs(KILL_DELAY).unwrap_or(default)
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
