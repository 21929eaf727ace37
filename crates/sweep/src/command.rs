// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trial launch templates and per-trial config files.
//!
//! A sweep may configure a launch template; `${...}` tokens expand from
//! the trial's hyperparameters. Each trial also gets its config
//! materialized under `wandb/sweep-<sweep>/config-<run>.yaml` (and
//! `.json` when the template asks for it).

use crate::error::AgentError;
use beacon_core::{CommandArg, RunId, SweepId};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Launch template used when the sweep config doesn't provide one.
pub const DEFAULT_COMMAND: &[&str] = &["${env}", "${interpreter}", "${program}", "${args}"];

/// Expansions available to launch templates.
pub struct SweepVars {
    vars: HashMap<&'static str, Vec<String>>,
}

/// Render a hyperparameter value the way it appears on a command line.
fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl SweepVars {
    pub fn new(program: &str, args: &BTreeMap<String, CommandArg>, json_file: &Path) -> Self {
        let flags_no_hyphens: Vec<String> = args
            .iter()
            .map(|(param, arg)| format!("{param}={}", value_to_string(&arg.value)))
            .collect();
        let flags: Vec<String> = flags_no_hyphens
            .iter()
            .map(|flag| format!("--{flag}"))
            .collect();
        let flags_dict: serde_json::Map<String, serde_json::Value> = args
            .iter()
            .map(|(param, arg)| (param.clone(), arg.value.clone()))
            .collect();
        let flags_json =
            serde_json::to_string(&flags_dict).unwrap_or_else(|_| "{}".to_string());

        let mut vars: HashMap<&'static str, Vec<String>> = HashMap::new();
        vars.insert("interpreter", vec!["python".to_string()]);
        vars.insert("program", vec![program.to_string()]);
        vars.insert("args", flags);
        vars.insert("args_no_hyphens", flags_no_hyphens);
        vars.insert("args_json", vec![flags_json]);
        vars.insert(
            "args_json_file",
            vec![json_file.to_string_lossy().into_owned()],
        );
        // `${env}` has no meaning on Windows
        if !cfg!(windows) {
            vars.insert("env", vec!["/usr/bin/env".to_string()]);
        }
        Self { vars }
    }

    pub fn args_json(&self) -> &str {
        self.vars
            .get("args_json")
            .and_then(|v| v.first())
            .map(String::as_str)
            .unwrap_or("{}")
    }
}

/// Expand a launch template: `${token}` elements splice in their
/// expansion (or nothing when the token is unknown), everything else is
/// passed through verbatim.
pub fn expand_command(template: &[String], vars: &SweepVars) -> Vec<String> {
    let mut command = Vec::new();
    for element in template {
        let token = element
            .strip_prefix("${")
            .and_then(|rest| rest.strip_suffix('}'));
        match token {
            Some(token) => {
                if let Some(expansion) = vars.vars.get(token) {
                    command.extend(expansion.iter().cloned());
                }
            }
            None => command.push(element.clone()),
        }
    }
    command
}

/// Per-trial config file locations.
pub fn config_file_paths(root: &Path, sweep_id: &SweepId, run_id: &RunId) -> (PathBuf, PathBuf) {
    let dir = root.join("wandb").join(format!("sweep-{sweep_id}"));
    (
        dir.join(format!("config-{run_id}.yaml")),
        dir.join(format!("config-{run_id}.json")),
    )
}

/// Write the trial's config as YAML (`param: {value: ...}` per entry).
pub fn write_config_yaml(
    path: &Path,
    args: &BTreeMap<String, CommandArg>,
) -> Result<(), AgentError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let yaml = serde_yaml::to_string(args)?;
    std::fs::write(path, yaml)?;
    Ok(())
}

/// Write the flat `param: value` JSON for `${args_json_file}`.
pub fn write_args_json(path: &Path, vars: &SweepVars) -> Result<(), AgentError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, vars.args_json())?;
    Ok(())
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
