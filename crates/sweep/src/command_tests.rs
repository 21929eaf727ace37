// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn args() -> BTreeMap<String, CommandArg> {
    let mut args = BTreeMap::new();
    args.insert("layers".to_string(), CommandArg::new(4));
    args.insert("lr".to_string(), CommandArg::new(0.01));
    args.insert("optim".to_string(), CommandArg::new("adam"));
    args
}

fn vars() -> SweepVars {
    SweepVars::new("train.py", &args(), Path::new("wandb/sweep-s/config-r.json"))
}

#[test]
fn default_template_expands_to_interpreter_invocation() {
    let template: Vec<String> = DEFAULT_COMMAND.iter().map(|s| s.to_string()).collect();
    let command = expand_command(&template, &vars());
    assert_eq!(
        command,
        vec![
            "/usr/bin/env",
            "python",
            "train.py",
            "--layers=4",
            "--lr=0.01",
            "--optim=adam",
        ]
    );
}

#[test]
fn args_no_hyphens_token_drops_dashes() {
    let template = vec!["${program}".to_string(), "${args_no_hyphens}".to_string()];
    let command = expand_command(&template, &vars());
    assert_eq!(command, vec!["train.py", "layers=4", "lr=0.01", "optim=adam"]);
}

#[test]
fn args_json_token_is_single_element() {
    let template = vec!["${args_json}".to_string()];
    let command = expand_command(&template, &vars());
    assert_eq!(command.len(), 1);
    let parsed: serde_json::Value = serde_json::from_str(&command[0]).unwrap();
    assert_eq!(parsed["layers"], 4);
    assert_eq!(parsed["lr"], 0.01);
    assert_eq!(parsed["optim"], "adam");
}

#[test]
fn literal_elements_pass_through() {
    let template = vec![
        "accelerate".to_string(),
        "launch".to_string(),
        "${program}".to_string(),
    ];
    assert_eq!(
        expand_command(&template, &vars()),
        vec!["accelerate", "launch", "train.py"]
    );
}

#[test]
fn unknown_tokens_expand_to_nothing() {
    let template = vec!["${mystery}".to_string(), "${program}".to_string()];
    assert_eq!(expand_command(&template, &vars()), vec!["train.py"]);
}

#[test]
fn config_paths_nest_under_sweep_dir() {
    let (yaml, json) = config_file_paths(
        Path::new("/work"),
        &SweepId::new("sw1"),
        &RunId::new("run7"),
    );
    assert_eq!(yaml, Path::new("/work/wandb/sweep-sw1/config-run7.yaml"));
    assert_eq!(json, Path::new("/work/wandb/sweep-sw1/config-run7.json"));
}

#[test]
fn config_yaml_wraps_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wandb/sweep-s/config-r.yaml");
    write_config_yaml(&path, &args()).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let parsed: serde_yaml::Value = serde_yaml::from_str(&text).unwrap();
    assert_eq!(parsed["lr"]["value"], serde_yaml::Value::from(0.01));
    assert_eq!(parsed["optim"]["value"], serde_yaml::Value::from("adam"));
}

#[test]
fn args_json_file_holds_flat_mapping() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config-r.json");
    write_args_json(&path, &vars()).unwrap();

    let parsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(parsed, serde_json::json!({"layers": 4, "lr": 0.01, "optim": "adam"}));
}
