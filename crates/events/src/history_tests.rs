// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn row(pairs: &[(&str, f64)]) -> HistoryRow {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::json!(v)))
        .collect()
}

#[test]
fn add_flushes_previous_row() {
    let mut history = History::new();
    history.add(row(&[("loss", 0.5)]));
    assert!(history.get_and_reset().is_empty());

    history.add(row(&[("loss", 0.4)]));
    let rows = history.get_and_reset();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["loss"], 0.5);
    assert_eq!(rows[0]["_step"], 0);
}

#[test]
fn steps_are_contiguous_from_zero() {
    let mut history = History::new();
    for i in 0..4 {
        history.add(row(&[("x", f64::from(i))]));
    }
    history.flush();

    let rows = history.get_and_reset();
    let steps: Vec<u64> = rows.iter().map(|r| r["_step"].as_u64().unwrap()).collect();
    assert_eq!(steps, vec![0, 1, 2, 3]);
}

#[test]
fn row_update_merges_into_in_flight_row() {
    let mut history = History::new();
    history.add(row(&[("loss", 0.5)]));
    history.row_update(row(&[("acc", 0.9)]));
    history.flush();

    let rows = history.get_and_reset();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["loss"], 0.5);
    assert_eq!(rows[0]["acc"], 0.9);
}

#[test]
fn flush_on_empty_row_is_a_no_op() {
    let mut history = History::new();
    history.flush();
    history.flush();
    assert!(history.get_and_reset().is_empty());

    // step counter untouched by no-op flushes
    history.add(row(&[("x", 1.0)]));
    history.flush();
    assert_eq!(history.get_and_reset()[0]["_step"], 0);
}

#[test]
fn get_and_reset_clears_accumulated_rows() {
    let mut history = History::new();
    history.add(row(&[("x", 1.0)]));
    history.flush();
    assert_eq!(history.get_and_reset().len(), 1);
    assert!(history.get_and_reset().is_empty());
}
