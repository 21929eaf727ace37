// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Step-grouped row accumulator.
//!
//! Scalars for one logical step accumulate in an in-flight map; the
//! next `add` flushes it. Emitted rows get a `_step` counter that is
//! strictly increasing and contiguous from 0, independent of the
//! writer's own step numbering.

use beacon_core::HistoryRow;

#[derive(Debug, Default)]
pub struct History {
    step: u64,
    data: HistoryRow,
    added: Vec<HistoryRow>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new row, flushing the in-flight one.
    pub fn add(&mut self, row: HistoryRow) {
        self.flush();
        self.data = row;
    }

    /// Merge values into the in-flight row.
    pub fn row_update(&mut self, row: HistoryRow) {
        self.data.extend(row);
    }

    /// Stamp and emit the in-flight row, if any.
    pub fn flush(&mut self) {
        if self.data.is_empty() {
            return;
        }
        self.data
            .insert("_step".to_string(), serde_json::json!(self.step));
        self.added.push(std::mem::take(&mut self.data));
        self.step += 1;
    }

    /// Drain rows emitted so far.
    pub fn get_and_reset(&mut self) -> Vec<HistoryRow> {
        std::mem::take(&mut self.added)
    }
}

#[cfg(test)]
#[path = "history_tests.rs"]
mod tests;
