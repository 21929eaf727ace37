// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! History row type shared by the event pipeline and transport

use std::collections::BTreeMap;

/// One emitted metrics row: metric name → value, plus bookkeeping keys
/// such as `_step`. A BTreeMap keeps serialisation order deterministic.
pub type HistoryRow = BTreeMap<String, serde_json::Value>;
