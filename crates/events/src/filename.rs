// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! tfevents filename filter.
//!
//! Event files are named
//! `<stem>.tfevents.<unixSeconds>.<hostnamePart>[.<hostnamePart>…][.<pid>][.<suffix>]`.
//! A file is "ours" iff its embedded creation time is at or after our
//! start time and every dotted hostname component matches the local
//! hostname positionally.

use std::path::Path;

/// Whether `path` is a tfevents file created by `hostname` at or after
/// `start_time` (epoch seconds).
pub fn is_tfevents_file_created_by(path: &Path, hostname: &str, start_time: f64) -> bool {
    let Some(basename) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return false;
    };
    if basename.ends_with(".profile_empty") {
        return false;
    }
    let components: Vec<&str> = basename.split('.').collect();
    let Some(tfevents_idx) = components.iter().position(|c| *c == "tfevents") else {
        return false;
    };

    // Hostnames may themselves contain dots; match component-wise.
    for (i, part) in hostname.split('.').enumerate() {
        match components.get(tfevents_idx + 2 + i) {
            Some(component) if *component == part => {}
            _ => return false,
        }
    }

    let Some(created) = components
        .get(tfevents_idx + 1)
        .and_then(|c| c.parse::<u64>().ok())
    else {
        return false;
    };
    created as f64 >= start_time
}

#[cfg(test)]
#[path = "filename_tests.rs"]
mod tests;
