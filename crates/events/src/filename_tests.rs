// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    ours = { "events.out.tfevents.1000.host1", "host1", 500.0, true },
    exactly_at_start = { "events.out.tfevents.1000.host1", "host1", 1000.0, true },
    too_old = { "events.out.tfevents.1000.host1", "host1", 1500.0, false },
    wrong_host = { "events.out.tfevents.1000.host2", "host1", 500.0, false },
    profile_empty = { "events.out.tfevents.1000.host1.profile_empty", "host1", 500.0, false },
    no_tfevents = { "events.out.1000.host1", "host1", 500.0, false },
    missing_time = { "events.out.tfevents.soon.host1", "host1", 500.0, false },
)]
fn filename_filter(name: &str, hostname: &str, start: f64, expected: bool) {
    assert_eq!(
        is_tfevents_file_created_by(Path::new(name), hostname, start),
        expected
    );
}

#[test]
fn dotted_hostname_matches_component_wise() {
    let path = Path::new("run/events.out.tfevents.1000.node-3.cluster.local.123.v2");
    assert!(is_tfevents_file_created_by(path, "node-3.cluster.local", 500.0));
    assert!(!is_tfevents_file_created_by(path, "node-3.cluster.remote", 500.0));
    assert!(!is_tfevents_file_created_by(
        path,
        "node-3.cluster.local.extra",
        500.0
    ));
}

#[test]
fn hostname_suffix_with_pid_still_matches() {
    // tensorflow writers append ".<pid>.v2" after the hostname
    let path = Path::new("events.out.tfevents.1700000000.trainbox.31415.v2");
    assert!(is_tfevents_file_created_by(path, "trainbox", 1_600_000_000.0));
}
