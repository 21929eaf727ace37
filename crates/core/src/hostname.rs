// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Default hostname provider.
//!
//! Watchers and the sweep agent take the hostname as a constructor
//! argument so tests can inject one; this is the production default.

/// Local machine hostname, or `"localhost"` if the OS won't say.
pub fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
#[path = "hostname_tests.rs"]
mod tests;
