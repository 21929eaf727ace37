// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declarative HTTP retry policy.
//!
//! Uploads and downloads share one policy: exponential backoff with
//! factor 1.0 over 16 attempts against a fixed status list. The first
//! sleep is 1 s and each doubles, which adds up to roughly 18 hours of
//! patience in the worst case.

use crate::error::StorageError;
use std::future::Future;
use std::time::Duration;

/// HTTP statuses that indicate a transient condition worth retrying.
pub const RETRY_STATUSES: [u16; 8] = [308, 408, 409, 429, 500, 502, 503, 504];

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub backoff_factor: f64,
    pub total: u32,
    pub statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff_factor: 1.0,
            total: 16,
            statuses: RETRY_STATUSES.to_vec(),
        }
    }
}

impl RetryPolicy {
    pub fn is_retriable(&self, status: u16) -> bool {
        self.statuses.contains(&status)
    }

    /// Sleep before retry number `attempt` (1-based):
    /// `backoff_factor * 2^(attempt - 1)` seconds.
    pub fn delay(&self, attempt: u32) -> Duration {
        let secs = self.backoff_factor * f64::from(2u32.saturating_pow(attempt.saturating_sub(1)));
        Duration::from_secs_f64(secs.max(0.0))
    }
}

/// Drive `op` until it returns a non-retriable response or the retry
/// budget is exhausted. `op` builds a fresh request on each attempt so
/// bodies can be re-created.
pub async fn send_with_retry<F, Fut>(
    policy: &RetryPolicy,
    mut op: F,
) -> Result<reqwest::Response, StorageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    let mut attempt: u32 = 0;
    loop {
        let result = op().await;
        let retriable = match &result {
            Ok(resp) => policy.is_retriable(resp.status().as_u16()),
            // Connection-level failures are transient by definition;
            // protocol/builder errors are not.
            Err(err) => err.is_connect() || err.is_timeout(),
        };
        if retriable && attempt < policy.total {
            attempt += 1;
            let delay = policy.delay(attempt);
            tracing::debug!(attempt, delay_secs = delay.as_secs_f64(), "retrying request");
            tokio::time::sleep(delay).await;
            continue;
        }
        return match result {
            Ok(resp) => resp.error_for_status().map_err(StorageError::from),
            Err(err) => Err(StorageError::from(err)),
        };
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
