// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single consumer draining the shared priority queue.
//!
//! For the first [`CONSUMER_DELAY`] after start, popped events are put
//! back and the consumer naps; this warm-up window lets later-arriving
//! files with earlier timestamps overtake before any row is emitted.
//! There is exactly one consumer per run.

use crate::history::History;
use crate::queue::{EventQueue, QueuedEvent};
use beacon_core::{Clock, HistoryRow, RunId, Transport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Warm-up window before rows start flowing.
pub const CONSUMER_DELAY: Duration = Duration::from_secs(10);

const POP_TIMEOUT: Duration = Duration::from_secs(1);
const WARMUP_RETRY_SLEEP: Duration = Duration::from_millis(100);

pub struct EventConsumer<T, C> {
    queue: Arc<EventQueue>,
    transport: Arc<T>,
    run: RunId,
    clock: C,
    delay: Duration,
}

/// Handle to a running consumer.
pub struct ConsumerHandle {
    shutdown: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl ConsumerHandle {
    /// Zero the warm-up delay, drain the queue, flush, and wait.
    pub async fn finish(self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Err(err) = self.task.await {
            tracing::warn!(error = %err, "event consumer task failed");
        }
    }
}

impl<T, C> EventConsumer<T, C>
where
    T: Transport + Send + Sync + 'static,
    C: Clock,
{
    pub fn new(queue: Arc<EventQueue>, transport: Arc<T>, run: RunId, clock: C) -> Self {
        Self {
            queue,
            transport,
            run,
            clock,
            delay: CONSUMER_DELAY,
        }
    }

    /// Override the warm-up window (tests).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn spawn(self) -> ConsumerHandle {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();
        let task = tokio::spawn(self.run_loop(flag));
        ConsumerHandle { shutdown, task }
    }

    async fn run_loop(self, shutdown: Arc<AtomicBool>) {
        let start = self.clock.epoch_secs();
        let mut history = History::new();
        let mut translator = StepTranslator::default();

        loop {
            match self.queue.pop_timeout(POP_TIMEOUT).await {
                Some(queued) => {
                    let shutting_down = shutdown.load(Ordering::SeqCst);
                    // Shutdown zeroes the delay so draining never waits.
                    if !shutting_down
                        && self.clock.epoch_secs() < start + self.delay.as_secs_f64()
                    {
                        self.queue.reinsert(queued);
                        tokio::time::sleep(WARMUP_RETRY_SLEEP).await;
                        continue;
                    }
                    translator.handle(queued, &mut history);
                    self.drain(&mut history).await;
                }
                None => {
                    if shutdown.load(Ordering::SeqCst) {
                        break;
                    }
                }
            }
        }

        // flush uncommitted data
        history.flush();
        self.drain(&mut history).await;
        tracing::debug!(run = %self.run, "event consumer drained");
    }

    async fn drain(&self, history: &mut History) {
        for row in history.get_and_reset() {
            self.transport.publish_history(row, &self.run).await;
        }
    }
}

/// Groups scalars into rows keyed by the writer's global step:
/// consecutive events for the same step merge into one row, a new step
/// starts a new row.
#[derive(Debug, Default)]
struct StepTranslator {
    current_step: Option<i64>,
}

impl StepTranslator {
    fn handle(&mut self, queued: QueuedEvent, history: &mut History) {
        let Some(summary) = queued.event.summary else {
            return;
        };
        let mut row = HistoryRow::new();
        for scalar in summary {
            let key = match &queued.namespace {
                Some(namespace) => format!("{namespace}/{}", scalar.tag),
                None => scalar.tag,
            };
            row.insert(key, serde_json::json!(scalar.value));
        }
        row.insert(
            "global_step".to_string(),
            serde_json::json!(queued.event.step),
        );

        if self.current_step == Some(queued.event.step) {
            history.row_update(row);
        } else {
            self.current_step = Some(queued.event.step);
            history.add(row);
        }
    }
}

#[cfg(test)]
#[path = "consumer_tests.rs"]
mod tests;
