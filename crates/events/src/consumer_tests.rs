// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::decoder::{ScalarValue, TfEvent};
use async_trait::async_trait;
use beacon_core::{FakeClock, FileEntry};
use parking_lot::Mutex;

#[derive(Default)]
struct RecordingTransport {
    rows: Mutex<Vec<HistoryRow>>,
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn publish_files(&self, _entries: &[FileEntry]) {}

    async fn publish_history(&self, row: HistoryRow, _run: &RunId) {
        self.rows.lock().push(row);
    }
}

fn scalar_event(wall_time: f64, step: i64, tag: &str, value: f64) -> QueuedEvent {
    QueuedEvent::new(
        TfEvent::scalars(wall_time, step, vec![ScalarValue::new(tag, value)]),
        None,
        wall_time,
    )
}

fn consumer_parts(
    delay: Duration,
) -> (
    Arc<EventQueue>,
    Arc<RecordingTransport>,
    FakeClock,
    ConsumerHandle,
) {
    let queue = Arc::new(EventQueue::new(64));
    let transport = Arc::new(RecordingTransport::default());
    let clock = FakeClock::new(0.0);
    let handle = EventConsumer::new(
        queue.clone(),
        transport.clone(),
        RunId::new("run-1"),
        clock.clone(),
    )
    .with_delay(delay)
    .spawn();
    (queue, transport, clock, handle)
}

#[tokio::test(start_paused = true)]
async fn events_within_warmup_emit_in_wall_time_order() {
    let (queue, transport, clock, handle) = consumer_parts(Duration::from_secs(10));

    // later wall time arrives first, within the warm-up window
    queue.push(scalar_event(5.0, 1, "loss", 0.5)).await;
    queue.push(scalar_event(3.0, 0, "loss", 0.9)).await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    clock.set(11.0);
    tokio::time::sleep(Duration::from_secs(5)).await;
    handle.finish().await;

    let rows = transport.rows.lock();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["loss"], 0.9);
    assert_eq!(rows[0]["global_step"], 0);
    assert_eq!(rows[1]["loss"], 0.5);
    assert_eq!(rows[1]["global_step"], 1);
}

#[tokio::test(start_paused = true)]
async fn emitted_steps_are_contiguous_from_zero() {
    let (queue, transport, clock, handle) = consumer_parts(Duration::from_secs(1));
    clock.set(5.0);

    // writer steps are sparse; emitted _step is our own counter
    queue.push(scalar_event(1.0, 10, "loss", 0.9)).await;
    queue.push(scalar_event(2.0, 20, "loss", 0.8)).await;
    queue.push(scalar_event(3.0, 40, "loss", 0.7)).await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    handle.finish().await;

    let rows = transport.rows.lock();
    let steps: Vec<u64> = rows.iter().map(|r| r["_step"].as_u64().unwrap()).collect();
    assert_eq!(steps, vec![0, 1, 2]);
}

#[tokio::test(start_paused = true)]
async fn same_step_events_merge_into_one_row() {
    let (queue, transport, clock, handle) = consumer_parts(Duration::from_secs(1));
    clock.set(5.0);

    queue.push(scalar_event(1.0, 7, "loss", 0.9)).await;
    queue.push(scalar_event(1.5, 7, "acc", 0.6)).await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    handle.finish().await;

    let rows = transport.rows.lock();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["loss"], 0.9);
    assert_eq!(rows[0]["acc"], 0.6);
    assert_eq!(rows[0]["global_step"], 7);
}

#[tokio::test(start_paused = true)]
async fn namespace_prefixes_metric_keys() {
    let (queue, transport, clock, handle) = consumer_parts(Duration::from_secs(1));
    clock.set(5.0);

    queue
        .push(QueuedEvent::new(
            TfEvent::scalars(1.0, 0, vec![ScalarValue::new("loss", 0.5)]),
            Some("train".to_string()),
            1.0,
        ))
        .await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    handle.finish().await;

    let rows = transport.rows.lock();
    assert_eq!(rows[0]["train/loss"], 0.5);
}

#[tokio::test(start_paused = true)]
async fn shutdown_drains_pending_events_despite_warmup() {
    let (queue, transport, _clock, handle) = consumer_parts(Duration::from_secs(3600));

    queue.push(scalar_event(1.0, 0, "loss", 0.9)).await;
    queue.push(scalar_event(2.0, 1, "loss", 0.8)).await;
    // clock stays inside the warm-up window; finish must drain anyway
    handle.finish().await;

    let rows = transport.rows.lock();
    assert_eq!(rows.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn events_without_summary_emit_nothing() {
    let (queue, transport, clock, handle) = consumer_parts(Duration::from_secs(1));
    clock.set(5.0);

    queue
        .push(QueuedEvent::new(
            TfEvent::file_version(1.0, "brain.Event:2"),
            None,
            1.0,
        ))
        .await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    handle.finish().await;

    assert!(transport.rows.lock().is_empty());
}
