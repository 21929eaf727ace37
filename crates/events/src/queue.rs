// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded priority queue ordered by event wall time.
//!
//! Multiple directory watchers push concurrently; the single consumer
//! pops the earliest event. Pushes block while the queue is full so
//! watchers back off instead of buffering unboundedly.

use crate::decoder::TfEvent;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;
use tokio::sync::Notify;

/// An event tagged with its owning namespace, as queued for the
/// consumer.
#[derive(Debug, Clone)]
pub struct QueuedEvent {
    pub event: TfEvent,
    pub namespace: Option<String>,
    /// Epoch seconds at which the watcher enqueued this event.
    pub created_at: f64,
}

impl QueuedEvent {
    pub fn new(event: TfEvent, namespace: Option<String>, created_at: f64) -> Self {
        Self {
            event,
            namespace,
            created_at,
        }
    }
}

/// Min-heap adapter: earliest wall time wins.
struct HeapItem(QueuedEvent);

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.0.event.wall_time == other.0.event.wall_time
    }
}

impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so BinaryHeap's max is the smallest wall time.
        other
            .0
            .event
            .wall_time
            .total_cmp(&self.0.event.wall_time)
    }
}

pub struct EventQueue {
    heap: Mutex<BinaryHeap<HeapItem>>,
    capacity: usize,
    not_empty: Notify,
    not_full: Notify,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            capacity: capacity.max(1),
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }

    /// Push, waiting while the queue is full.
    pub async fn push(&self, event: QueuedEvent) {
        let mut event = Some(event);
        loop {
            let notified = self.not_full.notified();
            {
                let mut heap = self.heap.lock();
                if heap.len() < self.capacity {
                    // `event` is always Some here; the take avoids a
                    // clone on the retry path.
                    if let Some(event) = event.take() {
                        heap.push(HeapItem(event));
                    }
                    drop(heap);
                    self.not_empty.notify_one();
                    return;
                }
            }
            notified.await;
        }
    }

    /// Re-insert an event the consumer decided not to process yet.
    /// Ignores capacity: the consumer just freed a slot, and blocking
    /// here could deadlock it against the watchers.
    pub fn reinsert(&self, event: QueuedEvent) {
        self.heap.lock().push(HeapItem(event));
        self.not_empty.notify_one();
    }

    /// Pop the earliest event, waiting up to `timeout` for one.
    pub async fn pop_timeout(&self, timeout: Duration) -> Option<QueuedEvent> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.not_empty.notified();
            {
                let mut heap = self.heap.lock();
                if let Some(HeapItem(event)) = heap.pop() {
                    drop(heap);
                    self.not_full.notify_one();
                    return Some(event);
                }
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
