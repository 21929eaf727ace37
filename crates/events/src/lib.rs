// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! beacon-events: tfevents watcher/consumer pipeline.
//!
//! A [`watcher::EventWatcher`] discovers event-log files written by the
//! current process, decodes them through an injected
//! [`decoder::EventDecoder`], and feeds summary-bearing events through a
//! wall-time-ordered [`queue::EventQueue`] into a single
//! [`consumer::EventConsumer`], which emits time-ordered history rows
//! over the transport.

pub mod consumer;
pub mod decoder;
pub mod filename;
pub mod history;
pub mod queue;
pub mod watcher;

pub use consumer::EventConsumer;
pub use decoder::{DecodeError, EventDecoder, EventIterator, ScalarValue, TfEvent};
pub use filename::is_tfevents_file_created_by;
pub use history::History;
pub use queue::{EventQueue, QueuedEvent};
pub use watcher::{EventWatcher, WatcherSettings};
