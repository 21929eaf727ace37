// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Directory watchers feeding the event queue.
//!
//! One [`DirWatcher`] task per observed log directory: it discovers
//! event files written by this process, decodes them in filename order,
//! and enqueues summary-bearing events. File-notification wake-ups
//! accelerate the loop when available; a 1 s poll is the fallback.
//! Shutdown is two-phase: the flag stops new work, then a grace period
//! lets the writer flush before the task exits.

use crate::consumer::{ConsumerHandle, EventConsumer, CONSUMER_DELAY};
use crate::decoder::{EventDecoder, EventIterator, TfEvent};
use crate::filename::is_tfevents_file_created_by;
use crate::queue::{EventQueue, QueuedEvent};
use beacon_core::{Clock, FileEntry, FilePolicy, RunId, Transport};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Grace period after shutdown for event data to be flushed.
pub const SHUTDOWN_DELAY: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct WatcherSettings {
    /// Local hostname, matched against event filenames.
    pub hostname: String,
    /// Process start time (epoch seconds); older files are not ours.
    pub start_time: f64,
    /// Priority queue bound; watchers block on push when full.
    pub queue_capacity: usize,
    /// Consumer warm-up window.
    pub consumer_delay: Duration,
}

impl WatcherSettings {
    pub fn new(hostname: impl Into<String>, start_time: f64) -> Self {
        Self {
            hostname: hostname.into(),
            start_time,
            queue_capacity: 1024,
            consumer_delay: CONSUMER_DELAY,
        }
    }
}

/// What a directory watcher learned over its lifetime.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirWatcherReport {
    pub first_event_wall_time: Option<f64>,
    pub file_version: Option<String>,
}

struct DirWatcherHandle {
    shutdown: Arc<AtomicBool>,
    task: JoinHandle<DirWatcherReport>,
}

/// Watches a set of log directories and owns the single consumer fed by
/// their shared queue.
pub struct EventWatcher<T, C, D> {
    settings: WatcherSettings,
    run: RunId,
    transport: Arc<T>,
    decoder: Arc<D>,
    clock: C,
    queue: Arc<EventQueue>,
    logdirs: HashMap<String, DirWatcherHandle>,
    consumer: Option<ConsumerHandle>,
}

impl<T, C, D> EventWatcher<T, C, D>
where
    T: Transport + Send + Sync + 'static,
    C: Clock,
    D: EventDecoder,
{
    pub fn new(
        settings: WatcherSettings,
        run: RunId,
        transport: Arc<T>,
        decoder: Arc<D>,
        clock: C,
    ) -> Self {
        let queue = Arc::new(EventQueue::new(settings.queue_capacity));
        Self {
            settings,
            run,
            transport,
            decoder,
            clock,
            queue,
            logdirs: HashMap::new(),
            consumer: None,
        }
    }

    /// Start watching a log directory. Idempotent per directory; the
    /// consumer is started on the first call.
    pub fn add(&mut self, logdir: &str) {
        let logdir = logdir.replace('\\', "/");
        if self.logdirs.contains_key(&logdir) {
            return;
        }
        let namespace = namespace_for(self.logdirs.keys().map(String::as_str), &logdir);
        tracing::info!(logdir, ?namespace, "watching log directory");

        if self.consumer.is_none() {
            self.consumer = Some(
                EventConsumer::new(
                    self.queue.clone(),
                    self.transport.clone(),
                    self.run.clone(),
                    self.clock.clone(),
                )
                .with_delay(self.settings.consumer_delay)
                .spawn(),
            );
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let watcher = DirWatcher {
            logdir: PathBuf::from(&logdir),
            namespace,
            hostname: self.settings.hostname.clone(),
            start_time: self.settings.start_time,
            queue: self.queue.clone(),
            decoder: self.decoder.clone(),
            transport: self.transport.clone(),
            clock: self.clock.clone(),
            shutdown: shutdown.clone(),
            current: None,
            last_completed: None,
            report: DirWatcherReport::default(),
        };
        let task = tokio::spawn(watcher.run());
        self.logdirs.insert(logdir, DirWatcherHandle { shutdown, task });
    }

    /// Two-phase shutdown: flag every watcher, wait for their grace
    /// periods, then drain and stop the consumer.
    pub async fn finish(mut self) -> Vec<DirWatcherReport> {
        for handle in self.logdirs.values() {
            handle.shutdown.store(true, Ordering::SeqCst);
        }
        let mut reports = Vec::new();
        for (logdir, handle) in self.logdirs.drain() {
            match handle.task.await {
                Ok(report) => reports.push(report),
                Err(err) => tracing::warn!(logdir, error = %err, "dir watcher task failed"),
            }
        }
        if let Some(consumer) = self.consumer.take() {
            consumer.finish().await;
        }
        reports
    }
}

/// Namespace for a new logdir given the already-known ones.
///
/// Heuristic: strip the directory-level common prefix of all known
/// logdirs and any filename component, and use what remains. With only
/// one directory known the root is still ambiguous, so anything other
/// than `train`/`validation` maps to no namespace.
pub fn namespace_for<'a>(
    known: impl Iterator<Item = &'a str>,
    logdir: &str,
) -> Option<String> {
    let mut dirs: Vec<&str> = known.collect();
    dirs.push(logdir);

    let prefix = common_prefix(&dirs);
    let rootdir = match prefix.rfind('/') {
        Some(idx) => &prefix[..idx],
        None => "",
    };
    let filename = if Path::new(logdir).is_file() {
        Path::new(logdir)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    } else {
        String::new()
    };

    let mut namespace = logdir.to_string();
    if !filename.is_empty() {
        namespace = namespace.replace(&filename, "");
    }
    if !rootdir.is_empty() {
        namespace = namespace.replace(rootdir, "");
    }
    let namespace = namespace.trim_matches('/').to_string();

    if dirs.len() == 1 && namespace != "train" && namespace != "validation" {
        return None;
    }
    if namespace.is_empty() {
        None
    } else {
        Some(namespace)
    }
}

fn common_prefix(strings: &[&str]) -> String {
    let Some(first) = strings.first() else {
        return String::new();
    };
    let mut prefix = first.to_string();
    for s in &strings[1..] {
        let common: usize = prefix
            .chars()
            .zip(s.chars())
            .take_while(|(a, b)| a == b)
            .map(|(a, _)| a.len_utf8())
            .sum();
        prefix.truncate(common);
    }
    prefix
}

struct DirWatcher<T, C, D> {
    logdir: PathBuf,
    namespace: Option<String>,
    hostname: String,
    start_time: f64,
    queue: Arc<EventQueue>,
    decoder: Arc<D>,
    transport: Arc<T>,
    clock: C,
    shutdown: Arc<AtomicBool>,
    current: Option<(PathBuf, Box<dyn EventIterator>)>,
    /// Last file we finished with; scanning resumes after it.
    last_completed: Option<PathBuf>,
    report: DirWatcherReport,
}

impl<T, C, D> DirWatcher<T, C, D>
where
    T: Transport + Send + Sync + 'static,
    C: Clock,
    D: EventDecoder,
{
    async fn run(mut self) -> DirWatcherReport {
        let (notify_tx, mut notify_rx) = mpsc::channel(32);
        let _watcher_guard = match create_file_watcher(&self.logdir, notify_tx) {
            Ok(watcher) => Some(watcher),
            Err(err) => {
                tracing::debug!(
                    logdir = %self.logdir.display(),
                    error = %err,
                    "file watcher unavailable, polling only"
                );
                None
            }
        };

        let mut seen_dir = self.logdir.is_dir();
        let mut shutdown_deadline: Option<tokio::time::Instant> = None;

        loop {
            self.poll_events().await;

            if self.logdir.is_dir() {
                seen_dir = true;
            } else if seen_dir {
                tracing::info!(logdir = %self.logdir.display(), "log directory deleted");
                break;
            }

            if self.shutdown.load(Ordering::SeqCst) {
                let now = tokio::time::Instant::now();
                match shutdown_deadline {
                    None => shutdown_deadline = Some(now + SHUTDOWN_DELAY),
                    Some(deadline) if now > deadline => break,
                    Some(_) => {}
                }
            }

            tokio::select! {
                _ = notify_rx.recv() => {}
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }
        }
        self.report
    }

    /// Decode everything currently available, file by file in name
    /// order. Stops when the newest known file is caught up.
    async fn poll_events(&mut self) {
        loop {
            if self.current.is_none() {
                let Some(next) = self.next_file(self.last_completed.as_deref()) else {
                    return;
                };
                if !self.open_file(next).await {
                    return;
                }
            }

            let Some((path, iterator)) = self.current.as_mut() else {
                return;
            };
            match iterator.next_event() {
                Ok(Some(event)) => self.process_event(event).await,
                Ok(None) => {
                    // Caught up; move on only once a newer file shows up,
                    // since the writer may still append to this one.
                    let current_path = path.clone();
                    match self.next_file(Some(&current_path)) {
                        Some(next) => {
                            self.last_completed = Some(current_path);
                            if !self.open_file(next).await {
                                return;
                            }
                        }
                        None => return,
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %err,
                        "event decode failed, abandoning file"
                    );
                    self.last_completed = Some(path.clone());
                    self.current = None;
                    return;
                }
            }
        }
    }

    async fn open_file(&mut self, path: PathBuf) -> bool {
        let entry = FileEntry::new(
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            FilePolicy::Live,
        );
        self.transport.publish_files(&[entry]).await;

        match self.decoder.open(&path) {
            Ok(iterator) => {
                tracing::debug!(path = %path.display(), "reading event file");
                self.current = Some((path, iterator));
                true
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to open event file");
                false
            }
        }
    }

    /// Earliest "ours" event file strictly after `after` in name order.
    fn next_file(&self, after: Option<&Path>) -> Option<PathBuf> {
        let entries = std::fs::read_dir(&self.logdir).ok()?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .filter(|p| is_tfevents_file_created_by(p, &self.hostname, self.start_time))
            .collect();
        files.sort();
        match after {
            Some(after) => files.into_iter().find(|p| p.as_path() > after),
            None => files.into_iter().next(),
        }
    }

    async fn process_event(&mut self, event: TfEvent) {
        if self.report.first_event_wall_time.is_none() {
            self.report.first_event_wall_time = Some(event.wall_time);
        }
        if let Some(version) = &event.file_version {
            self.report.file_version = Some(version.clone());
        }
        if event.summary.is_some() {
            let queued = QueuedEvent::new(
                event,
                self.namespace.clone(),
                self.clock.epoch_secs(),
            );
            self.queue.push(queued).await;
        }
    }
}

fn create_file_watcher(
    path: &Path,
    tx: mpsc::Sender<()>,
) -> Result<RecommendedWatcher, notify::Error> {
    let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, _>| {
        if res.is_ok() {
            let _ = tx.blocking_send(());
        }
    })?;

    watcher.watch(path, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;
