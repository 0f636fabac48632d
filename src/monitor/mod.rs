//! # Event Source
//!
//! File monitors turn filesystem changes into a stream of [`Event`]s tagged
//! with the [`MonitorId`] of the registration that asked for them. Two
//! backends share one contract:
//!
//! - [`native::NativeMonitor`] uses the OS notification facility through
//!   `notify`.
//! - [`poll::PollMonitor`] rescans registered paths on an interval and
//!   reports a change only when a file's modification time differs.
//!
//! Registering a directory synthesizes one `Exists` event per child followed
//! by a single `EndExist`, so a new subscriber converges without a separate
//! scan.
//!
//! [`FileMonitor::service_interval`] drains the queue, drops ignored names,
//! coalesces repeated `Changed` events and dispatches the rest to the
//! registered [`EventHandler`]s.

pub mod native;
pub mod poll;

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use glob::Pattern;
use log::{debug, info, warn};

use crate::error::Result;

/// Handle identifying one `add_monitor` registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonitorId(pub u64);

impl fmt::Display for MonitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Path existed when its parent was registered
    Exists,
    /// End of the synthetic scan of a registered path
    EndExist,
    Created,
    Changed,
    Deleted,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Exists => "exists",
            EventKind::EndExist => "endExist",
            EventKind::Created => "created",
            EventKind::Changed => "changed",
            EventKind::Deleted => "deleted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub monitor: MonitorId,
    pub path: PathBuf,
    pub kind: EventKind,
}

impl Event {
    pub fn new(monitor: MonitorId, path: impl Into<PathBuf>, kind: EventKind) -> Self {
        Self {
            monitor,
            path: path.into(),
            kind,
        }
    }
}

/// Receiver of dispatched events.
///
/// The monitor is passed back in so a handler can register new paths (for
/// example subdirectories it discovers) while handling an event.
pub trait EventHandler: Send + Sync {
    fn handle_event(&self, event: &Event, monitor: &mut dyn FileMonitor);
}

/// A source of filesystem events
pub trait FileMonitor: Send {
    /// Short backend name for logs
    fn backend(&self) -> &'static str;

    /// Register interest in `path` and queue its synthetic existence scan.
    fn add_monitor(&mut self, path: &Path, handler: Arc<dyn EventHandler>) -> Result<MonitorId>;

    /// Stop watching a registration. Unknown ids are ignored.
    fn remove_monitor(&mut self, id: MonitorId);

    /// Number of queued events, after collecting anything the backend has
    /// observed so far. Never blocks.
    fn pending(&mut self) -> usize;

    /// Pop the next queued event. Never blocks.
    fn next_event(&mut self) -> Option<Event>;

    /// Block until an event is queued or `timeout` elapses. Returns whether
    /// events are pending.
    fn wait_for_events(&mut self, timeout: Duration) -> bool;

    fn handler(&self, id: MonitorId) -> Option<Arc<dyn EventHandler>>;

    fn is_ignored(&self, path: &Path) -> bool;

    /// Release OS resources. No further events are produced.
    fn shutdown(&mut self);
}

/// Counters for one `service_interval` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceStats {
    pub processed: usize,
    pub coalesced: usize,
    pub ignored: usize,
}

impl dyn FileMonitor {
    /// Drain and dispatch every event that arrives within `interval`.
    ///
    /// Events queued by handlers during dispatch (such as the existence scan
    /// of a newly registered subdirectory) are dispatched in the same call,
    /// so `service_interval(Duration::ZERO)` brings a fresh registration to
    /// convergence.
    pub fn service_interval(&mut self, interval: Duration) -> ServiceStats {
        let start = Instant::now();
        let deadline = start + interval;
        let mut stats = ServiceStats::default();

        loop {
            let mut batch = Vec::new();
            while let Some(event) = self.next_event() {
                batch.push(event);
            }

            if batch.is_empty() {
                let now = Instant::now();
                if now >= deadline || !self.wait_for_events(deadline - now) {
                    break;
                }
                continue;
            }

            let before = batch.len();
            batch.retain(|e| !self.is_ignored(&e.path));
            stats.ignored += before - batch.len();

            let (batch, coalesced) = coalesce(batch);
            stats.coalesced += coalesced;

            for event in batch {
                let Some(handler) = self.handler(event.monitor) else {
                    warn!(
                        "Got event {} for unknown monitor {} on {}",
                        event.kind,
                        event.monitor,
                        event.path.display()
                    );
                    continue;
                };
                debug!(
                    "Dispatching {} {} ({})",
                    event.kind,
                    event.path.display(),
                    event.monitor
                );
                handler.handle_event(&event, self);
                stats.processed += 1;
            }
        }

        if stats.processed > 0 {
            info!(
                "Processed {} events in {:.3} s, {} coalesced",
                stats.processed,
                start.elapsed().as_secs_f64(),
                stats.coalesced
            );
        }
        stats
    }
}

/// Collapse repeated `Changed` events for the same (path, monitor) pair.
///
/// A `Changed` is dropped when the same pair already had a `Changed` since
/// its last other event. Every other event kind passes through in order.
/// Returns the kept events and the number dropped.
pub fn coalesce(events: Vec<Event>) -> (Vec<Event>, usize) {
    let mut seen: HashSet<(PathBuf, MonitorId)> = HashSet::new();
    let mut kept = Vec::with_capacity(events.len());
    let mut dropped = 0;

    for event in events {
        let key = (event.path.clone(), event.monitor);
        if event.kind == EventKind::Changed {
            if !seen.insert(key) {
                dropped += 1;
                continue;
            }
        } else {
            seen.remove(&key);
        }
        kept.push(event);
    }
    (kept, dropped)
}

/// Names never dispatched: version-control metadata, editor backups, swap
/// files and lock files.
pub const DEFAULT_IGNORE: &[&str] = &[
    ".svn", ".git", ".hg", ".bzr", "CVS", "*~", "#*", ".#*", ".*.swp", ".*.swx",
];

/// Glob patterns matched against the final component of an event path
#[derive(Debug, Clone)]
pub struct IgnoreList {
    patterns: Vec<Pattern>,
}

impl IgnoreList {
    /// Built-in patterns plus `extra`.
    pub fn new(extra: &[String]) -> Result<Self> {
        let mut patterns = DEFAULT_IGNORE
            .iter()
            .map(|p| Pattern::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for pattern in extra {
            patterns.push(Pattern::new(pattern)?);
        }
        Ok(Self { patterns })
    }

    pub fn is_ignored(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };
        let name = name.to_string_lossy();
        self.patterns.iter().any(|p| p.matches(&name))
    }
}

/// Registration bookkeeping and the event queue shared by both backends
pub(crate) struct MonitorCore {
    pub(crate) ignore: IgnoreList,
    handlers: HashMap<MonitorId, Arc<dyn EventHandler>>,
    pub(crate) queue: VecDeque<Event>,
    next_id: u64,
}

impl MonitorCore {
    pub(crate) fn new(ignore: IgnoreList) -> Self {
        Self {
            ignore,
            handlers: HashMap::new(),
            queue: VecDeque::new(),
            next_id: 1,
        }
    }

    pub(crate) fn register(&mut self, handler: Arc<dyn EventHandler>) -> MonitorId {
        let id = MonitorId(self.next_id);
        self.next_id += 1;
        self.handlers.insert(id, handler);
        id
    }

    pub(crate) fn unregister(&mut self, id: MonitorId) {
        self.handlers.remove(&id);
    }

    pub(crate) fn handler(&self, id: MonitorId) -> Option<Arc<dyn EventHandler>> {
        self.handlers.get(&id).cloned()
    }

    /// Queue `Exists` for every child of a directory (or the path itself
    /// for a file), then `EndExist`.
    pub(crate) fn queue_existing(&mut self, id: MonitorId, path: &Path, children: &[PathBuf]) {
        for child in children {
            self.queue.push_back(Event::new(id, child, EventKind::Exists));
        }
        self.queue.push_back(Event::new(id, path, EventKind::EndExist));
    }

    pub(crate) fn clear(&mut self) {
        self.handlers.clear();
        self.queue.clear();
    }
}

/// Children of a directory in name order, or the path itself for a file.
pub(crate) fn list_existing(path: &Path) -> std::io::Result<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut children = std::fs::read_dir(path)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    children.sort();
    Ok(children)
}
