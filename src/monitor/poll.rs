//! Polling fallback backend

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use log::debug;

use super::{list_existing, Event, EventHandler, EventKind, FileMonitor, IgnoreList, MonitorCore, MonitorId};
use crate::error::{Error, Result};

/// Modification time per child of one registered path
type Snapshot = BTreeMap<PathBuf, Option<SystemTime>>;

/// Monitor that rescans every registered path each `interval`.
///
/// A rescan reports children that appeared as `Created`, children that
/// vanished as `Deleted`, and children whose modification time differs from
/// the previous scan as `Changed`.
pub struct PollMonitor {
    core: MonitorCore,
    interval: Duration,
    last_scan: Instant,
    watched: HashMap<MonitorId, (PathBuf, Snapshot)>,
}

impl PollMonitor {
    pub fn new(ignore: IgnoreList, interval: Duration) -> Self {
        Self {
            core: MonitorCore::new(ignore),
            interval,
            last_scan: Instant::now(),
            watched: HashMap::new(),
        }
    }

    fn snapshot(children: &[PathBuf]) -> Snapshot {
        children
            .iter()
            .map(|child| {
                let mtime = fs::symlink_metadata(child).and_then(|m| m.modified()).ok();
                (child.clone(), mtime)
            })
            .collect()
    }

    /// Rescan every registered path and queue the differences.
    pub fn rescan(&mut self) {
        self.last_scan = Instant::now();
        let mut ids: Vec<MonitorId> = self.watched.keys().copied().collect();
        ids.sort();

        for id in ids {
            let Some((path, previous)) = self.watched.get(&id) else {
                continue;
            };
            let current = if path.exists() {
                list_existing(path)
                    .map(|children| Self::snapshot(&children))
                    .unwrap_or_default()
            } else {
                Snapshot::new()
            };

            for (child, mtime) in previous {
                match current.get(child) {
                    None => self
                        .core
                        .queue
                        .push_back(Event::new(id, child, EventKind::Deleted)),
                    Some(now) if now != mtime => self
                        .core
                        .queue
                        .push_back(Event::new(id, child, EventKind::Changed)),
                    Some(_) => {}
                }
            }
            for child in current.keys().filter(|c| !previous.contains_key(*c)) {
                self.core
                    .queue
                    .push_back(Event::new(id, child, EventKind::Created));
            }

            if let Some(entry) = self.watched.get_mut(&id) {
                entry.1 = current;
            }
        }
    }

    fn poll_due(&self) -> bool {
        self.last_scan.elapsed() >= self.interval
    }
}

impl FileMonitor for PollMonitor {
    fn backend(&self) -> &'static str {
        "poll"
    }

    fn add_monitor(&mut self, path: &Path, handler: Arc<dyn EventHandler>) -> Result<MonitorId> {
        let children = list_existing(path).map_err(|e| Error::Monitor {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let id = self.core.register(handler);
        self.watched
            .insert(id, (path.to_path_buf(), Self::snapshot(&children)));
        self.core.queue_existing(id, path, &children);
        debug!("Polling {} as {}", path.display(), id);
        Ok(id)
    }

    fn remove_monitor(&mut self, id: MonitorId) {
        self.watched.remove(&id);
        self.core.unregister(id);
    }

    fn pending(&mut self) -> usize {
        if self.core.queue.is_empty() && self.poll_due() {
            self.rescan();
        }
        self.core.queue.len()
    }

    fn next_event(&mut self) -> Option<Event> {
        self.pending();
        self.core.queue.pop_front()
    }

    fn wait_for_events(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.pending() > 0 {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let next_scan = self.last_scan + self.interval;
            let wake = next_scan.min(deadline);
            thread::sleep(wake.saturating_duration_since(now));
        }
    }

    fn handler(&self, id: MonitorId) -> Option<Arc<dyn EventHandler>> {
        self.core.handler(id)
    }

    fn is_ignored(&self, path: &Path) -> bool {
        self.core.ignore.is_ignored(path)
    }

    fn shutdown(&mut self) {
        self.watched.clear();
        self.core.clear();
    }
}
