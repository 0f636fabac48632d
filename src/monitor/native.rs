//! OS change-notification backend built on `notify`

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use notify::event::{ModifyKind, RenameMode};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};

use super::{list_existing, Event, EventHandler, EventKind, FileMonitor, IgnoreList, MonitorCore, MonitorId};
use crate::error::{Error, Result};

/// Monitor backed by the platform's recommended `notify` watcher.
///
/// Every registered path is watched non-recursively; the directory index
/// registers subdirectories itself as it discovers them.
pub struct NativeMonitor {
    core: MonitorCore,
    watcher: Option<RecommendedWatcher>,
    rx: Receiver<notify::Result<notify::Event>>,
    /// Watched path to registration
    watched: HashMap<PathBuf, MonitorId>,
}

impl NativeMonitor {
    /// Create the OS watcher. Fails when the facility is unavailable, in
    /// which case callers fall back to [`super::poll::PollMonitor`].
    pub fn new(ignore: IgnoreList) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| {
                let _ = tx.send(res);
            },
            Config::default(),
        )?;

        Ok(Self {
            core: MonitorCore::new(ignore),
            watcher: Some(watcher),
            rx,
            watched: HashMap::new(),
        })
    }

    /// Registration an OS event for `path` belongs to: the watch on its
    /// parent directory, else a watch on the path itself.
    fn owner_of(&self, path: &Path) -> Option<MonitorId> {
        path.parent()
            .and_then(|parent| self.watched.get(parent))
            .or_else(|| self.watched.get(path))
            .copied()
    }

    fn translate(&mut self, res: notify::Result<notify::Event>) {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                warn!("Change notification error: {}", e);
                return;
            }
        };

        match event.kind {
            notify::EventKind::Create(_) => {
                for path in &event.paths {
                    let id = self.owner_of(path);
                    enqueue(&mut self.core, id, path, EventKind::Created);
                }
            }
            notify::EventKind::Remove(_) => {
                for path in &event.paths {
                    let id = self.owner_of(path);
                    enqueue(&mut self.core, id, path, EventKind::Deleted);
                }
            }
            notify::EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                if let [from, to] = event.paths.as_slice() {
                    let id = self.owner_of(from);
                    enqueue(&mut self.core, id, from, EventKind::Deleted);
                    let id = self.owner_of(to);
                    enqueue(&mut self.core, id, to, EventKind::Created);
                }
            }
            notify::EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                for path in &event.paths {
                    let id = self.owner_of(path);
                    enqueue(&mut self.core, id, path, EventKind::Deleted);
                }
            }
            notify::EventKind::Modify(ModifyKind::Name(_)) => {
                for path in &event.paths {
                    let id = self.owner_of(path);
                    let kind = if path.exists() {
                        EventKind::Created
                    } else {
                        EventKind::Deleted
                    };
                    enqueue(&mut self.core, id, path, kind);
                }
            }
            notify::EventKind::Modify(_) | notify::EventKind::Any => {
                for path in &event.paths {
                    // Directory mtime changes carry no information for us
                    if path.is_dir() {
                        continue;
                    }
                    let id = self.owner_of(path);
                    enqueue(&mut self.core, id, path, EventKind::Changed);
                }
            }
            _ => {}
        }
    }

    fn drain_os(&mut self) {
        while let Ok(res) = self.rx.try_recv() {
            self.translate(res);
        }
    }
}

fn enqueue(core: &mut MonitorCore, id: Option<MonitorId>, path: &Path, kind: EventKind) {
    match id {
        Some(id) => core.queue.push_back(Event::new(id, path, kind)),
        None => debug!("Dropping {} for unwatched {}", kind, path.display()),
    }
}

impl FileMonitor for NativeMonitor {
    fn backend(&self) -> &'static str {
        "native"
    }

    fn add_monitor(&mut self, path: &Path, handler: Arc<dyn EventHandler>) -> Result<MonitorId> {
        let watcher = self.watcher.as_mut().ok_or_else(|| Error::Monitor {
            path: path.to_path_buf(),
            message: "monitor has been shut down".to_string(),
        })?;
        // Watch before listing so nothing created in between is missed
        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|e| Error::Monitor {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        let children = list_existing(path).map_err(|e| Error::Monitor {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let id = self.core.register(handler);
        self.watched.insert(path.to_path_buf(), id);
        self.core.queue_existing(id, path, &children);
        debug!("Monitoring {} as {}", path.display(), id);
        Ok(id)
    }

    fn remove_monitor(&mut self, id: MonitorId) {
        let paths: Vec<PathBuf> = self
            .watched
            .iter()
            .filter(|(_, watched)| **watched == id)
            .map(|(path, _)| path.clone())
            .collect();
        for path in paths {
            self.watched.remove(&path);
            if let Some(watcher) = self.watcher.as_mut() {
                // The path is usually gone already, which the OS reports as an error
                let _ = watcher.unwatch(&path);
            }
        }
        self.core.unregister(id);
    }

    fn pending(&mut self) -> usize {
        self.drain_os();
        self.core.queue.len()
    }

    fn next_event(&mut self) -> Option<Event> {
        if self.core.queue.is_empty() {
            self.drain_os();
        }
        self.core.queue.pop_front()
    }

    fn wait_for_events(&mut self, timeout: Duration) -> bool {
        if self.pending() > 0 {
            return true;
        }
        match self.rx.recv_timeout(timeout) {
            Ok(res) => {
                self.translate(res);
                self.drain_os();
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {}
        }
        !self.core.queue.is_empty()
    }

    fn handler(&self, id: MonitorId) -> Option<Arc<dyn EventHandler>> {
        self.core.handler(id)
    }

    fn is_ignored(&self, path: &Path) -> bool {
        self.core.ignore.is_ignored(path)
    }

    fn shutdown(&mut self) {
        // Dropping the watcher releases every OS watch handle
        self.watcher = None;
        self.watched.clear();
        self.core.clear();
    }
}
