//! # Directory Index
//!
//! Keeps one [`EntrySet`] per logical item in sync with a watched repository
//! root. A logical item is a directory beneath the root: `<root>/etc/motd/`
//! holds the variants of item `/etc/motd`, whose base name is `motd`.
//!
//! The index is the [`EventHandler`] for every directory it monitors and
//! registers subdirectories as it discovers them. All mutation happens while
//! a monitor dispatches events; readers take a short read lock and clone the
//! `Arc`s they need.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock, Weak};

use log::{debug, error, warn};

use crate::entry_set::{CandidateEntry, EntrySet};
use crate::error::{Error, ResolveError, Result};
use crate::info::InfoSource;
use crate::monitor::{Event, EventHandler, EventKind, FileMonitor, MonitorId};
use crate::specificity::{classify, sidecar_kind, Classification, UnclassifiableFile};

/// Candidates and metadata of one item, copied out of the index
#[derive(Debug, Clone)]
pub struct ItemSnapshot {
    pub item: String,
    pub candidates: Vec<Arc<CandidateEntry>>,
    pub info: Option<InfoSource>,
}

pub struct RepositoryIndex {
    root: PathBuf,
    me: Weak<RepositoryIndex>,
    sets: RwLock<BTreeMap<String, EntrySet>>,
    /// Monitored directory per registration
    dirs: Mutex<HashMap<MonitorId, PathBuf>>,
    /// Files skipped because their names fit no rule
    rejected: Mutex<BTreeMap<PathBuf, UnclassifiableFile>>,
}

impl RepositoryIndex {
    pub fn new(root: &Path) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            root: root.to_path_buf(),
            me: me.clone(),
            sets: RwLock::new(BTreeMap::new()),
            dirs: Mutex::new(HashMap::new()),
            rejected: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Register the root with `monitor`; its existence scan populates the
    /// index once the monitor is serviced.
    pub fn watch(&self, monitor: &mut dyn FileMonitor) -> Result<MonitorId> {
        self.monitor_dir(&self.root, monitor)
    }

    fn monitor_dir(&self, path: &Path, monitor: &mut dyn FileMonitor) -> Result<MonitorId> {
        let me = self.me.upgrade().ok_or_else(|| Error::Monitor {
            path: path.to_path_buf(),
            message: "index has been dropped".to_string(),
        })?;
        let id = monitor.add_monitor(path, me)?;
        self.dirs
            .lock()
            .map_err(|_| Error::LockPoisoned {
                context: "index directory table".to_string(),
            })?
            .insert(id, path.to_path_buf());
        Ok(id)
    }

    fn is_monitored(&self, path: &Path) -> bool {
        self.dirs
            .lock()
            .map(|dirs| dirs.values().any(|d| d == path))
            .unwrap_or(false)
    }

    /// Logical item name and base name of the directory holding `path`.
    fn item_of(&self, path: &Path) -> Option<(String, String)> {
        let dir = path.parent()?;
        let relative = dir.strip_prefix(&self.root).ok()?;
        let basename = relative.file_name()?.to_string_lossy().into_owned();
        let item = format!("/{}", relative.to_string_lossy().replace('\\', "/"));
        Some((item, basename))
    }

    fn item_of_dir(&self, dir: &Path) -> Option<String> {
        let relative = dir.strip_prefix(&self.root).ok()?;
        let relative = relative.to_string_lossy().replace('\\', "/");
        if relative.is_empty() {
            return None;
        }
        Some(format!("/{}", relative))
    }

    fn add_path(&self, path: &Path, monitor: &mut dyn FileMonitor, warn_duplicate: bool) {
        if path.is_dir() {
            if self.is_monitored(path) {
                debug!("Already monitoring {}", path.display());
                return;
            }
            if let Err(e) = self.monitor_dir(path, monitor) {
                error!("Failed to monitor {}: {}", path.display(), e);
            }
            return;
        }
        self.index_file(path, warn_duplicate);
    }

    fn index_file(&self, path: &Path, warn_duplicate: bool) {
        let Some((item, basename)) = self.item_of(path) else {
            debug!("Ignoring {} outside any item directory", path.display());
            return;
        };
        let file_name = match path.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => return,
        };

        match classify(&basename, &file_name) {
            Err(unclassifiable) => {
                warn!("{} ({})", unclassifiable, path.display());
                if let Ok(mut rejected) = self.rejected.lock() {
                    rejected.insert(path.to_path_buf(), unclassifiable);
                }
            }
            Ok(Classification::Sidecar(kind)) => match fs::read_to_string(path) {
                Ok(content) => {
                    let info = InfoSource::parse(kind, &content);
                    self.with_set(&item, &basename, |set| set.set_info(info));
                }
                Err(e) => error!("Failed to read {}: {}", path.display(), e),
            },
            Ok(Classification::Candidate(specificity)) => {
                match CandidateEntry::load(path, specificity) {
                    Ok(entry) => self.with_set(&item, &basename, |set| {
                        if set.insert(entry).is_some() && warn_duplicate {
                            warn!("Got duplicate add for {}", path.display());
                        }
                    }),
                    Err(e) => error!("Failed to read {}: {}", path.display(), e),
                }
            }
        }
    }

    fn with_set(&self, item: &str, basename: &str, update: impl FnOnce(&mut EntrySet)) {
        match self.sets.write() {
            Ok(mut sets) => update(
                sets.entry(item.to_string())
                    .or_insert_with(|| EntrySet::new(item, basename)),
            ),
            Err(_) => error!("Index lock poisoned; dropping update for {}", item),
        }
    }

    fn change_path(&self, path: &Path) {
        if path.is_dir() {
            return;
        }
        let known = self
            .item_of(path)
            .zip(path.file_name().map(|n| n.to_string_lossy().into_owned()))
            .map(|((item, basename), file_name)| {
                sidecar_kind(&basename, &file_name).is_some()
                    || self
                        .sets
                        .read()
                        .map(|sets| sets.get(&item).is_some_and(|s| s.contains(&file_name)))
                        .unwrap_or(false)
            })
            .unwrap_or(false);
        if !known {
            debug!("Changed event for unknown {}; adding it", path.display());
        }
        self.index_file(path, false);
    }

    fn remove_path(&self, path: &Path, monitor: &mut dyn FileMonitor) {
        if let Ok(mut rejected) = self.rejected.lock() {
            rejected.retain(|p, _| !p.starts_with(path));
        }

        // A deleted directory takes its monitors and items with it
        let gone: Vec<MonitorId> = match self.dirs.lock() {
            Ok(mut dirs) => {
                let ids: Vec<MonitorId> = dirs
                    .iter()
                    .filter(|(_, dir)| dir.starts_with(path))
                    .map(|(id, _)| *id)
                    .collect();
                for id in &ids {
                    dirs.remove(id);
                }
                ids
            }
            Err(_) => Vec::new(),
        };
        for id in gone {
            monitor.remove_monitor(id);
        }

        let Ok(mut sets) = self.sets.write() else {
            error!("Index lock poisoned; dropping removal of {}", path.display());
            return;
        };
        if let Some(item) = self.item_of_dir(path) {
            let prefix = format!("{}/", item);
            sets.retain(|key, _| *key != item && !key.starts_with(&prefix));
        }

        let Some((item, basename)) = self.item_of(path) else {
            return;
        };
        let Some(file_name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            return;
        };
        let Some(set) = sets.get_mut(&item) else {
            return;
        };
        if sidecar_kind(&basename, &file_name).is_some() {
            set.clear_info();
        } else {
            set.remove(&file_name);
        }
        if set.is_empty() {
            sets.remove(&item);
        }
    }

    /// Candidates and metadata of one item
    pub fn snapshot_item(&self, item: &str) -> std::result::Result<ItemSnapshot, ResolveError> {
        let sets = self.sets.read().map_err(|_| ResolveError::LockPoisoned {
            context: "repository index".to_string(),
        })?;
        let set = sets.get(item).ok_or_else(|| ResolveError::UnknownItem {
            item: item.to_string(),
        })?;
        Ok(ItemSnapshot {
            item: item.to_string(),
            candidates: set.candidates(),
            info: set.info().cloned(),
        })
    }

    /// Copy of every entry set, keyed by item name
    pub fn snapshot(&self) -> Result<BTreeMap<String, EntrySet>> {
        self.sets
            .read()
            .map(|sets| sets.clone())
            .map_err(|_| Error::LockPoisoned {
                context: "repository index".to_string(),
            })
    }

    /// Names of every indexed item
    pub fn items(&self) -> Vec<String> {
        self.sets
            .read()
            .map(|sets| sets.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Files skipped because their names could not be classified
    pub fn unclassifiable(&self) -> Vec<(PathBuf, UnclassifiableFile)> {
        self.rejected
            .lock()
            .map(|r| r.iter().map(|(p, u)| (p.clone(), u.clone())).collect())
            .unwrap_or_default()
    }
}

impl EventHandler for RepositoryIndex {
    fn handle_event(&self, event: &Event, monitor: &mut dyn FileMonitor) {
        match event.kind {
            EventKind::Exists => self.add_path(&event.path, monitor, true),
            EventKind::Created => self.add_path(&event.path, monitor, true),
            EventKind::Changed => self.change_path(&event.path),
            EventKind::Deleted => self.remove_path(&event.path, monitor),
            EventKind::EndExist => debug!("Finished existence scan of {}", event.path.display()),
        }
    }
}
