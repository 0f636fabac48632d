//! In-memory candidate entries for one logical item
//!
//! A [`CandidateEntry`] is immutable once built. The directory index replaces
//! the whole `Arc` when the file changes, so a resolver holding the old `Arc`
//! keeps reading the old bytes and never sees a partial update.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::info::InfoSource;
use crate::specificity::Specificity;

/// One classified variant file of a logical item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateEntry {
    /// Absolute path of the file in the repository
    pub path: PathBuf,
    pub file_name: String,
    pub specificity: Specificity,
    pub content: Vec<u8>,
    pub modified: SystemTime,
    /// Unix permission bits of the file, when the platform exposes them
    pub mode: Option<u32>,
}

impl CandidateEntry {
    /// Read `path` from disk and wrap it with its classification.
    pub fn load(path: &Path, specificity: Specificity) -> io::Result<Self> {
        let content = fs::read(path)?;
        let metadata = fs::metadata(path)?;
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            path: path.to_path_buf(),
            file_name,
            specificity,
            content,
            modified,
            mode: file_mode(&metadata),
        })
    }

    /// Build an entry from in-memory content (used by tests and tools that
    /// resolve without a repository on disk).
    pub fn from_bytes(path: impl Into<PathBuf>, specificity: Specificity, content: &[u8]) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            file_name,
            specificity,
            content: content.to_vec(),
            modified: SystemTime::UNIX_EPOCH,
            mode: None,
        }
    }
}

#[cfg(unix)]
fn file_mode(metadata: &fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(metadata.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn file_mode(_metadata: &fs::Metadata) -> Option<u32> {
    None
}

/// All candidates and the metadata sidecar of one logical item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySet {
    /// Logical item name, e.g. `/etc/motd`
    pub item: String,
    /// Last component of the item name, e.g. `motd`
    pub basename: String,
    entries: BTreeMap<String, Arc<CandidateEntry>>,
    info: Option<InfoSource>,
}

impl EntrySet {
    pub fn new(item: &str, basename: &str) -> Self {
        Self {
            item: item.to_string(),
            basename: basename.to_string(),
            entries: BTreeMap::new(),
            info: None,
        }
    }

    /// Insert or replace the entry for its file name, returning the entry it
    /// replaced.
    pub fn insert(&mut self, entry: CandidateEntry) -> Option<Arc<CandidateEntry>> {
        self.entries.insert(entry.file_name.clone(), Arc::new(entry))
    }

    pub fn remove(&mut self, file_name: &str) -> Option<Arc<CandidateEntry>> {
        self.entries.remove(file_name)
    }

    pub fn contains(&self, file_name: &str) -> bool {
        self.entries.contains_key(file_name)
    }

    pub fn get(&self, file_name: &str) -> Option<&Arc<CandidateEntry>> {
        self.entries.get(file_name)
    }

    /// Snapshot of the current candidates, ordered by file name
    pub fn candidates(&self) -> Vec<Arc<CandidateEntry>> {
        self.entries.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn info(&self) -> Option<&InfoSource> {
        self.info.as_ref()
    }

    pub fn set_info(&mut self, info: InfoSource) {
        self.info = Some(info);
    }

    pub fn clear_info(&mut self) {
        self.info = None;
    }

    /// True when nothing is left to keep the item alive in the index
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.info.is_none()
    }
}
