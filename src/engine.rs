//! # Resolution Engine
//!
//! [`Engine`] is the context object for one watched repository. It owns the
//! file monitor, the directory index built from its events and the patch
//! adapter. Independent engines share nothing, so several roots (or several
//! tests) can run side by side.
//!
//! Resolution goes through a [`Resolver`], a cheap clonable read-only handle
//! that may be used from any number of threads while the engine, or the
//! [`BackgroundUpdater`] it turns into, keeps the index current.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use base64::Engine as _;
use log::{info, warn};
use rayon::prelude::*;
use serde::Serialize;

use crate::client::ClientDescriptor;
use crate::config::{Config, MetadataDefaults, MonitorBackend};
use crate::delta::{apply_chain, ExternalPatch, PatchApplier};
use crate::error::{Error, ResolveError, Result};
use crate::index::RepositoryIndex;
use crate::info::InfoMetadata;
use crate::monitor::native::NativeMonitor;
use crate::monitor::poll::PollMonitor;
use crate::monitor::{FileMonitor, IgnoreList, ServiceStats};
use crate::resolver::{resolve_base_and_chain, Chain};

/// Materialized content and metadata of one item for one client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionResult {
    pub item: String,
    /// Raw bytes after every delta was applied
    #[serde(skip)]
    pub content: Vec<u8>,
    /// Content as text in the item's encoding (base64 for `base64`)
    pub text: String,
    pub owner: String,
    pub group: String,
    pub perms: String,
    pub encoding: String,
    pub paranoid: bool,
    pub sensitive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub important: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtime: Option<String>,
    /// True when the materialized content is empty
    pub empty: bool,
    /// Repository file the content started from
    pub base: PathBuf,
    /// Delta files applied on top of the base, in order
    pub deltas: Vec<PathBuf>,
}

/// Read-only resolution handle over an engine's index
#[derive(Clone)]
pub struct Resolver {
    index: Arc<RepositoryIndex>,
    patcher: Arc<dyn PatchApplier>,
    defaults: MetadataDefaults,
}

impl Resolver {
    /// Base and delta chain of `item` for `client`, without applying it
    pub fn chain(&self, item: &str, client: &ClientDescriptor) -> std::result::Result<Chain, ResolveError> {
        let snapshot = self.index.snapshot_item(item)?;
        resolve_base_and_chain(item, client, &snapshot.candidates)
    }

    /// Resolve `item` for `client`.
    ///
    /// Works on a snapshot taken at the start of the call; index updates
    /// made meanwhile do not affect it.
    pub fn resolve(
        &self,
        item: &str,
        client: &ClientDescriptor,
    ) -> std::result::Result<ResolutionResult, ResolveError> {
        let snapshot = self.index.snapshot_item(item)?;
        let chain = resolve_base_and_chain(item, client, &snapshot.candidates)?;
        let content = apply_chain(
            &chain.base.content,
            chain.deltas.iter().map(|d| d.as_ref()),
            self.patcher.as_ref(),
        )?;

        let info = snapshot
            .info
            .map(|source| source.for_client(item, client))
            .unwrap_or_default();
        let mut attrs = info.bind(
            &self.defaults.owner,
            &self.defaults.group,
            &self.defaults.perms,
        );
        if info.inherits_perms() {
            attrs.perms = inherited_perms(chain.base.mode, &self.defaults.perms);
        }
        let text = encode_text(item, &chain, &info, &content)?;

        Ok(ResolutionResult {
            item: item.to_string(),
            empty: content.is_empty(),
            content,
            text,
            owner: attrs.owner,
            group: attrs.group,
            perms: attrs.perms,
            encoding: attrs.encoding,
            paranoid: attrs.paranoid,
            sensitive: attrs.sensitive,
            important: attrs.important,
            mtime: attrs.mtime,
            base: chain.base.path.clone(),
            deltas: chain.deltas.iter().map(|d| d.path.clone()).collect(),
        })
    }

    /// Resolve every known item for one client, in parallel. Each item
    /// succeeds or fails on its own.
    pub fn resolve_all(
        &self,
        client: &ClientDescriptor,
    ) -> BTreeMap<String, std::result::Result<ResolutionResult, ResolveError>> {
        self.index
            .items()
            .into_par_iter()
            .map(|item| {
                let result = self.resolve(&item, client);
                (item, result)
            })
            .collect()
    }

    /// Names of every indexed item
    pub fn items(&self) -> Vec<String> {
        self.index.items()
    }

    pub fn index(&self) -> &Arc<RepositoryIndex> {
        &self.index
    }
}

fn inherited_perms(mode: Option<u32>, fallback: &str) -> String {
    match mode {
        Some(mode) => format!("{:04o}", mode & 0o7777),
        None => fallback.to_string(),
    }
}

/// Text form of the materialized content.
///
/// Only `base64` transforms the bytes. Every other encoding is metadata for
/// the client; the content itself is decoded as UTF-8.
fn encode_text(
    item: &str,
    chain: &Chain,
    info: &InfoMetadata,
    content: &[u8],
) -> std::result::Result<String, ResolveError> {
    if info.encoding.eq_ignore_ascii_case("base64") {
        return Ok(base64::engine::general_purpose::STANDARD.encode(content));
    }
    String::from_utf8(content.to_vec()).map_err(|e| ResolveError::Encoding {
        item: item.to_string(),
        paths: std::iter::once(&chain.base)
            .chain(chain.deltas.iter())
            .map(|entry| entry.path.clone())
            .collect(),
        message: e.to_string(),
    })
}

/// Context object for one watched repository root
pub struct Engine {
    root: PathBuf,
    monitor: Box<dyn FileMonitor>,
    index: Arc<RepositoryIndex>,
    resolver: Resolver,
    service_interval: Duration,
}

impl Engine {
    /// Open the repository named by `config` with its configured backend and
    /// wait until the initial scan has been indexed.
    pub fn open(config: &Config) -> Result<Self> {
        let ignore = IgnoreList::new(&config.ignore)?;
        let monitor: Box<dyn FileMonitor> = match config.monitor {
            MonitorBackend::Native => Box::new(NativeMonitor::new(ignore)?),
            MonitorBackend::Poll => Box::new(PollMonitor::new(ignore, config.poll_interval())),
            MonitorBackend::Auto => match NativeMonitor::new(ignore.clone()) {
                Ok(native) => Box::new(native),
                Err(e) => {
                    warn!("Native change notification unavailable ({}); polling instead", e);
                    Box::new(PollMonitor::new(ignore, config.poll_interval()))
                }
            },
        };
        Self::with_monitor(config, monitor)
    }

    /// Open the repository with a polling monitor; for one-shot commands
    /// that read the repository once and exit.
    pub fn scan(config: &Config) -> Result<Self> {
        let ignore = IgnoreList::new(&config.ignore)?;
        let monitor = Box::new(PollMonitor::new(ignore, config.poll_interval()));
        Self::with_monitor(config, monitor)
    }

    /// Open the repository on an already constructed monitor.
    pub fn with_monitor(config: &Config, mut monitor: Box<dyn FileMonitor>) -> Result<Self> {
        let root = config
            .repository
            .canonicalize()
            .map_err(|e| Error::Monitor {
                path: config.repository.clone(),
                message: e.to_string(),
            })?;
        if !root.is_dir() {
            return Err(Error::Monitor {
                path: root,
                message: "repository is not a directory".to_string(),
            });
        }

        let index = RepositoryIndex::new(&root);
        index.watch(monitor.as_mut())?;
        let stats = monitor.service_interval(Duration::ZERO);
        info!(
            "Indexed {} items under {} with the {} monitor ({} events)",
            index.items().len(),
            root.display(),
            monitor.backend(),
            stats.processed
        );

        let patcher: Arc<dyn PatchApplier> = Arc::new(ExternalPatch::new(
            &config.patch.program,
            config.patch.timeout(),
        ));
        let resolver = Resolver {
            index: Arc::clone(&index),
            patcher,
            defaults: config.defaults.clone(),
        };

        Ok(Self {
            root,
            monitor,
            index,
            resolver,
            service_interval: config.service_interval(),
        })
    }

    /// Replace the patch adapter used by resolvers created afterwards.
    pub fn set_patcher(&mut self, patcher: Arc<dyn PatchApplier>) {
        self.resolver.patcher = patcher;
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn backend(&self) -> &'static str {
        self.monitor.backend()
    }

    pub fn index(&self) -> &Arc<RepositoryIndex> {
        &self.index
    }

    pub fn resolver(&self) -> Resolver {
        self.resolver.clone()
    }

    /// Dispatch the events that arrive within `interval`.
    pub fn service(&mut self, interval: Duration) -> ServiceStats {
        self.monitor.service_interval(interval)
    }

    /// Dispatch events for the configured service interval.
    pub fn service_once(&mut self) -> ServiceStats {
        let interval = self.service_interval;
        self.service(interval)
    }

    /// Move event servicing onto a dedicated thread.
    pub fn into_background(self) -> BackgroundUpdater {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let resolver = self.resolver.clone();
        let interval = self.service_interval;
        let mut monitor = self.monitor;

        let handle = thread::spawn(move || {
            while !flag.load(Ordering::SeqCst) {
                monitor.service_interval(interval);
            }
            monitor.shutdown();
        });

        BackgroundUpdater {
            handle: Some(handle),
            shutdown,
            resolver,
        }
    }

    /// Stop producing events and release OS watch handles.
    pub fn shutdown(&mut self) {
        self.monitor.shutdown();
    }
}

/// Handle to an engine servicing its monitor on a background thread
pub struct BackgroundUpdater {
    handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    resolver: Resolver,
}

impl BackgroundUpdater {
    pub fn resolver(&self) -> Resolver {
        self.resolver.clone()
    }

    /// Ask the update thread to stop and wait for it. Resolutions already
    /// running on other threads are unaffected.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Background update thread panicked");
            }
        }
    }
}

impl Drop for BackgroundUpdater {
    fn drop(&mut self) {
        self.stop();
    }
}
