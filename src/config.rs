//! # Configuration Schema and Parsing
//!
//! This module defines the data structures that represent the `fleetcfg.yaml`
//! configuration file, as well as the logic for parsing it.
//!
//! ## Example
//!
//! ```yaml
//! repository: /srv/fleetcfg/Cfg
//! monitor: auto            # auto | native | poll
//! poll_interval_ms: 1000
//! service_interval_ms: 500
//! patch:
//!   program: patch
//!   timeout_ms: 10000
//! defaults:
//!   owner: root
//!   group: root
//!   perms: "0644"
//! ignore:
//!   - "*.orig"
//! clients:
//!   - hostname: web1.example.com
//!     groups:
//!       - { name: web, priority: 10 }
//!     bundles:
//!       - { name: frontend, priority: 5 }
//! ```
//!
//! Every key except `repository` is optional. A relative `repository` is
//! resolved against the directory holding the configuration file.

use crate::client::ClientDescriptor;
use crate::defaults::{
    DEFAULT_GROUP, DEFAULT_OWNER, DEFAULT_PATCH_PROGRAM, DEFAULT_PATCH_TIMEOUT_MS, DEFAULT_PERMS,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_SERVICE_INTERVAL_MS,
};
use crate::error::{Error, Result};
use crate::info::normalize_perms;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which change-notification backend the engine uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorBackend {
    /// Native notifications, falling back to polling when unavailable
    #[default]
    Auto,
    Native,
    Poll,
}

/// External patch program settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchConfig {
    pub program: String,
    pub timeout_ms: u64,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_PATCH_PROGRAM.to_string(),
            timeout_ms: DEFAULT_PATCH_TIMEOUT_MS,
        }
    }
}

impl PatchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Owner, group and permissions used when an item's sidecar names none
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataDefaults {
    pub owner: String,
    pub group: String,
    pub perms: String,
}

impl Default for MetadataDefaults {
    fn default() -> Self {
        Self {
            owner: DEFAULT_OWNER.to_string(),
            group: DEFAULT_GROUP.to_string(),
            perms: DEFAULT_PERMS.to_string(),
        }
    }
}

/// Parsed `fleetcfg.yaml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Root of the variant repository
    pub repository: PathBuf,
    #[serde(default)]
    pub monitor: MonitorBackend,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_service_interval_ms")]
    pub service_interval_ms: u64,
    #[serde(default)]
    pub patch: PatchConfig,
    #[serde(default)]
    pub defaults: MetadataDefaults,
    /// Extra glob patterns of file names to ignore
    #[serde(default)]
    pub ignore: Vec<String>,
    /// Known clients, for tools that resolve without a metadata service
    #[serde(default)]
    pub clients: Vec<ClientDescriptor>,
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_service_interval_ms() -> u64 {
    DEFAULT_SERVICE_INTERVAL_MS
}

impl Config {
    /// Configuration for `repository` with every other key defaulted
    pub fn for_repository(repository: impl Into<PathBuf>) -> Self {
        Self {
            repository: repository.into(),
            monitor: MonitorBackend::default(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            service_interval_ms: DEFAULT_SERVICE_INTERVAL_MS,
            patch: PatchConfig::default(),
            defaults: MetadataDefaults::default(),
            ignore: Vec::new(),
            clients: Vec::new(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn service_interval(&self) -> Duration {
        Duration::from_millis(self.service_interval_ms)
    }

    /// Look up a configured client by hostname
    pub fn client(&self, hostname: &str) -> Option<&ClientDescriptor> {
        self.clients.iter().find(|c| c.hostname == hostname)
    }

    fn validate(mut self) -> Result<Self> {
        if self.repository.as_os_str().is_empty() {
            return Err(Error::ConfigParse {
                message: "repository must not be empty".to_string(),
                hint: Some("Set repository to the directory holding your item variants".to_string()),
            });
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::ConfigParse {
                message: "poll_interval_ms must be greater than zero".to_string(),
                hint: Some(format!("The default is {}", DEFAULT_POLL_INTERVAL_MS)),
            });
        }
        if self.patch.timeout_ms == 0 {
            return Err(Error::ConfigParse {
                message: "patch.timeout_ms must be greater than zero".to_string(),
                hint: None,
            });
        }

        let perms = normalize_perms(&self.defaults.perms);
        if perms.len() != 4 || u32::from_str_radix(&perms, 8).is_err() {
            return Err(Error::ConfigParse {
                message: format!("defaults.perms is not an octal mode: {}", self.defaults.perms),
                hint: Some("Quote the value, e.g. perms: \"0644\"".to_string()),
            });
        }
        self.defaults.perms = perms;

        for (idx, client) in self.clients.iter().enumerate() {
            if client.hostname.is_empty() {
                return Err(Error::ConfigParse {
                    message: format!("clients[{}] has an empty hostname", idx),
                    hint: None,
                });
            }
        }
        Ok(self)
    }
}

/// Parses a YAML string into a `Config`.
pub fn parse(yaml_content: &str) -> Result<Config> {
    let config: Config = serde_yaml::from_str(yaml_content).map_err(|e| {
        let message = e.to_string();
        let hint = if message.contains("unknown variant") {
            Some("monitor must be one of: auto, native, poll".to_string())
        } else if message.contains("missing field `repository`") {
            Some("Add `repository: <path>` to the configuration file".to_string())
        } else {
            None
        };
        Error::ConfigParse { message, hint }
    })?;
    config.validate()
}

/// Parse a `Config` from a YAML file path, resolving a relative repository
/// path against the file's directory.
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    let mut config = parse(&content)?;
    if config.repository.is_relative() {
        if let Some(dir) = path.parent() {
            config.repository = dir.join(&config.repository);
        }
    }
    Ok(config)
}
