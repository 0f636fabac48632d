//! # CLI Command Implementations
//!
//! This module contains the implementation for each subcommand of the
//! `fleetcfg` command-line tool, one file per command.
//!
//! Each command module contains:
//! - An `Args` struct that defines the command-specific arguments and options,
//!   derived using `clap`.
//! - An `execute` function that takes the parsed `Args` plus the global
//!   configuration path and color flag, and calls into the `fleetcfg`
//!   library to do the work.

pub mod ls;
pub mod resolve;
pub mod validate;
pub mod watch;

use anyhow::Result;
use std::path::Path;

use fleetcfg::config::{self, Config};

/// Load the configuration file, with hints when it is missing.
pub fn load_config(config_path: &Path) -> Result<Config> {
    if !config_path.exists() {
        return Err(fleetcfg::suggestions::config_not_found(config_path));
    }
    config::from_file(config_path).map_err(|e| {
        anyhow::anyhow!(
            "Failed to load config from {}: {}",
            config_path.display(),
            e
        )
    })
}

/// Item names always start with `/`; accept `etc/motd` as `/etc/motd`.
pub fn normalize_item(item: &str) -> String {
    let trimmed = item.trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}
