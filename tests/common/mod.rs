//! Shared test utilities for integration and E2E tests.
//!
//! This module provides a fixture that lays out a variant repository in a
//! temporary directory, plus a `fleetcfg.yaml` pointing at it.
//!
//! ## Usage
//!
//! Add `mod common;` to your test file, then use the helpers:
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let fixture = TestFixture::new()
//!         .with_minimal_config()
//!         .with_variant("/etc/motd", "motd", "hello\n");
//!     // ... test code
//! }
//! ```

use assert_fs::prelude::*;
use std::path::{Path, PathBuf};

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    #[allow(unused_imports)]
    pub use assert_cmd::cargo::cargo_bin_cmd;
    #[allow(unused_imports)]
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::configs;
    #[allow(unused_imports)]
    pub use super::patch_available;
    pub use super::TestFixture;
}

/// Common configuration YAML snippets for testing.
#[allow(dead_code)]
pub mod configs {
    /// Minimal valid configuration: the repository only.
    pub const MINIMAL: &str = "repository: Cfg\n";

    /// Configuration with two named clients.
    pub const WITH_CLIENTS: &str = r#"
repository: Cfg
monitor: poll
poll_interval_ms: 50
clients:
  - hostname: web1.example.com
    groups:
      - name: web
        priority: 10
  - hostname: db1.example.com
    groups:
      - name: db
        priority: 10
"#;

    /// Invalid YAML for error testing.
    pub const INVALID_YAML: &str = "repository: [unclosed";
}

/// Whether an external `patch` program can be run.
///
/// Tests exercising unified-diff deltas skip themselves when it cannot.
#[allow(dead_code)]
pub fn patch_available() -> bool {
    std::process::Command::new("patch")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// A test fixture that provides a temporary directory holding a variant
/// repository under `Cfg/` and an optional `fleetcfg.yaml`.
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

#[allow(dead_code)]
impl TestFixture {
    /// Create a new test fixture with an empty repository directory.
    pub fn new() -> Self {
        let temp_dir = assert_fs::TempDir::new().expect("Failed to create temp directory");
        temp_dir
            .child("Cfg")
            .create_dir_all()
            .expect("Failed to create repository directory");
        Self { temp_dir }
    }

    /// Add a `fleetcfg.yaml` configuration file with the given content.
    pub fn with_config(self, content: &str) -> Self {
        self.temp_dir
            .child("fleetcfg.yaml")
            .write_str(content)
            .expect("Failed to write config file");
        self
    }

    /// Add the minimal valid configuration.
    pub fn with_minimal_config(self) -> Self {
        self.with_config(configs::MINIMAL)
    }

    /// Add a variant file `file_name` for `item` (e.g. "/etc/motd").
    pub fn with_variant(self, item: &str, file_name: &str, content: &str) -> Self {
        self.write_variant(item, file_name, content);
        self
    }

    /// Write (or overwrite) a variant file after construction.
    pub fn write_variant(&self, item: &str, file_name: &str, content: &str) {
        self.item_dir(item)
            .child(file_name)
            .write_str(content)
            .expect("Failed to write variant file");
    }

    /// Delete a variant file.
    pub fn remove_variant(&self, item: &str, file_name: &str) {
        std::fs::remove_file(self.item_dir(item).path().join(file_name))
            .expect("Failed to remove variant file");
    }

    fn item_dir(&self, item: &str) -> assert_fs::fixture::ChildPath {
        self.temp_dir
            .child("Cfg")
            .child(item.trim_start_matches('/'))
    }

    /// Get the path to the temporary directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Get the path to the repository root.
    pub fn repository(&self) -> PathBuf {
        self.temp_dir.path().join("Cfg")
    }

    /// Get the path to the config file.
    pub fn config_path(&self) -> PathBuf {
        self.temp_dir.path().join("fleetcfg.yaml")
    }

    /// Configuration polling the fixture's repository quickly.
    pub fn config(&self) -> fleetcfg::config::Config {
        let mut config = fleetcfg::config::Config::for_repository(self.repository());
        config.monitor = fleetcfg::config::MonitorBackend::Poll;
        config.poll_interval_ms = 20;
        config.service_interval_ms = 50;
        config
    }

    /// Create a command configured to run in this fixture's directory.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("fleetcfg");
        cmd.current_dir(self.path())
            .env_remove("FLEETCFG_CONFIG")
            .env("NO_COLOR", "1");
        cmd
    }

    /// Create a command with the config file path argument.
    pub fn command_with_config(&self) -> assert_cmd::Command {
        let mut cmd = self.command();
        cmd.arg("--config").arg(self.config_path());
        cmd
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_creates_repository() {
        let fixture = TestFixture::new();
        assert!(fixture.repository().is_dir());
    }

    #[test]
    fn test_fixture_with_variant() {
        let fixture = TestFixture::new().with_variant("/etc/motd", "motd", "hello");
        assert!(fixture.repository().join("etc/motd/motd").exists());
    }

    #[test]
    fn test_configs_are_valid_yaml() {
        for config in [configs::MINIMAL, configs::WITH_CLIENTS] {
            serde_yaml::from_str::<serde_yaml::Value>(config).expect("Config should be valid YAML");
        }
        assert!(serde_yaml::from_str::<serde_yaml::Value>(configs::INVALID_YAML).is_err());
    }
}
