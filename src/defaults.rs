//! Default values for fleetcfg configuration.
//!
//! This module provides centralized default values used by the configuration
//! parser, the engine and the CLI commands.

/// Configuration file looked up in the current directory when no `-c/--config`
/// flag or `FLEETCFG_CONFIG` variable is given.
pub const DEFAULT_CONFIG_FILENAME: &str = "fleetcfg.yaml";

/// Rescan interval of the polling monitor backend
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// How long one `service_interval` call waits for events
pub const DEFAULT_SERVICE_INTERVAL_MS: u64 = 500;

/// Program used to apply `.udiff` deltas
pub const DEFAULT_PATCH_PROGRAM: &str = "patch";

/// Upper bound on one patch invocation before it is killed
pub const DEFAULT_PATCH_TIMEOUT_MS: u64 = 10_000;

pub const DEFAULT_OWNER: &str = "root";
pub const DEFAULT_GROUP: &str = "root";
pub const DEFAULT_PERMS: &str = "0644";
