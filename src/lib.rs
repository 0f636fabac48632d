//! # fleetcfg
//!
//! This library decides, for every managed host, which variant of each
//! configuration item applies to it. A repository stores per item a family
//! of variant files tagged by scope (all hosts, a group at a priority, a
//! bundle at a priority, one host) and, for variants that modify instead of
//! replace, a delta operation. The library keeps an in-memory index of those
//! variants in sync with the disk through change notifications and resolves
//! items against client descriptors on demand.
//!
//! ## Quick Example
//!
//! ```no_run
//! use fleetcfg::client::ClientDescriptor;
//! use fleetcfg::config::Config;
//! use fleetcfg::engine::Engine;
//!
//! let engine = Engine::open(&Config::for_repository("/srv/fleetcfg/Cfg")).unwrap();
//! let resolver = engine.resolver();
//!
//! let client = ClientDescriptor::new("web1.example.com").with_group("web", 10);
//! let result = resolver.resolve("/etc/motd", &client).unwrap();
//! println!("{} {}:{} {}", result.perms, result.owner, result.group, result.text);
//! ```
//!
//! ## Core Concepts
//!
//! - **Specificity (`specificity`)**: classifies a variant file name into its
//!   scope and optional delta kind.
//! - **Event Source (`monitor`)**: native or polling file monitors that emit
//!   coalesced change events.
//! - **Directory Index (`index`, `entry_set`)**: the per-item candidate sets,
//!   updated from monitor events.
//! - **Resolution (`resolver`, `delta`, `info`)**: base selection, delta
//!   chain application and metadata binding.
//! - **Engine (`engine`)**: the context object tying one watched root
//!   together and handing out resolvers.

pub mod client;
pub mod config;
pub mod defaults;
pub mod delta;
pub mod engine;
pub mod entry_set;
pub mod error;
pub mod index;
pub mod info;
pub mod monitor;
pub mod output;
pub mod resolver;
pub mod specificity;
pub mod suggestions;

#[cfg(test)]
mod specificity_proptest;
