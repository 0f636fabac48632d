//! # Watch Command Implementation
//!
//! This module implements the `watch` subcommand: open the repository with
//! the configured monitor backend and keep the index in sync with the disk,
//! reporting each serviced batch of events. Runs until interrupted, or for
//! `--seconds` seconds.

use anyhow::Result;
use clap::Args;
use std::collections::BTreeSet;
use std::path::Path;
use std::time::{Duration, Instant};

use super::load_config;
use fleetcfg::engine::Engine;
use fleetcfg::output::{OutputConfig, Status};

/// Watch the repository and report index updates
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Stop after this many seconds instead of running until interrupted.
    #[arg(long, value_name = "N")]
    pub seconds: Option<u64>,
}

/// Execute the `watch` command.
pub fn execute(args: WatchArgs, config_path: &Path, color_flag: &str) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(color_flag);
    let config = load_config(config_path)?;
    let mut engine = Engine::open(&config)?;

    let mut known: BTreeSet<String> = engine.index().items().into_iter().collect();
    println!(
        "{} Watching {} with the {} monitor ({} items)",
        out.marker(Status::Info),
        out.emphasis(&engine.root().display().to_string()),
        engine.backend(),
        known.len()
    );

    let deadline = args
        .seconds
        .map(|s| Instant::now() + Duration::from_secs(s));

    while deadline.map_or(true, |d| Instant::now() < d) {
        let stats = engine.service_once();
        if stats.processed == 0 {
            continue;
        }

        let current: BTreeSet<String> = engine.index().items().into_iter().collect();
        for item in current.difference(&known) {
            println!("{} added {}", out.marker(Status::Ok), item);
        }
        for item in known.difference(&current) {
            println!("{} removed {}", out.marker(Status::Warn), item);
        }
        println!(
            "{} {} events processed, {} coalesced",
            out.marker(Status::Info),
            stats.processed,
            stats.coalesced
        );
        known = current;
    }

    engine.shutdown();
    Ok(())
}
