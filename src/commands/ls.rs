//! # Ls Command Implementation
//!
//! This module implements the `ls` subcommand, which lists the configuration
//! items of the repository and, per item, the variant files found for it with
//! their scope and delta kind.
//!
//! ## Functionality
//!
//! - **Item Listing**: Shows every item indexed under the repository root
//! - **Filtering**: By item name prefix, or by glob pattern (e.g. "/etc/*")
//! - **Long Format**: Optionally lists each variant and the item's metadata
//! - **Count**: Optionally prints only the number of matching items
//!
//! This command is a safe, read-only operation that does not modify any files.

use anyhow::{Context, Result};
use clap::Args;
use std::path::Path;

use super::load_config;
use fleetcfg::engine::Engine;
use fleetcfg::index::ItemSnapshot;
use fleetcfg::output::OutputConfig;

/// List configuration items and their variant files
#[derive(Args, Debug)]
pub struct LsArgs {
    /// Only list items whose name starts with this prefix (e.g., "/etc/ssh").
    #[arg(long, value_name = "PREFIX")]
    pub item: Option<String>,

    /// Filter items by glob pattern (e.g., "/etc/*", "/etc/ssh/**").
    #[arg(short, long, value_name = "PATTERN")]
    pub pattern: Option<String>,

    /// Use long listing format showing every variant and the item metadata.
    #[arg(short, long)]
    pub long: bool,

    /// Show only the total count of items.
    #[arg(long)]
    pub count: bool,
}

/// Execute the `ls` command.
pub fn execute(args: LsArgs, config_path: &Path, color_flag: &str) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(color_flag);
    let config = load_config(config_path)?;
    let engine = Engine::scan(&config)?;
    let index = engine.index();

    let pattern = args
        .pattern
        .as_deref()
        .map(glob::Pattern::new)
        .transpose()
        .context("Invalid --pattern")?;

    let items: Vec<String> = index
        .items()
        .into_iter()
        .filter(|item| args.item.as_deref().map_or(true, |prefix| item.starts_with(prefix)))
        .filter(|item| pattern.as_ref().map_or(true, |p| p.matches(item)))
        .collect();

    if args.count {
        println!("{}", items.len());
        return Ok(());
    }

    if items.is_empty() {
        println!("No items found");
        return Ok(());
    }

    for item in &items {
        if !args.long {
            println!("{}", item);
            continue;
        }
        // The item may vanish between listing and snapshot; skip it then
        if let Ok(snapshot) = index.snapshot_item(item) {
            print_long(&out, &snapshot);
        }
    }

    Ok(())
}

fn print_long(out: &OutputConfig, snapshot: &ItemSnapshot) {
    println!("{}", out.emphasis(&snapshot.item));
    for candidate in &snapshot.candidates {
        println!(
            "  {:<32} {}",
            candidate.file_name,
            out.dim(&candidate.specificity.to_string())
        );
    }
    if let Some(source) = &snapshot.info {
        let info = source.unconditional();
        let mut summary = format!(
            "owner={} group={} perms={} encoding={}",
            info.owner.as_deref().unwrap_or("-"),
            info.group.as_deref().unwrap_or("-"),
            info.perms.as_deref().unwrap_or("-"),
            info.encoding
        );
        if source.is_conditional() {
            summary.push_str(" (varies by client)");
        }
        println!("  {:<32} {}", ":info", out.dim(&summary));
    }
}
