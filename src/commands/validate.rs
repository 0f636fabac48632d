//! # Validate Command Implementation
//!
//! This module implements the `validate` subcommand, which checks a variant
//! repository for problems that would otherwise only show up at resolution
//! time.
//!
//! ## Functionality
//!
//! - **Configuration Validation**: Parses the configuration file.
//! - **File Name Validation**: Reports files whose names cannot be classified
//!   against their item's base name.
//! - **Ambiguity Detection**: Reports items with two files for the same scope
//!   and priority slot.
//! - **Client Resolution**: With `--resolve-clients`, resolves every item for
//!   every client listed in the configuration.
//!
//! This command is a safe, read-only operation that does not modify any files.

use anyhow::Result;
use clap::Args;
use std::path::Path;

use fleetcfg::config;
use fleetcfg::engine::Engine;
use fleetcfg::output::{OutputConfig, Status};
use fleetcfg::resolver::duplicate_slots;

/// Check a repository for unclassifiable and ambiguous variant files
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Also resolve every item for every client in the configuration.
    #[arg(long)]
    pub resolve_clients: bool,

    /// Use strict validation (fail on warnings).
    #[arg(long)]
    pub strict: bool,
}

/// Execute the `validate` command.
///
/// Errors (ambiguous variants, failed resolutions) make the command fail.
/// Unclassifiable files are warnings unless `--strict` is given.
pub fn execute(args: ValidateArgs, config_path: &Path, color_flag: &str) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(color_flag);
    println!(
        "{} Validating configuration: {}",
        out.marker(Status::Info),
        config_path.display()
    );

    if !config_path.exists() {
        return Err(fleetcfg::suggestions::config_not_found(config_path));
    }
    let config = match config::from_file(config_path) {
        Ok(config) => {
            println!(
                "{} Configuration file parsed successfully",
                out.marker(Status::Ok)
            );
            config
        }
        Err(e) => {
            println!(
                "{} Configuration parsing failed: {}",
                out.marker(Status::Error),
                e
            );
            return Err(anyhow::anyhow!("Configuration parsing failed: {}", e));
        }
    };

    let engine = Engine::scan(&config)?;
    let index = engine.index();
    let mut warnings = 0usize;
    let mut errors = 0usize;

    println!(
        "\n{} Repository {}: {} items",
        out.marker(Status::Info),
        engine.root().display(),
        index.items().len()
    );

    for (path, rejected) in index.unclassifiable() {
        println!(
            "{} {}: {}",
            out.marker(Status::Warn),
            path.display(),
            rejected
        );
        warnings += 1;
    }

    let sets = index.snapshot()?;
    for (item, set) in &sets {
        for slot in duplicate_slots(&set.candidates()) {
            println!(
                "{} {}: ambiguous variants for one slot",
                out.marker(Status::Error),
                out.emphasis(item)
            );
            for path in slot {
                println!("     {}", path.display());
            }
            errors += 1;
        }
    }

    if args.resolve_clients {
        let resolver = engine.resolver();
        for client in &config.clients {
            let results = resolver.resolve_all(client);
            let failed: Vec<_> = results
                .iter()
                .filter_map(|(item, r)| r.as_ref().err().map(|e| (item, e)))
                .collect();
            if failed.is_empty() {
                println!(
                    "{} {}: {} items resolved",
                    out.marker(Status::Ok),
                    client.hostname,
                    results.len()
                );
            }
            for (item, e) in failed {
                println!(
                    "{} {} {}: {}",
                    out.marker(Status::Error),
                    client.hostname,
                    item,
                    e
                );
                errors += 1;
            }
        }
    }

    println!();
    if errors > 0 || (args.strict && warnings > 0) {
        println!(
            "{} Validation failed: {} errors, {} warnings",
            out.marker(Status::Error),
            errors,
            warnings
        );
        return Err(anyhow::anyhow!(
            "Validation failed with {} errors and {} warnings",
            errors,
            warnings
        ));
    }
    if warnings > 0 {
        println!(
            "{} Validation passed with {} warnings",
            out.marker(Status::Warn),
            warnings
        );
    } else {
        println!("{} Validation passed", out.marker(Status::Ok));
    }
    Ok(())
}
