//! CLI argument parsing and command dispatch

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands;
use fleetcfg::defaults::DEFAULT_CONFIG_FILENAME;

/// fleetcfg - Resolve host-specific configuration files from a variant repository
#[derive(Parser, Debug)]
#[command(name = "fleetcfg")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Path to the fleetcfg.yaml configuration file
    #[arg(
        short,
        long,
        global = true,
        value_name = "FILE",
        env = "FLEETCFG_CONFIG",
        default_value = DEFAULT_CONFIG_FILENAME
    )]
    config: PathBuf,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Set log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, global = true, value_name = "LEVEL", default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve one item for one client and print its content
    Resolve(commands::resolve::ResolveArgs),

    /// List items and the classification of their variant files
    Ls(commands::ls::LsArgs),

    /// Check the repository for unclassifiable files and ambiguous variants
    Validate(commands::validate::ValidateArgs),

    /// Watch the repository and report index updates as they happen
    Watch(commands::watch::WatchArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        init_logging(&self.log_level);

        match self.command {
            Commands::Resolve(args) => commands::resolve::execute(args, &self.config, &self.color),
            Commands::Ls(args) => commands::ls::execute(args, &self.config, &self.color),
            Commands::Validate(args) => commands::validate::execute(args, &self.config, &self.color),
            Commands::Watch(args) => commands::watch::execute(args, &self.config, &self.color),
        }
    }
}

fn init_logging(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    // A second initialization (e.g. in tests) keeps the first logger
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .try_init();
}
