//! # Resolve Command Implementation
//!
//! This module implements the `resolve` subcommand: scan the repository once,
//! resolve one item for one client and print the result.
//!
//! The client is either looked up by name in the `clients` section of the
//! configuration (`--client`) or described inline (`--host` with optional
//! `--group NAME:PRIO` and `--bundle NAME:PRIO`).
//!
//! This command is a safe, read-only operation that does not modify any files.

use anyhow::Result;
use clap::{Args, ValueEnum};
use std::path::Path;

use super::{load_config, normalize_item};
use fleetcfg::client::{ClientDescriptor, Membership};
use fleetcfg::config::Config;
use fleetcfg::engine::{Engine, ResolutionResult};
use fleetcfg::output::{OutputConfig, Status};
use fleetcfg::suggestions;

/// Resolve one item for one client
#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Logical item to resolve, e.g. /etc/motd
    #[arg(value_name = "ITEM")]
    pub item: String,

    /// Name of a client from the configuration file
    #[arg(long, value_name = "NAME", conflicts_with = "host")]
    pub client: Option<String>,

    /// Hostname of an ad-hoc client
    #[arg(long, value_name = "HOSTNAME")]
    pub host: Option<String>,

    /// Group membership of the ad-hoc client (repeatable)
    #[arg(long = "group", value_name = "NAME[:PRIO]", requires = "host")]
    pub groups: Vec<Membership>,

    /// Bundle membership of the ad-hoc client (repeatable)
    #[arg(long = "bundle", value_name = "NAME[:PRIO]", requires = "host")]
    pub bundles: Vec<Membership>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Print the base file and applied deltas to stderr
    #[arg(long)]
    pub show_chain: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// The materialized content only
    #[default]
    Text,
    /// The full resolution result as JSON
    Json,
}

/// Execute the `resolve` command.
pub fn execute(args: ResolveArgs, config_path: &Path, color_flag: &str) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(color_flag);
    let config = load_config(config_path)?;
    let client = client_from_args(&args, &config)?;
    let item = normalize_item(&args.item);

    let engine = Engine::scan(&config)?;
    let resolver = engine.resolver();
    let known = resolver.items();
    if !known.contains(&item) {
        return Err(suggestions::unknown_item(&item, &known));
    }

    let result = resolver
        .resolve(&item, &client)
        .map_err(|e| suggestions::resolve_failed(&e))?;

    if args.show_chain {
        print_chain(&out, &result);
    }

    match args.format {
        OutputFormat::Text => print!("{}", result.text),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
    }
    Ok(())
}

fn client_from_args(args: &ResolveArgs, config: &Config) -> Result<ClientDescriptor> {
    if let Some(name) = &args.client {
        let known: Vec<&str> = config.clients.iter().map(|c| c.hostname.as_str()).collect();
        return config
            .client(name)
            .cloned()
            .ok_or_else(|| suggestions::client_not_found(name, &known));
    }
    let Some(host) = &args.host else {
        return Err(suggestions::no_client_given());
    };
    Ok(ClientDescriptor {
        hostname: host.clone(),
        groups: args.groups.clone(),
        bundles: args.bundles.clone(),
    })
}

fn print_chain(out: &OutputConfig, result: &ResolutionResult) {
    eprintln!(
        "{} base: {}",
        out.marker(Status::Info),
        out.emphasis(&result.base.display().to_string())
    );
    for delta in &result.deltas {
        eprintln!("{} delta: {}", out.marker(Status::Info), delta.display());
    }
    eprintln!(
        "{} {}:{} {} ({})",
        out.marker(Status::Info),
        result.owner,
        result.group,
        result.perms,
        result.encoding
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn args(client: Option<&str>, host: Option<&str>) -> ResolveArgs {
        ResolveArgs {
            item: "/etc/motd".to_string(),
            client: client.map(str::to_string),
            host: host.map(str::to_string),
            groups: vec![Membership::new("web", 10)],
            bundles: Vec::new(),
            format: OutputFormat::Text,
            show_chain: false,
        }
    }

    #[test]
    fn test_client_from_config() {
        let mut config = Config::for_repository(PathBuf::from("/r"));
        config
            .clients
            .push(ClientDescriptor::new("web1").with_group("web", 3));

        let client = client_from_args(&args(Some("web1"), None), &config).unwrap();
        assert_eq!(client.groups, vec![Membership::new("web", 3)]);
        assert!(client_from_args(&args(Some("web9"), None), &config).is_err());
    }

    #[test]
    fn test_inline_client() {
        let config = Config::for_repository(PathBuf::from("/r"));
        let client = client_from_args(&args(None, Some("h1")), &config).unwrap();
        assert_eq!(client.hostname, "h1");
        assert!(client.in_group("web"));
    }

    #[test]
    fn test_no_client() {
        let config = Config::for_repository(PathBuf::from("/r"));
        let err = client_from_args(&args(None, None), &config).unwrap_err();
        assert!(err.to_string().contains("No client given"));
    }
}
