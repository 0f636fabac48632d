//! # Error Suggestions
//!
//! This module provides helper functions for generating helpful error
//! messages with hints and suggestions. Errors should tell users what went
//! wrong AND how to fix it.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fleetcfg::suggestions;
//!
//! // Instead of:
//! anyhow::bail!("Configuration file not found: {}", path.display());
//!
//! // Use:
//! return Err(suggestions::config_not_found(path));
//! ```

use std::path::Path;

use crate::error::ResolveError;

/// Generate an error for when the configuration file is not found.
///
/// Includes hints about:
/// - Creating a new config file
/// - Using the -c/--config flag
/// - Using the FLEETCFG_CONFIG environment variable
pub fn config_not_found(path: &Path) -> anyhow::Error {
    anyhow::anyhow!(
        "Configuration file not found: {path}\n\n\
         hint: Create a fleetcfg.yaml file containing at least `repository: <path>`\n\
         hint: Use -c/--config to specify a different path\n\
         hint: Set FLEETCFG_CONFIG environment variable",
        path = path.display()
    )
}

/// Generate an error for an item that is not in the repository.
///
/// Suggests a close match among the known items.
pub fn unknown_item(item: &str, known: &[String]) -> anyhow::Error {
    let candidates: Vec<&str> = known.iter().map(String::as_str).collect();
    let did_you_mean = find_similar(item, &candidates)
        .map(|s| format!("\nhint: Did you mean '{s}'?"))
        .unwrap_or_default();

    anyhow::anyhow!(
        "Unknown configuration item: {item}{did_you_mean}\n\n\
         hint: Item names are directory paths below the repository root, e.g. /etc/motd\n\
         hint: Run 'fleetcfg ls' to list known items"
    )
}

/// Generate an error for a `--client` name missing from the configuration.
pub fn client_not_found(hostname: &str, known: &[&str]) -> anyhow::Error {
    let did_you_mean = find_similar(hostname, known)
        .map(|s| format!("\nhint: Did you mean '{s}'?"))
        .unwrap_or_default();

    anyhow::anyhow!(
        "Client not found in configuration: {hostname}{did_you_mean}\n\n\
         hint: Add it under `clients:` in the configuration file\n\
         hint: Or describe it inline with --host, --group NAME:PRIO and --bundle NAME:PRIO"
    )
}

/// Generate an error for a resolve call that names no client at all.
pub fn no_client_given() -> anyhow::Error {
    anyhow::anyhow!(
        "No client given\n\n\
         hint: Use --client NAME for a client listed in the configuration\n\
         hint: Or use --host NAME with optional --group/--bundle memberships"
    )
}

/// Wrap a resolution failure with the repository files involved and a hint
/// about how to fix it.
pub fn resolve_failed(error: &ResolveError) -> anyhow::Error {
    let hint = match error {
        ResolveError::UnknownItem { .. } => "hint: Run 'fleetcfg ls' to list known items",
        ResolveError::AmbiguousCandidate { .. } => {
            "hint: Remove or rename all but one of the files listed above"
        }
        ResolveError::NoBaseFound { .. } => {
            "hint: Add a global variant, or a non-delta variant for one of the client's groups"
        }
        ResolveError::DeltaTargetMissing { .. } => {
            "hint: The delta removes a line the base no longer contains; update the delta"
        }
        ResolveError::DeltaApplyFailed { .. } => {
            "hint: Regenerate the diff against the current base file"
        }
        ResolveError::Encoding { .. } => {
            "hint: Binary content needs `encoding: base64` in the item's :info file"
        }
        ResolveError::LockPoisoned { .. } => "hint: Restart fleetcfg",
    };
    let files = error
        .paths()
        .iter()
        .map(|p| format!("\n  file: {}", p.display()))
        .collect::<String>();

    anyhow::anyhow!("{error}{files}\n\n{hint}")
}

/// Find a similar string from a list of candidates using edit distance.
///
/// Returns Some(candidate) if a close match is found (edit distance <= 2).
fn find_similar<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .filter_map(|&candidate| {
            let distance = edit_distance(input, candidate);
            if distance <= 2 && distance < input.len() {
                Some((candidate, distance))
            } else {
                None
            }
        })
        .min_by_key(|(_, distance)| *distance)
        .map(|(candidate, _)| candidate)
}

/// Calculate the Levenshtein edit distance between two strings.
fn edit_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let (a_len, b_len) = (a_chars.len(), b_chars.len());

    // Single rolling row instead of the full matrix
    let mut previous: Vec<usize> = (0..=b_len).collect();
    let mut current = vec![0usize; b_len + 1];

    for i in 1..=a_len {
        current[0] = i;
        for j in 1..=b_len {
            let cost = usize::from(a_chars[i - 1] != b_chars[j - 1]);
            current[j] = (previous[j] + 1)
                .min(current[j - 1] + 1)
                .min(previous[j - 1] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b_len]
}
