//! # Specificity Classification
//!
//! Maps the name of a file inside an item directory to the scope it applies
//! to and, for variants that modify rather than replace content, the delta
//! algorithm. Classification happens once, when the file is indexed; nothing
//! downstream re-derives it from the file name.
//!
//! ## Grammar
//!
//! For an item whose base name is `motd`:
//!
//! | File name | Scope | Delta |
//! |---|---|---|
//! | `motd` | Global | no |
//! | `motd.B20_frontend[.cat\|.udiff]` | Bundle `frontend`, priority 20 | optional |
//! | `motd.G10_web[.cat\|.udiff]` | Group `web`, priority 10 | optional |
//! | `motd.T10_web[.cat\|.udiff]` | Group `web`, priority 10 (legacy tag grammar) | optional |
//! | `motd.H_host1[.cat\|.udiff]` | Host `host1` | optional |
//! | `:info`, `info`, `info.xml` | sidecar metadata | - |
//!
//! Anything else is an [`UnclassifiableFile`].

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Applicability class of a candidate variant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Scope {
    Global,
    Group { name: String, priority: u32 },
    Bundle { name: String, priority: u32 },
    Host { name: String },
}

impl Scope {
    /// Group/bundle/host name; empty for Global.
    pub fn qualifier(&self) -> &str {
        match self {
            Scope::Global => "",
            Scope::Group { name, .. } | Scope::Bundle { name, .. } | Scope::Host { name } => name,
        }
    }

    /// Priority for Group and Bundle scopes, 0 otherwise.
    pub fn priority(&self) -> u32 {
        match self {
            Scope::Group { priority, .. } | Scope::Bundle { priority, .. } => *priority,
            Scope::Global | Scope::Host { .. } => 0,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => write!(f, "global"),
            Scope::Group { name, priority } => write!(f, "group {} (priority {})", name, priority),
            Scope::Bundle { name, priority } => {
                write!(f, "bundle {} (priority {})", name, priority)
            }
            Scope::Host { name } => write!(f, "host {}", name),
        }
    }
}

/// How a delta variant modifies the buffer it is applied to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaKind {
    /// `.cat`: `+line` appends, `-line` removes the first match
    Line,
    /// `.udiff`: unified diff applied by the patch adapter
    Patch,
}

impl DeltaKind {
    pub fn suffix(&self) -> &'static str {
        match self {
            DeltaKind::Line => "cat",
            DeltaKind::Patch => "udiff",
        }
    }
}

/// Classified identity of one candidate file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Specificity {
    pub scope: Scope,
    /// `None` for variants that can serve as a base
    pub delta: Option<DeltaKind>,
}

impl Specificity {
    pub fn new(scope: Scope, delta: Option<DeltaKind>) -> Self {
        Self { scope, delta }
    }

    pub fn global() -> Self {
        Self::new(Scope::Global, None)
    }

    pub fn is_delta(&self) -> bool {
        self.delta.is_some()
    }
}

impl fmt::Display for Specificity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.delta {
            Some(kind) => write!(f, "{} {} delta", self.scope, kind.suffix()),
            None => write!(f, "{}", self.scope),
        }
    }
}

/// Format of an item's metadata sidecar file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidecarKind {
    /// `:info` or `info`, line-oriented `key: value`
    Lines,
    /// `info.xml`
    Xml,
}

/// Result of classifying one file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Candidate(Specificity),
    Sidecar(SidecarKind),
}

/// A file name that matches no rule of the grammar for its item.
///
/// Reported per file, logged and skipped; it never fails a resolution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Could not classify {file_name} for item base name {basename}")]
pub struct UnclassifiableFile {
    pub file_name: String,
    pub basename: String,
}

fn suffix_regex() -> &'static Regex {
    static SUFFIX: OnceLock<Regex> = OnceLock::new();
    SUFFIX.get_or_init(|| {
        Regex::new(
            r"^\.(?:B(?P<bprio>\d+)_(?P<bundle>\S+?)|[GT](?P<gprio>\d+)_(?P<group>\S+?)|H_(?P<host>\S+?))(?:\.(?P<op>cat|udiff))?$",
        )
        .expect("suffix grammar is a valid regex")
    })
}

/// Return the sidecar kind if `file_name` names a metadata file for an item
/// with the given base name.
pub fn sidecar_kind(basename: &str, file_name: &str) -> Option<SidecarKind> {
    match file_name {
        ":info" => Some(SidecarKind::Lines),
        "info" if basename != "info" => Some(SidecarKind::Lines),
        "info.xml" => Some(SidecarKind::Xml),
        _ => None,
    }
}

/// Classify `file_name` against the base name of its item.
pub fn classify(basename: &str, file_name: &str) -> Result<Classification, UnclassifiableFile> {
    let unclassifiable = || UnclassifiableFile {
        file_name: file_name.to_string(),
        basename: basename.to_string(),
    };

    if !basename.is_empty() && file_name == basename {
        return Ok(Classification::Candidate(Specificity::global()));
    }
    if let Some(kind) = sidecar_kind(basename, file_name) {
        return Ok(Classification::Sidecar(kind));
    }
    if basename.is_empty() {
        return Err(unclassifiable());
    }

    let rest = file_name.strip_prefix(basename).ok_or_else(unclassifiable)?;
    let caps = suffix_regex().captures(rest).ok_or_else(unclassifiable)?;

    let parse_prio = |name: &str| -> Result<u32, UnclassifiableFile> {
        caps[name].parse::<u32>().map_err(|_| unclassifiable())
    };

    let scope = if let Some(bundle) = caps.name("bundle") {
        Scope::Bundle {
            name: bundle.as_str().to_string(),
            priority: parse_prio("bprio")?,
        }
    } else if let Some(group) = caps.name("group") {
        Scope::Group {
            name: group.as_str().to_string(),
            priority: parse_prio("gprio")?,
        }
    } else if let Some(host) = caps.name("host") {
        Scope::Host {
            name: host.as_str().to_string(),
        }
    } else {
        return Err(unclassifiable());
    };

    let delta = match caps.name("op").map(|m| m.as_str()) {
        Some("cat") => Some(DeltaKind::Line),
        Some("udiff") => Some(DeltaKind::Patch),
        _ => None,
    };

    Ok(Classification::Candidate(Specificity::new(scope, delta)))
}

/// Canonical file name for a variant of `basename` with the given
/// specificity. `classify` maps the result back to the same specificity.
pub fn build_filename(basename: &str, specificity: &Specificity) -> String {
    let mut name = match &specificity.scope {
        Scope::Global => basename.to_string(),
        Scope::Group { name, priority } => format!("{}.G{:02}_{}", basename, priority, name),
        Scope::Bundle { name, priority } => format!("{}.B{:02}_{}", basename, priority, name),
        Scope::Host { name } => format!("{}.H_{}", basename, name),
    };
    if let Some(kind) = specificity.delta {
        name.push('.');
        name.push_str(kind.suffix());
    }
    name
}
