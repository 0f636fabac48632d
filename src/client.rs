//! Client descriptors supplied by the metadata collaborator

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Membership of a client in a named group or bundle, at a priority
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Membership {
    /// Group or bundle name
    pub name: String,
    /// Administrator-assigned priority (higher = more specific)
    #[serde(default)]
    pub priority: u32,
}

impl Membership {
    pub fn new(name: &str, priority: u32) -> Self {
        Self {
            name: name.to_string(),
            priority,
        }
    }
}

impl FromStr for Membership {
    type Err = String;

    /// Parses `NAME` or `NAME:PRIORITY`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rsplit_once(':') {
            Some((name, prio)) => {
                if name.is_empty() {
                    return Err(format!("missing name in membership '{}'", s));
                }
                let priority = prio
                    .parse::<u32>()
                    .map_err(|e| format!("invalid priority in '{}': {}", s, e))?;
                Ok(Membership::new(name, priority))
            }
            None if !s.is_empty() => Ok(Membership::new(s, 0)),
            None => Err("empty membership".to_string()),
        }
    }
}

impl fmt::Display for Membership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.priority)
    }
}

/// Everything the resolver needs to know about one managed host.
///
/// Constructed by an external collaborator (or from the `clients` section of
/// the configuration file) and never mutated during a resolution call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientDescriptor {
    pub hostname: String,
    #[serde(default)]
    pub groups: Vec<Membership>,
    #[serde(default)]
    pub bundles: Vec<Membership>,
}

impl ClientDescriptor {
    /// Create a descriptor with no group or bundle memberships
    pub fn new(hostname: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            groups: Vec::new(),
            bundles: Vec::new(),
        }
    }

    /// Add a group membership (builder style)
    pub fn with_group(mut self, name: &str, priority: u32) -> Self {
        self.groups.push(Membership::new(name, priority));
        self
    }

    /// Add a bundle membership (builder style)
    pub fn with_bundle(mut self, name: &str, priority: u32) -> Self {
        self.bundles.push(Membership::new(name, priority));
        self
    }

    pub fn in_group(&self, name: &str) -> bool {
        self.groups.iter().any(|g| g.name == name)
    }

    pub fn in_bundle(&self, name: &str) -> bool {
        self.bundles.iter().any(|b| b.name == name)
    }
}
