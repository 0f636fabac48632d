//! # Candidate Resolution
//!
//! Chooses, for one client and one logical item, the base variant and the
//! ordered chain of deltas stacked on top of it.
//!
//! ## Base selection
//!
//! The most specific applicable non-delta candidate wins:
//!
//! 1. the Host candidate for the client's hostname
//! 2. the highest-priority Bundle candidate
//! 3. the highest-priority Group candidate
//! 4. the Global candidate
//!
//! ## Delta chain
//!
//! Only deltas strictly more specific than the base are applied, least
//! specific first, and the host delta always comes last:
//!
//! | Base | Chain |
//! |---|---|
//! | Global | group deltas, bundle deltas, host delta |
//! | Bundle at P | bundle deltas above P, group deltas, host delta |
//! | Group at P | group deltas above P, host delta |
//! | Host | none |
//!
//! Within a class deltas are ordered by priority, then by qualifier name.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::client::ClientDescriptor;
use crate::entry_set::CandidateEntry;
use crate::error::ResolveError;
use crate::specificity::{Scope, Specificity};

/// Base entry plus the deltas to apply to it, in order
#[derive(Debug, Clone)]
pub struct Chain {
    pub base: Arc<CandidateEntry>,
    pub deltas: Vec<Arc<CandidateEntry>>,
}

/// Whether a candidate of the given scope applies to the client
pub fn applies(scope: &Scope, client: &ClientDescriptor) -> bool {
    match scope {
        Scope::Global => true,
        Scope::Group { name, .. } => client.in_group(name),
        Scope::Bundle { name, .. } => client.in_bundle(name),
        Scope::Host { name } => *name == client.hostname,
    }
}

/// Find specificity slots occupied by more than one file.
///
/// Returns the paths of each conflicting slot, sorted, in a stable order.
pub fn duplicate_slots(entries: &[Arc<CandidateEntry>]) -> Vec<Vec<PathBuf>> {
    let mut slots: HashMap<&Specificity, Vec<PathBuf>> = HashMap::new();
    for entry in entries {
        slots
            .entry(&entry.specificity)
            .or_default()
            .push(entry.path.clone());
    }
    let mut conflicts: Vec<Vec<PathBuf>> = slots
        .into_values()
        .filter(|paths| paths.len() > 1)
        .map(|mut paths| {
            paths.sort();
            paths
        })
        .collect();
    conflicts.sort();
    conflicts
}

/// Compute the base and delta chain of `item` for `client`.
pub fn resolve_base_and_chain(
    item: &str,
    client: &ClientDescriptor,
    entries: &[Arc<CandidateEntry>],
) -> Result<Chain, ResolveError> {
    let applicable: Vec<Arc<CandidateEntry>> = entries
        .iter()
        .filter(|e| applies(&e.specificity.scope, client))
        .cloned()
        .collect();

    if let Some(paths) = duplicate_slots(&applicable).into_iter().next() {
        return Err(ResolveError::AmbiguousCandidate {
            item: item.to_string(),
            paths,
        });
    }

    let (deltas, bases): (Vec<_>, Vec<_>) = applicable
        .into_iter()
        .partition(|e| e.specificity.is_delta());

    let base = select_base(item, client, &bases)?;

    let mut group_deltas = of_class(&deltas, |s| matches!(s, Scope::Group { .. }));
    let mut bundle_deltas = of_class(&deltas, |s| matches!(s, Scope::Bundle { .. }));
    let host_delta = deltas
        .iter()
        .find(|e| matches!(e.specificity.scope, Scope::Host { .. }))
        .cloned();
    sort_by_specificity(&mut group_deltas);
    sort_by_specificity(&mut bundle_deltas);

    let mut chain = Vec::new();
    match &base.specificity.scope {
        Scope::Host { .. } => {
            return Ok(Chain {
                base: Arc::clone(&base),
                deltas: chain,
            })
        }
        Scope::Global => {
            chain.extend(group_deltas);
            chain.extend(bundle_deltas);
        }
        Scope::Bundle { priority, .. } => {
            let floor = *priority;
            chain.extend(
                bundle_deltas
                    .into_iter()
                    .filter(|e| e.specificity.scope.priority() > floor),
            );
            chain.extend(group_deltas);
        }
        Scope::Group { priority, .. } => {
            let floor = *priority;
            chain.extend(
                group_deltas
                    .into_iter()
                    .filter(|e| e.specificity.scope.priority() > floor),
            );
        }
    }
    chain.extend(host_delta);

    Ok(Chain {
        base,
        deltas: chain,
    })
}

fn select_base(
    item: &str,
    client: &ClientDescriptor,
    bases: &[Arc<CandidateEntry>],
) -> Result<Arc<CandidateEntry>, ResolveError> {
    if let Some(host) = bases
        .iter()
        .find(|e| matches!(e.specificity.scope, Scope::Host { .. }))
    {
        return Ok(host.clone());
    }
    if let Some(bundle) = highest(item, &of_class(bases, |s| matches!(s, Scope::Bundle { .. })))? {
        return Ok(bundle);
    }
    if let Some(group) = highest(item, &of_class(bases, |s| matches!(s, Scope::Group { .. })))? {
        return Ok(group);
    }
    if let Some(global) = bases
        .iter()
        .find(|e| e.specificity.scope == Scope::Global)
    {
        return Ok(global.clone());
    }
    Err(ResolveError::NoBaseFound {
        item: item.to_string(),
        hostname: client.hostname.clone(),
    })
}

/// Highest-priority candidate of one class; a tie between different
/// qualifiers at that priority cannot be decided.
fn highest(
    item: &str,
    candidates: &[Arc<CandidateEntry>],
) -> Result<Option<Arc<CandidateEntry>>, ResolveError> {
    let Some(top) = candidates.iter().map(|e| e.specificity.scope.priority()).max() else {
        return Ok(None);
    };
    let mut winners: Vec<&Arc<CandidateEntry>> = candidates
        .iter()
        .filter(|e| e.specificity.scope.priority() == top)
        .collect();
    if winners.len() > 1 {
        let mut paths: Vec<PathBuf> = winners.iter().map(|e| e.path.clone()).collect();
        paths.sort();
        return Err(ResolveError::AmbiguousCandidate {
            item: item.to_string(),
            paths,
        });
    }
    Ok(winners.pop().cloned())
}

fn of_class(
    entries: &[Arc<CandidateEntry>],
    class: impl Fn(&Scope) -> bool,
) -> Vec<Arc<CandidateEntry>> {
    entries
        .iter()
        .filter(|e| class(&e.specificity.scope))
        .cloned()
        .collect()
}

fn sort_by_specificity(entries: &mut [Arc<CandidateEntry>]) {
    entries.sort_by(|a, b| {
        let (sa, sb) = (&a.specificity.scope, &b.specificity.scope);
        sa.priority()
            .cmp(&sb.priority())
            .then_with(|| sa.qualifier().cmp(sb.qualifier()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::specificity::{build_filename, DeltaKind};

    fn entry(scope: Scope, delta: Option<DeltaKind>, content: &str) -> Arc<CandidateEntry> {
        let spec = Specificity::new(scope, delta);
        let name = build_filename("motd", &spec);
        Arc::new(CandidateEntry::from_bytes(
            format!("/repo/etc/motd/{}", name),
            spec,
            content.as_bytes(),
        ))
    }

    fn group(name: &str, priority: u32) -> Scope {
        Scope::Group {
            name: name.to_string(),
            priority,
        }
    }

    fn bundle(name: &str, priority: u32) -> Scope {
        Scope::Bundle {
            name: name.to_string(),
            priority,
        }
    }

    fn host(name: &str) -> Scope {
        Scope::Host {
            name: name.to_string(),
        }
    }

    fn names(chain: &Chain) -> Vec<String> {
        chain.deltas.iter().map(|e| e.file_name.clone()).collect()
    }

    fn motd_repo() -> Vec<Arc<CandidateEntry>> {
        vec![
            entry(Scope::Global, None, "A"),
            entry(group("web", 10), None, "B"),
            entry(host("host1"), None, "C"),
        ]
    }

    #[test]
    fn test_motd_scenario() {
        let repo = motd_repo();
        let host1 = ClientDescriptor::new("host1");
        let host2 = ClientDescriptor::new("host2").with_group("web", 10);
        let host3 = ClientDescriptor::new("host3").with_group("db", 1);

        let base = |c: &ClientDescriptor| {
            resolve_base_and_chain("/etc/motd", c, &repo)
                .unwrap()
                .base
                .content
                .clone()
        };
        assert_eq!(base(&host1), b"C");
        assert_eq!(base(&host2), b"B");
        assert_eq!(base(&host3), b"A");
    }

    #[test]
    fn test_host_wins_over_everything() {
        let mut repo = motd_repo();
        repo.push(entry(bundle("frontend", 50), None, "D"));
        repo.push(entry(group("web", 5), Some(DeltaKind::Line), "+x"));
        let client = ClientDescriptor::new("host1")
            .with_group("web", 10)
            .with_bundle("frontend", 1);

        let chain = resolve_base_and_chain("/etc/motd", &client, &repo).unwrap();
        assert_eq!(chain.base.content, b"C");
        assert!(chain.deltas.is_empty());
    }

    #[test]
    fn test_group_priority_monotonicity() {
        let repo = vec![
            entry(group("web", 5), None, "low"),
            entry(group("web", 10), None, "high"),
        ];
        let client = ClientDescriptor::new("h").with_group("web", 0);
        let chain = resolve_base_and_chain("/etc/motd", &client, &repo).unwrap();
        assert_eq!(chain.base.content, b"high");
    }

    #[test]
    fn test_bundle_beats_group() {
        let repo = vec![
            entry(group("web", 90), None, "group"),
            entry(bundle("frontend", 1), None, "bundle"),
            entry(Scope::Global, None, "global"),
        ];
        let client = ClientDescriptor::new("h")
            .with_group("web", 0)
            .with_bundle("frontend", 0);
        let chain = resolve_base_and_chain("/etc/motd", &client, &repo).unwrap();
        assert_eq!(chain.base.content, b"bundle");
    }

    #[test]
    fn test_chain_for_global_base() {
        let repo = vec![
            entry(Scope::Global, None, "A"),
            entry(host("h"), Some(DeltaKind::Line), ""),
            entry(bundle("fe", 3), Some(DeltaKind::Line), ""),
            entry(group("web", 7), Some(DeltaKind::Patch), ""),
            entry(group("all", 2), Some(DeltaKind::Line), ""),
        ];
        let client = ClientDescriptor::new("h")
            .with_group("web", 0)
            .with_group("all", 0)
            .with_bundle("fe", 0);
        let chain = resolve_base_and_chain("/etc/motd", &client, &repo).unwrap();
        assert_eq!(
            names(&chain),
            vec!["motd.G02_all.cat", "motd.G07_web.udiff", "motd.B03_fe.cat", "motd.H_h.cat"]
        );
    }

    #[test]
    fn test_chain_for_bundle_base() {
        let repo = vec![
            entry(bundle("fe", 5), None, "base"),
            entry(bundle("fe", 5), Some(DeltaKind::Line), ""),
            entry(bundle("edge", 9), Some(DeltaKind::Line), ""),
            entry(group("web", 1), Some(DeltaKind::Line), ""),
            entry(host("h"), Some(DeltaKind::Line), ""),
        ];
        let client = ClientDescriptor::new("h")
            .with_group("web", 0)
            .with_bundle("fe", 0)
            .with_bundle("edge", 0);
        let chain = resolve_base_and_chain("/etc/motd", &client, &repo).unwrap();
        assert_eq!(chain.base.file_name, "motd.B05_fe");
        assert_eq!(
            names(&chain),
            vec!["motd.B09_edge.cat", "motd.G01_web.cat", "motd.H_h.cat"]
        );
    }

    #[test]
    fn test_chain_for_group_base() {
        let repo = vec![
            entry(group("web", 1), None, "base"),
            entry(group("web", 3), Some(DeltaKind::Line), ""),
            entry(group("web", 2), Some(DeltaKind::Line), ""),
            entry(group("web", 1), Some(DeltaKind::Line), ""),
            entry(group("other", 9), Some(DeltaKind::Line), ""),
        ];
        let client = ClientDescriptor::new("h").with_group("web", 0);
        let chain = resolve_base_and_chain("/etc/motd", &client, &repo).unwrap();
        assert_eq!(names(&chain), vec!["motd.G02_web.cat", "motd.G03_web.cat"]);
    }

    #[test]
    fn test_equal_priority_deltas_ordered_by_qualifier() {
        let repo = vec![
            entry(Scope::Global, None, "A"),
            entry(group("zeta", 4), Some(DeltaKind::Line), ""),
            entry(group("alpha", 4), Some(DeltaKind::Line), ""),
        ];
        let client = ClientDescriptor::new("h")
            .with_group("zeta", 0)
            .with_group("alpha", 0);
        let chain = resolve_base_and_chain("/etc/motd", &client, &repo).unwrap();
        assert_eq!(names(&chain), vec!["motd.G04_alpha.cat", "motd.G04_zeta.cat"]);
    }

    #[test]
    fn test_no_base_found() {
        let repo = vec![entry(group("web", 1), None, "B")];
        let client = ClientDescriptor::new("h");
        let err = resolve_base_and_chain("/etc/motd", &client, &repo).unwrap_err();
        assert_eq!(
            err,
            ResolveError::NoBaseFound {
                item: "/etc/motd".to_string(),
                hostname: "h".to_string()
            }
        );
    }

    #[test]
    fn test_duplicate_slot_is_ambiguous() {
        let spec = Specificity::new(group("web", 10), None);
        let repo = vec![
            Arc::new(CandidateEntry::from_bytes("/r/motd.G10_web", spec.clone(), b"1")),
            Arc::new(CandidateEntry::from_bytes("/r/motd.G010_web", spec, b"2")),
        ];
        let client = ClientDescriptor::new("h").with_group("web", 0);
        let err = resolve_base_and_chain("/etc/motd", &client, &repo).unwrap_err();
        match err {
            ResolveError::AmbiguousCandidate { paths, .. } => assert_eq!(
                paths,
                vec![PathBuf::from("/r/motd.G010_web"), PathBuf::from("/r/motd.G10_web")]
            ),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_slot_ignored_when_not_applicable() {
        let spec = Specificity::new(group("web", 10), None);
        let repo = vec![
            Arc::new(CandidateEntry::from_bytes("/r/motd.G10_web", spec.clone(), b"1")),
            Arc::new(CandidateEntry::from_bytes("/r/motd.G010_web", spec, b"2")),
            Arc::new(CandidateEntry::from_bytes("/r/motd", Specificity::global(), b"A")),
        ];
        let client = ClientDescriptor::new("h");
        let chain = resolve_base_and_chain("/etc/motd", &client, &repo).unwrap();
        assert_eq!(chain.base.content, b"A");
    }

    #[test]
    fn test_tie_between_groups_is_ambiguous() {
        let repo = vec![
            entry(group("web", 10), None, "web"),
            entry(group("db", 10), None, "db"),
        ];
        let client = ClientDescriptor::new("h")
            .with_group("web", 0)
            .with_group("db", 0);
        assert!(matches!(
            resolve_base_and_chain("/etc/motd", &client, &repo),
            Err(ResolveError::AmbiguousCandidate { .. })
        ));
    }
}
