//! Property-based tests for file-name classification and event coalescing.
//!
//! These tests use proptest to generate random inputs and verify that
//! invariants hold for all possible inputs.

#[cfg(test)]
mod proptest_tests {
    use crate::monitor::{coalesce, Event, EventKind, MonitorId};
    use crate::specificity::{
        build_filename, classify, Classification, DeltaKind, Scope, Specificity,
    };
    use proptest::prelude::*;

    fn scope_strategy() -> impl Strategy<Value = Scope> {
        prop_oneof![
            Just(Scope::Global),
            ("[a-z][a-z0-9_-]{0,11}", 0u32..1000).prop_map(|(name, priority)| Scope::Group {
                name,
                priority
            }),
            ("[a-z][a-z0-9_-]{0,11}", 0u32..1000).prop_map(|(name, priority)| Scope::Bundle {
                name,
                priority
            }),
            "[a-z][a-z0-9-]{0,8}(\\.[a-z0-9-]{1,8}){0,3}"
                .prop_filter("a trailing .cat/.udiff label reads as a delta suffix", |name| {
                    !name.ends_with(".cat") && !name.ends_with(".udiff")
                })
                .prop_map(|name| Scope::Host { name }),
        ]
    }

    fn specificity_strategy() -> impl Strategy<Value = Specificity> {
        (
            scope_strategy(),
            prop_oneof![
                Just(None),
                Just(Some(DeltaKind::Line)),
                Just(Some(DeltaKind::Patch)),
            ],
        )
            .prop_filter("global variants cannot be deltas", |(scope, delta)| {
                !(*scope == Scope::Global && delta.is_some())
            })
            .prop_map(|(scope, delta)| Specificity::new(scope, delta))
    }

    fn kind_strategy() -> impl Strategy<Value = EventKind> {
        prop_oneof![
            Just(EventKind::Created),
            Just(EventKind::Changed),
            Just(EventKind::Changed),
            Just(EventKind::Deleted),
            Just(EventKind::Exists),
        ]
    }

    fn events_strategy() -> impl Strategy<Value = Vec<Event>> {
        prop::collection::vec((0u64..3, 0usize..3, kind_strategy()), 0..40).prop_map(|raw| {
            raw.into_iter()
                .map(|(monitor, path, kind)| {
                    Event::new(MonitorId(monitor), format!("/r/file{}", path), kind)
                })
                .collect()
        })
    }

    // ============================================================================
    // classification property tests
    // ============================================================================

    proptest! {
        /// Property: classify(build_filename(spec)) == spec
        #[test]
        fn build_filename_round_trips(
            basename in "[a-z][a-z0-9_]{0,10}(\\.[a-z]{1,3})?",
            spec in specificity_strategy(),
        ) {
            let name = build_filename(&basename, &spec);
            let classified = classify(&basename, &name);
            prop_assert_eq!(classified, Ok(Classification::Candidate(spec)));
        }

        /// Property: a name that does not start with the base name is never a candidate
        #[test]
        fn foreign_prefix_never_candidate(
            basename in "[a-m]{3,8}",
            other in "[n-z]{1,12}(\\.G[0-9]{1,3}_[a-z]{1,5})?",
        ) {
            let result = classify(&basename, &other);
            prop_assert!(!matches!(result, Ok(Classification::Candidate(_))));
        }

        /// Property: classification never panics on arbitrary input
        #[test]
        fn classify_total(basename in ".{0,12}", name in ".{0,40}") {
            let _ = classify(&basename, &name);
        }
    }

    // ============================================================================
    // coalescing property tests
    // ============================================================================

    proptest! {
        /// Property: coalescing only ever drops Changed events
        #[test]
        fn coalesce_keeps_every_structural_event(events in events_strategy()) {
            let structural = |evs: &[Event]| -> Vec<Event> {
                evs.iter().filter(|e| e.kind != EventKind::Changed).cloned().collect()
            };
            let (kept, dropped) = coalesce(events.clone());
            prop_assert_eq!(structural(&kept), structural(&events));
            prop_assert_eq!(kept.len() + dropped, events.len());
        }

        /// Property: coalescing is idempotent
        #[test]
        fn coalesce_idempotent(events in events_strategy()) {
            let (once, _) = coalesce(events);
            let (twice, dropped) = coalesce(once.clone());
            prop_assert_eq!(dropped, 0);
            prop_assert_eq!(twice, once);
        }

        /// Property: every (path, monitor) pair with a Changed keeps at least one
        #[test]
        fn coalesce_never_loses_a_pair(events in events_strategy()) {
            let (kept, _) = coalesce(events.clone());
            for event in events.iter().filter(|e| e.kind == EventKind::Changed) {
                prop_assert!(kept.iter().any(|k| k.kind == EventKind::Changed
                    && k.path == event.path
                    && k.monitor == event.monitor));
            }
        }
    }
}
