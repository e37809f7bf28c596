//! Property-based tests for upmate.
//!
//! These tests use proptest to verify correctness properties across
//! randomly generated inputs.
//!
//! # Properties Tested
//!
//! - Property 1: A version change always resets the acknowledged flag
//! - Property 2: An unchanged version preserves the acknowledged flag
//! - Property 3: Reconcile is idempotent
//! - Property 4: Style names parse regardless of case and padding
//! - Property 5: Stored booleans decode as true only for "true"

#![cfg(test)]

use std::sync::Arc;

use proptest::prelude::*;

use crate::presentation::PresentationStyle;
use crate::store::{decode_bool, keys, InMemoryStore, KeyValueStore};
use crate::version::VersionTracker;

// =============================================================================
// Generators
// =============================================================================

/// Generate a dotted version string.
fn arb_version() -> impl Strategy<Value = String> {
    (0u32..50, 0u32..50, 0u32..50).prop_map(|(major, minor, patch)| {
        format!("{}.{}.{}", major, minor, patch)
    })
}

/// Generate a pair of distinct versions.
fn arb_version_pair() -> impl Strategy<Value = (String, String)> {
    (arb_version(), arb_version()).prop_filter("versions must differ", |(a, b)| a != b)
}

/// Generate a style name with random casing and surrounding whitespace.
fn arb_style_spelling() -> impl Strategy<Value = (PresentationStyle, String)> {
    (
        prop::sample::select(PresentationStyle::ALL.to_vec()),
        prop::collection::vec(any::<bool>(), 32),
        "[ \t]{0,3}",
        "[ \t]{0,3}",
    )
        .prop_map(|(style, upper, lead, trail)| {
            let mixed: String = style
                .as_str()
                .chars()
                .zip(upper.into_iter().cycle())
                .map(|(c, up)| {
                    if up {
                        c.to_ascii_uppercase()
                    } else {
                        c.to_ascii_lowercase()
                    }
                })
                .collect();
            (style, format!("{}{}{}", lead, mixed, trail))
        })
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
        .block_on(future)
}

// =============================================================================
// Property 1: Version change resets acknowledged
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Whatever the previous version and flag, moving to a different version
    /// leaves the flag false and the version advanced.
    #[test]
    fn prop_version_change_resets_acknowledged(
        (previous, current) in arb_version_pair(),
        was_acknowledged in any::<bool>(),
    ) {
        let (last_seen, acknowledged, transitioned) = block_on(async {
            let store = InMemoryStore::with_entries([
                (keys::LAST_SEEN_VERSION, previous.clone()),
                (keys::HAS_SEEN_VERSION_UPDATE, was_acknowledged.to_string()),
            ]);
            let tracker = VersionTracker::new(current.clone(), Arc::new(store));
            let result = tracker.reconcile().await.unwrap();
            let state = tracker.state().await.unwrap();
            (state.last_seen_version, state.acknowledged, result.transitioned)
        });

        prop_assert!(transitioned);
        prop_assert_eq!(last_seen, Some(current));
        prop_assert!(!acknowledged);
    }
}

// =============================================================================
// Property 2: Unchanged version preserves acknowledged
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_same_version_preserves_acknowledged(
        version in arb_version(),
        acknowledged in any::<bool>(),
    ) {
        let (after, transitioned) = block_on(async {
            let store = InMemoryStore::with_entries([
                (keys::LAST_SEEN_VERSION, version.clone()),
                (keys::HAS_SEEN_VERSION_UPDATE, acknowledged.to_string()),
            ]);
            let tracker = VersionTracker::new(version.clone(), Arc::new(store));
            let result = tracker.reconcile().await.unwrap();
            (tracker.is_acknowledged().await.unwrap(), result.transitioned)
        });

        prop_assert!(!transitioned);
        prop_assert_eq!(after, acknowledged);
    }
}

// =============================================================================
// Property 3: Reconcile is idempotent
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// A second reconcile with the same running version writes nothing new.
    #[test]
    fn prop_reconcile_idempotent(
        previous in prop::option::of(arb_version()),
        current in arb_version(),
        acknowledged in prop::option::of(any::<bool>()),
    ) {
        let (first, second, transitioned_again) = block_on(async {
            let mut entries = Vec::new();
            if let Some(previous) = previous {
                entries.push((keys::LAST_SEEN_VERSION, previous));
            }
            if let Some(acknowledged) = acknowledged {
                entries.push((keys::HAS_SEEN_VERSION_UPDATE, acknowledged.to_string()));
            }
            let store = InMemoryStore::with_entries(entries);
            let tracker = VersionTracker::new(current, Arc::new(store.clone()));

            tracker.reconcile().await.unwrap();
            let first = store.snapshot().await;
            let again = tracker.reconcile().await.unwrap();
            (first, store.snapshot().await, again.transitioned)
        });

        prop_assert!(!transitioned_again);
        prop_assert_eq!(first, second);
    }
}

// =============================================================================
// Property 4: Style parsing
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_style_parse_case_insensitive((style, spelling) in arb_style_spelling()) {
        prop_assert_eq!(PresentationStyle::parse(&spelling), Some(style));
        prop_assert_eq!(PresentationStyle::from_str_lossy(&spelling), style);
    }

    /// Anything that is not a style name falls back to fullScreen.
    #[test]
    fn prop_unknown_style_falls_back(raw in "[a-z]{1,12}") {
        prop_assume!(PresentationStyle::parse(&raw).is_none());
        prop_assert_eq!(
            PresentationStyle::from_str_lossy(&raw),
            PresentationStyle::FullScreen
        );
    }
}

// =============================================================================
// Property 5: Boolean decoding
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_only_true_decodes_true(raw in prop::option::of(".{0,8}")) {
        let expected = raw.as_deref() == Some("true");
        prop_assert_eq!(decode_bool(raw.as_deref()), expected);
    }
}

#[tokio::test]
async fn test_store_trait_object_reconcile() {
    let store: Arc<dyn KeyValueStore> = InMemoryStore::new_shared();
    let tracker = VersionTracker::new("3.0.0", store.clone());
    tracker.reconcile().await.unwrap();
    assert_eq!(
        store.get(keys::LAST_SEEN_VERSION).await.unwrap().as_deref(),
        Some("3.0.0")
    );
}
