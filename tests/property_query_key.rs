use proptest::prelude::*;
use std::time::Duration;

use storefront::domain::models::{QueryKey, QueryState};

fn segments() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z0-9-]{1,12}", 1..5)
}

proptest! {
    /// Property: every key starts with each of its own prefixes
    #[test]
    fn prop_key_starts_with_own_prefixes(parts in segments()) {
        let key = QueryKey::new(parts.clone());
        for len in 1..=parts.len() {
            let prefix = QueryKey::new(parts[..len].to_vec());
            prop_assert!(key.starts_with(&prefix));
        }
    }

    /// Property: a longer key is never a prefix of a shorter one
    #[test]
    fn prop_longer_key_is_not_prefix(parts in segments(), extra in "[a-z]{1,8}") {
        let key = QueryKey::new(parts.clone());
        let mut longer = parts;
        longer.push(extra);
        prop_assert!(!key.starts_with(&QueryKey::new(longer)));
    }

    /// Property: display joins segments with '/'
    #[test]
    fn prop_display_joins_segments(parts in segments()) {
        prop_assert_eq!(QueryKey::new(parts.clone()).to_string(), parts.join("/"));
    }

    /// Property: staleness flips exactly at the stale time
    #[test]
    fn prop_stale_at_window_boundary(stale_ms in 1u64..1_000_000, elapsed_ms in 0u64..2_000_000) {
        let fetched_at = tokio::time::Instant::now();
        let state = QueryState::<u32> {
            fetched_at: Some(fetched_at),
            ..QueryState::default()
        };
        let now = fetched_at + Duration::from_millis(elapsed_ms);

        prop_assert_eq!(
            state.is_stale(Duration::from_millis(stale_ms), now),
            elapsed_ms >= stale_ms
        );
    }

    /// Property: invalidated data is stale no matter how recent
    #[test]
    fn prop_invalidated_is_always_stale(stale_ms in 1u64..1_000_000) {
        let fetched_at = tokio::time::Instant::now();
        let state = QueryState::<u32> {
            fetched_at: Some(fetched_at),
            is_invalidated: true,
            ..QueryState::default()
        };

        prop_assert!(state.is_stale(Duration::from_millis(stale_ms), fetched_at));
    }
}
