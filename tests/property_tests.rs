mod common;

use proptest::prelude::*;
use render_cache::{CacheData, SetContext, TagInput};
use std::collections::HashSet;
use std::time::Duration;

fn tag_strategy() -> impl Strategy<Value = String> {
    "[a-z]{1,6}(:[a-z0-9]{1,6})?"
}

fn tag_list_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(tag_strategy(), 0..12)
}

proptest! {
    /// Property: normalized tags contain every input tag exactly once, in first-seen order
    #[test]
    fn normalized_tags_are_a_set(tags in tag_list_strategy()) {
        let normalized = TagInput::from(tags.clone()).into_tags();

        let unique: HashSet<&String> = normalized.iter().collect();
        prop_assert_eq!(unique.len(), normalized.len());

        let mut expected = Vec::new();
        for tag in &tags {
            if !expected.contains(tag) {
                expected.push(tag.clone());
            }
        }
        prop_assert_eq!(normalized, expected);
    }

    /// Property: a bare tag always normalizes to a one-element list
    #[test]
    fn scalar_tag_is_wrapped(tag in tag_strategy()) {
        let ctx: SetContext = serde_json::from_value(serde_json::json!({"tags": tag.clone()})).unwrap();
        prop_assert_eq!(ctx.tags.into_tags(), vec![tag]);
    }

    /// Property: positive revalidate values round up to whole seconds
    #[test]
    fn positive_revalidate_rounds_up(seconds in 0.001f64..1_000_000.0) {
        let ttl = CacheData::new("x")
            .with_revalidate(seconds)
            .effective_ttl(Duration::from_secs(86_400));
        prop_assert!(ttl.as_secs_f64() >= seconds);
        prop_assert!(ttl.as_secs_f64() < seconds + 1.0);
        prop_assert_eq!(ttl.subsec_nanos(), 0);
    }

    /// Property: non-positive revalidate values fall back to the default
    #[test]
    fn non_positive_revalidate_uses_default(seconds in -1_000_000.0f64..=0.0, default_secs in 1u64..1_000_000) {
        let default = Duration::from_secs(default_secs);
        let ttl = CacheData::new("x").with_revalidate(seconds).effective_ttl(default);
        prop_assert_eq!(ttl, default);
    }
}

/// Property-based round trip through the handler: whatever is set with tags T reads back with T
#[test]
fn set_then_get_returns_value_and_tags() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    proptest!(|(key in "[a-z0-9:/]{1,24}", value in any::<i64>(), tags in tag_list_strategy())| {
        let (_store, cache) = common::memory_handler();
        let entry = runtime.block_on(async {
            cache
                .set(&key, CacheData::new(value), SetContext::with_tags(tags.clone()))
                .await;
            cache.get(&key).await
        });

        let entry = entry.unwrap();
        prop_assert_eq!(entry.value, serde_json::json!(value));
        prop_assert_eq!(entry.tags, TagInput::from(tags).into_tags());
    });
}
