use std::sync::Arc;

use echoes::application::generator::DisabledGenerator;
use echoes::application::recommend::{RecommendSettings, RecommendationEngine};
use echoes::cache::{CacheConfig, EchoCache, EchoMutation, InvalidationPlan};
use echoes::domain::entities::EchoRecord;
use echoes_api_types::{Layout, RecommendLayoutRequest};
use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use time::OffsetDateTime;
use uuid::Uuid;

fn sample_echo(content: &str) -> EchoRecord {
    EchoRecord {
        id: Uuid::new_v4(),
        content: content.to_string(),
        username: "mika".to_string(),
        user_id: Uuid::nil(),
        media: Vec::new(),
        tags: Vec::new(),
        private: false,
        layout: Layout::Waterfall,
        extension: None,
        fav_count: 0,
        created_at: OffsetDateTime::now_utc(),
    }
}

fn counter(
    snapshot: &[(String, Vec<(String, String)>, u64)],
    name: &str,
    label: (&str, &str),
) -> u64 {
    snapshot
        .iter()
        .filter(|(key, labels, _)| {
            key == name
                && labels
                    .iter()
                    .any(|(k, v)| k == label.0 && v == label.1)
        })
        .map(|(_, _, value)| *value)
        .sum()
}

#[test]
fn cache_and_recommend_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        let cache = EchoCache::new(&CacheConfig {
            echo_limit: 1,
            ..Default::default()
        });
        let first = sample_echo("first");
        let second = sample_echo("second");

        assert!(cache.echo(first.id).is_none());
        assert!(cache.fill_echo(cache.ticket(), first.clone()));
        assert!(cache.echo(first.id).is_some());

        // Capacity one: the second snapshot pushes the first out.
        assert!(cache.fill_echo(cache.ticket(), second.clone()));

        // A write between ticket and fill voids the fill.
        let stale = cache.ticket();
        cache.apply(&InvalidationPlan::for_mutation(EchoMutation::Liked(
            second.id,
        )));
        assert!(!cache.fill_echo(stale, first.clone()));

        let engine =
            RecommendationEngine::new(Arc::new(DisabledGenerator), RecommendSettings::default());
        futures::executor::block_on(engine.recommend(&RecommendLayoutRequest {
            content: "just words".to_string(),
            ..Default::default()
        }));
    });

    let snapshot: Vec<(String, Vec<(String, String)>, u64)> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .filter_map(|(key, _, _, value)| match value {
            DebugValue::Counter(count) => {
                let labels = key
                    .key()
                    .labels()
                    .map(|label| (label.key().to_string(), label.value().to_string()))
                    .collect();
                Some((key.key().name().to_string(), labels, count))
            }
            _ => None,
        })
        .collect();

    assert_eq!(
        counter(&snapshot, "echoes_cache_miss_total", ("namespace", "echo")),
        1
    );
    assert_eq!(
        counter(&snapshot, "echoes_cache_hit_total", ("namespace", "echo")),
        1
    );
    assert_eq!(
        counter(&snapshot, "echoes_cache_evict_total", ("namespace", "echo")),
        1
    );
    assert_eq!(
        counter(&snapshot, "echoes_cache_invalidate_total", ("target", "echo")),
        1
    );
    assert_eq!(
        counter(
            &snapshot,
            "echoes_cache_invalidate_total",
            ("target", "echo-page-cache")
        ),
        1
    );
    assert_eq!(
        counter(
            &snapshot,
            "echoes_cache_fill_skipped_total",
            ("namespace", "echo")
        ),
        1
    );
    assert_eq!(
        counter(&snapshot, "echoes_recommend_total", ("source", "rule")),
        1
    );
}
