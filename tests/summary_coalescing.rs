use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use echoes::application::echoes::{Author, EchoStore};
use echoes::application::generator::{
    ChatMessage, DisabledGenerator, GenerationError, GenerationOptions, TextGenerator,
};
use echoes::application::recommend::{RecommendSettings, RecommendationEngine};
use echoes::application::service::EchoService;
use echoes::application::summary::{SummaryCoalescer, SummaryError, SummarySettings};
use echoes::cache::{CacheConfig, EchoCache};
use echoes::domain::echoes::EchoDraft;
use echoes::infra::access::StaticAccessPolicy;
use echoes::infra::memory::InMemoryRepositories;
use echoes_api_types::EchoPayload;
use futures::future::join_all;
use uuid::Uuid;

/// Sleeps briefly so concurrent callers pile up, then answers from a script.
struct SlowGenerator {
    calls: AtomicUsize,
    fail_first: usize,
    last_prompt_len: AtomicUsize,
}

impl SlowGenerator {
    fn new(fail_first: usize) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail_first,
            last_prompt_len: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for SlowGenerator {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn generate(
        &self,
        messages: &[ChatMessage],
        _options: GenerationOptions,
    ) -> Result<String, GenerationError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_prompt_len.store(messages.len(), Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        if call < self.fail_first {
            return Err(GenerationError::Status {
                status: 503,
                body: "busy".to_string(),
            });
        }
        Ok(format!("  summary #{call}  "))
    }
}

struct PanickingGenerator;

#[async_trait]
impl TextGenerator for PanickingGenerator {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn generate(
        &self,
        _messages: &[ChatMessage],
        _options: GenerationOptions,
    ) -> Result<String, GenerationError> {
        panic!("generator blew up");
    }
}

fn store() -> EchoStore {
    let repos = Arc::new(InMemoryRepositories::new());
    let cache = Arc::new(EchoCache::new(&CacheConfig::default()));
    EchoStore::new(repos.clone(), repos, cache, chrono_tz::UTC)
}

fn author() -> Author {
    Author {
        id: Uuid::new_v4(),
        username: "mika".to_string(),
    }
}

fn draft(content: &str) -> EchoDraft {
    EchoDraft::from_payload(EchoPayload {
        content: content.to_string(),
        ..Default::default()
    })
    .expect("valid draft")
}

#[tokio::test]
async fn concurrent_callers_share_one_generation() {
    let store = store();
    store
        .create(&author(), draft("walked by the river"))
        .await
        .expect("create");
    let generator = SlowGenerator::new(0);
    let coalescer = SummaryCoalescer::new(store, generator.clone(), SummarySettings::default());

    let results = join_all((0..8).map(|_| coalescer.recent_summary())).await;

    assert_eq!(generator.calls(), 1);
    for result in results {
        assert_eq!(result.expect("shared summary"), "summary #0");
    }
    assert_eq!(coalescer.in_flight(), 0);
    // system prompt, one echo, instruction
    assert_eq!(generator.last_prompt_len.load(Ordering::SeqCst), 3);

    let cached = coalescer.recent_summary().await.expect("cached");
    assert_eq!(cached, "summary #0");
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn a_failed_generation_reaches_every_waiter() {
    let generator = SlowGenerator::new(usize::MAX);
    let coalescer = SummaryCoalescer::new(store(), generator.clone(), SummarySettings::default());

    let results = join_all((0..4).map(|_| coalescer.recent_summary())).await;

    assert_eq!(generator.calls(), 1);
    for result in results {
        assert!(matches!(
            result,
            Err(SummaryError::Generation(GenerationError::Status { status: 503, .. }))
        ));
    }
    assert_eq!(coalescer.in_flight(), 0);
}

#[tokio::test]
async fn the_call_after_a_failure_retries() {
    let generator = SlowGenerator::new(1);
    let coalescer = SummaryCoalescer::new(store(), generator.clone(), SummarySettings::default());

    assert!(coalescer.recent_summary().await.is_err());
    assert_eq!(coalescer.recent_summary().await.expect("retry"), "summary #1");
    assert_eq!(generator.calls(), 2);
}

#[tokio::test]
async fn a_new_echo_invalidates_the_cached_summary() {
    let store = store();
    let generator = SlowGenerator::new(0);
    let coalescer =
        SummaryCoalescer::new(store.clone(), generator.clone(), SummarySettings::default());

    assert_eq!(coalescer.recent_summary().await.expect("first"), "summary #0");
    store
        .create(&author(), draft("new post"))
        .await
        .expect("create");
    assert_eq!(coalescer.recent_summary().await.expect("second"), "summary #1");
    assert_eq!(generator.calls(), 2);
}

#[tokio::test]
async fn a_cancelled_caller_does_not_strand_the_flight() {
    let store = store();
    store
        .create(&author(), draft("old post"))
        .await
        .expect("create");
    let generator = SlowGenerator::new(0);
    let coalescer =
        SummaryCoalescer::new(store.clone(), generator.clone(), SummarySettings::default());

    let abandoned =
        tokio::time::timeout(Duration::from_millis(10), coalescer.recent_summary()).await;
    assert!(abandoned.is_err());
    store
        .create(&author(), draft("new post after cancel"))
        .await
        .expect("create");

    // The orphaned flight finishes by itself and unregisters.
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(coalescer.in_flight(), 0);
    assert_eq!(generator.calls(), 1);

    let summary = coalescer.recent_summary().await.expect("fresh summary");
    assert_eq!(summary, "summary #1");
    assert_eq!(generator.calls(), 2);
    // system prompt, both echoes, instruction
    assert_eq!(generator.last_prompt_len.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn slow_generation_times_out() {
    let generator = SlowGenerator::new(0);
    let coalescer = SummaryCoalescer::new(
        store(),
        generator,
        SummarySettings {
            temperature: 0.7,
            timeout: Duration::from_millis(1),
        },
    );

    let err = coalescer.recent_summary().await.expect_err("timeout");
    assert!(matches!(
        err,
        SummaryError::Generation(GenerationError::Timeout)
    ));
}

#[tokio::test]
async fn disabled_generation_surfaces_as_a_generator_error() {
    let store = store();
    let generator = Arc::new(DisabledGenerator);
    let service = EchoService::new(
        store.clone(),
        Arc::new(StaticAccessPolicy::default()),
        RecommendationEngine::new(generator.clone(), RecommendSettings::default()),
        SummaryCoalescer::new(store, generator, SummarySettings::default()),
    );

    let err = service
        .get_recent_summary()
        .await
        .expect_err("no generator configured");
    assert_eq!(err.kind(), "generator");
}

#[tokio::test]
async fn a_crashed_flight_is_reported_as_cancelled() {
    let coalescer =
        SummaryCoalescer::new(store(), Arc::new(PanickingGenerator), SummarySettings::default());

    let err = coalescer.recent_summary().await.expect_err("crashed flight");
    assert!(matches!(
        err,
        SummaryError::Generation(GenerationError::Cancelled)
    ));
    assert_eq!(coalescer.in_flight(), 0);
}
