use std::sync::Arc;

use async_trait::async_trait;
use echoes::application::echoes::{Author, EchoStore};
use echoes::application::generator::{
    ChatMessage, DisabledGenerator, GenerationError, GenerationOptions, TextGenerator,
};
use echoes::application::recommend::{RecommendSettings, RecommendationEngine, request_for_echo};
use echoes::cache::{CacheConfig, EchoCache};
use echoes::domain::echoes::EchoDraft;
use echoes::infra::memory::InMemoryRepositories;
use echoes_api_types::{
    EchoPayload, Layout, MediaFeatureInput, MediaKind, MediaPayload, RecommendLayoutRequest,
    RecommendationSource,
};
use uuid::Uuid;

struct Fixed(&'static str);

#[async_trait]
impl TextGenerator for Fixed {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn generate(
        &self,
        _messages: &[ChatMessage],
        _options: GenerationOptions,
    ) -> Result<String, GenerationError> {
        Ok(self.0.to_string())
    }
}

fn image(width: u32, height: u32) -> MediaFeatureInput {
    MediaFeatureInput {
        kind: MediaKind::Image,
        width,
        height,
    }
}

fn request(media: Vec<MediaFeatureInput>, content: &str) -> RecommendLayoutRequest {
    RecommendLayoutRequest {
        media,
        content: content.to_string(),
        tags: Vec::new(),
    }
}

fn rules_only() -> RecommendationEngine {
    RecommendationEngine::new(Arc::new(DisabledGenerator), RecommendSettings::default())
}

#[tokio::test]
async fn mixed_orientations_without_text_form_a_waterfall() {
    let req = request(vec![image(1200, 800), image(800, 1200), image(900, 900)], "");
    let rec = rules_only().recommend(&req).await;

    assert_eq!(rec.layout, Layout::Waterfall);
    assert_eq!(rec.source, RecommendationSource::Rule);
    assert_eq!(rec.reason, "image showcase");
}

#[tokio::test]
async fn code_with_square_images_forms_a_grid() {
    let mut content = String::from("```rust\nfn main() { println!(\"hi\"); }\n```\n");
    while content.chars().count() < 220 {
        content.push('x');
    }
    let rec = rules_only()
        .recommend(&request(vec![image(900, 900); 3], &content))
        .await;

    assert_eq!(rec.layout, Layout::Grid);
    assert_eq!(rec.reason, "code sharing");
}

#[tokio::test]
async fn many_images_with_a_short_caption_form_a_carousel() {
    let rec = rules_only()
        .recommend(&request(vec![image(1000, 1000); 14], "weekend"))
        .await;

    assert_eq!(rec.layout, Layout::Carousel);
    assert_eq!(rec.reason, "one by one");
}

#[tokio::test]
async fn rule_scores_are_stable_across_calls() {
    let req = RecommendLayoutRequest {
        tags: vec!["travel".to_string(), "photo".to_string()],
        ..request(
            vec![image(1920, 1080), image(1080, 1920), image(1500, 1000)],
            "Sunset over the harbour, then dinner.",
        )
    };
    let first = RecommendationEngine::rule_based(&req);
    for _ in 0..10 {
        assert_eq!(RecommendationEngine::rule_based(&req), first);
        assert_eq!(rules_only().recommend(&req).await, first);
    }
}

#[tokio::test]
async fn generated_answers_are_used_when_valid() {
    let engine = RecommendationEngine::new(
        Arc::new(Fixed("Horizontal | wide panoramas")),
        RecommendSettings::default(),
    );
    let rec = engine
        .recommend(&request(vec![image(3000, 1000); 2], ""))
        .await;

    assert_eq!(rec.layout, Layout::Horizontal);
    assert_eq!(rec.source, RecommendationSource::Ai);
}

#[tokio::test]
async fn unknown_generated_layouts_fall_back_to_rules() {
    let engine = RecommendationEngine::new(
        Arc::new(Fixed("masonry|looks nice")),
        RecommendSettings::default(),
    );
    let req = request(vec![image(1000, 1000); 14], "weekend");
    let rec = engine.recommend(&req).await;

    assert_eq!(rec, RecommendationEngine::rule_based(&req));
    assert_eq!(rec.source, RecommendationSource::Rule);
}

#[tokio::test]
async fn live_photo_videos_are_not_counted_for_stored_echoes() {
    let repos = Arc::new(InMemoryRepositories::new());
    let cache = Arc::new(EchoCache::new(&CacheConfig::default()));
    let store = EchoStore::new(repos.clone(), repos, cache, chrono_tz::UTC);

    let half = |url: &str, kind| MediaPayload {
        url: url.to_string(),
        kind,
        source: None,
        object_key: None,
        width: 1000,
        height: 1000,
        live_pair_id: Some("live".to_string()),
    };
    let draft = EchoDraft::from_payload(EchoPayload {
        media: vec![
            half("still.heic", MediaKind::Image),
            half("motion.mov", MediaKind::Video),
        ],
        ..Default::default()
    })
    .expect("valid draft");
    let author = Author {
        id: Uuid::new_v4(),
        username: "mika".to_string(),
    };
    let echo = store.create(&author, draft).await.expect("create");

    let req = request_for_echo(&echo);
    assert_eq!(req.media, vec![image(1000, 1000)]);

    let rec = rules_only().recommend_for_echo(&echo).await;
    assert_eq!(rec.layout, Layout::Waterfall);
    assert_eq!(rec.reason, "image showcase");
}
