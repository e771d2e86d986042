//! Layout recommendation.
//!
//! The rule scorer always runs first; its answer is returned whenever the
//! generator is disabled, fails, times out or produces something that is not
//! one of the four layouts.

pub mod features;
pub mod prompt;
pub mod scoring;

use std::{sync::Arc, time::Duration};

use echoes_api_types::{LayoutRecommendation, MediaFeatureInput, RecommendLayoutRequest};
use metrics::counter;
use tracing::{info, warn};

use crate::{
    application::generator::{ChatMessage, GenerationError, GenerationOptions, TextGenerator},
    domain::{entities::EchoRecord, types::RecommendationSource},
};

pub use features::{ContentFeatures, ContentType, LayoutAnalysis, MediaFeatures, TextPosition};
pub use scoring::ScoredLayout;

const METRIC_RECOMMEND: &str = "echoes_recommend_total";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecommendSettings {
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for RecommendSettings {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Clone)]
pub struct RecommendationEngine {
    generator: Arc<dyn TextGenerator>,
    settings: RecommendSettings,
}

impl RecommendationEngine {
    pub fn new(generator: Arc<dyn TextGenerator>, settings: RecommendSettings) -> Self {
        Self {
            generator,
            settings,
        }
    }

    /// Rule scorer only.
    pub fn rule_based(request: &RecommendLayoutRequest) -> LayoutRecommendation {
        let analysis = LayoutAnalysis::new(&request.media, &request.content, &request.tags);
        rule_recommendation(&analysis)
    }

    pub async fn recommend(&self, request: &RecommendLayoutRequest) -> LayoutRecommendation {
        let analysis = LayoutAnalysis::new(&request.media, &request.content, &request.tags);
        let fallback = rule_recommendation(&analysis);

        info!(
            media = analysis.media.total,
            content_len = analysis.content.length,
            content_type = %analysis.content_type,
            text_position = analysis.text_position.as_str(),
            "Layout analysis complete"
        );

        let recommendation = if self.generator.is_enabled() {
            match self.generate(&analysis).await {
                Ok(recommendation) => recommendation,
                Err(err) => {
                    warn!(error = %err, "Generated layout unavailable; using rule score");
                    fallback
                }
            }
        } else {
            fallback
        };

        counter!(METRIC_RECOMMEND, "source" => recommendation.source.as_str()).increment(1);
        info!(
            layout = %recommendation.layout,
            source = %recommendation.source,
            reason = %recommendation.reason,
            "Layout recommended"
        );
        recommendation
    }

    /// Recommends for a stored echo. The video half of a live photo is not
    /// shown on its own, so it is left out of the media features.
    pub async fn recommend_for_echo(&self, echo: &EchoRecord) -> LayoutRecommendation {
        self.recommend(&request_for_echo(echo)).await
    }

    async fn generate(&self, analysis: &LayoutAnalysis) -> Result<LayoutRecommendation, LayoutHintError> {
        let messages = [
            ChatMessage::system(prompt::SYSTEM_PROMPT),
            ChatMessage::user(prompt::build_prompt(analysis)),
        ];
        let options = GenerationOptions {
            temperature: self.settings.temperature,
        };

        let output = tokio::time::timeout(
            self.settings.timeout,
            self.generator.generate(&messages, options),
        )
        .await
        .map_err(|_| GenerationError::Timeout)??;

        let (layout, reason) = prompt::parse_layout_output(&output)
            .ok_or_else(|| LayoutHintError::Unparseable(output.clone()))?;
        Ok(LayoutRecommendation {
            layout,
            source: RecommendationSource::Ai,
            reason,
        })
    }
}

pub fn request_for_echo(echo: &EchoRecord) -> RecommendLayoutRequest {
    let live_videos = echo.live_video_ids();
    let media = echo
        .media
        .iter()
        .filter(|media| !live_videos.contains(&media.id))
        .map(|media| MediaFeatureInput {
            kind: media.kind,
            width: u32::try_from(media.width).unwrap_or(0),
            height: u32::try_from(media.height).unwrap_or(0),
        })
        .collect();
    RecommendLayoutRequest {
        media,
        content: echo.content.clone(),
        tags: echo.tags.iter().map(|tag| tag.name.clone()).collect(),
    }
}

fn rule_recommendation(analysis: &LayoutAnalysis) -> LayoutRecommendation {
    let scored = scoring::score(analysis);
    LayoutRecommendation {
        layout: scored.layout,
        source: RecommendationSource::Rule,
        reason: scored.reason.to_string(),
    }
}

#[derive(Debug, thiserror::Error)]
enum LayoutHintError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("output names no known layout: {0:?}")]
    Unparseable(String),
}
