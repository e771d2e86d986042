//! Chat-completions client for OpenAI-compatible text generation endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    application::generator::{ChatMessage, GenerationError, GenerationOptions, TextGenerator},
    config::GeneratorSettings,
};

use super::error::InfraError;

const COMPLETIONS_PATH: &str = "chat/completions";
const ERROR_BODY_LIMIT: usize = 512;

pub struct OpenAiCompatibleGenerator {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    model: String,
}

impl OpenAiCompatibleGenerator {
    pub fn new(
        base_url: &Url,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, InfraError> {
        let endpoint = completions_endpoint(base_url)?;
        let client = Client::builder()
            .user_agent(concat!("echoes/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|err| InfraError::generator(format!("failed to build client: {err}")))?;
        Ok(Self {
            client,
            endpoint,
            api_key,
            model: model.into(),
        })
    }

    /// `None` when the settings leave generation disabled.
    pub fn from_settings(settings: &GeneratorSettings) -> Result<Option<Self>, InfraError> {
        if !settings.enabled {
            return Ok(None);
        }
        let (Some(base_url), Some(model)) = (settings.base_url.as_ref(), settings.model.as_ref())
        else {
            return Err(InfraError::configuration(
                "generator",
                "base_url and model are required when enabled",
            ));
        };
        Self::new(base_url, settings.api_key.clone(), model, settings.timeout).map(Some)
    }
}

fn completions_endpoint(base_url: &Url) -> Result<Url, InfraError> {
    let base = base_url.as_str().trim_end_matches('/');
    Url::parse(&format!("{base}/{COMPLETIONS_PATH}"))
        .map_err(|err| InfraError::configuration("generator", format!("bad url: {err}")))
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

fn first_text(response: CompletionResponse) -> Result<String, GenerationError> {
    response
        .choices
        .into_iter()
        .find_map(|choice| choice.message.content)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or(GenerationError::EmptyResponse)
}

fn transport_error(err: reqwest::Error) -> GenerationError {
    if err.is_timeout() {
        GenerationError::Timeout
    } else {
        GenerationError::Transport(err.to_string())
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatibleGenerator {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn generate(
        &self,
        messages: &[ChatMessage],
        options: GenerationOptions,
    ) -> Result<String, GenerationError> {
        let body = CompletionRequest {
            model: &self.model,
            messages,
            temperature: options.temperature,
            stream: false,
        };

        let mut request = self.client.post(self.endpoint.clone()).json(&body);
        if let Some(key) = self.api_key.as_deref() {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let text: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(ERROR_BODY_LIMIT)
                .collect();
            warn!(status = status.as_u16(), "Generator rejected the request");
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: CompletionResponse = response.json().await.map_err(transport_error)?;
        let text = first_text(parsed)?;
        debug!(
            model = %self.model,
            messages = messages.len(),
            chars = text.chars().count(),
            "Generation complete"
        );
        Ok(text)
    }
}
