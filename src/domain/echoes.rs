//! Normalisation rules applied to every echo before it reaches storage.

use echoes_api_types::{EchoPayload, MediaPayload};
use url::Url;

use crate::domain::{
    entities::Extension,
    error::DomainError,
    types::{ExtensionKind, Layout, MediaKind, MediaSource},
};

/// A media item ready to persist. `pair_token` is never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDraft {
    pub url: String,
    pub kind: MediaKind,
    pub source: Option<MediaSource>,
    pub object_key: Option<String>,
    pub width: i32,
    pub height: i32,
    pub pair_token: Option<String>,
}

/// Validated, normalised echo contents shared by create and update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoDraft {
    pub content: String,
    pub media: Vec<MediaDraft>,
    pub tags: Vec<String>,
    pub private: bool,
    pub layout: Layout,
    pub extension: Option<Extension>,
}

impl EchoDraft {
    pub fn from_payload(payload: EchoPayload) -> Result<Self, DomainError> {
        let EchoPayload {
            content,
            media,
            tags,
            private,
            layout,
            extension,
            extension_type,
        } = payload;

        let content = content.trim().to_string();
        let layout = normalize_layout(layout.as_deref());
        let extension = normalize_extension(extension_type.as_deref(), extension.as_deref())?;

        let media = media
            .into_iter()
            .filter_map(|item| normalize_media(item).transpose())
            .collect::<Result<Vec<_>, _>>()?;

        if content.is_empty() && media.is_empty() && extension.is_none() {
            return Err(DomainError::validation(
                "content",
                "an echo needs text content, media, or an extension",
            ));
        }

        Ok(Self {
            content,
            media,
            tags,
            private,
            layout,
            extension,
        })
    }

    /// Pairing tokens aligned with `media`; an empty string means unpaired.
    pub fn pair_tokens(&self) -> Vec<&str> {
        self.media
            .iter()
            .map(|m| m.pair_token.as_deref().unwrap_or(""))
            .collect()
    }
}

/// Falls back to the canonical layout for absent or unknown names.
pub fn normalize_layout(raw: Option<&str>) -> Layout {
    raw.map(|value| value.trim().to_ascii_lowercase())
        .and_then(|value| value.parse().ok())
        .unwrap_or_default()
}

/// Keeps an extension only when both its kind and payload are present.
pub fn normalize_extension(
    kind: Option<&str>,
    payload: Option<&str>,
) -> Result<Option<Extension>, DomainError> {
    let kind = kind.map(str::trim).unwrap_or("");
    let payload = payload.unwrap_or("");
    if kind.is_empty() || payload.trim().is_empty() {
        return Ok(None);
    }

    let kind = kind
        .parse::<ExtensionKind>()
        .map_err(|err| DomainError::validation("extension_type", err.to_string()))?;

    let payload = match kind {
        ExtensionKind::GithubProject => {
            let trimmed = payload.trim();
            Url::parse(trimmed).map_err(|err| {
                DomainError::validation(
                    "extension",
                    format!("repository link `{trimmed}` is invalid: {err}"),
                )
            })?;
            trimmed.to_string()
        }
        _ => payload.to_string(),
    };

    Ok(Some(Extension { kind, payload }))
}

/// Drops placeholders without a URL.
fn normalize_media(item: MediaPayload) -> Result<Option<MediaDraft>, DomainError> {
    let url = item.url.trim();
    if url.is_empty() {
        return Ok(None);
    }

    let width = dimension(item.width, "media.width")?;
    let height = dimension(item.height, "media.height")?;

    Ok(Some(MediaDraft {
        url: url.to_string(),
        kind: item.kind,
        source: item.source,
        object_key: item
            .object_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty()),
        width,
        height,
        pair_token: item
            .live_pair_id
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty()),
    }))
}

fn dimension(value: u32, field: &'static str) -> Result<i32, DomainError> {
    i32::try_from(value)
        .map_err(|_| DomainError::validation(field, format!("{value} is out of range")))
}
