//! Wire types shared by the echoes backend and its callers.
//!
//! Everything here is plain serde data: no persistence or runtime concerns.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Returned when a string does not name a known enum variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} `{}`", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

string_enum! {
    /// Visual arrangement used to render an echo's media.
    Layout, "layout" {
        Waterfall => "waterfall",
        Grid => "grid",
        Horizontal => "horizontal",
        Carousel => "carousel",
    }
}

impl Default for Layout {
    fn default() -> Self {
        Layout::Waterfall
    }
}

string_enum! {
    MediaKind, "media kind" {
        Image => "image",
        Video => "video",
    }
}

string_enum! {
    /// Where a media file is hosted.
    MediaSource, "media source" {
        Local => "local",
        Url => "url",
        S3 => "s3",
    }
}

string_enum! {
    ExtensionKind, "extension kind" {
        Music => "MUSIC",
        Video => "VIDEO",
        GithubProject => "GITHUBPROJ",
        Website => "WEBSITE",
    }
}

string_enum! {
    /// Which path produced a layout recommendation.
    RecommendationSource, "recommendation source" {
        Ai => "ai",
        Rule => "rule",
    }
}

/// One media attachment as submitted by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaPayload {
    pub url: String,
    #[serde(rename = "media_type")]
    pub kind: MediaKind,
    #[serde(default, rename = "media_source")]
    pub source: Option<MediaSource>,
    #[serde(default)]
    pub object_key: Option<String>,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    /// Client-side token pairing a still image with its live-photo video.
    #[serde(default)]
    pub live_pair_id: Option<String>,
}

/// Create/update request body for an echo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EchoPayload {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub media: Vec<MediaPayload>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub layout: Option<String>,
    #[serde(default)]
    pub extension: Option<String>,
    #[serde(default)]
    pub extension_type: Option<String>,
}

/// Media facts used by the layout recommender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFeatureInput {
    #[serde(rename = "media_type")]
    pub kind: MediaKind,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecommendLayoutRequest {
    #[serde(default)]
    pub media: Vec<MediaFeatureInput>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutRecommendation {
    pub layout: Layout,
    pub source: RecommendationSource,
    pub reason: String,
}
