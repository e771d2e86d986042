//! Feature extraction for layout scoring.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::types::MediaKind;
use echoes_api_types::MediaFeatureInput;

pub const LANDSCAPE_RATIO: f64 = 1.2;
pub const WIDE_RATIO: f64 = 1.5;
pub const PORTRAIT_RATIO: f64 = 0.8;
pub const TALL_RATIO: f64 = 0.67;

static CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```.*?```|`[^`\n]+`").expect("code pattern is valid"));
static LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[[^\]]*\]\([^)]*\)|https?://\S+").expect("link pattern is valid")
});
static IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").expect("image pattern is valid"));
static HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^#{1,6}\s+.+").expect("header pattern is valid"));
static LIST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*[-*+]\s+.+|^\s*\d+\.\s+.+").expect("list pattern is valid")
});
static QUOTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^>\s+.+").expect("quote pattern is valid"));
static PARAGRAPH_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n\s*\n").expect("paragraph pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    WideLandscape,
    Landscape,
    Square,
    Portrait,
    TallPortrait,
}

impl Shape {
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio > WIDE_RATIO {
            Shape::WideLandscape
        } else if ratio > LANDSCAPE_RATIO {
            Shape::Landscape
        } else if ratio < TALL_RATIO {
            Shape::TallPortrait
        } else if ratio < PORTRAIT_RATIO {
            Shape::Portrait
        } else {
            Shape::Square
        }
    }

    pub fn is_landscape(self) -> bool {
        matches!(self, Shape::WideLandscape | Shape::Landscape)
    }

    pub fn is_portrait(self) -> bool {
        matches!(self, Shape::Portrait | Shape::TallPortrait)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DominantType {
    Landscape,
    Portrait,
    Square,
    Mixed,
    Balanced,
    Unknown,
}

impl DominantType {
    pub fn as_str(self) -> &'static str {
        match self {
            DominantType::Landscape => "landscape_dominant",
            DominantType::Portrait => "portrait_dominant",
            DominantType::Square => "square_dominant",
            DominantType::Mixed => "mixed_orientation",
            DominantType::Balanced => "balanced",
            DominantType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DominantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate shape statistics. Items without both dimensions count toward
/// `total` but not toward any shape or ratio statistic.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaFeatures {
    pub total: usize,
    pub landscape: usize,
    pub portrait: usize,
    pub square: usize,
    pub videos: usize,
    pub min_ratio: Option<f64>,
    pub max_ratio: Option<f64>,
    pub avg_ratio: f64,
    /// Population variance of the aspect ratios.
    pub ratio_variance: f64,
    pub dominant: DominantType,
}

impl MediaFeatures {
    pub fn from_inputs(media: &[MediaFeatureInput]) -> Self {
        let mut features = MediaFeatures {
            total: media.len(),
            landscape: 0,
            portrait: 0,
            square: 0,
            videos: 0,
            min_ratio: None,
            max_ratio: None,
            avg_ratio: 0.0,
            ratio_variance: 0.0,
            dominant: DominantType::Unknown,
        };

        let mut ratios = Vec::with_capacity(media.len());
        for item in media {
            if item.kind == MediaKind::Video {
                features.videos += 1;
            }
            if item.width == 0 || item.height == 0 {
                continue;
            }

            let ratio = f64::from(item.width) / f64::from(item.height);
            ratios.push(ratio);
            features.min_ratio = Some(features.min_ratio.map_or(ratio, |min| min.min(ratio)));
            features.max_ratio = Some(features.max_ratio.map_or(ratio, |max| max.max(ratio)));

            let shape = Shape::from_ratio(ratio);
            if shape.is_landscape() {
                features.landscape += 1;
            } else if shape.is_portrait() {
                features.portrait += 1;
            } else {
                features.square += 1;
            }
        }

        if !ratios.is_empty() {
            let count = ratios.len() as f64;
            features.avg_ratio = ratios.iter().sum::<f64>() / count;
            features.ratio_variance = ratios
                .iter()
                .map(|r| (r - features.avg_ratio).powi(2))
                .sum::<f64>()
                / count;
        }

        features.dominant = features.dominant_type();
        features
    }

    pub fn landscape_share(&self) -> f64 {
        self.share(self.landscape)
    }

    pub fn portrait_share(&self) -> f64 {
        self.share(self.portrait)
    }

    pub fn square_share(&self) -> f64 {
        self.share(self.square)
    }

    pub fn is_mixed_orientation(&self) -> bool {
        self.landscape > 0 && self.portrait > 0
    }

    fn share(&self, count: usize) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            count as f64 / self.total as f64
        }
    }

    fn dominant_type(&self) -> DominantType {
        if self.total == 0 {
            DominantType::Unknown
        } else if self.landscape_share() >= 0.6 {
            DominantType::Landscape
        } else if self.portrait_share() >= 0.6 {
            DominantType::Portrait
        } else if self.square_share() >= 0.6 {
            DominantType::Square
        } else if self.is_mixed_orientation() {
            DominantType::Mixed
        } else {
            DominantType::Balanced
        }
    }
}

/// Structural signals of the markdown text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentFeatures {
    pub content: String,
    /// In characters.
    pub length: usize,
    pub has_code: bool,
    pub has_links: bool,
    pub has_images_in_text: bool,
    pub has_headers: bool,
    pub has_lists: bool,
    pub has_quotes: bool,
    pub line_count: usize,
    pub paragraph_count: usize,
}

impl ContentFeatures {
    pub fn from_text(content: &str) -> Self {
        Self {
            content: content.to_string(),
            length: content.chars().count(),
            has_code: CODE.is_match(content),
            has_links: LINK.is_match(content),
            has_images_in_text: IMAGE.is_match(content),
            has_headers: HEADER.is_match(content),
            has_lists: LIST.is_match(content),
            has_quotes: QUOTE.is_match(content),
            line_count: content.split('\n').count(),
            paragraph_count: PARAGRAPH_BREAK
                .split(content)
                .filter(|p| !p.trim().is_empty())
                .count(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Technical,
    Photography,
    Tutorial,
    Narrative,
    Discussion,
    Journal,
    Generic,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Technical => "technical",
            ContentType::Photography => "photography",
            ContentType::Tutorial => "tutorial",
            ContentType::Narrative => "narrative",
            ContentType::Discussion => "discussion",
            ContentType::Journal => "journal",
            ContentType::Generic => "generic",
        }
    }

    /// Tags are checked first, in order, then code, then wording, then length.
    pub fn classify(content: &ContentFeatures, tags: &[String]) -> Self {
        for tag in tags {
            let tag = tag.to_lowercase();
            if contains_any(&tag, TAG_PHOTOGRAPHY) {
                return ContentType::Photography;
            }
            if contains_any(&tag, TAG_TUTORIAL) {
                return ContentType::Tutorial;
            }
            if contains_any(&tag, TAG_NARRATIVE) {
                return ContentType::Narrative;
            }
            if contains_any(&tag, TAG_TECHNICAL) {
                return ContentType::Technical;
            }
        }

        if content.has_code {
            return ContentType::Technical;
        }

        let text = content.content.to_lowercase();
        if contains_any(&text, TEXT_TUTORIAL) {
            return ContentType::Tutorial;
        }
        if contains_any(&text, TEXT_DISCUSSION) {
            return ContentType::Discussion;
        }
        if contains_any(&text, TEXT_NARRATIVE) {
            return ContentType::Narrative;
        }
        if content.length < 30 && contains_any(&text, TEXT_PHOTOGRAPHY) {
            return ContentType::Photography;
        }

        if content.length > 200 {
            if content.has_headers || content.has_lists {
                return ContentType::Tutorial;
            }
            return ContentType::Journal;
        }

        ContentType::Generic
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const TAG_PHOTOGRAPHY: &[&str] = &[
    "摄影", "photo", "photography", "风景", "portrait", "街拍", "随拍", "art", "艺术", "设计",
    "插画",
];
const TAG_TUTORIAL: &[&str] = &["教程", "tutorial", "指南", "guide", "步骤", "how"];
const TAG_NARRATIVE: &[&str] = &["旅行", "travel", "游记", "旅途", "故事", "story"];
const TAG_TECHNICAL: &[&str] = &["code", "编程", "技术", "开发", "代码", "程序"];

const TEXT_TUTORIAL: &[&str] = &["第一步", "第二步", "步骤", "如何", "教程", "方法"];
const TEXT_DISCUSSION: &[&str] = &["请问", "有人", "怎么", "为什么", "吗？", "呢？"];
const TEXT_NARRATIVE: &[&str] = &["今天", "昨天", "从...到", "第一天", "一路", "旅途"];
const TEXT_PHOTOGRAPHY: &[&str] = &["拍", "好美", "美丽", "漂亮", "❤", "😍", "🌸"];

/// Where the text should sit relative to the media.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextPosition {
    Top,
    Bottom,
}

impl TextPosition {
    pub fn infer(content: &ContentFeatures) -> Self {
        if content.length >= 100
            || content.has_code
            || content.paragraph_count >= 2
            || content.has_headers
            || content.has_lists
        {
            TextPosition::Top
        } else {
            TextPosition::Bottom
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TextPosition::Top => "top",
            TextPosition::Bottom => "bottom",
        }
    }
}

pub(crate) fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Everything the scorer and the prompt builder look at.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutAnalysis {
    pub media: MediaFeatures,
    pub content: ContentFeatures,
    pub tags: Vec<String>,
    pub content_type: ContentType,
    pub text_position: TextPosition,
}

impl LayoutAnalysis {
    pub fn new(media: &[MediaFeatureInput], content: &str, tags: &[String]) -> Self {
        let media = MediaFeatures::from_inputs(media);
        let content = ContentFeatures::from_text(content);
        let content_type = ContentType::classify(&content, tags);
        let text_position = TextPosition::infer(&content);
        Self {
            media,
            content,
            tags: tags.to_vec(),
            content_type,
            text_position,
        }
    }
}
