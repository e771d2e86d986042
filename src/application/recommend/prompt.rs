//! Prompt construction and output parsing for the generated layout hint.

use std::fmt::Write as _;

use crate::{application::recommend::features::LayoutAnalysis, domain::types::Layout};

const PREVIEW_CHARS: usize = 300;

/// Lookup order when the output names a layout somewhere inside free text.
const SEARCH_ORDER: [Layout; 4] = [
    Layout::Waterfall,
    Layout::Grid,
    Layout::Horizontal,
    Layout::Carousel,
];

pub const SYSTEM_PROMPT: &str = "\
You are a social media layout expert. Weigh all of the information below and \
recommend the best layout. Readers can open any image full screen, so the layout \
decides the first impression only.

Layouts:
- grid: square thumbnails, up to 9 shown (+N beyond), text above the images. \
Good when the text matters first (code, long posts, discussion) or for previewing many images.
- waterfall: original aspect ratios in two staggered columns, text below. \
Good when the images are the point (photography, design, food, outfits), for mixed \
orientations, and for short or empty text.
- horizontal: fixed height, scrolled sideways, text above. Good for landscapes, \
panoramas and sequences such as trips or processes.
- carousel: one full image at a time with navigation, text below. Good for \
tutorials, step by step content, comparisons and ten or more images.

Signals, strongest first: the intent of the text, code blocks and long text (grid), \
short text or emoji (waterfall), mostly landscape images (horizontal), tutorial \
wording (carousel), then tags.

Reply with exactly one line in the form layout|reason, where layout is one of \
grid, waterfall, horizontal, carousel and reason has at most ten words.
Examples:
grid|code sharing, read first
waterfall|photography, keep ratios
horizontal|all landscape, gallery
carousel|tutorial steps, one by one";

pub fn build_prompt(analysis: &LayoutAnalysis) -> String {
    let content = &analysis.content;
    let media = &analysis.media;
    let mut prompt = String::new();

    if content.content.is_empty() {
        prompt.push_str("## Post text\n\n(no text, images only)\n\n");
    } else {
        let mut preview: String = content.content.chars().take(PREVIEW_CHARS).collect();
        if content.length > PREVIEW_CHARS {
            preview.push_str("...");
        }
        let _ = write!(prompt, "## Post text (most important)\n\n{preview}\n\n");
    }

    let tags = if analysis.tags.is_empty() {
        "none".to_string()
    } else {
        analysis.tags.join(", ")
    };
    let ratio_mix = if media.is_mixed_orientation() {
        "mixed orientation"
    } else if media.ratio_variance > 0.25 {
        "widely varying ratios"
    } else {
        "consistent ratios"
    };

    let _ = write!(
        prompt,
        "## Text features\n\
         - length: {} characters\n\
         - lines/paragraphs: {}/{}\n\
         - tags: {}\n\
         - code block: {}\n\
         - headers/lists/quotes: {}/{}/{}\n\
         - inferred content type: {}\n\
         - suggested text position: {}\n\n\
         ## Media\n\
         - images: {}\n\
         - landscape/portrait/square: {}/{}/{} ({:.0}% landscape)\n\
         - ratios: {}\n\
         - dominant shape: {}\n\n\
         Weigh the meaning of the text together with the image features and recommend \
         the most suitable layout.",
        content.length,
        content.line_count,
        content.paragraph_count,
        tags,
        content.has_code,
        content.has_headers,
        content.has_lists,
        content.has_quotes,
        analysis.content_type,
        analysis.text_position.as_str(),
        media.total.saturating_sub(media.videos),
        media.landscape,
        media.portrait,
        media.square,
        media.landscape_share() * 100.0,
        ratio_mix,
        media.dominant,
    );

    prompt
}

/// Parses `layout|reason`, a bare layout name, or free text naming one.
/// `None` when no known layout can be found.
pub fn parse_layout_output(output: &str) -> Option<(Layout, String)> {
    let output = output.trim();

    if let Some((name, reason)) = output.split_once('|') {
        let layout = name.trim().to_lowercase().parse().ok()?;
        return Some((layout, reason.trim().to_string()));
    }

    let lowered = output.to_lowercase();
    SEARCH_ORDER
        .iter()
        .find(|layout| lowered == layout.as_str())
        .or_else(|| {
            SEARCH_ORDER
                .iter()
                .find(|layout| lowered.contains(layout.as_str()))
        })
        .map(|layout| (*layout, String::new()))
}
