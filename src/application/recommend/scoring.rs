//! Rule-based layout scoring.
//!
//! Every rule adds to one or more candidates; nothing overrides. The first
//! rule to give a candidate a reason names it, unless a rule marked as
//! decisive overwrites it. Candidates are kept in a fixed array so ties never
//! depend on iteration order: the earliest candidate wins a tie.

use crate::{
    application::recommend::features::{ContentType, LayoutAnalysis, contains_any},
    domain::types::Layout,
};

const CANDIDATES: [Layout; 4] = [
    Layout::Grid,
    Layout::Waterfall,
    Layout::Horizontal,
    Layout::Carousel,
];

const TAG_VISUAL: &[&str] = &["摄影", "photo", "风景", "随拍", "设计", "插画", "美食", "穿搭"];
const TAG_TUTORIAL: &[&str] = &["教程", "tutorial", "步骤", "指南", "how"];
const TAG_TRAVEL: &[&str] = &["旅行", "travel", "游记", "旅途", "全景"];
const TAG_TECHNICAL: &[&str] = &["代码", "code", "技术", "开发", "编程"];

/// Winning candidate of the rule scorer.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredLayout {
    pub layout: Layout,
    pub score: f64,
    pub reason: &'static str,
}

#[derive(Debug, Default)]
struct Board {
    scores: [f64; 4],
    reasons: [Option<&'static str>; 4],
}

impl Board {
    fn slot(layout: Layout) -> usize {
        match layout {
            Layout::Grid => 0,
            Layout::Waterfall => 1,
            Layout::Horizontal => 2,
            Layout::Carousel => 3,
        }
    }

    fn add(&mut self, layout: Layout, points: f64) {
        self.scores[Self::slot(layout)] += points;
    }

    /// Sets the reason unless an earlier rule already did.
    fn suggest(&mut self, layout: Layout, reason: &'static str) {
        self.reasons[Self::slot(layout)].get_or_insert(reason);
    }

    fn insist(&mut self, layout: Layout, reason: &'static str) {
        self.reasons[Self::slot(layout)] = Some(reason);
    }

    fn score(&self, layout: Layout) -> f64 {
        self.scores[Self::slot(layout)]
    }

    fn winner(&self) -> ScoredLayout {
        let mut best = CANDIDATES[0];
        for candidate in &CANDIDATES[1..] {
            if self.score(*candidate) > self.score(best) {
                best = *candidate;
            }
        }
        ScoredLayout {
            layout: best,
            score: self.score(best),
            reason: self.reasons[Self::slot(best)].unwrap_or_else(|| fallback_reason(best)),
        }
    }
}

pub fn fallback_reason(layout: Layout) -> &'static str {
    match layout {
        Layout::Grid => "overall recommendation",
        Layout::Waterfall => "full display",
        Layout::Horizontal => "continuous browsing",
        Layout::Carousel => "one by one",
    }
}

/// Deterministic for a given analysis.
pub fn score(analysis: &LayoutAnalysis) -> ScoredLayout {
    let mut board = Board::default();
    score_text(&mut board, analysis);
    score_count(&mut board, analysis);
    score_shapes(&mut board, analysis);
    score_content_type(&mut board, analysis);
    score_tags(&mut board, analysis);
    score_combinations(&mut board, analysis);
    board.winner()
}

fn score_text(board: &mut Board, analysis: &LayoutAnalysis) {
    let content = &analysis.content;

    if content.has_code {
        board.add(Layout::Grid, 35.0);
        board.add(Layout::Horizontal, 10.0);
        board.insist(Layout::Grid, "code sharing");
    }

    let structure = [
        (content.has_headers, 10.0),
        (content.has_lists, 10.0),
        (content.has_quotes, 5.0),
    ]
    .iter()
    .filter(|(present, _)| *present)
    .map(|(_, points)| points)
    .sum::<f64>();
    if structure > 0.0 {
        board.add(Layout::Grid, structure);
        board.add(Layout::Horizontal, structure * 0.5);
        board.suggest(Layout::Grid, "structured content");
    }

    match content.length {
        150.. => {
            board.add(Layout::Grid, 30.0);
            board.add(Layout::Horizontal, 15.0);
            board.suggest(Layout::Grid, "long text");
        }
        80..150 => {
            board.add(Layout::Grid, 20.0);
            board.add(Layout::Horizontal, 10.0);
            board.add(Layout::Waterfall, 5.0);
        }
        30..80 => {
            board.add(Layout::Grid, 10.0);
            board.add(Layout::Waterfall, 10.0);
            board.add(Layout::Horizontal, 5.0);
        }
        _ => {
            board.add(Layout::Waterfall, 25.0);
            board.add(Layout::Carousel, 15.0);
            board.suggest(Layout::Waterfall, "image showcase");
        }
    }
}

fn score_count(board: &mut Board, analysis: &LayoutAnalysis) {
    match analysis.media.total {
        15.. => {
            board.add(Layout::Carousel, 25.0);
            board.add(Layout::Grid, 15.0);
            board.suggest(Layout::Carousel, "many images");
        }
        10..15 => {
            board.add(Layout::Carousel, 20.0);
            board.add(Layout::Grid, 15.0);
            board.add(Layout::Waterfall, 5.0);
        }
        5..10 => {
            board.add(Layout::Grid, 15.0);
            board.add(Layout::Waterfall, 10.0);
            board.add(Layout::Carousel, 8.0);
            board.add(Layout::Horizontal, 8.0);
        }
        3 | 4 => {
            board.add(Layout::Waterfall, 15.0);
            board.add(Layout::Grid, 12.0);
            board.add(Layout::Horizontal, 10.0);
        }
        2 => {
            board.add(Layout::Waterfall, 18.0);
            board.add(Layout::Grid, 10.0);
        }
        1 => {
            board.add(Layout::Waterfall, 20.0);
            board.add(Layout::Grid, 12.0);
            board.suggest(Layout::Waterfall, "single image");
        }
        _ => {}
    }
}

fn score_shapes(board: &mut Board, analysis: &LayoutAnalysis) {
    let media = &analysis.media;
    if media.total == 0 {
        return;
    }

    let landscape = media.landscape_share();
    if landscape >= 0.9 && media.total >= 3 {
        board.add(Layout::Horizontal, 30.0);
        board.insist(Layout::Horizontal, "all landscape");
    } else if landscape >= 0.7 && media.total >= 3 {
        board.add(Layout::Horizontal, 25.0);
        board.suggest(Layout::Horizontal, "mostly landscape");
    } else if landscape >= 0.5 {
        board.add(Layout::Horizontal, 15.0);
    }

    if media.portrait_share() >= 0.8 {
        board.add(Layout::Waterfall, 20.0);
        board.suggest(Layout::Waterfall, "portrait");
    }

    if media.square_share() >= 0.8 {
        board.add(Layout::Grid, 15.0);
    }

    if media.is_mixed_orientation() {
        let points = if media.ratio_variance > 0.3 { 30.0 } else { 20.0 };
        board.add(Layout::Waterfall, points);
        board.suggest(Layout::Waterfall, "mixed ratios");
    }

    if media.ratio_variance > 0.25 {
        board.add(Layout::Waterfall, 15.0);
        board.add(Layout::Grid, -10.0);
    }
}

fn score_content_type(board: &mut Board, analysis: &LayoutAnalysis) {
    match analysis.content_type {
        ContentType::Technical => {
            board.add(Layout::Grid, 20.0);
            board.suggest(Layout::Grid, "technical content");
        }
        ContentType::Photography => {
            board.add(Layout::Waterfall, 30.0);
            board.insist(Layout::Waterfall, "photography");
        }
        ContentType::Tutorial => {
            board.add(Layout::Carousel, 25.0);
            board.add(Layout::Grid, 15.0);
            board.suggest(Layout::Carousel, "tutorial steps");
        }
        ContentType::Narrative => {
            board.add(Layout::Horizontal, 25.0);
            board.add(Layout::Waterfall, 15.0);
            board.suggest(Layout::Horizontal, "story or process");
        }
        ContentType::Discussion => {
            board.add(Layout::Grid, 20.0);
            board.suggest(Layout::Grid, "discussion");
        }
        ContentType::Journal | ContentType::Generic => {}
    }
}

fn score_tags(board: &mut Board, analysis: &LayoutAnalysis) {
    for tag in &analysis.tags {
        let tag = tag.to_lowercase();
        if contains_any(&tag, TAG_VISUAL) {
            board.add(Layout::Waterfall, 12.0);
            board.suggest(Layout::Waterfall, "visual content");
        }
        if contains_any(&tag, TAG_TUTORIAL) {
            board.add(Layout::Carousel, 12.0);
            board.suggest(Layout::Carousel, "tutorial content");
        }
        if contains_any(&tag, TAG_TRAVEL) {
            board.add(Layout::Horizontal, 12.0);
            board.suggest(Layout::Horizontal, "travel log");
        }
        if contains_any(&tag, TAG_TECHNICAL) {
            board.add(Layout::Grid, 10.0);
        }
    }
}

fn score_combinations(board: &mut Board, analysis: &LayoutAnalysis) {
    let length = analysis.content.length;

    if length < 50 && analysis.content_type == ContentType::Photography && analysis.media.total <= 6
    {
        board.add(Layout::Waterfall, 15.0);
    }
    if length >= 100 && analysis.content.has_code {
        board.add(Layout::Grid, 15.0);
    }
    if analysis.media.landscape >= 3 && analysis.content_type == ContentType::Narrative {
        board.add(Layout::Horizontal, 15.0);
    }
}

#[cfg(test)]
mod tests {
    use echoes_api_types::MediaFeatureInput;

    use super::*;
    use crate::domain::types::MediaKind;

    fn image(width: u32, height: u32) -> MediaFeatureInput {
        MediaFeatureInput {
            kind: MediaKind::Image,
            width,
            height,
        }
    }

    #[test]
    fn mixed_orientation_without_text_is_waterfall() {
        let analysis = LayoutAnalysis::new(
            &[image(1200, 800), image(800, 1200), image(900, 900)],
            "",
            &[],
        );
        let scored = score(&analysis);
        assert_eq!(scored.layout, Layout::Waterfall);
        assert_eq!(scored.score, 60.0);
        assert_eq!(scored.reason, "image showcase");
    }

    #[test]
    fn code_with_square_images_is_grid() {
        let mut content = String::from("```rust\nfn main() { println!(\"hi\"); }\n```\n");
        while content.chars().count() < 220 {
            content.push('x');
        }
        let analysis = LayoutAnalysis::new(&[image(900, 900); 3], &content, &[]);
        assert_eq!(analysis.content.length, 220);

        let scored = score(&analysis);
        assert_eq!(scored.layout, Layout::Grid);
        assert_eq!(scored.score, 127.0);
        assert_eq!(scored.reason, "code sharing");
    }

    #[test]
    fn many_images_with_short_caption_is_carousel() {
        let analysis = LayoutAnalysis::new(&[image(1000, 1000); 14], "weekend", &[]);
        let scored = score(&analysis);
        assert_eq!(scored.layout, Layout::Carousel);
        assert_eq!(scored.score, 35.0);
        assert_eq!(scored.reason, "one by one");
    }

    #[test]
    fn ties_go_to_the_earliest_candidate() {
        let mut board = Board::default();
        board.add(Layout::Carousel, 10.0);
        board.add(Layout::Waterfall, 10.0);
        assert_eq!(board.winner().layout, Layout::Waterfall);

        assert_eq!(Board::default().winner().layout, Layout::Grid);
        assert_eq!(Board::default().winner().reason, "overall recommendation");
    }

    #[test]
    fn first_reason_sticks_unless_insisted() {
        let mut board = Board::default();
        board.suggest(Layout::Waterfall, "first");
        board.suggest(Layout::Waterfall, "second");
        board.add(Layout::Waterfall, 1.0);
        assert_eq!(board.winner().reason, "first");

        board.insist(Layout::Waterfall, "photography");
        assert_eq!(board.winner().reason, "photography");
    }

    #[test]
    fn scoring_is_repeatable() {
        let analysis = LayoutAnalysis::new(
            &[image(1920, 1080), image(1920, 1080), image(1080, 1920)],
            "今天 一路向西",
            &["travel".to_string()],
        );
        let first = score(&analysis);
        for _ in 0..16 {
            assert_eq!(score(&analysis), first);
        }
    }
}
