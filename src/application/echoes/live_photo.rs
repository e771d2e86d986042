//! Live photo pairing.
//!
//! A client marks the still and moving halves of a live photo with the same
//! token. Pairing is a single directed edge from the image to the video.

use std::collections::BTreeMap;

use crate::domain::types::MediaKind;

#[derive(Default)]
struct TokenGroup {
    images: Vec<usize>,
    videos: Vec<usize>,
}

pub struct LiveLinker;

impl LiveLinker {
    /// Maps image index to video index for every token shared by exactly one
    /// image and exactly one video. `tokens` is aligned with `kinds`; an empty
    /// token means unpaired.
    pub fn link(kinds: &[MediaKind], tokens: &[&str]) -> BTreeMap<usize, usize> {
        let mut groups: BTreeMap<&str, TokenGroup> = BTreeMap::new();

        for (index, (kind, token)) in kinds.iter().zip(tokens).enumerate() {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            let group = groups.entry(token).or_default();
            match kind {
                MediaKind::Image => group.images.push(index),
                MediaKind::Video => group.videos.push(index),
            }
        }

        groups
            .into_values()
            .filter_map(|group| match (group.images.as_slice(), group.videos.as_slice()) {
                (&[image], &[video]) => Some((image, video)),
                _ => None,
            })
            .collect()
    }
}
