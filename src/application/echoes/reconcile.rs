//! Media list reconciliation.
//!
//! Turns the persisted media of an echo plus the requested list into a plan
//! of row mutations. Row ids are referenced from outside the aggregate (live
//! photo links, bookmarks), so the plan never deletes and reinserts a row whose
//! URL survives the update.
//!
//! Two plans exist:
//!
//! * [`ReorderPlan`]: the request holds exactly the existing URLs (as a
//!   multiset). Every existing id survives; row `rows[i]` takes the content of
//!   requested item `i`, and live photo links are rebuilt over the new
//!   positions.
//! * [`MergePlan`]: anything else. Rows are matched by URL, matched rows keep
//!   their id and link, unmatched existing rows are deleted and unmatched
//!   requested items are inserted.
//!
//! Both plans store media in request order.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use uuid::Uuid;

use crate::{
    application::echoes::live_photo::LiveLinker,
    domain::{echoes::MediaDraft, entities::MediaRecord, types::MediaKind},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaPlan {
    Reorder(ReorderPlan),
    Merge(MergePlan),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorderPlan {
    /// `rows[i]` is overwritten with requested item `i` at position `i`.
    pub rows: Vec<Uuid>,
    /// Image row to video row, after the overwrite.
    pub links: BTreeMap<Uuid, Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeptMedia {
    pub id: Uuid,
    pub position: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergePlan {
    pub delete: Vec<Uuid>,
    pub keep: Vec<KeptMedia>,
    /// Requested indices that need a new row.
    pub insert: Vec<usize>,
    /// Kept images whose linked video is deleted.
    pub unlink: Vec<Uuid>,
    /// Requested index pairs (image, video) among inserted items.
    pub links: BTreeMap<usize, usize>,
}

impl MediaPlan {
    pub fn is_reorder(&self) -> bool {
        matches!(self, MediaPlan::Reorder(_))
    }
}

pub struct MediaReconciler;

impl MediaReconciler {
    pub fn plan(existing: &[MediaRecord], requested: &[MediaDraft]) -> MediaPlan {
        if !requested.is_empty() && same_urls(existing, requested) {
            MediaPlan::Reorder(plan_reorder(existing, requested))
        } else {
            MediaPlan::Merge(plan_merge(existing, requested))
        }
    }
}

fn same_urls(existing: &[MediaRecord], requested: &[MediaDraft]) -> bool {
    if existing.len() != requested.len() {
        return false;
    }
    let mut counts: HashMap<&str, isize> = HashMap::new();
    for media in existing {
        *counts.entry(media.url.as_str()).or_default() += 1;
    }
    for media in requested {
        *counts.entry(media.url.as_str()).or_default() -= 1;
    }
    counts.values().all(|count| *count == 0)
}

fn plan_reorder(existing: &[MediaRecord], requested: &[MediaDraft]) -> ReorderPlan {
    let rows: Vec<Uuid> = existing.iter().map(|media| media.id).collect();

    let locate = |url: &str, kind: MediaKind| {
        requested
            .iter()
            .position(|media| media.url == url && media.kind == kind)
    };

    // Links requested through tokens win; surviving links are carried over
    // by URL for every image and video the tokens left untouched.
    let kinds: Vec<MediaKind> = requested.iter().map(|media| media.kind).collect();
    let tokens: Vec<&str> = requested
        .iter()
        .map(|media| media.pair_token.as_deref().unwrap_or(""))
        .collect();
    let mut index_links = LiveLinker::link(&kinds, &tokens);
    let mut linked_videos: BTreeSet<usize> = index_links.values().copied().collect();

    let by_id: HashMap<Uuid, &MediaRecord> = existing.iter().map(|m| (m.id, m)).collect();
    for image in existing.iter().filter(|m| m.kind == MediaKind::Image) {
        let Some(video) = image.live_video_id.and_then(|id| by_id.get(&id)) else {
            continue;
        };
        let (Some(image_at), Some(video_at)) = (
            locate(&image.url, MediaKind::Image),
            locate(&video.url, MediaKind::Video),
        ) else {
            continue;
        };
        if index_links.contains_key(&image_at) || linked_videos.contains(&video_at) {
            continue;
        }
        index_links.insert(image_at, video_at);
        linked_videos.insert(video_at);
    }

    let links = index_links
        .into_iter()
        .map(|(image_at, video_at)| (rows[image_at], rows[video_at]))
        .collect();

    ReorderPlan { rows, links }
}

fn plan_merge(existing: &[MediaRecord], requested: &[MediaDraft]) -> MergePlan {
    let mut unmatched: Vec<Option<&MediaRecord>> = existing.iter().map(Some).collect();
    let mut plan = MergePlan::default();

    for (index, media) in requested.iter().enumerate() {
        let matched = unmatched
            .iter_mut()
            .find(|slot| slot.is_some_and(|row| row.url == media.url))
            .and_then(Option::take);
        match matched {
            Some(row) => plan.keep.push(KeptMedia {
                id: row.id,
                position: position(index),
            }),
            None => plan.insert.push(index),
        }
    }

    plan.delete = unmatched.iter().flatten().map(|row| row.id).collect();

    let deleted: BTreeSet<Uuid> = plan.delete.iter().copied().collect();
    let kept: BTreeSet<Uuid> = plan.keep.iter().map(|k| k.id).collect();
    plan.unlink = existing
        .iter()
        .filter(|row| kept.contains(&row.id))
        .filter(|row| row.live_video_id.is_some_and(|video| deleted.contains(&video)))
        .map(|row| row.id)
        .collect();

    let kinds: Vec<MediaKind> = plan.insert.iter().map(|&i| requested[i].kind).collect();
    let tokens: Vec<&str> = plan
        .insert
        .iter()
        .map(|&i| requested[i].pair_token.as_deref().unwrap_or(""))
        .collect();
    plan.links = LiveLinker::link(&kinds, &tokens)
        .into_iter()
        .map(|(image, video)| (plan.insert[image], plan.insert[video]))
        .collect();

    plan
}

pub(crate) fn position(index: usize) -> i32 {
    i32::try_from(index).unwrap_or(i32::MAX)
}
