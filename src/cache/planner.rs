//! Invalidation planning.
//!
//! Translates committed mutations into the set of cache entries and groups
//! that may now hold pre-mutation data.

use std::collections::BTreeSet;
use std::fmt;

use uuid::Uuid;

use super::keys::{CacheGroup, RECENT_SUMMARY_KEY};

/// A committed write, as far as the cache is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoMutation {
    Created(Uuid),
    Updated(Uuid),
    Deleted(Uuid),
    Liked(Uuid),
    TagDeleted(Uuid),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InvalidationPlan {
    /// Single-echo snapshots to drop.
    pub echoes: BTreeSet<Uuid>,
    /// Drop every single-echo snapshot (tag names are embedded in all of them).
    pub all_echoes: bool,
    pub groups: BTreeSet<CacheGroup>,
    pub text_keys: BTreeSet<&'static str>,
}

impl fmt::Display for InvalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InvalidationPlan {{ echoes: {}, all_echoes: {}, groups: {:?}, text: {} }}",
            self.echoes.len(),
            self.all_echoes,
            self.groups,
            self.text_keys.len(),
        )
    }
}

impl InvalidationPlan {
    pub fn for_mutation(mutation: EchoMutation) -> Self {
        let mut plan = Self::default();
        plan.groups.extend(CacheGroup::ALL);

        match mutation {
            EchoMutation::Created(_) => {
                plan.text_keys.insert(RECENT_SUMMARY_KEY);
            }
            EchoMutation::Updated(id) | EchoMutation::Deleted(id) => {
                plan.echoes.insert(id);
                plan.text_keys.insert(RECENT_SUMMARY_KEY);
            }
            EchoMutation::Liked(id) => {
                plan.echoes.insert(id);
            }
            EchoMutation::TagDeleted(_) => {
                plan.all_echoes = true;
                plan.text_keys.insert(RECENT_SUMMARY_KEY);
            }
        }

        plan
    }

    /// Merges several mutations into one plan.
    pub fn from_mutations(mutations: impl IntoIterator<Item = EchoMutation>) -> Self {
        mutations
            .into_iter()
            .map(Self::for_mutation)
            .fold(Self::default(), |mut acc, plan| {
                acc.merge(plan);
                acc
            })
    }

    pub fn merge(&mut self, other: InvalidationPlan) {
        self.all_echoes |= other.all_echoes;
        self.echoes.extend(other.echoes);
        self.groups.extend(other.groups);
        self.text_keys.extend(other.text_keys);
        if self.all_echoes {
            self.echoes.clear();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.echoes.is_empty()
            && !self.all_echoes
            && self.groups.is_empty()
            && self.text_keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_touches_groups_and_summary_only() {
        let plan = InvalidationPlan::for_mutation(EchoMutation::Created(Uuid::new_v4()));
        assert!(plan.echoes.is_empty());
        assert_eq!(plan.groups.len(), 2);
        assert!(plan.text_keys.contains(RECENT_SUMMARY_KEY));
    }

    #[test]
    fn like_keeps_summary() {
        let id = Uuid::new_v4();
        let plan = InvalidationPlan::for_mutation(EchoMutation::Liked(id));
        assert!(plan.echoes.contains(&id));
        assert!(plan.text_keys.is_empty());
    }

    #[test]
    fn merging_dedupes_and_tag_delete_widens() {
        let a = Uuid::new_v4();
        let plan = InvalidationPlan::from_mutations([
            EchoMutation::Updated(a),
            EchoMutation::Liked(a),
        ]);
        assert_eq!(plan.echoes.len(), 1);
        assert!(!plan.all_echoes);

        let widened = InvalidationPlan::from_mutations([
            EchoMutation::Updated(a),
            EchoMutation::TagDeleted(Uuid::new_v4()),
        ]);
        assert!(widened.all_echoes);
        assert!(widened.echoes.is_empty());
    }

    #[test]
    fn empty_plan() {
        assert!(InvalidationPlan::default().is_empty());
        assert!(InvalidationPlan::from_mutations([]).is_empty());
    }
}
