use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{EchoTx, RepoError},
    domain::{entities::TagRecord, error::DomainError},
};

const TAG_MARKER: char = '#';

pub struct TagResolver;

impl TagResolver {
    /// Strips one leading `#` marker and surrounding whitespace. `None` when
    /// nothing is left.
    pub fn normalize(raw: &str) -> Option<String> {
        let trimmed = raw.trim();
        let name = trimmed.strip_prefix(TAG_MARKER).unwrap_or(trimmed).trim();
        (!name.is_empty()).then(|| name.to_string())
    }

    /// Normalises a batch, skipping empties and keeping the first occurrence.
    pub fn normalize_all<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
        let mut names: Vec<String> = Vec::with_capacity(raw.len());
        for name in raw.iter().filter_map(|r| Self::normalize(r.as_ref())) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    /// Looks every name up in one query, bumps the usage of the ones that
    /// exist and creates the rest with a usage of one.
    pub async fn resolve<S: AsRef<str>>(
        tx: &mut dyn EchoTx,
        raw: &[S],
    ) -> Result<Vec<TagRecord>, RepoError> {
        let names = Self::normalize_all(raw);
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let mut existing = tx.find_tags_by_names(&names).await?;
        let mut resolved = Vec::with_capacity(names.len());

        for name in names {
            match existing.iter().position(|tag| tag.name == name) {
                Some(at) => {
                    let mut tag = existing.swap_remove(at);
                    tx.increment_tag_usage(tag.id).await?;
                    tag.usage_count += 1;
                    resolved.push(tag);
                }
                None => resolved.push(Self::insert(tx, name).await?),
            }
        }

        Ok(resolved)
    }

    /// Creates a single tag. An empty name is a validation error here, unlike
    /// in a batch where it is skipped.
    pub async fn create(tx: &mut dyn EchoTx, raw: &str) -> Result<TagRecord, CreateTagError> {
        let name = Self::normalize(raw)
            .ok_or_else(|| DomainError::validation("tag", "name must not be empty"))?;

        let mut found = tx.find_tags_by_names(std::slice::from_ref(&name)).await?;
        if let Some(tag) = found.pop() {
            return Ok(tag);
        }
        Ok(Self::insert(tx, name).await?)
    }

    async fn insert(tx: &mut dyn EchoTx, name: String) -> Result<TagRecord, RepoError> {
        let tag = TagRecord {
            id: Uuid::new_v4(),
            name,
            usage_count: 1,
            created_at: OffsetDateTime::now_utc(),
        };
        tx.insert_tag(&tag).await?;
        Ok(tag)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CreateTagError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_marker_and_whitespace() {
        assert_eq!(TagResolver::normalize("  #rust "), Some("rust".to_string()));
        assert_eq!(TagResolver::normalize("# spaced"), Some("spaced".to_string()));
        assert_eq!(TagResolver::normalize(" # "), None);
        assert_eq!(TagResolver::normalize("Rust"), Some("Rust".to_string()));
    }

    #[test]
    fn only_one_marker_is_stripped() {
        assert_eq!(TagResolver::normalize("##rust"), Some("#rust".to_string()));
        assert_eq!(TagResolver::normalize(" ## "), Some("#".to_string()));
    }

    #[test]
    fn batch_dedupes_case_sensitively() {
        let names = TagResolver::normalize_all(&["#a", "a", "", "A", "#b"]);
        assert_eq!(names, vec!["a", "A", "b"]);
    }
}
