use std::error::Error as StdError;

use thiserror::Error;

use crate::{
    application::repos::RepoError, domain::error::DomainError, infra::error::InfraError,
};

/// Flattened error chain, outermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub source: &'static str,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self { source, messages }
    }

    pub fn chain(&self) -> String {
        self.messages.join(": ")
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("resource not found")]
    NotFound,
    #[error("permission denied")]
    PermissionDenied,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AppError::NotFound
                | AppError::Domain(DomainError::NotFound { .. })
                | AppError::Repo(RepoError::NotFound)
        )
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AppError::Validation(_) | AppError::Domain(DomainError::Validation { .. })
        )
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, AppError::PermissionDenied)
    }

    /// Short category label, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            _ if self.is_not_found() => "not_found",
            _ if self.is_validation() => "validation",
            AppError::PermissionDenied => "permission",
            AppError::Repo(_) | AppError::Infra(InfraError::Database { .. }) => "persistence",
            AppError::Infra(InfraError::Generator { .. }) => "generator",
            AppError::Infra(_) => "infrastructure",
            AppError::Domain(_) | AppError::Unexpected(_) => "unexpected",
            AppError::NotFound | AppError::Validation(_) => "unexpected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_the_taxonomy() {
        assert_eq!(AppError::NotFound.kind(), "not_found");
        assert_eq!(AppError::from(RepoError::NotFound).kind(), "not_found");
        assert_eq!(
            AppError::from(DomainError::validation("content", "empty")).kind(),
            "validation"
        );
        assert_eq!(AppError::PermissionDenied.kind(), "permission");
        assert_eq!(AppError::from(RepoError::Timeout).kind(), "persistence");
        assert_eq!(AppError::unexpected("boom").kind(), "unexpected");
    }

    #[test]
    fn report_walks_the_source_chain() {
        let error = AppError::from(InfraError::Io(std::io::Error::other("disk gone")));
        let report = ErrorReport::from_error("test", &error);
        assert_eq!(report.messages.first().map(String::as_str), Some("io error: disk gone"));
        assert!(report.chain().contains("disk gone"));
    }
}
