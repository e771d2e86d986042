//! Caller identity and the authorization collaborator.

use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Caller {
    #[default]
    Anonymous,
    User { id: Uuid, username: String },
}

impl Caller {
    pub fn user(id: Uuid, username: impl Into<String>) -> Self {
        Caller::User {
            id,
            username: username.into(),
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Caller::Anonymous => None,
            Caller::User { id, .. } => Some(*id),
        }
    }
}

/// Authorization decisions are made outside the echo core.
pub trait AccessPolicy: Send + Sync {
    fn can_view_private(&self, caller: &Caller) -> bool;

    fn can_administer(&self, caller: &Caller) -> bool;
}
