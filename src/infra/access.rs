use std::collections::HashSet;

use uuid::Uuid;

use crate::application::access::{AccessPolicy, Caller};

/// Fixed set of administrators. Administrators may also see private echoes.
#[derive(Debug, Clone, Default)]
pub struct StaticAccessPolicy {
    admin_ids: HashSet<Uuid>,
}

impl StaticAccessPolicy {
    pub fn new(admin_ids: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            admin_ids: admin_ids.into_iter().collect(),
        }
    }

    pub fn owner_only(owner_id: Uuid) -> Self {
        Self::new([owner_id])
    }
}

impl AccessPolicy for StaticAccessPolicy {
    fn can_view_private(&self, caller: &Caller) -> bool {
        self.can_administer(caller)
    }

    fn can_administer(&self, caller: &Caller) -> bool {
        caller
            .user_id()
            .is_some_and(|id| self.admin_ids.contains(&id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_listed_users_administer() {
        let owner = Uuid::new_v4();
        let policy = StaticAccessPolicy::owner_only(owner);

        assert!(policy.can_administer(&Caller::user(owner, "owner")));
        assert!(policy.can_view_private(&Caller::user(owner, "owner")));
        assert!(!policy.can_administer(&Caller::user(Uuid::new_v4(), "guest")));
        assert!(!policy.can_view_private(&Caller::Anonymous));
    }
}
