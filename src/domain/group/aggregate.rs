//! Groups and memberships.

use serde::{Deserialize, Serialize};

use super::Role;
use crate::domain::foundation::{GroupId, Timestamp, UserId};

/// Ownership/sharing boundary for budgets.
///
/// Created once per new user and never mutated by the sync core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub owner_id: UserId,
    pub created_at: Timestamp,
}

/// A (group, user) pair with the user's role. Composite identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub role: Role,
}

impl Membership {
    /// Membership making `user_id` the owner of `group_id`.
    pub fn owner(group_id: GroupId, user_id: UserId) -> Self {
        Self {
            group_id,
            user_id,
            role: Role::Owner,
        }
    }
}

/// A group as seen by one user: the group plus that user's role in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMembership {
    pub group: Group,
    pub role: Role,
}

impl GroupMembership {
    pub fn new(group: Group, role: Role) -> Self {
        Self { group, role }
    }

    pub fn group_id(&self) -> GroupId {
        self.group.id
    }

    pub fn is_owner(&self) -> bool {
        self.role == Role::Owner
    }
}

/// First group in which the user holds the owner role.
pub fn first_owned_group(groups: &[GroupMembership]) -> Option<&GroupMembership> {
    groups.iter().find(|g| g.role.can_create_budgets())
}
