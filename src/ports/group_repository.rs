//! Group repository port.
//!
//! Reads and writes over the `groups` and `group_members` collections.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, GroupId, UserId};
use crate::domain::group::{Group, Membership};

/// Repository port for groups and memberships.
#[async_trait]
pub trait GroupRepository: Send + Sync {
    /// All memberships held by `user_id`, in storage order.
    async fn memberships_for_user(&self, user_id: &UserId) -> Result<Vec<Membership>, DomainError>;

    /// Groups with the given ids. Missing ids are skipped.
    async fn groups_by_ids(&self, ids: &[GroupId]) -> Result<Vec<Group>, DomainError>;

    /// Creates a group owned by `owner_id`. Id and creation time are
    /// server-assigned.
    async fn create_group(&self, owner_id: &UserId) -> Result<Group, DomainError>;

    /// Inserts a membership row.
    async fn add_member(&self, membership: &Membership) -> Result<Membership, DomainError>;
}
