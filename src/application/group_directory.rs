//! GroupDirectory - resolves which groups the current user belongs to.
//!
//! A user with no memberships is provisioned on first use: one group owned
//! by them and an owner membership. That write is part of the read path.

use std::collections::HashMap;
use std::sync::Arc;

use super::retry::{Lifetime, RetryPolicy};
use super::SyncError;
use crate::domain::foundation::{DomainError, UserId};
use crate::domain::group::{GroupMembership, Membership};
use crate::ports::{GroupRepository, IdentityProvider};

/// Resolves group memberships for the signed-in user.
pub struct GroupDirectory {
    identity: Arc<dyn IdentityProvider>,
    groups: Arc<dyn GroupRepository>,
    retry: RetryPolicy,
    lifetime: Lifetime,
}

impl GroupDirectory {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        groups: Arc<dyn GroupRepository>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            identity,
            groups,
            retry,
            lifetime: Lifetime::new(),
        }
    }

    /// Cancels any retry still waiting to fire.
    pub fn shutdown(&self) {
        self.lifetime.shutdown();
    }

    /// The signed-in user.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` when nobody is signed in or the provider fails.
    pub async fn current_user(&self) -> Result<UserId, SyncError> {
        self.identity
            .current_user()
            .await?
            .ok_or(SyncError::Unauthenticated)
    }

    /// Groups of the signed-in user, provisioning a default group if none.
    pub async fn resolve_groups(&self) -> Result<Vec<GroupMembership>, SyncError> {
        let user_id = self.current_user().await?;
        self.resolve_groups_for(&user_id).await
    }

    /// Groups of `user_id` with the user's role in each, in membership order.
    ///
    /// # Errors
    ///
    /// - `LoadFailed` when the membership read keeps failing after retries
    /// - `Mutation` when provisioning the default group fails
    /// - `Cancelled` when shut down while waiting for a retry
    pub async fn resolve_groups_for(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<GroupMembership>, SyncError> {
        let fetched = self
            .retry
            .run(&self.lifetime, "groups", |attempt| {
                tracing::debug!(user_id = %user_id, attempt, "Fetching memberships");
                self.fetch_groups(user_id)
            })
            .await?;

        if let Some(groups) = fetched {
            tracing::debug!(user_id = %user_id, count = groups.len(), "Resolved groups");
            return Ok(groups);
        }

        let provisioned = self.provision(user_id).await?;
        Ok(vec![provisioned])
    }

    /// `None` when the user holds no memberships at all. Memberships whose
    /// group is missing are skipped but still count as memberships.
    async fn fetch_groups(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Vec<GroupMembership>>, DomainError> {
        let memberships = self.groups.memberships_for_user(user_id).await?;
        if memberships.is_empty() {
            return Ok(None);
        }

        let ids: Vec<_> = memberships.iter().map(|m| m.group_id).collect();
        let mut by_id: HashMap<_, _> = self
            .groups
            .groups_by_ids(&ids)
            .await?
            .into_iter()
            .map(|g| (g.id, g))
            .collect();

        Ok(Some(
            memberships
                .into_iter()
                .filter_map(|m| match by_id.remove(&m.group_id) {
                    Some(group) => Some(GroupMembership::new(group, m.role)),
                    None => {
                        tracing::warn!(group_id = %m.group_id, "Membership points at a missing group");
                        None
                    }
                })
                .collect(),
        ))
    }

    async fn provision(&self, user_id: &UserId) -> Result<GroupMembership, SyncError> {
        let group = self
            .groups
            .create_group(user_id)
            .await
            .map_err(|e| SyncError::mutation("create your group", e))?;

        let membership = self
            .groups
            .add_member(&Membership::owner(group.id, user_id.clone()))
            .await
            .map_err(|e| {
                tracing::error!(
                    group_id = %group.id,
                    error = %e,
                    "Group created but owner membership failed"
                );
                SyncError::mutation("create your group", e.with_detail("stage", "membership"))
            })?;

        tracing::info!(user_id = %user_id, group_id = %group.id, "Provisioned default group");
        Ok(GroupMembership::new(group, membership.role))
    }
}
