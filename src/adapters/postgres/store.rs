//! PostgreSQL remote store.
//!
//! One pool-backed type implementing every remote store port so it can be
//! handed to the sync core as a `RemoteStore`. Budget and expense queries
//! live in sibling modules; this file holds the type and group access.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::watch;
use uuid::Uuid;

use super::rows::{db_error, GroupRow, MemberRow};
use crate::config::StoreConfig;
use crate::domain::foundation::{DomainError, GroupId, SubscriptionId, UserId};
use crate::domain::group::{Group, Membership};
use crate::ports::GroupRepository;

/// PostgreSQL implementation of the remote store ports.
pub struct PostgresStore {
    pub(super) pool: PgPool,
    /// NOTIFY channel the change trigger publishes on.
    pub(super) channel: String,
    /// Shutdown switches of running listener tasks.
    pub(super) listeners: Mutex<HashMap<SubscriptionId, watch::Sender<bool>>>,
}

impl PostgresStore {
    pub fn new(pool: PgPool, channel: impl Into<String>) -> Self {
        Self {
            pool,
            channel: channel.into(),
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Opens a pool sized by `config`.
    ///
    /// # Errors
    ///
    /// - `ValidationFailed` if no database URL is configured
    /// - `DatabaseError` if the connection cannot be established
    pub async fn connect(config: &StoreConfig) -> Result<Self, DomainError> {
        let url = config
            .database_url()
            .ok_or_else(|| DomainError::validation("database_url", "No database URL configured"))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect(url)
            .await
            .map_err(|e| db_error("Failed to connect to database", e))?;

        tracing::info!(
            max_connections = config.max_connections,
            channel = %config.notify_channel,
            "Connected to remote store"
        );
        Ok(Self::new(pool, config.notify_channel.clone()))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl GroupRepository for PostgresStore {
    async fn memberships_for_user(&self, user_id: &UserId) -> Result<Vec<Membership>, DomainError> {
        let rows: Vec<MemberRow> = sqlx::query_as(
            r#"
            SELECT group_id, user_id, role
            FROM group_members
            WHERE user_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load memberships", e))?;

        rows.into_iter().map(Membership::try_from).collect()
    }

    async fn groups_by_ids(&self, ids: &[GroupId]) -> Result<Vec<Group>, DomainError> {
        let ids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let rows: Vec<GroupRow> = sqlx::query_as(
            r#"
            SELECT id, owner_id, created_at
            FROM groups
            WHERE id = ANY($1)
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load groups", e))?;

        rows.into_iter().map(Group::try_from).collect()
    }

    async fn create_group(&self, owner_id: &UserId) -> Result<Group, DomainError> {
        let row: GroupRow = sqlx::query_as(
            r#"
            INSERT INTO groups (owner_id)
            VALUES ($1)
            RETURNING id, owner_id, created_at
            "#,
        )
        .bind(owner_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to create group", e))?;

        Group::try_from(row)
    }

    async fn add_member(&self, membership: &Membership) -> Result<Membership, DomainError> {
        let row: MemberRow = sqlx::query_as(
            r#"
            INSERT INTO group_members (group_id, user_id, role)
            VALUES ($1, $2, $3)
            RETURNING group_id, user_id, role
            "#,
        )
        .bind(membership.group_id.as_uuid())
        .bind(membership.user_id.as_str())
        .bind(membership.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to add group member", e))?;

        Membership::try_from(row)
    }
}
