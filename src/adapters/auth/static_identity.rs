//! Identity fixed at startup, e.g. from configuration.

use async_trait::async_trait;

use crate::domain::foundation::{AuthError, UserId};
use crate::ports::IdentityProvider;

/// Always reports the same user (or nobody).
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    user: Option<UserId>,
}

impl StaticIdentity {
    pub fn new(user: Option<UserId>) -> Self {
        Self { user }
    }

    pub fn user(user_id: UserId) -> Self {
        Self::new(Some(user_id))
    }

    pub fn anonymous() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn current_user(&self) -> Result<Option<UserId>, AuthError> {
        Ok(self.user.clone())
    }
}
