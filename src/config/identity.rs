//! Identity configuration

use serde::Deserialize;

use super::error::ValidationError;
use crate::domain::foundation::UserId;

/// The user the binary acts as.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentityConfig {
    pub user_id: Option<String>,
}

impl IdentityConfig {
    /// The configured user, if any.
    pub fn user(&self) -> Result<Option<UserId>, ValidationError> {
        self.user_id
            .as_deref()
            .map(|raw| UserId::new(raw).map_err(|_| ValidationError::InvalidUserId))
            .transpose()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.user().map(|_| ())
    }
}
