//! Identity provider port.
//!
//! Sign-in and verification flows live in the provider. The sync core only
//! asks who is signed in right now.

use async_trait::async_trait;

use crate::domain::foundation::{AuthError, UserId};

/// Source of the current user's stable identifier.
///
/// # Contract
///
/// - `Ok(Some(id))` when a user is signed in
/// - `Ok(None)` when nobody is signed in
/// - `Err(AuthError::ServiceUnavailable)` for transient provider failures
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_user(&self) -> Result<Option<UserId>, AuthError>;
}
