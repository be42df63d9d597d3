//! Mock identity provider for testing.
//!
//! Lets a test sign a user in or out between calls, or force a provider
//! error.
//!
//! # Example
//!
//! ```ignore
//! let identity = MockIdentityProvider::signed_in("user-123");
//! assert!(identity.current_user().await?.is_some());
//!
//! identity.sign_out();
//! assert!(identity.current_user().await?.is_none());
//! ```

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::domain::foundation::{AuthError, UserId};
use crate::ports::IdentityProvider;

/// Mock identity provider with a switchable current user.
#[derive(Debug, Default)]
pub struct MockIdentityProvider {
    user: RwLock<Option<UserId>>,
    /// Optional error to return for every call (for error testing)
    force_error: RwLock<Option<AuthError>>,
}

impl MockIdentityProvider {
    /// Nobody signed in.
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider with `user_id` signed in.
    ///
    /// # Panics
    ///
    /// Panics if `user_id` is blank. Intended for tests.
    pub fn signed_in(user_id: &str) -> Self {
        let provider = Self::new();
        provider.sign_in(UserId::new(user_id).unwrap_or_else(|e| panic!("test user id: {}", e)));
        provider
    }

    pub fn sign_in(&self, user_id: UserId) {
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = Some(user_id);
    }

    pub fn sign_out(&self) {
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Forces every call to return `error` until cleared with `None`.
    pub fn set_error(&self, error: Option<AuthError>) {
        *self.force_error.write().unwrap_or_else(PoisonError::into_inner) = error;
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn current_user(&self) -> Result<Option<UserId>, AuthError> {
        if let Some(error) = self
            .force_error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(error);
        }
        Ok(self.user.read().unwrap_or_else(PoisonError::into_inner).clone())
    }
}
