//! Error type of the synchronization core.

use thiserror::Error;

use crate::domain::extraction::ExtractionError;
use crate::domain::foundation::{AuthError, DomainError};

/// Failures surfaced by the sync core to its caller.
///
/// Transient read failures only show up here as `LoadFailed`, after the
/// retry budget is spent. Write failures show up as `Mutation` once any
/// optimistic local change has been rolled back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Nobody is signed in.
    #[error("No user is signed in")]
    Unauthenticated,

    /// The user is signed in but may not do this.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Unable to load {resource} after {attempts} attempt(s): {source}")]
    LoadFailed {
        resource: &'static str,
        attempts: u32,
        #[source]
        source: DomainError,
    },

    #[error("Failed to {action}: {source}")]
    Mutation {
        action: &'static str,
        #[source]
        source: DomainError,
    },

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Live updates unavailable: {0}")]
    Subscription(#[source] DomainError),

    #[error("Loading {0} was cancelled")]
    Cancelled(&'static str),
}

impl SyncError {
    pub fn mutation(action: &'static str, source: DomainError) -> Self {
        SyncError::Mutation { action, source }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        SyncError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Text the UI shows for this error.
    pub fn user_message(&self) -> String {
        match self {
            SyncError::Unauthenticated => "Please sign in to continue.".to_string(),
            SyncError::Forbidden(reason) => reason.clone(),
            SyncError::LoadFailed { resource, .. } => {
                format!("Unable to load {}. Please try again later.", resource)
            }
            SyncError::Mutation { action, .. } => {
                format!("Could not {}. Please try again.", action)
            }
            SyncError::Extraction(ExtractionError::NoTransactions) => {
                "No transactions found. Try describing the expense differently.".to_string()
            }
            SyncError::Extraction(ExtractionError::NotConfigured) => {
                "Quick add is not available.".to_string()
            }
            SyncError::Extraction(err) => format!("Could not read that expense: {}", err),
            SyncError::NotFound { entity, .. } => format!("That {} no longer exists.", entity),
            SyncError::Subscription(_) => "Live updates are unavailable right now.".to_string(),
            SyncError::Cancelled(_) => "The operation was cancelled.".to_string(),
        }
    }
}

impl From<AuthError> for SyncError {
    fn from(err: AuthError) -> Self {
        tracing::warn!(error = %err, "Identity provider did not return a user");
        SyncError::Unauthenticated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_failure_mentions_the_resource() {
        let err = SyncError::LoadFailed {
            resource: "groups",
            attempts: 4,
            source: DomainError::network("timeout"),
        };
        assert_eq!(
            err.to_string(),
            "Unable to load groups after 4 attempt(s): [NETWORK_ERROR] timeout"
        );
        assert_eq!(err.user_message(), "Unable to load groups. Please try again later.");
    }

    #[test]
    fn forbidden_shows_its_reason() {
        let err = SyncError::Forbidden("Only group owners can create budgets".into());
        assert_eq!(err.user_message(), "Only group owners can create budgets");
    }

    #[test]
    fn extraction_errors_convert() {
        let err: SyncError = ExtractionError::InvalidDate { index: 0 }.into();
        assert!(matches!(err, SyncError::Extraction(_)));
        assert!(err.user_message().contains("invalid date format"));
    }

    #[test]
    fn auth_errors_become_unauthenticated() {
        let err: SyncError = AuthError::InvalidSession.into();
        assert_eq!(err, SyncError::Unauthenticated);
    }

    #[test]
    fn not_found_names_the_entity() {
        let err = SyncError::not_found("expense", "abc");
        assert_eq!(err.to_string(), "expense abc not found");
        assert_eq!(err.user_message(), "That expense no longer exists.");
    }
}
