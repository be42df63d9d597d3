//! Authentication types for the domain layer.
//!
//! The identity provider itself (sign-in, phone verification) lives outside
//! this crate. All the sync core needs from it is a stable identifier for
//! the current user, or the knowledge that nobody is signed in.

use thiserror::Error;

/// Errors surfaced by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The session is missing, malformed, or expired.
    #[error("Invalid or expired session")]
    InvalidSession,

    /// The identity provider could not be reached.
    #[error("Auth service unavailable: {0}")]
    ServiceUnavailable(String),
}
