//! Foundation module - Shared domain primitives.
//!
//! Contains value objects, identifiers, and error types that form the
//! vocabulary of the budgeting domain.

mod auth;
mod errors;
mod ids;
mod money;
mod state_machine;
mod timestamp;

pub use auth::AuthError;
pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{BudgetId, CorrelationId, ExpenseId, GroupId, SubscriptionId, UserId};
pub use money::Money;
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
