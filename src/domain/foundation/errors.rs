//! Error types for the domain layer.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use thiserror::Error;

/// Errors that occur during value object construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Field '{field}' cannot be empty")]
    EmptyField { field: String },

    #[error("Field '{field}' must be positive")]
    NotPositive { field: String },

    #[error("Field '{field}' has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

impl ValidationError {
    /// Creates an empty field validation error.
    pub fn empty_field(field: impl Into<String>) -> Self {
        ValidationError::EmptyField { field: field.into() }
    }

    /// Creates a non-positive amount validation error.
    pub fn not_positive(field: impl Into<String>) -> Self {
        ValidationError::NotPositive { field: field.into() }
    }

    /// Creates an invalid format validation error.
    pub fn invalid_format(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Error codes organized by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Validation errors
    ValidationFailed,

    // Not found errors
    GroupNotFound,
    BudgetNotFound,
    ExpenseNotFound,

    // Authorization errors
    Unauthenticated,
    Forbidden,

    // Change feed errors
    SubscriptionFailed,

    // Infrastructure errors
    NetworkError,
    DatabaseError,
    InternalError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::GroupNotFound => "GROUP_NOT_FOUND",
            ErrorCode::BudgetNotFound => "BUDGET_NOT_FOUND",
            ErrorCode::ExpenseNotFound => "EXPENSE_NOT_FOUND",
            ErrorCode::Unauthenticated => "UNAUTHENTICATED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::SubscriptionFailed => "SUBSCRIPTION_FAILED",
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        };
        write!(f, "{}", s)
    }
}

/// Standard domain error with code, message, and optional details.
///
/// Every port returns this type; the application layer lifts it into
/// `SyncError` with the retry / rollback semantics attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainError {
    pub code: ErrorCode,
    pub message: String,
    pub details: HashMap<String, String>,
}

impl DomainError {
    /// Creates a new domain error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: HashMap::new(),
        }
    }

    /// Creates a validation error for a specific field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message).with_detail("field", field.into())
    }

    /// Creates a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NetworkError, message)
    }

    /// Adds a detail to the error.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Returns true for not-found codes.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::GroupNotFound | ErrorCode::BudgetNotFound | ErrorCode::ExpenseNotFound
        )
    }
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl Error for DomainError {}

impl From<ValidationError> for DomainError {
    fn from(err: ValidationError) -> Self {
        Self::new(ErrorCode::ValidationFailed, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_empty_field_displays_correctly() {
        let err = ValidationError::empty_field("name");
        assert_eq!(format!("{}", err), "Field 'name' cannot be empty");
    }

    #[test]
    fn validation_error_not_positive_displays_correctly() {
        let err = ValidationError::not_positive("amount");
        assert_eq!(format!("{}", err), "Field 'amount' must be positive");
    }

    #[test]
    fn domain_error_displays_code_and_message() {
        let err = DomainError::new(ErrorCode::BudgetNotFound, "Budget not found");
        assert_eq!(format!("{}", err), "[BUDGET_NOT_FOUND] Budget not found");
    }

    #[test]
    fn domain_error_with_detail_adds_detail() {
        let err = DomainError::validation("amount", "Amount must be positive")
            .with_detail("value", "-3");

        assert_eq!(err.code, ErrorCode::ValidationFailed);
        assert_eq!(err.details.get("field"), Some(&"amount".to_string()));
        assert_eq!(err.details.get("value"), Some(&"-3".to_string()));
    }

    #[test]
    fn not_found_codes_are_classified() {
        assert!(DomainError::new(ErrorCode::ExpenseNotFound, "x").is_not_found());
        assert!(!DomainError::database("x").is_not_found());
    }
}
