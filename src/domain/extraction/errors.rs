//! Extraction-specific error types.

use thiserror::Error;

/// Failures at the expense-extraction boundary.
///
/// None of these are retried and none touch local state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    /// The service ran but found nothing to record.
    #[error("No transactions identified")]
    NoTransactions,

    /// The response was not the expected structured shape.
    #[error("Malformed extraction response: {0}")]
    Malformed(String),

    #[error("Transaction {index}: missing {field}")]
    MissingField { index: usize, field: &'static str },

    #[error("Transaction {index}: {reason}")]
    InvalidAmount { index: usize, reason: &'static str },

    #[error("Transaction {index}: invalid date format, expected YYYY-MM-DD")]
    InvalidDate { index: usize },

    #[error("Transaction {index}: unknown budget id '{budget_id}'")]
    UnknownBudget { index: usize, budget_id: String },

    /// The extraction service itself failed (network, auth, rate limit).
    #[error("Extraction service failed: {0}")]
    Provider(String),

    /// No extraction service is configured.
    #[error("Expense extraction is not configured")]
    NotConfigured,
}

impl ExtractionError {
    /// True for errors caused by the shape of the service's output.
    pub fn is_validation(&self) -> bool {
        !matches!(self, ExtractionError::Provider(_) | ExtractionError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_transaction() {
        let err = ExtractionError::InvalidAmount {
            index: 2,
            reason: "amount must be a number",
        };
        assert_eq!(err.to_string(), "Transaction 2: amount must be a number");
    }

    #[test]
    fn provider_failures_are_not_validation() {
        assert!(!ExtractionError::Provider("timeout".into()).is_validation());
        assert!(ExtractionError::NoTransactions.is_validation());
        assert!(ExtractionError::InvalidDate { index: 0 }.is_validation());
    }
}
