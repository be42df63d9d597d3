//! Expense extraction port.
//!
//! Turns free text or a receipt photo into validated transactions, each
//! assigned to one of the candidate budgets.

use async_trait::async_trait;

use crate::domain::extraction::{BudgetCandidate, ExtractedTransaction, ExtractionError, ExtractionInput};

/// Port for the external extraction service.
///
/// Implementations must return only transactions that passed validation
/// against `candidates`; a response with any invalid transaction is an
/// error as a whole.
#[async_trait]
pub trait ExpenseExtractor: Send + Sync {
    async fn extract(
        &self,
        input: ExtractionInput,
        candidates: &[BudgetCandidate],
    ) -> Result<Vec<ExtractedTransaction>, ExtractionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expense_extractor_is_object_safe() {
        fn _accepts_dyn(_extractor: &dyn ExpenseExtractor) {}
    }
}
