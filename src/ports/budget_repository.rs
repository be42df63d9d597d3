//! Budget repository port.

use async_trait::async_trait;

use crate::domain::budget::{Budget, BudgetChanges, BudgetWithExpenses, NewBudget};
use crate::domain::foundation::{BudgetId, DomainError, GroupId};

/// Repository port for the `budgets` collection.
#[async_trait]
pub trait BudgetRepository: Send + Sync {
    /// Budgets whose group is in `group_ids`, each joined with its
    /// expenses, newest-created first.
    async fn budgets_with_expenses(
        &self,
        group_ids: &[GroupId],
    ) -> Result<Vec<BudgetWithExpenses>, DomainError>;

    /// Inserts a budget and returns the stored row.
    async fn insert_budget(&self, budget: &NewBudget) -> Result<Budget, DomainError>;

    /// Applies `changes` and returns the stored row.
    ///
    /// # Errors
    ///
    /// - `BudgetNotFound` if no budget has this id
    async fn update_budget(&self, id: BudgetId, changes: &BudgetChanges) -> Result<Budget, DomainError>;

    /// Deletes the budget row only. Expenses are not cascaded here.
    async fn delete_budget(&self, id: BudgetId) -> Result<(), DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_repository_is_object_safe() {
        fn _accepts_dyn(_repo: &dyn BudgetRepository) {}
    }
}
