//! Expense repository port.

use async_trait::async_trait;

use crate::domain::budget::{Expense, ExpenseChanges, NewExpense};
use crate::domain::foundation::{BudgetId, DomainError, ExpenseId};

/// Repository port for the `expenses` collection.
#[async_trait]
pub trait ExpenseRepository: Send + Sync {
    /// Expenses of one budget, expense date descending.
    async fn expenses_for_budget(&self, budget_id: BudgetId) -> Result<Vec<Expense>, DomainError>;

    /// Inserts an expense under its client-assigned id.
    ///
    /// Implementations echo `expense.correlation` on the resulting change
    /// event.
    async fn insert_expense(&self, expense: &NewExpense) -> Result<Expense, DomainError>;

    /// Applies `changes` and returns the stored row.
    ///
    /// # Errors
    ///
    /// - `ExpenseNotFound` if no expense has this id
    async fn update_expense(&self, id: ExpenseId, changes: &ExpenseChanges) -> Result<Expense, DomainError>;

    async fn delete_expense(&self, id: ExpenseId) -> Result<(), DomainError>;

    /// Deletes every expense of a budget, returning how many went.
    async fn delete_expenses_for_budget(&self, budget_id: BudgetId) -> Result<u64, DomainError>;
}
