//! Expense access for the PostgreSQL store.

use async_trait::async_trait;

use super::rows::{db_error, ExpenseRow};
use super::PostgresStore;
use crate::domain::budget::{Expense, ExpenseChanges, NewExpense};
use crate::domain::foundation::{BudgetId, DomainError, ErrorCode, ExpenseId};
use crate::ports::ExpenseRepository;

const RETURNING: &str =
    "RETURNING id, budget_id, description, (amount * 100)::bigint AS amount_cents, expense_date, created_at";

#[async_trait]
impl ExpenseRepository for PostgresStore {
    async fn expenses_for_budget(&self, budget_id: BudgetId) -> Result<Vec<Expense>, DomainError> {
        let rows: Vec<ExpenseRow> = sqlx::query_as(
            r#"
            SELECT id, budget_id, description, (amount * 100)::bigint AS amount_cents,
                   expense_date, created_at
            FROM expenses
            WHERE budget_id = $1
            ORDER BY expense_date DESC, created_at DESC, id ASC
            "#,
        )
        .bind(budget_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load expenses", e))?;

        Ok(rows.into_iter().map(Expense::from).collect())
    }

    async fn insert_expense(&self, expense: &NewExpense) -> Result<Expense, DomainError> {
        let sql = format!(
            "INSERT INTO expenses (id, budget_id, description, amount, expense_date, correlation_id) \
             VALUES ($1, $2, $3, $4::numeric / 100, $5, $6) {}",
            RETURNING
        );
        let row: ExpenseRow = sqlx::query_as(&sql)
            .bind(expense.id.as_uuid())
            .bind(expense.budget_id.as_uuid())
            .bind(&expense.description)
            .bind(expense.amount.cents())
            .bind(expense.expense_date)
            .bind(expense.correlation.map(|c| *c.as_uuid()))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("Failed to insert expense", e))?;

        Ok(row.into())
    }

    async fn update_expense(&self, id: ExpenseId, changes: &ExpenseChanges) -> Result<Expense, DomainError> {
        let sql = format!(
            "UPDATE expenses SET \
                 description = COALESCE($2, description), \
                 amount = COALESCE($3::numeric / 100, amount), \
                 expense_date = COALESCE($4, expense_date), \
                 correlation_id = NULL \
             WHERE id = $1 {}",
            RETURNING
        );
        let row: Option<ExpenseRow> = sqlx::query_as(&sql)
            .bind(id.as_uuid())
            .bind(changes.description.as_deref())
            .bind(changes.amount.map(|a| a.cents()))
            .bind(changes.expense_date)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to update expense", e))?;

        row.map(Expense::from).ok_or_else(|| {
            DomainError::new(ErrorCode::ExpenseNotFound, "Expense not found")
                .with_detail("expense_id", id.to_string())
        })
    }

    async fn delete_expense(&self, id: ExpenseId) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM expenses WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to delete expense", e))?;
        Ok(())
    }

    async fn delete_expenses_for_budget(&self, budget_id: BudgetId) -> Result<u64, DomainError> {
        let result = sqlx::query("DELETE FROM expenses WHERE budget_id = $1")
            .bind(budget_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to delete budget expenses", e))?;
        Ok(result.rows_affected())
    }
}
