//! Budget access for the PostgreSQL store.

use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

use super::rows::{db_error, BudgetRow, ExpenseRow};
use super::PostgresStore;
use crate::domain::budget::{Budget, BudgetChanges, BudgetWithExpenses, Expense, NewBudget};
use crate::domain::foundation::{BudgetId, DomainError, ErrorCode, GroupId};
use crate::ports::BudgetRepository;

#[async_trait]
impl BudgetRepository for PostgresStore {
    async fn budgets_with_expenses(
        &self,
        group_ids: &[GroupId],
    ) -> Result<Vec<BudgetWithExpenses>, DomainError> {
        let group_ids: Vec<Uuid> = group_ids.iter().map(|id| *id.as_uuid()).collect();

        let budgets: Vec<BudgetRow> = sqlx::query_as(
            r#"
            SELECT id, group_id, name, (amount * 100)::bigint AS amount_cents, created_at
            FROM budgets
            WHERE group_id = ANY($1)
            ORDER BY created_at DESC
            "#,
        )
        .bind(&group_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load budgets", e))?;

        let budget_ids: Vec<Uuid> = budgets.iter().map(|b| b.id).collect();
        let expenses: Vec<ExpenseRow> = sqlx::query_as(
            r#"
            SELECT id, budget_id, description, (amount * 100)::bigint AS amount_cents,
                   expense_date, created_at
            FROM expenses
            WHERE budget_id = ANY($1)
            ORDER BY expense_date DESC, created_at DESC, id ASC
            "#,
        )
        .bind(&budget_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load expenses", e))?;

        let mut by_budget: HashMap<Uuid, Vec<Expense>> = HashMap::new();
        for row in expenses {
            by_budget.entry(row.budget_id).or_default().push(row.into());
        }

        Ok(budgets
            .into_iter()
            .map(|row| {
                let expenses = by_budget.remove(&row.id).unwrap_or_default();
                BudgetWithExpenses {
                    budget: row.into(),
                    expenses,
                }
            })
            .collect())
    }

    async fn insert_budget(&self, budget: &NewBudget) -> Result<Budget, DomainError> {
        let row: BudgetRow = sqlx::query_as(
            r#"
            INSERT INTO budgets (group_id, name, amount)
            VALUES ($1, $2, $3::numeric / 100)
            RETURNING id, group_id, name, (amount * 100)::bigint AS amount_cents, created_at
            "#,
        )
        .bind(budget.group_id.as_uuid())
        .bind(&budget.name)
        .bind(budget.amount.cents())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to insert budget", e))?;

        Ok(row.into())
    }

    async fn update_budget(&self, id: BudgetId, changes: &BudgetChanges) -> Result<Budget, DomainError> {
        let row: Option<BudgetRow> = sqlx::query_as(
            r#"
            UPDATE budgets SET
                name = COALESCE($2, name),
                amount = COALESCE($3::numeric / 100, amount)
            WHERE id = $1
            RETURNING id, group_id, name, (amount * 100)::bigint AS amount_cents, created_at
            "#,
        )
        .bind(id.as_uuid())
        .bind(changes.name.as_deref())
        .bind(changes.amount.map(|a| a.cents()))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to update budget", e))?;

        row.map(Budget::from).ok_or_else(|| {
            DomainError::new(ErrorCode::BudgetNotFound, "Budget not found")
                .with_detail("budget_id", id.to_string())
        })
    }

    async fn delete_budget(&self, id: BudgetId) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM budgets WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to delete budget", e))?;
        Ok(())
    }
}
