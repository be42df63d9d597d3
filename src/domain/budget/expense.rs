//! Expense entity, its write models, and display ordering.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::domain::foundation::{BudgetId, CorrelationId, ExpenseId, Money, Timestamp};

/// A single spend recorded against one budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub budget_id: BudgetId,
    pub description: String,
    pub amount: Money,
    /// Calendar date of the spend, not a timestamp.
    pub expense_date: NaiveDate,
    pub created_at: Timestamp,
}

/// Insert payload for an expense.
///
/// Carries a client-assigned id so the optimistic row and the stored row
/// share an identity, plus an optional correlation token the store echoes on
/// the resulting change event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewExpense {
    pub id: ExpenseId,
    pub budget_id: BudgetId,
    pub description: String,
    pub amount: Money,
    pub expense_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation: Option<CorrelationId>,
}

impl NewExpense {
    pub fn new(
        budget_id: BudgetId,
        description: impl Into<String>,
        amount: Money,
        expense_date: NaiveDate,
    ) -> Self {
        Self {
            id: ExpenseId::new(),
            budget_id,
            description: description.into(),
            amount,
            expense_date,
            correlation: None,
        }
    }

    pub fn with_correlation(mut self, correlation: CorrelationId) -> Self {
        self.correlation = Some(correlation);
        self
    }

    /// The row a client shows before the store confirms the insert.
    pub fn to_optimistic(&self, created_at: Timestamp) -> Expense {
        Expense {
            id: self.id,
            budget_id: self.budget_id,
            description: self.description.clone(),
            amount: self.amount,
            expense_date: self.expense_date,
            created_at,
        }
    }
}

/// Partial update of an expense.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expense_date: Option<NaiveDate>,
}

impl ExpenseChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_amount(mut self, amount: Money) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_expense_date(mut self, date: NaiveDate) -> Self {
        self.expense_date = Some(date);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.amount.is_none() && self.expense_date.is_none()
    }

    /// Returns `expense` with the set fields replaced.
    pub fn apply_to(&self, expense: &Expense) -> Expense {
        let mut updated = expense.clone();
        if let Some(description) = &self.description {
            updated.description = description.clone();
        }
        if let Some(amount) = self.amount {
            updated.amount = amount;
        }
        if let Some(date) = self.expense_date {
            updated.expense_date = date;
        }
        updated
    }
}

/// Display order: newest expense date first, then newest creation time,
/// then id so that equal rows always land in the same place.
pub fn display_order(a: &Expense, b: &Expense) -> Ordering {
    b.expense_date
        .cmp(&a.expense_date)
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Sorts expenses into display order in place.
pub fn sort_for_display(expenses: &mut [Expense]) {
    expenses.sort_by(display_order);
}
