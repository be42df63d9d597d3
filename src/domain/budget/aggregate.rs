//! Budget entity and its write models.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{BudgetId, GroupId, Money, Timestamp, ValidationError};

/// A spending limit belonging to exactly one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    pub id: BudgetId,
    pub group_id: GroupId,
    pub name: String,
    pub amount: Money,
    pub created_at: Timestamp,
}

/// Insert payload for a budget. The id and creation time are server-assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBudget {
    pub group_id: GroupId,
    pub name: String,
    pub amount: Money,
}

impl NewBudget {
    pub fn new(group_id: GroupId, name: impl Into<String>, amount: Money) -> Self {
        Self {
            group_id,
            name: name.into(),
            amount,
        }
    }
}

/// Partial update of a budget.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Money>,
}

impl BudgetChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_amount(mut self, amount: Money) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.amount.is_none()
    }

    /// Keeps only the fields that differ from `current`.
    pub fn diff_against(&self, current: &Budget) -> Self {
        Self {
            name: self.name.clone().filter(|name| *name != current.name),
            amount: self.amount.filter(|amount| *amount != current.amount),
        }
    }

    /// Merges the set fields into `budget`.
    pub fn apply_to(&self, budget: &mut Budget) {
        if let Some(name) = &self.name {
            budget.name = name.clone();
        }
        if let Some(amount) = self.amount {
            budget.amount = amount;
        }
    }
}

/// Checks a user-supplied budget name.
pub fn validate_budget_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::empty_field("name"));
    }
    Ok(())
}

/// Checks that a monetary amount is strictly positive.
///
/// The sync core trusts its callers to have run this; it does not re-check.
pub fn validate_amount(field: &str, amount: Money) -> Result<(), ValidationError> {
    if !amount.is_positive() {
        return Err(ValidationError::not_positive(field));
    }
    if amount > Money::MAX_AMOUNT {
        return Err(ValidationError::invalid_format(
            field,
            format!("must not exceed {}", Money::MAX_AMOUNT),
        ));
    }
    Ok(())
}
