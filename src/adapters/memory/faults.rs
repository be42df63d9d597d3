//! Fault injection and call accounting for the in-memory store.

use std::collections::HashMap;

use crate::domain::foundation::{DomainError, ErrorCode};

/// Every remote call the in-memory store serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    MembershipsForUser,
    GroupsByIds,
    CreateGroup,
    AddMember,
    BudgetsWithExpenses,
    InsertBudget,
    UpdateBudget,
    DeleteBudget,
    ExpensesForBudget,
    InsertExpense,
    UpdateExpense,
    DeleteExpense,
    DeleteExpensesForBudget,
    Subscribe,
}

impl StoreOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreOperation::MembershipsForUser => "memberships_for_user",
            StoreOperation::GroupsByIds => "groups_by_ids",
            StoreOperation::CreateGroup => "create_group",
            StoreOperation::AddMember => "add_member",
            StoreOperation::BudgetsWithExpenses => "budgets_with_expenses",
            StoreOperation::InsertBudget => "insert_budget",
            StoreOperation::UpdateBudget => "update_budget",
            StoreOperation::DeleteBudget => "delete_budget",
            StoreOperation::ExpensesForBudget => "expenses_for_budget",
            StoreOperation::InsertExpense => "insert_expense",
            StoreOperation::UpdateExpense => "update_expense",
            StoreOperation::DeleteExpense => "delete_expense",
            StoreOperation::DeleteExpensesForBudget => "delete_expenses_for_budget",
            StoreOperation::Subscribe => "subscribe",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    Times(u32),
    Always,
}

/// Planned failures plus a count of every call attempted.
#[derive(Debug, Default)]
pub(crate) struct FaultPlan {
    faults: HashMap<StoreOperation, Fault>,
    calls: HashMap<StoreOperation, usize>,
}

impl FaultPlan {
    pub(crate) fn fail_next(&mut self, op: StoreOperation, times: u32) {
        if times == 0 {
            self.faults.remove(&op);
        } else {
            self.faults.insert(op, Fault::Times(times));
        }
    }

    pub(crate) fn fail_always(&mut self, op: StoreOperation) {
        self.faults.insert(op, Fault::Always);
    }

    pub(crate) fn heal(&mut self, op: StoreOperation) {
        self.faults.remove(&op);
    }

    pub(crate) fn calls(&self, op: StoreOperation) -> usize {
        self.calls.get(&op).copied().unwrap_or(0)
    }

    /// Records a call and decides whether it fails.
    pub(crate) fn check(&mut self, op: StoreOperation) -> Result<(), DomainError> {
        *self.calls.entry(op).or_insert(0) += 1;

        let fail = match self.faults.get(&op).copied() {
            None => false,
            Some(Fault::Always) => true,
            Some(Fault::Times(1)) => {
                self.faults.remove(&op);
                true
            }
            Some(Fault::Times(n)) => {
                self.faults.insert(op, Fault::Times(n - 1));
                true
            }
        };

        if fail {
            Err(DomainError::new(
                ErrorCode::NetworkError,
                format!("injected failure in {}", op.as_str()),
            )
            .with_detail("operation", op.as_str()))
        } else {
            Ok(())
        }
    }
}
