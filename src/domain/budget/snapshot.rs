//! Immutable, versioned snapshots of the local budget collection.

use super::BudgetView;
use crate::domain::foundation::{BudgetId, ExpenseId};

/// One immutable state of the local budget mirror.
///
/// Snapshots are never edited in place. A writer clones the budgets, edits
/// the clone and publishes it with the next version number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BudgetSnapshot {
    version: u64,
    budgets: Vec<BudgetView>,
}

impl BudgetSnapshot {
    /// Version 0, no budgets.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Budgets newest-created first.
    pub fn budgets(&self) -> &[BudgetView] {
        &self.budgets
    }

    pub fn is_empty(&self) -> bool {
        self.budgets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.budgets.len()
    }

    pub fn budget(&self, id: BudgetId) -> Option<&BudgetView> {
        self.budgets.iter().find(|b| b.id() == id)
    }

    /// The budget whose expense list holds `expense_id`.
    pub fn owner_of_expense(&self, expense_id: ExpenseId) -> Option<&BudgetView> {
        self.budgets.iter().find(|b| b.contains_expense(expense_id))
    }

    /// Successor snapshot holding `budgets`.
    pub fn succeed(&self, budgets: Vec<BudgetView>) -> Self {
        Self {
            version: self.version + 1,
            budgets,
        }
    }

    /// Copy of the budgets for a writer to edit.
    pub fn to_budgets(&self) -> Vec<BudgetView> {
        self.budgets.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::budget::{Budget, NewExpense};
    use crate::domain::foundation::{GroupId, Money, Timestamp};
    use chrono::NaiveDate;

    fn view() -> BudgetView {
        BudgetView::empty(Budget {
            id: BudgetId::new(),
            group_id: GroupId::new(),
            name: "Fuel".to_string(),
            amount: Money::from_cents(10000),
            created_at: Timestamp::now(),
        })
    }

    #[test]
    fn succeed_bumps_version_and_leaves_original_untouched() {
        let first = BudgetSnapshot::empty();
        let second = first.succeed(vec![view()]);

        assert_eq!(first.version(), 0);
        assert!(first.is_empty());
        assert_eq!(second.version(), 1);
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn owner_of_expense_finds_containing_budget() {
        let mut a = view();
        let b = view();
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let expense = NewExpense::new(a.id(), "Gas", Money::from_cents(4000), date)
            .to_optimistic(Timestamp::now());
        let expense_id = expense.id;
        a.insert_expense(expense);

        let snapshot = BudgetSnapshot::empty().succeed(vec![b, a.clone()]);

        assert_eq!(snapshot.owner_of_expense(expense_id).map(|v| v.id()), Some(a.id()));
        assert!(snapshot.owner_of_expense(ExpenseId::new()).is_none());
    }
}
