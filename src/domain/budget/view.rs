//! BudgetView - a budget with its loaded expenses and derived total.

use serde::Serialize;

use super::{display_order, Budget, BudgetChanges, Expense};
use crate::domain::foundation::{BudgetId, ExpenseId, Money};

/// Typed result of the budget ⨝ expenses read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetWithExpenses {
    pub budget: Budget,
    pub expenses: Vec<Expense>,
}

/// A budget enriched with its expenses and their total.
///
/// The expense list and `total_expenses` are private and change together:
/// every mutator recomputes the total from the list it just edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BudgetView {
    budget: Budget,
    expenses: Vec<Expense>,
    total_expenses: Money,
}

impl BudgetView {
    pub fn new(budget: Budget, expenses: Vec<Expense>) -> Self {
        let total_expenses = expenses.iter().map(|e| e.amount).sum();
        Self {
            budget,
            expenses,
            total_expenses,
        }
    }

    /// View of a freshly created budget: no expenses, zero total.
    pub fn empty(budget: Budget) -> Self {
        Self::new(budget, Vec::new())
    }

    pub fn budget(&self) -> &Budget {
        &self.budget
    }

    pub fn id(&self) -> BudgetId {
        self.budget.id
    }

    /// Expenses in arrival order.
    pub fn expenses(&self) -> &[Expense] {
        &self.expenses
    }

    /// Expenses in display order (newest date first).
    pub fn expenses_for_display(&self) -> Vec<&Expense> {
        let mut sorted: Vec<&Expense> = self.expenses.iter().collect();
        sorted.sort_by(|a, b| display_order(a, b));
        sorted
    }

    pub fn total_expenses(&self) -> Money {
        self.total_expenses
    }

    /// Budget amount minus spent total. Negative when overspent.
    pub fn remaining(&self) -> Money {
        self.budget.amount - self.total_expenses
    }

    pub fn expense(&self, id: ExpenseId) -> Option<&Expense> {
        self.expenses.iter().find(|e| e.id == id)
    }

    pub fn position_of(&self, id: ExpenseId) -> Option<usize> {
        self.expenses.iter().position(|e| e.id == id)
    }

    pub fn contains_expense(&self, id: ExpenseId) -> bool {
        self.position_of(id).is_some()
    }

    /// Appends an expense. Returns false (and changes nothing) if the id is
    /// already present.
    pub fn insert_expense(&mut self, expense: Expense) -> bool {
        if self.contains_expense(expense.id) {
            return false;
        }
        self.expenses.push(expense);
        self.recompute_total();
        true
    }

    /// Replaces the expense with the same id, returning the previous value.
    pub fn replace_expense(&mut self, expense: Expense) -> Option<Expense> {
        let index = self.position_of(expense.id)?;
        let previous = std::mem::replace(&mut self.expenses[index], expense);
        self.recompute_total();
        Some(previous)
    }

    /// Removes an expense, returning where it was and what it was.
    pub fn remove_expense(&mut self, id: ExpenseId) -> Option<(usize, Expense)> {
        let index = self.position_of(id)?;
        let removed = self.expenses.remove(index);
        self.recompute_total();
        Some((index, removed))
    }

    /// Puts a removed expense back at its former index (clamped to the end).
    pub fn restore_expense(&mut self, index: usize, expense: Expense) {
        if self.contains_expense(expense.id) {
            return;
        }
        let index = index.min(self.expenses.len());
        self.expenses.insert(index, expense);
        self.recompute_total();
    }

    pub fn apply_changes(&mut self, changes: &BudgetChanges) {
        changes.apply_to(&mut self.budget);
    }

    fn recompute_total(&mut self) {
        self.total_expenses = self.expenses.iter().map(|e| e.amount).sum();
    }
}

impl From<BudgetWithExpenses> for BudgetView {
    fn from(joined: BudgetWithExpenses) -> Self {
        Self::new(joined.budget, joined.expenses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::budget::NewExpense;
    use crate::domain::foundation::{GroupId, Timestamp};
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn budget(amount_cents: i64) -> Budget {
        Budget {
            id: BudgetId::new(),
            group_id: GroupId::new(),
            name: "Groceries".to_string(),
            amount: Money::from_cents(amount_cents),
            created_at: Timestamp::now(),
        }
    }

    fn expense_for(view: &BudgetView, cents: i64, day: u32) -> Expense {
        let date = NaiveDate::from_ymd_opt(2024, 1, day.clamp(1, 28)).unwrap();
        NewExpense::new(view.id(), "item", Money::from_cents(cents), date).to_optimistic(Timestamp::now())
    }

    #[test]
    fn new_computes_total_from_expenses() {
        let mut view = BudgetView::empty(budget(20000));
        let a = expense_for(&view, 450, 1);
        let b = expense_for(&view, 1000, 2);
        view = BudgetView::new(view.budget().clone(), vec![a, b]);

        assert_eq!(view.total_expenses(), Money::from_cents(1450));
        assert_eq!(view.remaining(), Money::from_cents(18550));
    }

    #[test]
    fn insert_rejects_duplicate_ids() {
        let mut view = BudgetView::empty(budget(20000));
        let milk = expense_for(&view, 450, 1);

        assert!(view.insert_expense(milk.clone()));
        assert!(!view.insert_expense(milk));
        assert_eq!(view.expenses().len(), 1);
        assert_eq!(view.total_expenses(), Money::from_cents(450));
    }

    #[test]
    fn remove_then_restore_is_exact() {
        let mut view = BudgetView::empty(budget(20000));
        for (cents, day) in [(100, 1), (200, 2), (300, 3)] {
            let e = expense_for(&view, cents, day);
            view.insert_expense(e);
        }
        let before = view.clone();
        let middle = view.expenses()[1].id;

        let (index, removed) = view.remove_expense(middle).unwrap();
        assert_eq!(view.total_expenses(), Money::from_cents(400));

        view.restore_expense(index, removed);
        assert_eq!(view, before);
    }

    #[test]
    fn replace_returns_previous_and_updates_total() {
        let mut view = BudgetView::empty(budget(20000));
        let e = expense_for(&view, 450, 1);
        view.insert_expense(e.clone());

        let mut bigger = e.clone();
        bigger.amount = Money::from_cents(900);
        let previous = view.replace_expense(bigger).unwrap();

        assert_eq!(previous, e);
        assert_eq!(view.total_expenses(), Money::from_cents(900));
    }

    #[test]
    fn display_order_is_newest_date_first() {
        let mut view = BudgetView::empty(budget(20000));
        for day in [3, 1, 2] {
            let e = expense_for(&view, 100, day);
            view.insert_expense(e);
        }
        let days: Vec<u32> = view
            .expenses_for_display()
            .iter()
            .map(|e| chrono::Datelike::day(&e.expense_date))
            .collect();
        assert_eq!(days, [3, 2, 1]);
    }

    proptest! {
        #[test]
        fn total_always_matches_held_expenses(
            ops in prop::collection::vec((1i64..100_000, 1u32..28, any::<bool>()), 0..40)
        ) {
            let mut view = BudgetView::empty(budget(1_000_000));
            for (cents, day, remove_first) in ops {
                if remove_first && !view.expenses().is_empty() {
                    let id = view.expenses()[0].id;
                    view.remove_expense(id);
                } else {
                    let e = expense_for(&view, cents, day);
                    view.insert_expense(e);
                }
                let expected: Money = view.expenses().iter().map(|e| e.amount).sum();
                prop_assert_eq!(view.total_expenses(), expected);
            }
        }
    }
}
