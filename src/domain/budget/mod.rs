//! Budget domain module.
//!
//! # Module Structure
//!
//! - `aggregate` - Budget entity and write models
//! - `expense` - Expense entity, write models, display ordering
//! - `view` - BudgetView (budget + expenses + derived total)
//! - `snapshot` - Immutable versioned collection of BudgetViews

mod aggregate;
mod expense;
mod snapshot;
mod view;

pub use aggregate::{validate_amount, validate_budget_name, Budget, BudgetChanges, NewBudget};
pub use expense::{display_order, sort_for_display, Expense, ExpenseChanges, NewExpense};
pub use snapshot::BudgetSnapshot;
pub use view::{BudgetView, BudgetWithExpenses};
