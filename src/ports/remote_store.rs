//! RemoteStore - the whole CRUD + change-notification boundary as one trait.

use super::{BudgetRepository, ChangeFeed, ExpenseRepository, GroupRepository};

/// Combined trait for remote store implementations.
///
/// A RemoteStore serves all four collections and pushes their changes.
pub trait RemoteStore: GroupRepository + BudgetRepository + ExpenseRepository + ChangeFeed {}

// Blanket implementation - any type that implements every port is a RemoteStore
impl<T: GroupRepository + BudgetRepository + ExpenseRepository + ChangeFeed> RemoteStore for T {}
