//! Application layer - the client-side synchronization core.
//!
//! - `GroupDirectory` resolves (and on first use provisions) the user's groups
//! - `BudgetStore` owns the local budget mirror and all budget/expense edits
//! - `ExpenseStream` keeps one budget's expenses live from the change feed
//! - `QuickAdd` records expenses proposed by the extraction service
//!
//! Components talk to the outside world only through ports.

mod budget_store;
mod errors;
mod expense_stream;
mod group_directory;
mod quick_add;
mod retry;

pub use budget_store::{BudgetStore, LoadStatus};
pub use errors::SyncError;
pub use expense_stream::{ExpenseStream, StreamStatus, SubscriptionPhase};
pub use group_directory::GroupDirectory;
pub use quick_add::{QuickAdd, QuickAddOutcome};
pub use retry::{Lifetime, RetryPolicy};
