//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the sync core and the outside world. Adapters implement these ports.
//!
//! ## Remote Store Ports
//!
//! - `GroupRepository` - Groups and memberships
//! - `BudgetRepository` - Budgets, read joined with their expenses
//! - `ExpenseRepository` - Expenses with client-assigned ids
//! - `ChangeFeed` - Filtered change notifications per collection
//! - `RemoteStore` - All of the above as one object
//!
//! ## Collaborator Ports
//!
//! - `IdentityProvider` - Who is signed in
//! - `ExpenseExtractor` - Text/receipt to validated transactions
//! - `AIProvider` - LLM completions backing the default extractor

mod ai_provider;
mod budget_repository;
mod change_feed;
mod expense_extractor;
mod expense_repository;
mod group_repository;
mod identity_provider;
mod remote_store;

pub use ai_provider::{
    AIError, AIProvider, CompletionRequest, CompletionResponse, FinishReason, ImageAttachment,
    Message, MessageRole, ProviderInfo, TokenUsage,
};
pub use budget_repository::BudgetRepository;
pub use change_feed::{
    ChangeEvent, ChangeFeed, ChangeKind, ChangeRecord, ChangeSubscription, ChangeTopic,
    ChannelStatus, RowFilter, Table,
};
pub use expense_extractor::ExpenseExtractor;
pub use expense_repository::ExpenseRepository;
pub use group_repository::GroupRepository;
pub use identity_provider::IdentityProvider;
pub use remote_store::RemoteStore;
