//! ChangeFeed port - push notifications of row changes in the remote store.
//!
//! A subscription is scoped to one table and an optional equality filter.
//! Events may arrive before, during, or after the direct write that caused
//! them; the feed makes no ordering promise beyond arrival order, and
//! delivery is best-effort.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

use crate::domain::budget::{Budget, Expense};
use crate::domain::foundation::{BudgetId, CorrelationId, DomainError, ErrorCode, SubscriptionId};
use crate::domain::group::{Group, Membership};

/// The four remote collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Groups,
    GroupMembers,
    Budgets,
    Expenses,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Groups => "groups",
            Table::GroupMembers => "group_members",
            Table::Budgets => "budgets",
            Table::Expenses => "expenses",
        }
    }
}

/// Row filter of a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowFilter {
    All,
    Eq { column: &'static str, value: String },
}

/// What a subscription listens to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeTopic {
    pub table: Table,
    pub filter: RowFilter,
}

impl ChangeTopic {
    /// Every change to `table`.
    pub fn table(table: Table) -> Self {
        Self {
            table,
            filter: RowFilter::All,
        }
    }

    /// Changes to the expenses of one budget.
    pub fn expenses_for_budget(budget_id: BudgetId) -> Self {
        Self {
            table: Table::Expenses,
            filter: RowFilter::Eq {
                column: "budget_id",
                value: budget_id.to_string(),
            },
        }
    }

    /// True if `event` falls inside this topic.
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if event.record.table() != self.table {
            return false;
        }
        match &self.filter {
            RowFilter::All => true,
            RowFilter::Eq { column, value } => {
                event.record.column_value(column).as_deref() == Some(value.as_str())
            }
        }
    }

    /// Human-readable channel name, e.g. `expenses:budget_id=eq.<id>`.
    pub fn channel_name(&self) -> String {
        match &self.filter {
            RowFilter::All => self.table.as_str().to_string(),
            RowFilter::Eq { column, value } => {
                format!("{}:{}=eq.{}", self.table.as_str(), column, value)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// The row carried by a change event. For deletes this is the old row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeRecord {
    Groups(Group),
    GroupMembers(Membership),
    Budgets(Budget),
    Expenses(Expense),
}

impl ChangeRecord {
    pub fn table(&self) -> Table {
        match self {
            ChangeRecord::Groups(_) => Table::Groups,
            ChangeRecord::GroupMembers(_) => Table::GroupMembers,
            ChangeRecord::Budgets(_) => Table::Budgets,
            ChangeRecord::Expenses(_) => Table::Expenses,
        }
    }

    /// String value of a filterable column.
    pub fn column_value(&self, column: &str) -> Option<String> {
        match (self, column) {
            (ChangeRecord::Groups(g), "id") => Some(g.id.to_string()),
            (ChangeRecord::Groups(g), "owner_id") => Some(g.owner_id.to_string()),
            (ChangeRecord::GroupMembers(m), "group_id") => Some(m.group_id.to_string()),
            (ChangeRecord::GroupMembers(m), "user_id") => Some(m.user_id.to_string()),
            (ChangeRecord::Budgets(b), "id") => Some(b.id.to_string()),
            (ChangeRecord::Budgets(b), "group_id") => Some(b.group_id.to_string()),
            (ChangeRecord::Expenses(e), "id") => Some(e.id.to_string()),
            (ChangeRecord::Expenses(e), "budget_id") => Some(e.budget_id.to_string()),
            _ => None,
        }
    }

    pub fn as_expense(&self) -> Option<&Expense> {
        match self {
            ChangeRecord::Expenses(e) => Some(e),
            _ => None,
        }
    }
}

/// One row change pushed by the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub record: ChangeRecord,
    /// Token of the write that produced this change, when the writer supplied one.
    pub correlation: Option<CorrelationId>,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, record: ChangeRecord) -> Self {
        Self {
            kind,
            record,
            correlation: None,
        }
    }

    pub fn with_correlation(mut self, correlation: Option<CorrelationId>) -> Self {
        self.correlation = correlation;
        self
    }
}

/// Channel-level status reported by the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    Subscribing,
    Subscribed,
    Errored(String),
    Closed,
}

/// A live subscription: its status and the events it delivers.
#[derive(Debug)]
pub struct ChangeSubscription {
    pub id: SubscriptionId,
    pub status: watch::Receiver<ChannelStatus>,
    pub events: mpsc::UnboundedReceiver<ChangeEvent>,
}

impl ChangeSubscription {
    /// Waits until the feed confirms the subscription.
    ///
    /// # Errors
    ///
    /// `SubscriptionFailed` if the channel errors or closes first.
    pub async fn confirmed(&mut self) -> Result<(), DomainError> {
        loop {
            let status = self.status.borrow_and_update().clone();
            match status {
                ChannelStatus::Subscribed => return Ok(()),
                ChannelStatus::Errored(message) => {
                    return Err(DomainError::new(ErrorCode::SubscriptionFailed, message))
                }
                ChannelStatus::Closed => {
                    return Err(DomainError::new(
                        ErrorCode::SubscriptionFailed,
                        "Channel closed before subscription was confirmed",
                    ))
                }
                ChannelStatus::Subscribing => {}
            }
            if self.status.changed().await.is_err() {
                return Err(DomainError::new(
                    ErrorCode::SubscriptionFailed,
                    "Change feed dropped the subscription",
                ));
            }
        }
    }
}

/// Port for subscribing to row changes.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Opens a subscription. The returned status starts at `Subscribing`.
    async fn subscribe(&self, topic: ChangeTopic) -> Result<ChangeSubscription, DomainError>;

    /// Releases a subscription. Unknown ids are ignored.
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), DomainError>;
}
