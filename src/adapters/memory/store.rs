//! In-memory remote store for tests and local runs.
//!
//! Holds the four collections in process, publishes a change event for every
//! write, and lets tests script failures per operation. Change events are
//! delivered synchronously during the write unless held with
//! [`InMemoryStore::hold_events`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};

use super::faults::{FaultPlan, StoreOperation};
use crate::domain::budget::{
    sort_for_display, Budget, BudgetChanges, BudgetWithExpenses, Expense, ExpenseChanges, NewBudget,
    NewExpense,
};
use crate::domain::foundation::{
    BudgetId, DomainError, ErrorCode, ExpenseId, GroupId, SubscriptionId, Timestamp, UserId,
};
use crate::domain::group::{Group, Membership};
use crate::ports::{
    BudgetRepository, ChangeEvent, ChangeFeed, ChangeKind, ChangeRecord, ChangeSubscription,
    ChangeTopic, ChannelStatus, ExpenseRepository, GroupRepository,
};

#[derive(Debug, Default)]
struct Tables {
    groups: Vec<Group>,
    members: Vec<Membership>,
    budgets: Vec<Budget>,
    expenses: Vec<Expense>,
}

struct Subscriber {
    topic: ChangeTopic,
    status: watch::Sender<ChannelStatus>,
    events: mpsc::UnboundedSender<ChangeEvent>,
}

#[derive(Default)]
struct Feed {
    subscribers: HashMap<SubscriptionId, Subscriber>,
    held: Option<Vec<ChangeEvent>>,
    reject_with: Option<String>,
}

impl Feed {
    fn dispatch(&mut self, event: ChangeEvent) {
        if let Some(held) = self.held.as_mut() {
            held.push(event);
            return;
        }
        self.subscribers.retain(|_, sub| {
            if sub.topic.matches(&event) {
                sub.events.send(event.clone()).is_ok()
            } else {
                !sub.events.is_closed()
            }
        });
    }
}

/// In-process implementation of every remote store port.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    feed: Mutex<Feed>,
    faults: Mutex<FaultPlan>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // === Seeding (no change events) ===

    pub fn seed_group(&self, group: Group) {
        lock(&self.tables).groups.push(group);
    }

    pub fn seed_membership(&self, membership: Membership) {
        lock(&self.tables).members.push(membership);
    }

    pub fn seed_budget(&self, budget: Budget) {
        lock(&self.tables).budgets.push(budget);
    }

    pub fn seed_expense(&self, expense: Expense) {
        lock(&self.tables).expenses.push(expense);
    }

    // === Inspection ===

    pub fn groups(&self) -> Vec<Group> {
        lock(&self.tables).groups.clone()
    }

    pub fn memberships(&self) -> Vec<Membership> {
        lock(&self.tables).members.clone()
    }

    pub fn budgets(&self) -> Vec<Budget> {
        lock(&self.tables).budgets.clone()
    }

    pub fn expenses(&self) -> Vec<Expense> {
        lock(&self.tables).expenses.clone()
    }

    pub fn expense(&self, id: ExpenseId) -> Option<Expense> {
        lock(&self.tables).expenses.iter().find(|e| e.id == id).cloned()
    }

    /// Subscriptions whose receiver is still alive.
    pub fn active_subscriptions(&self) -> usize {
        let mut feed = lock(&self.feed);
        feed.subscribers.retain(|_, sub| !sub.events.is_closed());
        feed.subscribers.len()
    }

    // === Fault injection ===

    /// Fails the next `times` calls of `op`.
    pub fn fail_next(&self, op: StoreOperation, times: u32) {
        lock(&self.faults).fail_next(op, times);
    }

    /// Fails every call of `op` until [`heal`](Self::heal).
    pub fn fail_always(&self, op: StoreOperation) {
        lock(&self.faults).fail_always(op);
    }

    pub fn heal(&self, op: StoreOperation) {
        lock(&self.faults).heal(op);
    }

    /// How many times `op` was attempted, failures included.
    pub fn calls(&self, op: StoreOperation) -> usize {
        lock(&self.faults).calls(op)
    }

    // === Change feed control ===

    /// Queues change events instead of delivering them.
    pub fn hold_events(&self) {
        let mut feed = lock(&self.feed);
        if feed.held.is_none() {
            feed.held = Some(Vec::new());
        }
    }

    /// Delivers queued events in order and resumes live delivery.
    pub fn release_events(&self) {
        let mut feed = lock(&self.feed);
        if let Some(held) = feed.held.take() {
            for event in held {
                feed.dispatch(event);
            }
        }
    }

    /// New subscriptions end in `Errored(message)` instead of `Subscribed`.
    pub fn reject_subscriptions(&self, message: Option<String>) {
        lock(&self.feed).reject_with = message;
    }

    /// Publishes a change as if another client had written it.
    pub fn emit(&self, event: ChangeEvent) {
        lock(&self.feed).dispatch(event);
    }

    /// Marks every live subscription as errored, e.g. a dropped connection.
    pub fn break_subscriptions(&self, message: &str) {
        let feed = lock(&self.feed);
        for sub in feed.subscribers.values() {
            sub.status.send_replace(ChannelStatus::Errored(message.to_string()));
        }
    }

    fn check(&self, op: StoreOperation) -> Result<(), DomainError> {
        lock(&self.faults).check(op)
    }

    fn publish(&self, event: ChangeEvent) {
        lock(&self.feed).dispatch(event);
    }
}

#[async_trait]
impl GroupRepository for InMemoryStore {
    async fn memberships_for_user(&self, user_id: &UserId) -> Result<Vec<Membership>, DomainError> {
        self.check(StoreOperation::MembershipsForUser)?;
        Ok(lock(&self.tables)
            .members
            .iter()
            .filter(|m| &m.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn groups_by_ids(&self, ids: &[GroupId]) -> Result<Vec<Group>, DomainError> {
        self.check(StoreOperation::GroupsByIds)?;
        Ok(lock(&self.tables)
            .groups
            .iter()
            .filter(|g| ids.contains(&g.id))
            .cloned()
            .collect())
    }

    async fn create_group(&self, owner_id: &UserId) -> Result<Group, DomainError> {
        self.check(StoreOperation::CreateGroup)?;
        let group = Group {
            id: GroupId::new(),
            owner_id: owner_id.clone(),
            created_at: Timestamp::now(),
        };
        lock(&self.tables).groups.push(group.clone());
        self.publish(ChangeEvent::new(ChangeKind::Insert, ChangeRecord::Groups(group.clone())));
        Ok(group)
    }

    async fn add_member(&self, membership: &Membership) -> Result<Membership, DomainError> {
        self.check(StoreOperation::AddMember)?;
        {
            let mut tables = lock(&self.tables);
            if !tables.groups.iter().any(|g| g.id == membership.group_id) {
                return Err(DomainError::new(ErrorCode::GroupNotFound, "Group not found")
                    .with_detail("group_id", membership.group_id.to_string()));
            }
            let duplicate = tables
                .members
                .iter()
                .any(|m| m.group_id == membership.group_id && m.user_id == membership.user_id);
            if duplicate {
                return Err(DomainError::database("duplicate membership"));
            }
            tables.members.push(membership.clone());
        }
        self.publish(ChangeEvent::new(
            ChangeKind::Insert,
            ChangeRecord::GroupMembers(membership.clone()),
        ));
        Ok(membership.clone())
    }
}

#[async_trait]
impl BudgetRepository for InMemoryStore {
    async fn budgets_with_expenses(
        &self,
        group_ids: &[GroupId],
    ) -> Result<Vec<BudgetWithExpenses>, DomainError> {
        self.check(StoreOperation::BudgetsWithExpenses)?;
        let tables = lock(&self.tables);

        let mut budgets: Vec<&Budget> = tables
            .budgets
            .iter()
            .filter(|b| group_ids.contains(&b.group_id))
            .collect();
        budgets.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(budgets
            .into_iter()
            .map(|budget| {
                let mut expenses: Vec<Expense> = tables
                    .expenses
                    .iter()
                    .filter(|e| e.budget_id == budget.id)
                    .cloned()
                    .collect();
                sort_for_display(&mut expenses);
                BudgetWithExpenses {
                    budget: budget.clone(),
                    expenses,
                }
            })
            .collect())
    }

    async fn insert_budget(&self, new: &NewBudget) -> Result<Budget, DomainError> {
        self.check(StoreOperation::InsertBudget)?;
        let budget = Budget {
            id: BudgetId::new(),
            group_id: new.group_id,
            name: new.name.clone(),
            amount: new.amount,
            created_at: Timestamp::now(),
        };
        lock(&self.tables).budgets.push(budget.clone());
        self.publish(ChangeEvent::new(ChangeKind::Insert, ChangeRecord::Budgets(budget.clone())));
        Ok(budget)
    }

    async fn update_budget(&self, id: BudgetId, changes: &BudgetChanges) -> Result<Budget, DomainError> {
        self.check(StoreOperation::UpdateBudget)?;
        let updated = {
            let mut tables = lock(&self.tables);
            let budget = tables
                .budgets
                .iter_mut()
                .find(|b| b.id == id)
                .ok_or_else(|| {
                    DomainError::new(ErrorCode::BudgetNotFound, "Budget not found")
                        .with_detail("budget_id", id.to_string())
                })?;
            changes.apply_to(budget);
            budget.clone()
        };
        self.publish(ChangeEvent::new(ChangeKind::Update, ChangeRecord::Budgets(updated.clone())));
        Ok(updated)
    }

    async fn delete_budget(&self, id: BudgetId) -> Result<(), DomainError> {
        self.check(StoreOperation::DeleteBudget)?;
        let removed = {
            let mut tables = lock(&self.tables);
            let index = tables.budgets.iter().position(|b| b.id == id);
            index.map(|i| tables.budgets.remove(i))
        };
        if let Some(budget) = removed {
            self.publish(ChangeEvent::new(ChangeKind::Delete, ChangeRecord::Budgets(budget)));
        }
        Ok(())
    }
}

#[async_trait]
impl ExpenseRepository for InMemoryStore {
    async fn expenses_for_budget(&self, budget_id: BudgetId) -> Result<Vec<Expense>, DomainError> {
        self.check(StoreOperation::ExpensesForBudget)?;
        let mut expenses: Vec<Expense> = lock(&self.tables)
            .expenses
            .iter()
            .filter(|e| e.budget_id == budget_id)
            .cloned()
            .collect();
        sort_for_display(&mut expenses);
        Ok(expenses)
    }

    async fn insert_expense(&self, new: &NewExpense) -> Result<Expense, DomainError> {
        self.check(StoreOperation::InsertExpense)?;
        let expense = new.to_optimistic(Timestamp::now());
        {
            let mut tables = lock(&self.tables);
            if tables.expenses.iter().any(|e| e.id == expense.id) {
                return Err(DomainError::database("duplicate expense id")
                    .with_detail("expense_id", expense.id.to_string()));
            }
            tables.expenses.push(expense.clone());
        }
        self.publish(
            ChangeEvent::new(ChangeKind::Insert, ChangeRecord::Expenses(expense.clone()))
                .with_correlation(new.correlation),
        );
        Ok(expense)
    }

    async fn update_expense(&self, id: ExpenseId, changes: &ExpenseChanges) -> Result<Expense, DomainError> {
        self.check(StoreOperation::UpdateExpense)?;
        let updated = {
            let mut tables = lock(&self.tables);
            let expense = tables
                .expenses
                .iter_mut()
                .find(|e| e.id == id)
                .ok_or_else(|| {
                    DomainError::new(ErrorCode::ExpenseNotFound, "Expense not found")
                        .with_detail("expense_id", id.to_string())
                })?;
            *expense = changes.apply_to(expense);
            expense.clone()
        };
        self.publish(ChangeEvent::new(ChangeKind::Update, ChangeRecord::Expenses(updated.clone())));
        Ok(updated)
    }

    async fn delete_expense(&self, id: ExpenseId) -> Result<(), DomainError> {
        self.check(StoreOperation::DeleteExpense)?;
        let removed = {
            let mut tables = lock(&self.tables);
            let index = tables.expenses.iter().position(|e| e.id == id);
            index.map(|i| tables.expenses.remove(i))
        };
        if let Some(expense) = removed {
            self.publish(ChangeEvent::new(ChangeKind::Delete, ChangeRecord::Expenses(expense)));
        }
        Ok(())
    }

    async fn delete_expenses_for_budget(&self, budget_id: BudgetId) -> Result<u64, DomainError> {
        self.check(StoreOperation::DeleteExpensesForBudget)?;
        let removed: Vec<Expense> = {
            let mut tables = lock(&self.tables);
            let (gone, kept) = std::mem::take(&mut tables.expenses)
                .into_iter()
                .partition(|e| e.budget_id == budget_id);
            tables.expenses = kept;
            gone
        };
        let count = removed.len() as u64;
        for expense in removed {
            self.publish(ChangeEvent::new(ChangeKind::Delete, ChangeRecord::Expenses(expense)));
        }
        Ok(count)
    }
}

#[async_trait]
impl ChangeFeed for InMemoryStore {
    async fn subscribe(&self, topic: ChangeTopic) -> Result<ChangeSubscription, DomainError> {
        self.check(StoreOperation::Subscribe)?;

        let id = SubscriptionId::new();
        let (status_tx, status_rx) = watch::channel(ChannelStatus::Subscribing);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let mut feed = lock(&self.feed);
        match feed.reject_with.clone() {
            Some(message) => {
                status_tx.send_replace(ChannelStatus::Errored(message));
            }
            None => {
                status_tx.send_replace(ChannelStatus::Subscribed);
            }
        }
        feed.subscribers.insert(
            id,
            Subscriber {
                topic,
                status: status_tx,
                events: events_tx,
            },
        );

        Ok(ChangeSubscription {
            id,
            status: status_rx,
            events: events_rx,
        })
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), DomainError> {
        if let Some(sub) = lock(&self.feed).subscribers.remove(&id) {
            sub.status.send_replace(ChannelStatus::Closed);
        }
        Ok(())
    }
}
