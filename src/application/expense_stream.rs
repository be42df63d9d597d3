//! ExpenseStream - live expense list of the budget currently open.
//!
//! Opening a budget subscribes to its expense changes, waits for the feed
//! to confirm, seeds the list with a direct fetch, then hands the
//! subscription to a pump task that merges insert events.
//!
//! Locally added expenses are shown at once as pending entries tagged with
//! the correlation token of their write. The store echoes that token on
//! the resulting insert event, which then only confirms the entry instead
//! of adding a second copy.

use chrono::NaiveDate;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::budget_store::BudgetStore;
use super::SyncError;
use crate::domain::budget::{display_order, sort_for_display, Expense, NewExpense};
use crate::domain::foundation::{
    BudgetId, CorrelationId, DomainError, ExpenseId, Money, StateMachine, SubscriptionId,
    Timestamp,
};
use crate::ports::{
    ChangeEvent, ChangeFeed, ChangeKind, ChangeSubscription, ChangeTopic, ChannelStatus,
    ExpenseRepository,
};

/// Lifecycle of the stream's change subscription.
///
/// ```text
/// Unsubscribed -> Subscribing -> Active -> Errored
///                      |            |         |
///                      +------------+---------+--> Unsubscribed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionPhase {
    Unsubscribed,
    Subscribing,
    Active,
    Errored,
}

impl StateMachine for SubscriptionPhase {
    fn can_transition_to(&self, target: &Self) -> bool {
        use SubscriptionPhase::*;
        matches!(
            (self, target),
            (Unsubscribed, Subscribing)
                | (Subscribing, Active)
                | (Subscribing, Errored)
                | (Subscribing, Unsubscribed)
                | (Active, Errored)
                | (Active, Unsubscribed)
                | (Errored, Unsubscribed)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SubscriptionPhase::*;
        match self {
            Unsubscribed => vec![Subscribing],
            Subscribing => vec![Active, Errored, Unsubscribed],
            Active => vec![Errored, Unsubscribed],
            Errored => vec![Unsubscribed],
        }
    }
}

/// Snapshot of the stream's state for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamStatus {
    pub budget_id: Option<BudgetId>,
    pub phase: SubscriptionPhase,
    /// Initial fetch in flight.
    pub loading: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    Confirmed,
    /// Shown before the store confirmed it; the token of its write.
    Pending(CorrelationId),
}

/// What an insert event did to the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Merge {
    /// A row written elsewhere was added.
    Added,
    /// A pending local row was confirmed; it was recorded when its write returned.
    Confirmed,
    Unchanged,
}

#[derive(Debug, Clone)]
struct Entry {
    expense: Expense,
    state: EntryState,
}

impl Entry {
    fn confirmed(expense: Expense) -> Self {
        Self {
            expense,
            state: EntryState::Confirmed,
        }
    }
}

struct Inner {
    budget_id: Option<BudgetId>,
    phase: SubscriptionPhase,
    loading: bool,
    error: Option<String>,
    /// Kept in display order.
    entries: Vec<Entry>,
    subscription: Option<SubscriptionId>,
    pump: Option<JoinHandle<()>>,
    /// Bumped on every open and close; stale pumps compare against it.
    generation: u64,
}

impl Inner {
    fn set_phase(&mut self, next: SubscriptionPhase) {
        match self.phase.transition_to(next) {
            Ok(phase) => {
                tracing::debug!(from = ?self.phase, to = ?phase, "Subscription phase changed");
                self.phase = phase;
            }
            Err(error) => {
                tracing::warn!(error = %error, "Ignored invalid subscription transition");
            }
        }
    }

    fn sort(&mut self) {
        self.entries.sort_by(|a, b| display_order(&a.expense, &b.expense));
    }

    /// Merges a remote insert.
    fn merge_insert(&mut self, expense: &Expense, correlation: Option<CorrelationId>) -> Merge {
        if let Some(token) = correlation {
            let echo = self
                .entries
                .iter_mut()
                .find(|e| e.state == EntryState::Pending(token));
            if let Some(entry) = echo {
                entry.state = EntryState::Confirmed;
                tracing::debug!(expense_id = %expense.id, "Discarded echo of local insert");
                return Merge::Confirmed;
            }
        }

        if let Some(entry) = self.entries.iter_mut().find(|e| e.expense.id == expense.id) {
            let was_pending = entry.state != EntryState::Confirmed;
            entry.state = EntryState::Confirmed;
            tracing::debug!(expense_id = %expense.id, "Discarded duplicate insert");
            return if was_pending {
                Merge::Confirmed
            } else {
                Merge::Unchanged
            };
        }

        self.entries.push(Entry::confirmed(expense.clone()));
        self.sort();
        Merge::Added
    }

    fn merge_update(&mut self, expense: &Expense) -> bool {
        match self.entries.iter_mut().find(|e| e.expense.id == expense.id) {
            Some(entry) => {
                *entry = Entry::confirmed(expense.clone());
                self.sort();
                true
            }
            None => false,
        }
    }

    fn merge_delete(&mut self, id: ExpenseId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.expense.id != id);
        self.entries.len() != before
    }
}

struct Shared {
    inner: Mutex<Inner>,
    revision: watch::Sender<u64>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn touch(&self) {
        self.revision.send_modify(|r| *r += 1);
    }

    /// Applies one change event to the list.
    ///
    /// Returns whether the list changed and, for inserts of rows written
    /// elsewhere, the row to record upstream. Echoes of local inserts are
    /// not returned: the write already recorded them, and the row may have
    /// been deleted since. Watchers are not notified here.
    fn apply(
        &self,
        generation: u64,
        event: &ChangeEvent,
        merge_remote_updates: bool,
    ) -> (bool, Option<Expense>) {
        let Some(expense) = event.record.as_expense() else {
            return (false, None);
        };
        let mut inner = self.lock();
        if inner.generation != generation || inner.budget_id != Some(expense.budget_id) {
            return (false, None);
        }
        match event.kind {
            ChangeKind::Insert => match inner.merge_insert(expense, event.correlation) {
                Merge::Added => (true, Some(expense.clone())),
                Merge::Confirmed => (true, None),
                Merge::Unchanged => (false, None),
            },
            ChangeKind::Update if merge_remote_updates => (inner.merge_update(expense), None),
            ChangeKind::Delete if merge_remote_updates => (inner.merge_delete(expense.id), None),
            kind => {
                tracing::debug!(?kind, expense_id = %expense.id, "Ignored remote change");
                (false, None)
            }
        }
    }

    fn channel_failed(&self, generation: u64, message: String) {
        {
            let mut inner = self.lock();
            if inner.generation != generation || inner.phase != SubscriptionPhase::Active {
                return;
            }
            tracing::warn!(error = %message, "Expense channel failed");
            inner.set_phase(SubscriptionPhase::Errored);
            inner.error = Some(message);
        }
        self.touch();
    }
}

/// Live view of one budget's expenses.
pub struct ExpenseStream {
    expenses: Arc<dyn ExpenseRepository>,
    feed: Arc<dyn ChangeFeed>,
    budgets: Option<Arc<BudgetStore>>,
    merge_remote_updates: bool,
    shared: Arc<Shared>,
}

impl ExpenseStream {
    pub fn new(expenses: Arc<dyn ExpenseRepository>, feed: Arc<dyn ChangeFeed>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            expenses,
            feed,
            budgets: None,
            merge_remote_updates: false,
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    budget_id: None,
                    phase: SubscriptionPhase::Unsubscribed,
                    loading: false,
                    error: None,
                    entries: Vec::new(),
                    subscription: None,
                    pump: None,
                    generation: 0,
                }),
                revision,
            }),
        }
    }

    /// Records confirmed inserts into `budgets` so their totals follow.
    pub fn with_budget_store(mut self, budgets: Arc<BudgetStore>) -> Self {
        self.budgets = Some(budgets);
        self
    }

    /// Also apply remote updates and deletes to the open list.
    pub fn with_remote_updates(mut self, enabled: bool) -> Self {
        self.merge_remote_updates = enabled;
        self
    }

    // === Reads ===

    /// Expenses of the open budget, newest first.
    pub fn expenses(&self) -> Vec<Expense> {
        self.shared.lock().entries.iter().map(|e| e.expense.clone()).collect()
    }

    pub fn total_expenses(&self) -> Money {
        self.shared.lock().entries.iter().map(|e| e.expense.amount).sum()
    }

    /// True while a local insert waits for its echo.
    pub fn is_pending(&self, id: ExpenseId) -> bool {
        self.shared
            .lock()
            .entries
            .iter()
            .any(|e| e.expense.id == id && e.state != EntryState::Confirmed)
    }

    pub fn budget_id(&self) -> Option<BudgetId> {
        self.shared.lock().budget_id
    }

    pub fn status(&self) -> StreamStatus {
        let inner = self.shared.lock();
        StreamStatus {
            budget_id: inner.budget_id,
            phase: inner.phase,
            loading: inner.loading,
            error: inner.error.clone(),
        }
    }

    /// Ticks whenever the list or status changes.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.shared.revision.subscribe()
    }

    // === Lifecycle ===

    /// Shows `budget_id`, replacing whatever was open.
    ///
    /// The previous subscription is released before the new one is made.
    ///
    /// # Errors
    ///
    /// - `Subscription` if the feed refuses; the phase is `Errored`
    /// - `LoadFailed` if the initial fetch fails; the stream is closed
    /// - `Cancelled` if the stream was closed or reopened meanwhile
    pub async fn open(&self, budget_id: BudgetId) -> Result<(), SyncError> {
        self.close().await;

        let generation = {
            let mut inner = self.shared.lock();
            inner.generation += 1;
            inner.budget_id = Some(budget_id);
            inner.loading = true;
            inner.error = None;
            inner.set_phase(SubscriptionPhase::Subscribing);
            inner.generation
        };
        self.shared.touch();

        let topic = ChangeTopic::expenses_for_budget(budget_id);
        let channel = topic.channel_name();
        let mut subscription = match self.feed.subscribe(topic).await {
            Ok(subscription) => subscription,
            Err(error) => return Err(self.subscription_failed(generation, error)),
        };

        if !self.adopt_subscription(generation, subscription.id) {
            self.release(subscription.id).await;
            return Err(SyncError::Cancelled("expenses"));
        }

        if let Err(error) = subscription.confirmed().await {
            return Err(self.subscription_failed(generation, error));
        }

        let mut rows = match self.expenses.expenses_for_budget(budget_id).await {
            Ok(rows) => rows,
            Err(error) => {
                let stale = {
                    let mut inner = self.shared.lock();
                    if inner.generation != generation {
                        None
                    } else {
                        inner.loading = false;
                        inner.error = Some(error.message.clone());
                        inner.set_phase(SubscriptionPhase::Unsubscribed);
                        inner.subscription.take()
                    }
                };
                if let Some(id) = stale {
                    self.release(id).await;
                }
                self.shared.touch();
                return Err(SyncError::LoadFailed {
                    resource: "expenses",
                    attempts: 1,
                    source: error,
                });
            }
        };
        sort_for_display(&mut rows);

        {
            let mut inner = self.shared.lock();
            if inner.generation != generation {
                return Err(SyncError::Cancelled("expenses"));
            }
            // Local adds made while the fetch was in flight stay pending.
            let pending: Vec<Entry> = inner
                .entries
                .drain(..)
                .filter(|e| {
                    e.state != EntryState::Confirmed && !rows.iter().any(|r| r.id == e.expense.id)
                })
                .collect();
            inner.entries = rows.into_iter().map(Entry::confirmed).collect();
            if !pending.is_empty() {
                tracing::debug!(count = pending.len(), "Kept pending expenses over the initial fetch");
                inner.entries.extend(pending);
                inner.sort();
            }
            inner.loading = false;
            inner.set_phase(SubscriptionPhase::Active);
            inner.pump = Some(tokio::spawn(pump(
                self.shared.clone(),
                subscription,
                generation,
                self.budgets.clone(),
                self.merge_remote_updates,
            )));
        }
        self.shared.touch();
        tracing::info!(budget_id = %budget_id, channel = %channel, "Expense stream active");
        Ok(())
    }

    /// Releases the subscription and clears the list.
    pub async fn close(&self) {
        let (subscription, pump) = {
            let mut inner = self.shared.lock();
            inner.generation += 1;
            if inner.phase != SubscriptionPhase::Unsubscribed {
                inner.set_phase(SubscriptionPhase::Unsubscribed);
            }
            inner.budget_id = None;
            inner.entries.clear();
            inner.loading = false;
            inner.error = None;
            (inner.subscription.take(), inner.pump.take())
        };
        if let Some(pump) = pump {
            pump.abort();
        }
        if let Some(id) = subscription {
            self.release(id).await;
        }
        self.shared.touch();
    }

    // === Mutations ===

    /// Adds an expense to `target`, or to the open budget when `None`.
    ///
    /// When the target is the open budget the expense is listed as pending
    /// before the remote insert and removed again if the insert fails.
    ///
    /// # Errors
    ///
    /// - `NotFound` when no target is given and nothing is open
    /// - `Mutation` when the remote insert fails
    pub async fn add_expense(
        &self,
        description: impl Into<String>,
        amount: Money,
        date: NaiveDate,
        target: Option<BudgetId>,
    ) -> Result<Expense, SyncError> {
        let correlation = CorrelationId::new();
        let (new, shown) = {
            let mut inner = self.shared.lock();
            let budget_id = target
                .or(inner.budget_id)
                .ok_or_else(|| SyncError::not_found("budget", "(none open)"))?;
            let new = NewExpense::new(budget_id, description, amount, date).with_correlation(correlation);
            let shown = inner.budget_id == Some(budget_id);
            if shown {
                inner.entries.push(Entry {
                    expense: new.to_optimistic(Timestamp::now()),
                    state: EntryState::Pending(correlation),
                });
                inner.sort();
            }
            (new, shown)
        };
        if shown {
            self.shared.touch();
            tracing::debug!(expense_id = %new.id, correlation = %correlation, "Listed pending expense");
        }

        match self.expenses.insert_expense(&new).await {
            Ok(confirmed) => {
                if let Some(budgets) = &self.budgets {
                    budgets.record_expense(confirmed.clone());
                }
                tracing::info!(expense_id = %confirmed.id, budget_id = %confirmed.budget_id, "Expense added");
                Ok(confirmed)
            }
            Err(error) => {
                if shown {
                    let removed = {
                        let mut inner = self.shared.lock();
                        inner.merge_delete(new.id)
                    };
                    if removed {
                        self.shared.touch();
                    }
                }
                tracing::warn!(expense_id = %new.id, error = %error, "Expense insert failed");
                Err(SyncError::mutation("add the expense", error))
            }
        }
    }

    // === Internals ===

    fn adopt_subscription(&self, generation: u64, id: SubscriptionId) -> bool {
        let mut inner = self.shared.lock();
        if inner.generation != generation {
            return false;
        }
        inner.subscription = Some(id);
        true
    }

    fn subscription_failed(&self, generation: u64, error: DomainError) -> SyncError {
        {
            let mut inner = self.shared.lock();
            if inner.generation == generation {
                tracing::warn!(error = %error, "Expense subscription failed");
                inner.loading = false;
                inner.error = Some(error.message.clone());
                inner.set_phase(SubscriptionPhase::Errored);
            }
        }
        self.shared.touch();
        SyncError::Subscription(error)
    }

    async fn release(&self, id: SubscriptionId) {
        match self.feed.unsubscribe(id).await {
            Ok(()) => tracing::debug!(subscription_id = %id, "Released subscription"),
            Err(error) => tracing::warn!(subscription_id = %id, error = %error, "Unsubscribe failed"),
        }
    }
}

impl Drop for ExpenseStream {
    fn drop(&mut self) {
        if let Some(pump) = self.shared.lock().pump.take() {
            pump.abort();
        }
    }
}

/// Feeds subscription events into the stream until the channel fails.
async fn pump(
    shared: Arc<Shared>,
    mut subscription: ChangeSubscription,
    generation: u64,
    budgets: Option<Arc<BudgetStore>>,
    merge_remote_updates: bool,
) {
    loop {
        tokio::select! {
            event = subscription.events.recv() => match event {
                Some(event) => {
                    let (changed, inserted) = shared.apply(generation, &event, merge_remote_updates);
                    if let (Some(budgets), Some(expense)) = (&budgets, inserted) {
                        budgets.record_expense(expense);
                    }
                    if changed {
                        shared.touch();
                    }
                }
                None => {
                    shared.channel_failed(generation, "Change feed closed the channel".to_string());
                    return;
                }
            },
            changed = subscription.status.changed() => {
                if changed.is_err() {
                    shared.channel_failed(generation, "Change feed dropped the subscription".to_string());
                    return;
                }
                let status = subscription.status.borrow_and_update().clone();
                match status {
                    ChannelStatus::Errored(message) => {
                        shared.channel_failed(generation, message);
                        return;
                    }
                    ChannelStatus::Closed => {
                        shared.channel_failed(generation, "Channel closed".to_string());
                        return;
                    }
                    ChannelStatus::Subscribing | ChannelStatus::Subscribed => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryStore, StoreOperation};
    use crate::application::RetryPolicy;
    use crate::domain::budget::Budget;
    use crate::domain::foundation::{GroupId, UserId};
    use crate::domain::group::{Group, GroupMembership, Membership, Role};
    use crate::domain::budget::ExpenseChanges;
    use crate::ports::ChangeRecord;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    struct Fixture {
        remote: Arc<InMemoryStore>,
        budgets: Arc<BudgetStore>,
        groceries: Budget,
        fuel: Budget,
    }

    async fn fixture() -> Fixture {
        let remote = Arc::new(InMemoryStore::new());
        let user = UserId::new("user-1").unwrap();
        let group = Group {
            id: GroupId::new(),
            owner_id: user.clone(),
            created_at: Timestamp::now(),
        };
        remote.seed_group(group.clone());
        remote.seed_membership(Membership::owner(group.id, user));

        let budget = |name: &str| Budget {
            id: BudgetId::new(),
            group_id: group.id,
            name: name.to_string(),
            amount: Money::from_cents(20000),
            created_at: Timestamp::now(),
        };
        let groceries = budget("Groceries");
        let fuel = budget("Fuel");
        remote.seed_budget(groceries.clone());
        remote.seed_budget(fuel.clone());

        let budgets = Arc::new(BudgetStore::new(
            remote.clone(),
            remote.clone(),
            RetryPolicy::new(0, Duration::from_millis(1)),
        ));
        budgets
            .load(&[GroupMembership::new(group, Role::Owner)])
            .await
            .unwrap();

        Fixture {
            remote,
            budgets,
            groceries,
            fuel,
        }
    }

    impl Fixture {
        fn stream(&self) -> ExpenseStream {
            ExpenseStream::new(self.remote.clone(), self.remote.clone())
                .with_budget_store(self.budgets.clone())
        }

        fn seed_expense(&self, budget_id: BudgetId, desc: &str, cents: i64, day: u32) -> Expense {
            let expense = NewExpense::new(budget_id, desc, Money::from_cents(cents), date(day))
                .to_optimistic(Timestamp::now());
            self.remote.seed_expense(expense.clone());
            expense
        }

        fn remote_expense(&self, budget_id: BudgetId, desc: &str, cents: i64, day: u32) -> Expense {
            NewExpense::new(budget_id, desc, Money::from_cents(cents), date(day))
                .to_optimistic(Timestamp::now())
        }
    }

    async fn settle(stream: &ExpenseStream, condition: impl Fn(&ExpenseStream) -> bool) {
        let mut rx = stream.changes();
        let reached = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if condition(stream) {
                    return;
                }
                if rx.changed().await.is_err() {
                    return;
                }
            }
        })
        .await;
        assert!(reached.is_ok(), "stream never reached the expected state");
    }

    fn count(stream: &ExpenseStream, id: ExpenseId) -> usize {
        stream.expenses().iter().filter(|e| e.id == id).count()
    }

    #[test]
    fn phases_follow_the_subscription_lifecycle() {
        use SubscriptionPhase::*;
        assert!(Unsubscribed.can_transition_to(&Subscribing));
        assert!(!Unsubscribed.can_transition_to(&Active));
        assert!(Subscribing.can_transition_to(&Active));
        assert!(Active.can_transition_to(&Errored));
        assert!(!Errored.can_transition_to(&Active));
        assert!(Errored.can_transition_to(&Unsubscribed));
        assert!(!Errored.is_terminal());
        for phase in [Unsubscribed, Subscribing, Active, Errored] {
            for target in phase.valid_transitions() {
                assert!(phase.can_transition_to(&target));
            }
        }
    }

    #[tokio::test]
    async fn open_seeds_the_list_newest_first() {
        let f = fixture().await;
        f.seed_expense(f.groceries.id, "Milk", 450, 1);
        f.seed_expense(f.groceries.id, "Eggs", 275, 3);
        f.seed_expense(f.groceries.id, "Bread", 300, 2);
        f.seed_expense(f.fuel.id, "Diesel", 5000, 4);
        let stream = f.stream();

        stream.open(f.groceries.id).await.unwrap();

        let names: Vec<_> = stream.expenses().into_iter().map(|e| e.description).collect();
        assert_eq!(names, vec!["Eggs", "Bread", "Milk"]);
        let status = stream.status();
        assert_eq!(status.phase, SubscriptionPhase::Active);
        assert_eq!(status.budget_id, Some(f.groceries.id));
        assert!(!status.loading);
        assert_eq!(f.remote.active_subscriptions(), 1);
    }

    #[tokio::test]
    async fn reopening_releases_the_previous_channel_first() {
        let f = fixture().await;
        let stream = f.stream();

        stream.open(f.groceries.id).await.unwrap();
        stream.open(f.fuel.id).await.unwrap();

        assert_eq!(f.remote.active_subscriptions(), 1);
        assert_eq!(stream.budget_id(), Some(f.fuel.id));
    }

    #[tokio::test]
    async fn close_unsubscribes_and_clears() {
        let f = fixture().await;
        f.seed_expense(f.groceries.id, "Milk", 450, 1);
        let stream = f.stream();
        stream.open(f.groceries.id).await.unwrap();

        stream.close().await;

        assert_eq!(f.remote.active_subscriptions(), 0);
        assert!(stream.expenses().is_empty());
        assert_eq!(stream.status().phase, SubscriptionPhase::Unsubscribed);
    }

    #[tokio::test]
    async fn local_insert_is_listed_once_after_its_echo() {
        let f = fixture().await;
        let stream = f.stream();
        stream.open(f.groceries.id).await.unwrap();
        f.remote.hold_events();

        let milk = stream
            .add_expense("Milk", Money::from_cents(450), date(1), None)
            .await
            .unwrap();

        assert!(stream.is_pending(milk.id));
        assert_eq!(count(&stream, milk.id), 1);

        f.remote.release_events();
        settle(&stream, |s| !s.is_pending(milk.id)).await;

        assert_eq!(count(&stream, milk.id), 1);
        assert_eq!(stream.total_expenses(), Money::from_cents(450));
    }

    #[tokio::test]
    async fn repeated_insert_without_token_is_deduplicated_by_id() {
        let f = fixture().await;
        let stream = f.stream();
        stream.open(f.groceries.id).await.unwrap();
        let milk = stream
            .add_expense("Milk", Money::from_cents(450), date(1), None)
            .await
            .unwrap();
        settle(&stream, |s| !s.is_pending(milk.id)).await;

        f.remote.emit(ChangeEvent::new(
            ChangeKind::Insert,
            ChangeRecord::Expenses(milk.clone()),
        ));
        let marker = f.remote_expense(f.groceries.id, "Bread", 300, 2);
        f.remote.emit(ChangeEvent::new(ChangeKind::Insert, ChangeRecord::Expenses(marker)));
        settle(&stream, |s| s.expenses().len() == 2).await;

        assert_eq!(count(&stream, milk.id), 1);
        assert_eq!(stream.total_expenses(), Money::from_cents(750));
    }

    #[tokio::test]
    async fn confirmed_insert_raises_the_budget_total() {
        let f = fixture().await;
        let stream = f.stream();
        stream.open(f.groceries.id).await.unwrap();

        stream
            .add_expense("Milk", Money::from_cents(450), date(1), None)
            .await
            .unwrap();

        let view = f.budgets.budget(f.groceries.id).unwrap();
        assert_eq!(view.total_expenses(), Money::from_cents(450));
        assert_eq!(view.remaining(), Money::from_cents(19550));
    }

    #[tokio::test]
    async fn deleted_expense_stays_deleted_after_a_late_echo() {
        let f = fixture().await;
        let stream = f.stream();
        stream.open(f.groceries.id).await.unwrap();
        f.remote.hold_events();

        let milk = stream
            .add_expense("Milk", Money::from_cents(450), date(1), None)
            .await
            .unwrap();
        f.budgets.delete_expense(milk.id).await.unwrap();

        f.remote.release_events();
        settle(&stream, |s| !s.is_pending(milk.id)).await;

        let view = f.budgets.budget(f.groceries.id).unwrap();
        assert!(!view.contains_expense(milk.id));
        assert_eq!(view.total_expenses(), Money::zero());
    }

    #[tokio::test]
    async fn another_clients_insert_is_merged_in_order() {
        let f = fixture().await;
        f.seed_expense(f.groceries.id, "Milk", 450, 1);
        f.seed_expense(f.groceries.id, "Eggs", 275, 3);
        let stream = f.stream();
        stream.open(f.groceries.id).await.unwrap();

        let bread = f.remote_expense(f.groceries.id, "Bread", 300, 2);
        f.remote.emit(ChangeEvent::new(ChangeKind::Insert, ChangeRecord::Expenses(bread.clone())));
        settle(&stream, |s| s.expenses().len() == 3).await;

        let names: Vec<_> = stream.expenses().into_iter().map(|e| e.description).collect();
        assert_eq!(names, vec!["Eggs", "Bread", "Milk"]);
        assert!(f.budgets.budget(f.groceries.id).unwrap().contains_expense(bread.id));
    }

    #[tokio::test]
    async fn failed_insert_removes_the_pending_entry() {
        let f = fixture().await;
        let stream = f.stream();
        stream.open(f.groceries.id).await.unwrap();
        f.remote.fail_next(StoreOperation::InsertExpense, 1);

        let err = stream
            .add_expense("Milk", Money::from_cents(450), date(1), None)
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Mutation { .. }));
        assert!(stream.expenses().is_empty());
        assert_eq!(f.budgets.budget(f.groceries.id).unwrap().total_expenses(), Money::zero());
    }

    #[tokio::test]
    async fn insert_into_another_budget_is_not_listed() {
        let f = fixture().await;
        let stream = f.stream();
        stream.open(f.groceries.id).await.unwrap();

        let diesel = stream
            .add_expense("Diesel", Money::from_cents(5000), date(1), Some(f.fuel.id))
            .await
            .unwrap();

        assert_eq!(diesel.budget_id, f.fuel.id);
        assert!(stream.expenses().is_empty());
        assert_eq!(f.budgets.budget(f.fuel.id).unwrap().total_expenses(), Money::from_cents(5000));
    }

    #[tokio::test]
    async fn add_without_a_budget_is_rejected() {
        let f = fixture().await;
        let stream = f.stream();

        let err = stream
            .add_expense("Milk", Money::from_cents(450), date(1), None)
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::NotFound { entity: "budget", .. }));
        assert_eq!(f.remote.calls(StoreOperation::InsertExpense), 0);
    }

    #[tokio::test]
    async fn remote_updates_and_deletes_are_ignored_by_default() {
        let f = fixture().await;
        let milk = f.seed_expense(f.groceries.id, "Milk", 450, 1);
        let eggs = f.seed_expense(f.groceries.id, "Eggs", 275, 3);
        let stream = f.stream();
        stream.open(f.groceries.id).await.unwrap();

        let mut renamed = milk.clone();
        renamed.description = "Oat milk".to_string();
        f.remote.emit(ChangeEvent::new(ChangeKind::Update, ChangeRecord::Expenses(renamed)));
        f.remote.emit(ChangeEvent::new(ChangeKind::Delete, ChangeRecord::Expenses(eggs.clone())));
        let marker = f.remote_expense(f.groceries.id, "Bread", 300, 2);
        f.remote.emit(ChangeEvent::new(ChangeKind::Insert, ChangeRecord::Expenses(marker)));
        settle(&stream, |s| s.expenses().len() == 3).await;

        let listed = stream.expenses();
        assert!(listed.iter().any(|e| e.description == "Milk"));
        assert!(listed.iter().any(|e| e.id == eggs.id));
    }

    #[tokio::test]
    async fn remote_updates_and_deletes_merge_when_enabled() {
        let f = fixture().await;
        let milk = f.seed_expense(f.groceries.id, "Milk", 450, 1);
        let eggs = f.seed_expense(f.groceries.id, "Eggs", 275, 3);
        let stream = f.stream().with_remote_updates(true);
        stream.open(f.groceries.id).await.unwrap();

        let mut renamed = milk.clone();
        renamed.description = "Oat milk".to_string();
        f.remote.emit(ChangeEvent::new(ChangeKind::Update, ChangeRecord::Expenses(renamed)));
        f.remote.emit(ChangeEvent::new(ChangeKind::Delete, ChangeRecord::Expenses(eggs)));
        settle(&stream, |s| s.expenses().len() == 1).await;

        assert_eq!(stream.expenses()[0].description, "Oat milk");
    }

    #[tokio::test]
    async fn refused_subscription_leaves_the_stream_errored() {
        let f = fixture().await;
        f.remote.reject_subscriptions(Some("permission denied".into()));
        let stream = f.stream();

        let err = stream.open(f.groceries.id).await.unwrap_err();

        assert!(matches!(err, SyncError::Subscription(_)));
        let status = stream.status();
        assert_eq!(status.phase, SubscriptionPhase::Errored);
        assert_eq!(status.error.as_deref(), Some("permission denied"));

        f.remote.reject_subscriptions(None);
        stream.open(f.groceries.id).await.unwrap();
        assert_eq!(stream.status().phase, SubscriptionPhase::Active);
        assert_eq!(f.remote.active_subscriptions(), 1);
    }

    #[tokio::test]
    async fn dropped_channel_moves_to_errored() {
        let f = fixture().await;
        let stream = f.stream();
        stream.open(f.groceries.id).await.unwrap();

        f.remote.break_subscriptions("connection lost");
        settle(&stream, |s| s.status().phase == SubscriptionPhase::Errored).await;

        assert_eq!(stream.status().error.as_deref(), Some("connection lost"));
    }

    /// Expense repository whose initial fetch reads its rows, then waits
    /// for `release` before returning them.
    struct SlowFetch {
        remote: Arc<InMemoryStore>,
        fetched: Notify,
        release: Notify,
    }

    #[async_trait]
    impl ExpenseRepository for SlowFetch {
        async fn expenses_for_budget(&self, budget_id: BudgetId) -> Result<Vec<Expense>, DomainError> {
            let rows = self.remote.expenses_for_budget(budget_id).await;
            self.fetched.notify_one();
            self.release.notified().await;
            rows
        }

        async fn insert_expense(&self, expense: &NewExpense) -> Result<Expense, DomainError> {
            self.remote.insert_expense(expense).await
        }

        async fn update_expense(&self, id: ExpenseId, changes: &ExpenseChanges) -> Result<Expense, DomainError> {
            self.remote.update_expense(id, changes).await
        }

        async fn delete_expense(&self, id: ExpenseId) -> Result<(), DomainError> {
            self.remote.delete_expense(id).await
        }

        async fn delete_expenses_for_budget(&self, budget_id: BudgetId) -> Result<u64, DomainError> {
            self.remote.delete_expenses_for_budget(budget_id).await
        }
    }

    #[tokio::test]
    async fn add_during_the_initial_fetch_survives_seeding() {
        let f = fixture().await;
        f.seed_expense(f.groceries.id, "Eggs", 275, 3);
        let repo = Arc::new(SlowFetch {
            remote: f.remote.clone(),
            fetched: Notify::new(),
            release: Notify::new(),
        });
        let stream = Arc::new(
            ExpenseStream::new(repo.clone(), f.remote.clone()).with_budget_store(f.budgets.clone()),
        );
        let opening = tokio::spawn({
            let stream = stream.clone();
            let budget_id = f.groceries.id;
            async move { stream.open(budget_id).await }
        });

        repo.fetched.notified().await;
        f.remote.hold_events();
        let milk = stream
            .add_expense("Milk", Money::from_cents(450), date(1), None)
            .await
            .unwrap();
        repo.release.notify_one();
        opening.await.unwrap().unwrap();

        assert!(stream.is_pending(milk.id));
        let names: Vec<_> = stream.expenses().into_iter().map(|e| e.description).collect();
        assert_eq!(names, vec!["Eggs", "Milk"]);

        f.remote.release_events();
        settle(&stream, |s| !s.is_pending(milk.id)).await;
        assert_eq!(count(&stream, milk.id), 1);
        assert_eq!(stream.total_expenses(), Money::from_cents(725));
    }

    #[tokio::test]
    async fn failed_initial_fetch_releases_the_channel() {
        let f = fixture().await;
        f.remote.fail_next(StoreOperation::ExpensesForBudget, 1);
        let stream = f.stream();

        let err = stream.open(f.groceries.id).await.unwrap_err();

        assert!(matches!(err, SyncError::LoadFailed { resource: "expenses", .. }));
        assert_eq!(stream.status().phase, SubscriptionPhase::Unsubscribed);
        assert_eq!(f.remote.active_subscriptions(), 0);
    }
}
