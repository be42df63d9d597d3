//! BudgetStore - the local mirror of the user's budgets and their expenses.
//!
//! State lives in an immutable [`BudgetSnapshot`] behind an `Arc`. Every
//! change goes through `commit`, which publishes the next version to
//! watchers. Expense edits are applied before the remote call and rolled
//! back if it fails; budget edits wait for the server.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

use super::retry::{Lifetime, RetryPolicy};
use super::SyncError;
use crate::domain::budget::{
    Budget, BudgetChanges, BudgetSnapshot, BudgetView, Expense, ExpenseChanges, NewBudget,
};
use crate::domain::extraction::BudgetCandidate;
use crate::domain::foundation::{BudgetId, DomainError, ExpenseId, GroupId, Money};
use crate::domain::group::{first_owned_group, GroupMembership};
use crate::ports::{BudgetRepository, ExpenseRepository};

/// Progress of the most recent load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    Idle,
    Loading,
    Ready,
    Failed { message: String },
}

struct State {
    snapshot: Arc<BudgetSnapshot>,
    status: LoadStatus,
    last_error: Option<SyncError>,
    /// Groups of the last load; scope for `refresh` and `add_budget`.
    groups: Vec<GroupMembership>,
}

/// Owner of the local budget collection.
pub struct BudgetStore {
    budgets: Arc<dyn BudgetRepository>,
    expenses: Arc<dyn ExpenseRepository>,
    retry: RetryPolicy,
    lifetime: Lifetime,
    state: Mutex<State>,
    published: watch::Sender<Arc<BudgetSnapshot>>,
}

impl BudgetStore {
    pub fn new(
        budgets: Arc<dyn BudgetRepository>,
        expenses: Arc<dyn ExpenseRepository>,
        retry: RetryPolicy,
    ) -> Self {
        let snapshot = Arc::new(BudgetSnapshot::empty());
        let (published, _) = watch::channel(snapshot.clone());
        Self {
            budgets,
            expenses,
            retry,
            lifetime: Lifetime::new(),
            state: Mutex::new(State {
                snapshot,
                status: LoadStatus::Idle,
                last_error: None,
                groups: Vec::new(),
            }),
            published,
        }
    }

    // === Reads ===

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<BudgetSnapshot> {
        self.lock().snapshot.clone()
    }

    /// Receives every committed snapshot.
    pub fn watch(&self) -> watch::Receiver<Arc<BudgetSnapshot>> {
        self.published.subscribe()
    }

    pub fn budget(&self, id: BudgetId) -> Option<BudgetView> {
        self.lock().snapshot.budget(id).cloned()
    }

    /// Budgets offered to the extraction service.
    pub fn candidates(&self) -> Vec<BudgetCandidate> {
        self.lock()
            .snapshot
            .budgets()
            .iter()
            .map(|view| BudgetCandidate {
                id: view.id(),
                name: view.budget().name.clone(),
            })
            .collect()
    }

    pub fn status(&self) -> LoadStatus {
        self.lock().status.clone()
    }

    pub fn last_error(&self) -> Option<SyncError> {
        self.lock().last_error.clone()
    }

    pub fn groups(&self) -> Vec<GroupMembership> {
        self.lock().groups.clone()
    }

    /// Cancels any load retry still waiting to fire.
    pub fn shutdown(&self) {
        self.lifetime.shutdown();
    }

    // === Loading ===

    /// Replaces the collection with the budgets of `groups`.
    ///
    /// Every failed attempt clears the collection and records the error.
    /// Each call starts with a fresh retry budget.
    ///
    /// # Errors
    ///
    /// - `LoadFailed` after the last retry fails; the collection is empty
    /// - `Cancelled` if shut down while waiting for a retry
    pub async fn load(&self, groups: &[GroupMembership]) -> Result<Arc<BudgetSnapshot>, SyncError> {
        let ids: Vec<GroupId> = groups.iter().map(|g| g.group_id()).collect();
        {
            let mut state = self.lock();
            state.groups = groups.to_vec();
            state.status = LoadStatus::Loading;
        }

        if ids.is_empty() {
            let mut state = self.lock();
            self.commit(&mut state, Vec::new());
            state.status = LoadStatus::Ready;
            state.last_error = None;
            return Ok(state.snapshot.clone());
        }

        let ids = &ids;
        let fetched = self
            .retry
            .run(&self.lifetime, "budgets", |attempt| async move {
                tracing::debug!(attempt, groups = ids.len(), "Fetching budgets");
                let result = self.budgets.budgets_with_expenses(ids).await;
                if let Err(error) = &result {
                    self.record_failed_attempt(attempt, error);
                }
                result
            })
            .await;

        let mut state = self.lock();
        match fetched {
            Ok(rows) => {
                let views: Vec<BudgetView> = rows.into_iter().map(BudgetView::from).collect();
                let count = views.len();
                let version = self.commit(&mut state, views);
                state.status = LoadStatus::Ready;
                state.last_error = None;
                tracing::info!(budgets = count, version, "Budgets loaded");
                Ok(state.snapshot.clone())
            }
            Err(error) => {
                if !state.snapshot.is_empty() {
                    self.commit(&mut state, Vec::new());
                }
                state.status = LoadStatus::Failed {
                    message: error.user_message(),
                };
                state.last_error = Some(error.clone());
                Err(error)
            }
        }
    }

    /// Loads again with the groups of the previous load.
    pub async fn refresh(&self) -> Result<Arc<BudgetSnapshot>, SyncError> {
        let groups = self.groups();
        self.load(&groups).await
    }

    fn record_failed_attempt(&self, attempt: u32, error: &DomainError) {
        let mut state = self.lock();
        if !state.snapshot.is_empty() {
            self.commit(&mut state, Vec::new());
        }
        state.last_error = Some(SyncError::LoadFailed {
            resource: "budgets",
            attempts: attempt,
            source: error.clone(),
        });
    }

    // === Budget mutations (confirmed before applied) ===

    /// Creates a budget in the first group the user owns and prepends it.
    ///
    /// # Errors
    ///
    /// - `Forbidden` if the user owns none of the loaded groups
    /// - `Mutation` if the insert fails; local state is untouched
    pub async fn add_budget(
        &self,
        name: impl Into<String>,
        amount: Money,
    ) -> Result<Budget, SyncError> {
        let group_id = {
            let state = self.lock();
            first_owned_group(&state.groups)
                .map(|g| g.group_id())
                .ok_or_else(|| {
                    SyncError::Forbidden("Only group owners can create budgets".to_string())
                })?
        };

        let budget = self
            .budgets
            .insert_budget(&NewBudget::new(group_id, name, amount))
            .await
            .map_err(|e| SyncError::mutation("create the budget", e))?;

        let mut state = self.lock();
        if state.snapshot.budget(budget.id).is_none() {
            let mut budgets = state.snapshot.to_budgets();
            budgets.insert(0, BudgetView::empty(budget.clone()));
            self.commit(&mut state, budgets);
        }
        tracing::info!(budget_id = %budget.id, group_id = %group_id, "Budget created");
        Ok(budget)
    }

    /// Updates name and/or amount. Fields equal to the current values are
    /// dropped; an empty diff returns the current budget without a remote call.
    pub async fn update_budget(
        &self,
        id: BudgetId,
        changes: BudgetChanges,
    ) -> Result<Budget, SyncError> {
        let current = self
            .budget(id)
            .map(|view| view.budget().clone())
            .ok_or_else(|| SyncError::not_found("budget", id))?;

        let diff = changes.diff_against(&current);
        if diff.is_empty() {
            tracing::debug!(budget_id = %id, "Budget update is a no-op");
            return Ok(current);
        }

        let updated = self
            .budgets
            .update_budget(id, &diff)
            .await
            .map_err(|e| SyncError::mutation("update the budget", e))?;

        let mut state = self.lock();
        let mut budgets = state.snapshot.to_budgets();
        if let Some(view) = budgets.iter_mut().find(|v| v.id() == id) {
            view.apply_changes(&diff);
            self.commit(&mut state, budgets);
        }
        Ok(updated)
    }

    /// Deletes a budget's expenses, then the budget.
    ///
    /// The two remote deletes are not atomic. If the second fails the
    /// remote budget survives without expenses; the local view is made to
    /// match and the error carries `stage = "budget"`.
    pub async fn delete_budget(&self, id: BudgetId) -> Result<(), SyncError> {
        if self.budget(id).is_none() {
            return Err(SyncError::not_found("budget", id));
        }

        let removed = self
            .expenses
            .delete_expenses_for_budget(id)
            .await
            .map_err(|e| SyncError::mutation("delete the budget", e.with_detail("stage", "expenses")))?;

        if let Err(error) = self.budgets.delete_budget(id).await {
            tracing::error!(
                budget_id = %id,
                expenses_removed = removed,
                error = %error,
                "Budget expenses deleted but budget delete failed; remote state diverged"
            );
            let mut state = self.lock();
            let mut budgets = state.snapshot.to_budgets();
            if let Some(view) = budgets.iter_mut().find(|v| v.id() == id) {
                *view = BudgetView::empty(view.budget().clone());
                self.commit(&mut state, budgets);
            }
            return Err(SyncError::mutation(
                "delete the budget",
                error.with_detail("stage", "budget"),
            ));
        }

        let mut state = self.lock();
        let mut budgets = state.snapshot.to_budgets();
        budgets.retain(|v| v.id() != id);
        self.commit(&mut state, budgets);
        tracing::info!(budget_id = %id, expenses_removed = removed, "Budget deleted");
        Ok(())
    }

    // === Expense mutations (optimistic) ===

    /// Applies `changes` locally, then remotely; rolls back on failure.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no loaded budget holds the expense
    /// - `Mutation` if the remote update fails; the budget's expenses and
    ///   total are back to their values before the call
    pub async fn update_expense(
        &self,
        id: ExpenseId,
        changes: ExpenseChanges,
    ) -> Result<Expense, SyncError> {
        let (before, previous, applied) = {
            let mut state = self.lock();
            let before = state.snapshot.clone();
            let (budget_id, previous) = locate(&before, id)?;
            if changes.is_empty() {
                return Ok(previous);
            }

            let mut budgets = before.to_budgets();
            if let Some(view) = budgets.iter_mut().find(|v| v.id() == budget_id) {
                view.replace_expense(changes.apply_to(&previous));
            }
            let applied = self.commit(&mut state, budgets);
            (before, previous, applied)
        };
        tracing::debug!(expense_id = %id, version = applied, "Applied optimistic expense update");

        match self.expenses.update_expense(id, &changes).await {
            Ok(confirmed) => {
                let mut state = self.lock();
                let mut budgets = state.snapshot.to_budgets();
                let swapped = budgets
                    .iter_mut()
                    .find(|v| v.contains_expense(id))
                    .and_then(|view| view.replace_expense(confirmed.clone()));
                if swapped.is_some_and(|shown| shown != confirmed) {
                    self.commit(&mut state, budgets);
                }
                Ok(confirmed)
            }
            Err(error) => {
                tracing::warn!(expense_id = %id, error = %error, "Expense update failed, rolling back");
                self.rollback(&before, applied, |budgets| {
                    if let Some(view) = budgets.iter_mut().find(|v| v.contains_expense(id)) {
                        view.replace_expense(previous);
                    }
                });
                Err(SyncError::mutation("update the expense", error))
            }
        }
    }

    /// Removes the expense locally, then remotely; re-inserts it on failure.
    pub async fn delete_expense(&self, id: ExpenseId) -> Result<(), SyncError> {
        let (before, budget_id, index, removed, applied) = {
            let mut state = self.lock();
            let before = state.snapshot.clone();
            let (budget_id, _) = locate(&before, id)?;

            let mut budgets = before.to_budgets();
            let taken = budgets
                .iter_mut()
                .find(|v| v.id() == budget_id)
                .and_then(|view| view.remove_expense(id));
            let Some((index, removed)) = taken else {
                return Err(SyncError::not_found("expense", id));
            };
            let applied = self.commit(&mut state, budgets);
            (before, budget_id, index, removed, applied)
        };
        tracing::debug!(expense_id = %id, version = applied, "Applied optimistic expense delete");

        match self.expenses.delete_expense(id).await {
            Ok(()) => Ok(()),
            Err(error) => {
                tracing::warn!(expense_id = %id, error = %error, "Expense delete failed, rolling back");
                self.rollback(&before, applied, |budgets| {
                    if let Some(view) = budgets.iter_mut().find(|v| v.id() == budget_id) {
                        view.restore_expense(index, removed);
                    }
                });
                Err(SyncError::mutation("delete the expense", error))
            }
        }
    }

    /// Adds a confirmed expense to its budget's view.
    ///
    /// Returns false when the budget is not loaded or already holds the id.
    pub fn record_expense(&self, expense: Expense) -> bool {
        let mut state = self.lock();
        match state.snapshot.budget(expense.budget_id) {
            Some(view) if !view.contains_expense(expense.id) => {}
            _ => return false,
        }

        let expense_id = expense.id;
        let mut budgets = state.snapshot.to_budgets();
        if let Some(view) = budgets.iter_mut().find(|v| v.id() == expense.budget_id) {
            view.insert_expense(expense);
        }
        let version = self.commit(&mut state, budgets);
        tracing::debug!(expense_id = %expense_id, version, "Recorded expense");
        true
    }

    // === Snapshot plumbing ===

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publishes `budgets` as the next snapshot. Returns its version.
    fn commit(&self, state: &mut State, budgets: Vec<BudgetView>) -> u64 {
        let next = Arc::new(state.snapshot.succeed(budgets));
        let version = next.version();
        state.snapshot = next.clone();
        self.published.send_replace(next);
        version
    }

    /// Undoes the optimistic commit `applied`.
    ///
    /// If nothing else committed since, the pre-mutation snapshot comes back
    /// whole. Otherwise only `inverse` is applied, keeping the other changes.
    fn rollback(
        &self,
        before: &BudgetSnapshot,
        applied: u64,
        inverse: impl FnOnce(&mut Vec<BudgetView>),
    ) {
        let mut state = self.lock();
        let budgets = if state.snapshot.version() == applied {
            before.to_budgets()
        } else {
            let mut budgets = state.snapshot.to_budgets();
            inverse(&mut budgets);
            budgets
        };
        let version = self.commit(&mut state, budgets);
        tracing::debug!(version, "Rolled back optimistic change");
    }
}

/// Owning budget and current value of an expense.
fn locate(snapshot: &BudgetSnapshot, id: ExpenseId) -> Result<(BudgetId, Expense), SyncError> {
    snapshot
        .owner_of_expense(id)
        .and_then(|view| view.expense(id).map(|e| (view.id(), e.clone())))
        .ok_or_else(|| SyncError::not_found("expense", id))
}
