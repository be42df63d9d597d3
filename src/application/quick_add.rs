//! QuickAdd - turns free text or a receipt into recorded expenses.
//!
//! The loaded budgets are offered to the extraction service as candidates.
//! Each transaction it returns is added through the expense stream, so one
//! aimed at the open budget shows up there immediately.

use std::sync::Arc;

use super::budget_store::BudgetStore;
use super::expense_stream::ExpenseStream;
use super::SyncError;
use crate::domain::budget::Expense;
use crate::domain::extraction::{ExtractionError, ExtractionInput};
use crate::ports::ExpenseExtractor;

/// One expense created by quick add.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuickAddOutcome {
    pub expense: Expense,
    pub budget_name: String,
    /// Confirmation shown to the user.
    pub message: String,
}

pub struct QuickAdd {
    extractor: Arc<dyn ExpenseExtractor>,
    budgets: Arc<BudgetStore>,
    stream: Arc<ExpenseStream>,
}

impl QuickAdd {
    pub fn new(
        extractor: Arc<dyn ExpenseExtractor>,
        budgets: Arc<BudgetStore>,
        stream: Arc<ExpenseStream>,
    ) -> Self {
        Self {
            extractor,
            budgets,
            stream,
        }
    }

    /// Extracts transactions from `input` and adds each one.
    ///
    /// Transactions are added in order; the first failed insert stops the
    /// run and earlier ones stay added.
    ///
    /// # Errors
    ///
    /// - `Extraction` when the service fails, finds nothing, or returns
    ///   invalid data; nothing is added
    /// - `Mutation` when an insert fails
    pub async fn add(&self, input: ExtractionInput) -> Result<Vec<QuickAddOutcome>, SyncError> {
        let candidates = self.budgets.candidates();
        let transactions = self.extractor.extract(input, &candidates).await?;
        if transactions.is_empty() {
            return Err(ExtractionError::NoTransactions.into());
        }
        tracing::info!(count = transactions.len(), "Extracted transactions");

        let mut outcomes = Vec::with_capacity(transactions.len());
        for tx in transactions {
            let expense = self
                .stream
                .add_expense(tx.description, tx.amount, tx.date, Some(tx.budget_id))
                .await?;

            let view = self.budgets.budget(tx.budget_id);
            let budget_name = view
                .as_ref()
                .map(|v| v.budget().name.clone())
                .or_else(|| {
                    candidates
                        .iter()
                        .find(|c| c.id == tx.budget_id)
                        .map(|c| c.name.clone())
                })
                .unwrap_or_else(|| "your budget".to_string());

            let message = match &view {
                Some(view) => format!(
                    "{} for {} was added to {}, {} remaining",
                    expense.description,
                    expense.amount,
                    budget_name,
                    view.remaining()
                ),
                None => format!(
                    "{} for {} was added to {}",
                    expense.description, expense.amount, budget_name
                ),
            };

            outcomes.push(QuickAddOutcome {
                expense,
                budget_name,
                message,
            });
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryStore, StoreOperation};
    use crate::application::RetryPolicy;
    use crate::domain::budget::Budget;
    use crate::domain::extraction::{BudgetCandidate, ExtractedTransaction};
    use crate::domain::foundation::{BudgetId, GroupId, Money, Timestamp, UserId};
    use crate::domain::group::{Group, GroupMembership, Membership, Role};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Extractor returning a scripted result and remembering its candidates.
    struct ScriptedExtractor {
        result: Result<Vec<ExtractedTransaction>, ExtractionError>,
        seen: Mutex<Vec<BudgetCandidate>>,
    }

    impl ScriptedExtractor {
        fn returning(result: Result<Vec<ExtractedTransaction>, ExtractionError>) -> Self {
            Self {
                result,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ExpenseExtractor for ScriptedExtractor {
        async fn extract(
            &self,
            _input: ExtractionInput,
            candidates: &[BudgetCandidate],
        ) -> Result<Vec<ExtractedTransaction>, ExtractionError> {
            *self.seen.lock().unwrap() = candidates.to_vec();
            self.result.clone()
        }
    }

    struct Fixture {
        remote: Arc<InMemoryStore>,
        budgets: Arc<BudgetStore>,
        stream: Arc<ExpenseStream>,
        groceries: Budget,
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
        let groceries = Budget {
            id: BudgetId::new(),
            group_id: group.id,
            name: "Groceries".to_string(),
            amount: Money::from_cents(20000),
            created_at: Timestamp::now(),
        };
        remote.seed_budget(groceries.clone());

        let budgets = Arc::new(BudgetStore::new(
            remote.clone(),
            remote.clone(),
            RetryPolicy::new(0, Duration::from_millis(1)),
        ));
        budgets
            .load(&[GroupMembership::new(group, Role::Owner)])
            .await
            .unwrap();
        let stream = Arc::new(
            ExpenseStream::new(remote.clone(), remote.clone()).with_budget_store(budgets.clone()),
        );

        Fixture {
            remote,
            budgets,
            stream,
            groceries,
        }
    }

    fn coffee(budget_id: BudgetId) -> ExtractedTransaction {
        ExtractedTransaction {
            description: "Coffee".to_string(),
            amount: Money::from_cents(350),
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            budget_id,
        }
    }

    fn quick_add(f: &Fixture, extractor: Arc<ScriptedExtractor>) -> QuickAdd {
        QuickAdd::new(extractor, f.budgets.clone(), f.stream.clone())
    }

    #[tokio::test]
    async fn adds_each_transaction_with_a_confirmation() {
        let f = fixture().await;
        let extractor = Arc::new(ScriptedExtractor::returning(Ok(vec![coffee(f.groceries.id)])));

        let outcomes = quick_add(&f, extractor.clone())
            .add(ExtractionInput::Text("coffee 3.50".into()))
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 1);
        assert_eq!(
            outcomes[0].message,
            "Coffee for $3.50 was added to Groceries, $196.50 remaining"
        );
        assert_eq!(f.remote.expenses().len(), 1);
        assert_eq!(
            *extractor.seen.lock().unwrap(),
            vec![BudgetCandidate {
                id: f.groceries.id,
                name: "Groceries".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn open_budget_lists_the_new_expense() {
        let f = fixture().await;
        f.stream.open(f.groceries.id).await.unwrap();
        let extractor = Arc::new(ScriptedExtractor::returning(Ok(vec![coffee(f.groceries.id)])));

        let outcomes = quick_add(&f, extractor)
            .add(ExtractionInput::Text("coffee 3.50".into()))
            .await
            .unwrap();

        let listed = f.stream.expenses();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, outcomes[0].expense.id);
    }

    #[tokio::test]
    async fn empty_extraction_is_an_error() {
        let f = fixture().await;
        let extractor = Arc::new(ScriptedExtractor::returning(Ok(Vec::new())));

        let err = quick_add(&f, extractor)
            .add(ExtractionInput::Text("hello".into()))
            .await
            .unwrap_err();

        assert_eq!(err, SyncError::Extraction(ExtractionError::NoTransactions));
        assert_eq!(f.remote.calls(StoreOperation::InsertExpense), 0);
    }

    #[tokio::test]
    async fn invalid_extraction_adds_nothing() {
        let f = fixture().await;
        let extractor = Arc::new(ScriptedExtractor::returning(Err(ExtractionError::InvalidAmount {
            index: 0,
            reason: "amount must be a number",
        })));

        let err = quick_add(&f, extractor)
            .add(ExtractionInput::Text("coffee".into()))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Extraction(ExtractionError::InvalidAmount { .. })));
        assert!(f.remote.expenses().is_empty());
        assert_eq!(f.budgets.budget(f.groceries.id).unwrap().total_expenses(), Money::zero());
    }

    #[tokio::test]
    async fn failed_insert_stops_the_run() {
        let f = fixture().await;
        f.remote.fail_next(StoreOperation::InsertExpense, 1);
        let extractor = Arc::new(ScriptedExtractor::returning(Ok(vec![
            coffee(f.groceries.id),
            coffee(f.groceries.id),
        ])));

        let err = quick_add(&f, extractor)
            .add(ExtractionInput::Text("two coffees".into()))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Mutation { .. }));
        assert_eq!(f.remote.calls(StoreOperation::InsertExpense), 1);
    }
}
