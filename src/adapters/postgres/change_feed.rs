//! LISTEN/NOTIFY change feed for the PostgreSQL store.
//!
//! The schema trigger publishes `{"table", "type", "record"}` on one channel
//! for every row change. Each subscription runs its own `PgListener` task
//! that decodes notifications, applies the topic filter, and forwards
//! matches until it is unsubscribed or the connection fails.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;
use sqlx::postgres::PgListener;
use std::sync::PoisonError;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use super::rows::parse_user_id;
use super::PostgresStore;
use crate::domain::budget::{Budget, Expense};
use crate::domain::foundation::{
    BudgetId, CorrelationId, DomainError, ErrorCode, ExpenseId, GroupId, Money, SubscriptionId,
    Timestamp,
};
use crate::domain::group::{Group, Membership, Role};
use crate::ports::{
    ChangeEvent, ChangeFeed, ChangeKind, ChangeRecord, ChangeSubscription, ChangeTopic, ChannelStatus,
};

#[derive(Debug, Deserialize)]
struct NotifyPayload {
    table: String,
    #[serde(rename = "type")]
    kind: ChangeKind,
    record: Value,
}

#[derive(Debug, Deserialize)]
struct GroupRecord {
    id: Uuid,
    owner_id: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct MemberRecord {
    group_id: Uuid,
    user_id: String,
    role: Role,
}

#[derive(Debug, Deserialize)]
struct BudgetRecord {
    id: Uuid,
    group_id: Uuid,
    name: String,
    amount: f64,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ExpenseRecord {
    id: Uuid,
    budget_id: Uuid,
    description: String,
    amount: f64,
    expense_date: NaiveDate,
    created_at: DateTime<Utc>,
    #[serde(default)]
    correlation_id: Option<Uuid>,
}

fn payload_error(message: impl std::fmt::Display) -> DomainError {
    DomainError::new(
        ErrorCode::SubscriptionFailed,
        format!("Invalid change payload: {}", message),
    )
}

fn record<T: for<'de> Deserialize<'de>>(value: Value) -> Result<T, DomainError> {
    serde_json::from_value(value).map_err(payload_error)
}

fn money(amount: f64) -> Result<Money, DomainError> {
    Money::from_major(amount).ok_or_else(|| payload_error("amount out of range"))
}

/// Decodes one trigger notification into a change event.
pub(super) fn parse_notification(payload: &str) -> Result<ChangeEvent, DomainError> {
    let payload: NotifyPayload = serde_json::from_str(payload).map_err(payload_error)?;
    let mut correlation = None;

    let change = match payload.table.as_str() {
        "groups" => {
            let r: GroupRecord = record(payload.record)?;
            ChangeRecord::Groups(Group {
                id: GroupId::from_uuid(r.id),
                owner_id: parse_user_id(r.owner_id)?,
                created_at: Timestamp::from_datetime(r.created_at),
            })
        }
        "group_members" => {
            let r: MemberRecord = record(payload.record)?;
            ChangeRecord::GroupMembers(Membership {
                group_id: GroupId::from_uuid(r.group_id),
                user_id: parse_user_id(r.user_id)?,
                role: r.role,
            })
        }
        "budgets" => {
            let r: BudgetRecord = record(payload.record)?;
            ChangeRecord::Budgets(Budget {
                id: BudgetId::from_uuid(r.id),
                group_id: GroupId::from_uuid(r.group_id),
                name: r.name,
                amount: money(r.amount)?,
                created_at: Timestamp::from_datetime(r.created_at),
            })
        }
        "expenses" => {
            let r: ExpenseRecord = record(payload.record)?;
            // an update clears the token, so only inserts can echo one
            if payload.kind == ChangeKind::Insert {
                correlation = r.correlation_id.map(CorrelationId::from_uuid);
            }
            ChangeRecord::Expenses(Expense {
                id: ExpenseId::from_uuid(r.id),
                budget_id: BudgetId::from_uuid(r.budget_id),
                description: r.description,
                amount: money(r.amount)?,
                expense_date: r.expense_date,
                created_at: Timestamp::from_datetime(r.created_at),
            })
        }
        other => return Err(payload_error(format!("unknown table '{}'", other))),
    };

    Ok(ChangeEvent::new(payload.kind, change).with_correlation(correlation))
}

/// Pumps notifications from one listener until shut down.
async fn listen(
    mut listener: PgListener,
    topic: ChangeTopic,
    status: watch::Sender<ChannelStatus>,
    events: mpsc::UnboundedSender<ChangeEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    status.send_replace(ChannelStatus::Closed);
                    break;
                }
            }
            notification = listener.recv() => {
                match notification {
                    Ok(notification) => match parse_notification(notification.payload()) {
                        Ok(event) if topic.matches(&event) => {
                            if events.send(event).is_err() {
                                tracing::debug!(channel = %topic.channel_name(), "Receiver dropped, stopping listener");
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!(error = %e, "Discarding undecodable change notification");
                        }
                    },
                    Err(e) => {
                        tracing::error!(error = %e, channel = %topic.channel_name(), "Change listener failed");
                        status.send_replace(ChannelStatus::Errored(e.to_string()));
                        break;
                    }
                }
            }
        }
    }
}

#[async_trait]
impl ChangeFeed for PostgresStore {
    async fn subscribe(&self, topic: ChangeTopic) -> Result<ChangeSubscription, DomainError> {
        let id = SubscriptionId::new();
        let (status_tx, status_rx) = watch::channel(ChannelStatus::Subscribing);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, shutdown_tx);

        let pool = self.pool.clone();
        let channel = self.channel.clone();
        tokio::spawn(async move {
            let connected = async {
                let mut listener = PgListener::connect_with(&pool).await?;
                listener.listen(&channel).await?;
                Ok::<_, sqlx::Error>(listener)
            }
            .await;

            match connected {
                Ok(listener) => {
                    tracing::debug!(channel = %topic.channel_name(), "Change listener subscribed");
                    status_tx.send_replace(ChannelStatus::Subscribed);
                    listen(listener, topic, status_tx, events_tx, shutdown_rx).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to start change listener");
                    status_tx.send_replace(ChannelStatus::Errored(e.to_string()));
                }
            }
        });

        Ok(ChangeSubscription {
            id,
            status: status_rx,
            events: events_rx,
        })
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), DomainError> {
        let switch = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if let Some(switch) = switch {
            let _ = switch.send(true);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_expense_insert_with_correlation() {
        let correlation = Uuid::new_v4();
        let payload = serde_json::json!({
            "table": "expenses",
            "type": "INSERT",
            "record": {
                "id": Uuid::new_v4(),
                "budget_id": Uuid::new_v4(),
                "description": "Milk",
                "amount": 4.50,
                "expense_date": "2024-01-01",
                "created_at": "2024-01-01T10:00:00.123456+00:00",
                "correlation_id": correlation
            }
        })
        .to_string();

        let event = parse_notification(&payload).unwrap();
        assert_eq!(event.kind, ChangeKind::Insert);
        assert_eq!(event.correlation, Some(CorrelationId::from_uuid(correlation)));
        let expense = event.record.as_expense().unwrap();
        assert_eq!(expense.amount, Money::from_cents(450));
        assert_eq!(expense.description, "Milk");
    }

    #[test]
    fn expense_delete_carries_no_correlation() {
        let payload = serde_json::json!({
            "table": "expenses",
            "type": "DELETE",
            "record": {
                "id": Uuid::new_v4(),
                "budget_id": Uuid::new_v4(),
                "description": "Milk",
                "amount": 4.5,
                "expense_date": "2024-01-01",
                "created_at": "2024-01-01T10:00:00+00:00",
                "correlation_id": Uuid::new_v4()
            }
        })
        .to_string();

        let event = parse_notification(&payload).unwrap();
        assert_eq!(event.kind, ChangeKind::Delete);
        assert_eq!(event.correlation, None);
    }

    #[test]
    fn parses_budget_update() {
        let payload = serde_json::json!({
            "table": "budgets",
            "type": "UPDATE",
            "record": {
                "id": Uuid::new_v4(),
                "group_id": Uuid::new_v4(),
                "name": "Groceries",
                "amount": 200,
                "created_at": "2024-01-01T10:00:00+00:00"
            }
        })
        .to_string();

        let event = parse_notification(&payload).unwrap();
        match event.record {
            ChangeRecord::Budgets(budget) => assert_eq!(budget.amount, Money::from_cents(20000)),
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn parses_membership_role() {
        let payload = serde_json::json!({
            "table": "group_members",
            "type": "INSERT",
            "record": {
                "group_id": Uuid::new_v4(),
                "user_id": "user-1",
                "role": "owner",
                "created_at": "2024-01-01T10:00:00+00:00"
            }
        })
        .to_string();

        let event = parse_notification(&payload).unwrap();
        assert!(matches!(
            event.record,
            ChangeRecord::GroupMembers(Membership { role: Role::Owner, .. })
        ));
    }

    #[test]
    fn unknown_table_is_rejected() {
        let payload = r#"{"table":"audit","type":"INSERT","record":{}}"#;
        let err = parse_notification(payload).unwrap_err();
        assert_eq!(err.code, ErrorCode::SubscriptionFailed);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_notification("not json").is_err());
    }
}
