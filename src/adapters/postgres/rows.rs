//! Database rows and their conversion into domain types.
//!
//! Amounts are stored as `NUMERIC(12,2)`; queries select them as
//! `amount_cents` and writes bind cents divided by 100 in SQL.

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::domain::budget::{Budget, Expense};
use crate::domain::foundation::{
    BudgetId, DomainError, ErrorCode, ExpenseId, GroupId, Money, Timestamp, UserId,
};
use crate::domain::group::{Group, Membership, Role};

#[derive(Debug, sqlx::FromRow)]
pub(super) struct GroupRow {
    pub id: Uuid,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<GroupRow> for Group {
    type Error = DomainError;

    fn try_from(row: GroupRow) -> Result<Self, Self::Error> {
        Ok(Group {
            id: GroupId::from_uuid(row.id),
            owner_id: parse_user_id(row.owner_id)?,
            created_at: Timestamp::from_datetime(row.created_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct MemberRow {
    pub group_id: Uuid,
    pub user_id: String,
    pub role: String,
}

impl TryFrom<MemberRow> for Membership {
    type Error = DomainError;

    fn try_from(row: MemberRow) -> Result<Self, Self::Error> {
        let role: Role = row.role.parse().map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Invalid role value: {}", e))
        })?;
        Ok(Membership {
            group_id: GroupId::from_uuid(row.group_id),
            user_id: parse_user_id(row.user_id)?,
            role,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct BudgetRow {
    pub id: Uuid,
    pub group_id: Uuid,
    pub name: String,
    pub amount_cents: i64,
    pub created_at: DateTime<Utc>,
}

impl From<BudgetRow> for Budget {
    fn from(row: BudgetRow) -> Self {
        Budget {
            id: BudgetId::from_uuid(row.id),
            group_id: GroupId::from_uuid(row.group_id),
            name: row.name,
            amount: Money::from_cents(row.amount_cents),
            created_at: Timestamp::from_datetime(row.created_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct ExpenseRow {
    pub id: Uuid,
    pub budget_id: Uuid,
    pub description: String,
    pub amount_cents: i64,
    pub expense_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl From<ExpenseRow> for Expense {
    fn from(row: ExpenseRow) -> Self {
        Expense {
            id: ExpenseId::from_uuid(row.id),
            budget_id: BudgetId::from_uuid(row.budget_id),
            description: row.description,
            amount: Money::from_cents(row.amount_cents),
            expense_date: row.expense_date,
            created_at: Timestamp::from_datetime(row.created_at),
        }
    }
}

pub(super) fn parse_user_id(raw: String) -> Result<UserId, DomainError> {
    UserId::new(raw).map_err(|e| {
        DomainError::new(ErrorCode::DatabaseError, format!("Invalid user_id: {}", e))
    })
}

/// Wraps a sqlx error with what we were doing.
pub(super) fn db_error(context: &str, e: sqlx::Error) -> DomainError {
    DomainError::database(format!("{}: {}", context, e))
}
