//! # Mentor payment tracker
//!
//! Payout of an allocation's mentor bucket.  Same lifecycle as a team
//! distribution (see [`crate::payout`]), but for a single mentor and with the
//! project carried on the record so mentor history can be listed without
//! joining through allocations.
//!
//! The amount is accepted as given.  It is expected to match the
//! allocation's `mentor_amount`; a mismatch is logged and nothing more.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::allocations::{self, AllocationStatusKind};
use crate::errors::{FundError, Result};
use crate::money::Money;
use crate::payout::{
    apply_transition, validate_receipt, PayoutColumns, PayoutDetails, PayoutStatus,
    PayoutStatusKind, PayoutTable, PayoutTransition,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MentorPayment {
    pub id: i64,
    pub fund_allocation_id: i64,
    pub mentor_id: i64,
    pub project_id: i64,
    pub amount: Money,
    #[serde(flatten)]
    pub status: PayoutStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct MentorPaymentRow {
    id: i64,
    fund_allocation_id: i64,
    mentor_id: i64,
    project_id: i64,
    amount: Money,
    #[sqlx(flatten)]
    lifecycle: PayoutColumns,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MentorPaymentRow> for MentorPayment {
    type Error = FundError;

    fn try_from(row: MentorPaymentRow) -> Result<Self> {
        Ok(MentorPayment {
            id: row.id,
            fund_allocation_id: row.fund_allocation_id,
            mentor_id: row.mentor_id,
            project_id: row.project_id,
            amount: row.amount,
            status: row.lifecycle.into_status("mentor payment", row.id)?,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const MENTOR_PAYMENT_COLUMNS: &str = "id, fund_allocation_id, mentor_id, project_id, amount, \
     status, approved_by, approved_at, paid_date, payment_method, transaction_reference, \
     cancel_reason, notes, created_at, updated_at";

#[derive(Debug, Clone, Deserialize)]
pub struct NewMentorPayment {
    pub fund_allocation_id: i64,
    pub mentor_id: i64,
    pub amount: Money,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MentorPaymentFilter {
    pub mentor_id: Option<i64>,
    pub project_id: Option<i64>,
    pub status: Option<PayoutStatusKind>,
}

// ─────────────────────────────────────────────────────────
// Writes
// ─────────────────────────────────────────────────────────

/// Create a `PENDING` mentor payment against an `ALLOCATED` allocation.
pub async fn create_from_allocation(
    pool: &SqlitePool,
    new: NewMentorPayment,
) -> Result<MentorPayment> {
    if !new.amount.is_positive() {
        return Err(FundError::Validation(format!(
            "mentor payment amount must be positive, got {}",
            new.amount
        )));
    }

    let allocation = allocations::get_allocation(pool, new.fund_allocation_id).await?;
    if allocation.status.kind() != AllocationStatusKind::Allocated {
        return Err(FundError::InvalidState(format!(
            "fund allocation {} is {}, mentor payments need ALLOCATED",
            allocation.id,
            allocation.status.kind().as_str()
        )));
    }
    if new.amount != allocation.amounts.mentor {
        warn!(
            allocation_id = allocation.id,
            mentor_id = new.mentor_id,
            amount = %new.amount,
            mentor_bucket = %allocation.amounts.mentor,
            "Mentor payment amount differs from the mentor bucket"
        );
    }

    let now = Utc::now();
    let done = sqlx::query(
        r#"
        INSERT INTO mentor_payments
            (fund_allocation_id, mentor_id, project_id, amount, status, notes,
             created_at, updated_at)
        SELECT id, ?2, project_id, ?3, 'PENDING', ?4, ?5, ?5
        FROM   fund_allocations
        WHERE  id = ?1 AND status = 'ALLOCATED'
        "#,
    )
    .bind(new.fund_allocation_id)
    .bind(new.mentor_id)
    .bind(new.amount)
    .bind(&new.notes)
    .bind(now)
    .execute(pool)
    .await?;

    if done.rows_affected() == 0 {
        return Err(FundError::InvalidState(format!(
            "fund allocation {} is no longer ALLOCATED",
            allocation.id
        )));
    }

    let id = done.last_insert_rowid();
    info!(
        mentor_payment_id = id,
        allocation_id = allocation.id,
        mentor_id = new.mentor_id,
        amount = %new.amount,
        "Mentor payment created"
    );
    get_mentor_payment(pool, id).await
}

pub async fn approve(pool: &SqlitePool, id: i64, approved_by: i64) -> Result<MentorPayment> {
    transition(
        pool,
        id,
        PayoutTransition::Approve {
            approved_by,
            notes: None,
        },
    )
    .await
}

pub async fn mark_as_paid(
    pool: &SqlitePool,
    id: i64,
    details: PayoutDetails,
    paid_date: NaiveDate,
) -> Result<MentorPayment> {
    validate_receipt(&details.payment_method, &details.transaction_reference)?;
    transition(
        pool,
        id,
        PayoutTransition::Pay {
            paid_date,
            payment_method: &details.payment_method,
            transaction_reference: &details.transaction_reference,
        },
    )
    .await
}

/// Cancel an unpaid mentor payment.  Paid ones are final.
pub async fn cancel(pool: &SqlitePool, id: i64, reason: Option<String>) -> Result<MentorPayment> {
    transition(
        pool,
        id,
        PayoutTransition::Cancel {
            reason: reason.as_deref(),
        },
    )
    .await
}

async fn transition(
    pool: &SqlitePool,
    id: i64,
    transition: PayoutTransition<'_>,
) -> Result<MentorPayment> {
    let target = transition.target();
    let updated = apply_transition(pool, PayoutTable::MentorPayments, id, &transition).await?;
    let payment = get_mentor_payment(pool, id).await?;
    if !updated {
        return Err(FundError::InvalidState(format!(
            "mentor payment {id} is {}, cannot move to {}",
            payment.status.kind().as_str(),
            target.as_str()
        )));
    }

    info!(
        mentor_payment_id = id,
        mentor_id = payment.mentor_id,
        status = target.as_str(),
        amount = %payment.amount,
        "Mentor payment status changed"
    );
    Ok(payment)
}

// ─────────────────────────────────────────────────────────
// Reads
// ─────────────────────────────────────────────────────────

pub async fn get_mentor_payment(pool: &SqlitePool, id: i64) -> Result<MentorPayment> {
    let row = sqlx::query_as::<_, MentorPaymentRow>(&format!(
        "SELECT {MENTOR_PAYMENT_COLUMNS} FROM mentor_payments WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.ok_or_else(|| FundError::not_found("mentor payment", id))?
        .try_into()
}

pub async fn find_mentor_payments(
    pool: &SqlitePool,
    filter: &MentorPaymentFilter,
) -> Result<Vec<MentorPayment>> {
    let rows = sqlx::query_as::<_, MentorPaymentRow>(&format!(
        r#"
        SELECT {MENTOR_PAYMENT_COLUMNS}
        FROM   mentor_payments
        WHERE  (?1 IS NULL OR mentor_id = ?1)
          AND  (?2 IS NULL OR project_id = ?2)
          AND  (?3 IS NULL OR status = ?3)
        ORDER  BY id ASC
        "#
    ))
    .bind(filter.mentor_id)
    .bind(filter.project_id)
    .bind(filter.status.map(|s| s.as_str()))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(MentorPayment::try_from).collect()
}

pub async fn mentor_payments_for_allocation(
    pool: &SqlitePool,
    fund_allocation_id: i64,
) -> Result<Vec<MentorPayment>> {
    let rows = sqlx::query_as::<_, MentorPaymentRow>(&format!(
        "SELECT {MENTOR_PAYMENT_COLUMNS} FROM mentor_payments \
         WHERE fund_allocation_id = ?1 ORDER BY id ASC"
    ))
    .bind(fund_allocation_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(MentorPayment::try_from).collect()
}

/// Sum of paid mentor payments for a mentor.
pub async fn total_paid_for_mentor(pool: &SqlitePool, mentor_id: i64) -> Result<Money> {
    let (total,): (i64,) = sqlx::query_as(
        "SELECT COALESCE(SUM(amount), 0) FROM mentor_payments WHERE mentor_id = ?1 AND status = 'PAID'",
    )
    .bind(mentor_id)
    .fetch_one(pool)
    .await?;
    Ok(Money::from_cents(total))
}
