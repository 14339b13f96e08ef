//! # Payment ledger
//!
//! Money received from a company for a project.
//!
//! ```text
//! Pending ──► Processing ──► Completed
//!    │  └──────────────────►┘
//!    └───────────┴─────────► Cancelled
//! ```
//!
//! `Completed` and `Cancelled` are terminal.  A payment only moves through
//! the transition functions below; every one of them is a single
//! compare-and-set `UPDATE`, so two concurrent requests can never both act
//! on the same source state.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;

use crate::db::{is_unique_violation, status_list};
use crate::errors::{FundError, Result};
use crate::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentType {
    Initial,
    Milestone,
    Final,
    Advance,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "INITIAL",
            Self::Milestone => "MILESTONE",
            Self::Final => "FINAL",
            Self::Advance => "ADVANCE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INITIAL" => Some(Self::Initial),
            "MILESTONE" => Some(Self::Milestone),
            "FINAL" => Some(Self::Final),
            "ADVANCE" => Some(Self::Advance),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatusKind {
    Pending,
    Processing,
    Completed,
    Cancelled,
}

impl PaymentStatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "PROCESSING" => Some(Self::Processing),
            "COMPLETED" => Some(Self::Completed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// States from which a transition into `self` is legal.
    pub fn sources(&self) -> &'static [PaymentStatusKind] {
        match self {
            Self::Pending => &[],
            Self::Processing => &[Self::Pending],
            Self::Completed | Self::Cancelled => &[Self::Pending, Self::Processing],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed { payment_date: DateTime<Utc> },
    Cancelled { reason: Option<String> },
}

impl PaymentStatus {
    pub fn kind(&self) -> PaymentStatusKind {
        match self {
            Self::Pending => PaymentStatusKind::Pending,
            Self::Processing => PaymentStatusKind::Processing,
            Self::Completed { .. } => PaymentStatusKind::Completed,
            Self::Cancelled { .. } => PaymentStatusKind::Cancelled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Payment {
    pub id: i64,
    pub project_id: i64,
    pub company_id: i64,
    pub amount: Money,
    pub payment_type: PaymentType,
    #[serde(flatten)]
    pub status: PaymentStatus,
    pub transaction_reference: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A payment row as stored.
#[derive(Debug, Clone, sqlx::FromRow)]
struct PaymentRow {
    id: i64,
    project_id: i64,
    company_id: i64,
    amount: Money,
    payment_type: String,
    status: String,
    transaction_reference: Option<String>,
    due_date: Option<NaiveDate>,
    payment_date: Option<DateTime<Utc>>,
    cancel_reason: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = FundError;

    fn try_from(row: PaymentRow) -> Result<Self> {
        let corrupt = |what: String| FundError::CorruptRecord(format!("payment {}: {what}", row.id));

        let payment_type = PaymentType::parse(&row.payment_type)
            .ok_or_else(|| corrupt(format!("unknown type '{}'", row.payment_type)))?;
        let status = match PaymentStatusKind::parse(&row.status) {
            Some(PaymentStatusKind::Pending) => PaymentStatus::Pending,
            Some(PaymentStatusKind::Processing) => PaymentStatus::Processing,
            Some(PaymentStatusKind::Completed) => PaymentStatus::Completed {
                payment_date: row
                    .payment_date
                    .ok_or_else(|| corrupt("completed without payment date".to_string()))?,
            },
            Some(PaymentStatusKind::Cancelled) => PaymentStatus::Cancelled {
                reason: row.cancel_reason.clone(),
            },
            None => return Err(corrupt(format!("unknown status '{}'", row.status))),
        };

        Ok(Payment {
            id: row.id,
            project_id: row.project_id,
            company_id: row.company_id,
            amount: row.amount,
            payment_type,
            status,
            transaction_reference: row.transaction_reference,
            due_date: row.due_date,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const PAYMENT_COLUMNS: &str = "id, project_id, company_id, amount, payment_type, status, \
     transaction_reference, due_date, payment_date, cancel_reason, notes, created_at, updated_at";

/// Input for [`create_payment`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewPayment {
    pub project_id: i64,
    pub company_id: i64,
    pub amount: Money,
    pub payment_type: PaymentType,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Optional filters for [`find_payments`]; `None` matches everything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentFilter {
    pub project_id: Option<i64>,
    pub company_id: Option<i64>,
    pub status: Option<PaymentStatusKind>,
}

// ─────────────────────────────────────────────────────────
// Writes
// ─────────────────────────────────────────────────────────

/// Record a new payment in `PENDING`.
pub async fn create_payment(pool: &SqlitePool, new: NewPayment) -> Result<Payment> {
    if !new.amount.is_positive() {
        return Err(FundError::Validation(format!(
            "payment amount must be positive, got {}",
            new.amount
        )));
    }

    let now = Utc::now();
    let id = sqlx::query(
        r#"
        INSERT INTO payments
            (project_id, company_id, amount, payment_type, status, due_date, notes,
             created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
        "#,
    )
    .bind(new.project_id)
    .bind(new.company_id)
    .bind(new.amount)
    .bind(new.payment_type.as_str())
    .bind(PaymentStatusKind::Pending.as_str())
    .bind(new.due_date)
    .bind(&new.notes)
    .bind(now)
    .execute(pool)
    .await?
    .last_insert_rowid();

    info!(
        payment_id = id,
        project_id = new.project_id,
        company_id = new.company_id,
        amount = %new.amount,
        "Payment recorded"
    );
    get_payment(pool, id).await
}

/// Mark a pending or processing payment as received.
pub async fn confirm_payment(pool: &SqlitePool, id: i64) -> Result<Payment> {
    transition(pool, id, PaymentStatusKind::Completed, None, None).await
}

/// Cancel a payment that has not completed.
pub async fn cancel_payment(pool: &SqlitePool, id: i64, reason: Option<String>) -> Result<Payment> {
    transition(pool, id, PaymentStatusKind::Cancelled, None, reason.as_deref()).await
}

/// Administrative status override.  Follows the same state machine as the
/// dedicated operations and optionally records the external transaction
/// reference.
pub async fn update_status(
    pool: &SqlitePool,
    id: i64,
    status: PaymentStatusKind,
    transaction_reference: Option<String>,
) -> Result<Payment> {
    if status == PaymentStatusKind::Pending {
        // Nothing transitions into PENDING; report against the current state.
        let current = get_payment(pool, id).await?;
        return Err(invalid_transition(&current, status));
    }
    transition(pool, id, status, transaction_reference.as_deref(), None).await
}

async fn transition(
    pool: &SqlitePool,
    id: i64,
    target: PaymentStatusKind,
    transaction_reference: Option<&str>,
    reason: Option<&str>,
) -> Result<Payment> {
    let sources: Vec<&'static str> = target.sources().iter().map(|s| s.as_str()).collect();
    let now = Utc::now();
    let payment_date = (target == PaymentStatusKind::Completed).then_some(now);

    let result = sqlx::query(&format!(
        r#"
        UPDATE payments
        SET    status                = ?2,
               payment_date          = COALESCE(?3, payment_date),
               transaction_reference = COALESCE(?4, transaction_reference),
               cancel_reason         = COALESCE(?5, cancel_reason),
               updated_at            = ?6
        WHERE  id = ?1 AND status IN ({})
        "#,
        status_list(&sources)
    ))
    .bind(id)
    .bind(target.as_str())
    .bind(payment_date)
    .bind(transaction_reference)
    .bind(reason)
    .bind(now)
    .execute(pool)
    .await;

    let updated = match result {
        Ok(done) => done.rows_affected() == 1,
        Err(e) if is_unique_violation(&e) => {
            return Err(FundError::Conflict(format!(
                "transaction reference '{}' is already used by another payment",
                transaction_reference.unwrap_or_default()
            )))
        }
        Err(e) => return Err(e.into()),
    };

    let payment = get_payment(pool, id).await?;
    if !updated {
        return Err(invalid_transition(&payment, target));
    }

    info!(
        payment_id = id,
        status = target.as_str(),
        amount = %payment.amount,
        "Payment status changed"
    );
    Ok(payment)
}

fn invalid_transition(payment: &Payment, target: PaymentStatusKind) -> FundError {
    FundError::InvalidState(format!(
        "payment {} is {}, cannot move to {}",
        payment.id,
        payment.status.kind().as_str(),
        target.as_str()
    ))
}

// ─────────────────────────────────────────────────────────
// Reads
// ─────────────────────────────────────────────────────────

pub async fn get_payment(pool: &SqlitePool, id: i64) -> Result<Payment> {
    let row = sqlx::query_as::<_, PaymentRow>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.ok_or_else(|| FundError::not_found("payment", id))?
        .try_into()
}

/// Payments matching every filter that is set, ordered by id.
pub async fn find_payments(pool: &SqlitePool, filter: &PaymentFilter) -> Result<Vec<Payment>> {
    let rows = sqlx::query_as::<_, PaymentRow>(&format!(
        r#"
        SELECT {PAYMENT_COLUMNS}
        FROM   payments
        WHERE  (?1 IS NULL OR project_id = ?1)
          AND  (?2 IS NULL OR company_id = ?2)
          AND  (?3 IS NULL OR status = ?3)
        ORDER  BY id ASC
        "#
    ))
    .bind(filter.project_id)
    .bind(filter.company_id)
    .bind(filter.status.map(|s| s.as_str()))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Payment::try_from).collect()
}

/// Pending or processing payments whose due date is before `today`.
pub async fn overdue_payments(pool: &SqlitePool, today: NaiveDate) -> Result<Vec<Payment>> {
    let rows = sqlx::query_as::<_, PaymentRow>(&format!(
        r#"
        SELECT {PAYMENT_COLUMNS}
        FROM   payments
        WHERE  due_date IS NOT NULL
          AND  due_date < ?1
          AND  status IN ('PENDING', 'PROCESSING')
        ORDER  BY due_date ASC, id ASC
        "#
    ))
    .bind(today)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Payment::try_from).collect()
}

/// Sum of completed payment amounts for a project.
pub async fn total_paid_for_project(pool: &SqlitePool, project_id: i64) -> Result<Money> {
    let (total,): (i64,) = sqlx::query_as(
        "SELECT COALESCE(SUM(amount), 0) FROM payments WHERE project_id = ?1 AND status = 'COMPLETED'",
    )
    .bind(project_id)
    .fetch_one(pool)
    .await?;
    Ok(Money::from_cents(total))
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
