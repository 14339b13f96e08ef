//! # Lab fund advances
//!
//! Money the lab fronts to a project before the company's payment arrives.
//!
//! ```text
//! Advanced ──► Settled
//!     └──────► Cancelled
//! ```
//!
//! Approval only records who signed off; it does not move the status.  Whether
//! settlement requires a prior approval is a deployment choice
//! (`REQUIRE_ADVANCE_APPROVAL`), enforced inside the settling `UPDATE`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;

use crate::errors::{FundError, Result};
use crate::money::Money;
use crate::payments::{self, PaymentStatusKind};
use crate::payout::Approval;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdvanceStatusKind {
    Advanced,
    Settled,
    Cancelled,
}

impl AdvanceStatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Advanced => "ADVANCED",
            Self::Settled => "SETTLED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ADVANCED" => Some(Self::Advanced),
            "SETTLED" => Some(Self::Settled),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Advance status.  A settled advance always names its settling payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdvanceStatus {
    Advanced {
        payment_id: Option<i64>,
    },
    Settled {
        payment_id: i64,
        settled_at: DateTime<Utc>,
    },
    Cancelled {
        payment_id: Option<i64>,
        reason: Option<String>,
    },
}

impl AdvanceStatus {
    pub fn kind(&self) -> AdvanceStatusKind {
        match self {
            Self::Advanced { .. } => AdvanceStatusKind::Advanced,
            Self::Settled { .. } => AdvanceStatusKind::Settled,
            Self::Cancelled { .. } => AdvanceStatusKind::Cancelled,
        }
    }

    pub fn payment_id(&self) -> Option<i64> {
        match self {
            Self::Advanced { payment_id } | Self::Cancelled { payment_id, .. } => *payment_id,
            Self::Settled { payment_id, .. } => Some(*payment_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabFundAdvance {
    pub id: i64,
    pub project_id: i64,
    pub advance_amount: Money,
    pub advance_reason: String,
    pub approval: Option<Approval>,
    #[serde(flatten)]
    pub status: AdvanceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct AdvanceRow {
    id: i64,
    project_id: i64,
    payment_id: Option<i64>,
    advance_amount: Money,
    advance_reason: String,
    status: String,
    approved_by: Option<i64>,
    approved_at: Option<DateTime<Utc>>,
    settled_at: Option<DateTime<Utc>>,
    cancel_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AdvanceRow> for LabFundAdvance {
    type Error = FundError;

    fn try_from(row: AdvanceRow) -> Result<Self> {
        let corrupt =
            |what: String| FundError::CorruptRecord(format!("lab fund advance {}: {what}", row.id));

        let approval = match (row.approved_by, row.approved_at) {
            (Some(approved_by), Some(approved_at)) => Some(Approval {
                approved_by,
                approved_at,
            }),
            (None, None) => None,
            _ => return Err(corrupt("half-recorded approval".to_string())),
        };

        let status = match AdvanceStatusKind::parse(&row.status) {
            Some(AdvanceStatusKind::Advanced) => AdvanceStatus::Advanced {
                payment_id: row.payment_id,
            },
            Some(AdvanceStatusKind::Settled) => match (row.payment_id, row.settled_at) {
                (Some(payment_id), Some(settled_at)) => AdvanceStatus::Settled {
                    payment_id,
                    settled_at,
                },
                _ => return Err(corrupt("settled without payment".to_string())),
            },
            Some(AdvanceStatusKind::Cancelled) => AdvanceStatus::Cancelled {
                payment_id: row.payment_id,
                reason: row.cancel_reason.clone(),
            },
            None => return Err(corrupt(format!("unknown status '{}'", row.status))),
        };

        Ok(LabFundAdvance {
            id: row.id,
            project_id: row.project_id,
            advance_amount: row.advance_amount,
            advance_reason: row.advance_reason.clone(),
            approval,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const ADVANCE_COLUMNS: &str = "id, project_id, payment_id, advance_amount, advance_reason, \
     status, approved_by, approved_at, settled_at, cancel_reason, created_at, updated_at";

#[derive(Debug, Clone, Deserialize)]
pub struct NewAdvance {
    pub project_id: i64,
    pub payment_id: Option<i64>,
    pub advance_amount: Money,
    pub advance_reason: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdvanceFilter {
    pub project_id: Option<i64>,
    pub status: Option<AdvanceStatusKind>,
}

// ─────────────────────────────────────────────────────────
// Writes
// ─────────────────────────────────────────────────────────

/// Record money fronted by the lab.  `payment_id` optionally names the
/// payment expected to repay it.
pub async fn create_advance(pool: &SqlitePool, new: NewAdvance) -> Result<LabFundAdvance> {
    if !new.advance_amount.is_positive() {
        return Err(FundError::Validation(format!(
            "advance amount must be positive, got {}",
            new.advance_amount
        )));
    }
    if new.advance_reason.trim().is_empty() {
        return Err(FundError::Validation("advance_reason is required".to_string()));
    }
    if let Some(payment_id) = new.payment_id {
        let payment = payments::get_payment(pool, payment_id).await?;
        require_same_project(new.project_id, &payment)?;
    }

    let now = Utc::now();
    let id = sqlx::query(
        r#"
        INSERT INTO lab_fund_advances
            (project_id, payment_id, advance_amount, advance_reason, status,
             created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, 'ADVANCED', ?5, ?5)
        "#,
    )
    .bind(new.project_id)
    .bind(new.payment_id)
    .bind(new.advance_amount)
    .bind(new.advance_reason.trim())
    .bind(now)
    .execute(pool)
    .await?
    .last_insert_rowid();

    info!(
        advance_id = id,
        project_id = new.project_id,
        amount = %new.advance_amount,
        "Lab fund advance recorded"
    );
    get_advance(pool, id).await
}

/// Record who approved an outstanding advance.  Status is unchanged.
pub async fn approve(pool: &SqlitePool, id: i64, approved_by: i64) -> Result<LabFundAdvance> {
    let now = Utc::now();
    let updated = sqlx::query(
        r#"
        UPDATE lab_fund_advances
        SET    approved_by = ?2, approved_at = ?3, updated_at = ?3
        WHERE  id = ?1 AND status = 'ADVANCED'
        "#,
    )
    .bind(id)
    .bind(approved_by)
    .bind(now)
    .execute(pool)
    .await?
    .rows_affected()
        == 1;

    let advance = get_advance(pool, id).await?;
    if !updated {
        return Err(not_outstanding(&advance, "approved"));
    }

    info!(advance_id = id, approved_by, "Lab fund advance approved");
    Ok(advance)
}

/// Settle an outstanding advance against the payment that repays it.
///
/// The payment must exist, belong to the advance's project and not be
/// cancelled.  With `require_approval` the advance must have been approved.
pub async fn settle(
    pool: &SqlitePool,
    id: i64,
    payment_id: i64,
    require_approval: bool,
) -> Result<LabFundAdvance> {
    let advance = get_advance(pool, id).await?;
    let payment = payments::get_payment(pool, payment_id).await?;
    require_same_project(advance.project_id, &payment)?;
    if payment.status.kind() == PaymentStatusKind::Cancelled {
        return Err(FundError::InvalidState(format!(
            "payment {payment_id} is CANCELLED and cannot settle an advance"
        )));
    }
    if let Some(linked) = advance.status.payment_id() {
        if linked != payment_id {
            return Err(FundError::Validation(format!(
                "lab fund advance {id} is linked to payment {linked}, not {payment_id}"
            )));
        }
    }
    if require_approval && advance.approval.is_none() {
        return Err(FundError::InvalidState(format!(
            "lab fund advance {id} must be approved before it is settled"
        )));
    }

    let now = Utc::now();
    let updated = sqlx::query(
        r#"
        UPDATE lab_fund_advances
        SET    status = 'SETTLED', payment_id = ?2, settled_at = ?3, updated_at = ?3
        WHERE  id = ?1
          AND  status = 'ADVANCED'
          AND  (payment_id IS NULL OR payment_id = ?2)
          AND  (?4 = 0 OR approved_by IS NOT NULL)
          AND  EXISTS (SELECT 1 FROM payments p
                       WHERE p.id = ?2
                         AND p.project_id = lab_fund_advances.project_id
                         AND p.status <> 'CANCELLED')
        "#,
    )
    .bind(id)
    .bind(payment_id)
    .bind(now)
    .bind(require_approval)
    .execute(pool)
    .await?
    .rows_affected()
        == 1;

    let advance = get_advance(pool, id).await?;
    if !updated {
        return Err(not_outstanding(&advance, "settled"));
    }

    info!(
        advance_id = id,
        payment_id,
        amount = %advance.advance_amount,
        "Lab fund advance settled"
    );
    Ok(advance)
}

pub async fn cancel(pool: &SqlitePool, id: i64, reason: Option<String>) -> Result<LabFundAdvance> {
    let now = Utc::now();
    let updated = sqlx::query(
        r#"
        UPDATE lab_fund_advances
        SET    status = 'CANCELLED', cancel_reason = ?2, updated_at = ?3
        WHERE  id = ?1 AND status = 'ADVANCED'
        "#,
    )
    .bind(id)
    .bind(&reason)
    .bind(now)
    .execute(pool)
    .await?
    .rows_affected()
        == 1;

    let advance = get_advance(pool, id).await?;
    if !updated {
        return Err(not_outstanding(&advance, "cancelled"));
    }

    info!(advance_id = id, reason = ?reason, "Lab fund advance cancelled");
    Ok(advance)
}

fn require_same_project(project_id: i64, payment: &payments::Payment) -> Result<()> {
    if payment.project_id != project_id {
        return Err(FundError::Validation(format!(
            "payment {} belongs to project {}, not {project_id}",
            payment.id, payment.project_id
        )));
    }
    Ok(())
}

fn not_outstanding(advance: &LabFundAdvance, action: &str) -> FundError {
    FundError::InvalidState(format!(
        "lab fund advance {} is {} and cannot be {action}",
        advance.id,
        advance.status.kind().as_str()
    ))
}

// ─────────────────────────────────────────────────────────
// Reads
// ─────────────────────────────────────────────────────────

pub async fn get_advance(pool: &SqlitePool, id: i64) -> Result<LabFundAdvance> {
    let row = sqlx::query_as::<_, AdvanceRow>(&format!(
        "SELECT {ADVANCE_COLUMNS} FROM lab_fund_advances WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.ok_or_else(|| FundError::not_found("lab fund advance", id))?
        .try_into()
}

pub async fn find_advances(pool: &SqlitePool, filter: &AdvanceFilter) -> Result<Vec<LabFundAdvance>> {
    let rows = sqlx::query_as::<_, AdvanceRow>(&format!(
        r#"
        SELECT {ADVANCE_COLUMNS}
        FROM   lab_fund_advances
        WHERE  (?1 IS NULL OR project_id = ?1)
          AND  (?2 IS NULL OR status = ?2)
        ORDER  BY id ASC
        "#
    ))
    .bind(filter.project_id)
    .bind(filter.status.map(|s| s.as_str()))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(LabFundAdvance::try_from).collect()
}

/// Sum of advances still waiting for settlement, optionally for one project.
pub async fn total_outstanding(pool: &SqlitePool, project_id: Option<i64>) -> Result<Money> {
    let (total,): (i64,) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(advance_amount), 0)
        FROM   lab_fund_advances
        WHERE  status = 'ADVANCED' AND (?1 IS NULL OR project_id = ?1)
        "#,
    )
    .bind(project_id)
    .fetch_one(pool)
    .await?;
    Ok(Money::from_cents(total))
}
