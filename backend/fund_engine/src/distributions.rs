//! # Fund distribution engine
//!
//! Breaks an allocation's team bucket into per-talent payouts.
//!
//! The sum of all non-cancelled distributions under an allocation never
//! exceeds its `team_amount`.  The check is made twice: once up front for a
//! readable error, and again by the `fund_distributions_team_cap` trigger
//! inside the `INSERT` itself, which is the one that holds under concurrent
//! writers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;

use crate::allocations::{self, AllocationStatusKind, FundAllocation};
use crate::db::{is_trigger_abort, TEAM_BUCKET_EXCEEDED};
use crate::errors::{FundError, Result};
use crate::money::{Money, Percentage};
use crate::payout::{
    apply_transition, validate_receipt, PayoutColumns, PayoutDetails, PayoutStatus,
    PayoutStatusKind, PayoutTable, PayoutTransition,
};

/// SQL predicate over the `fund_allocations` row in scope: no open
/// distributions remain and the paid ones add up to the team bucket.
pub(crate) const FULLY_PAID_GUARD: &str = r#"
    NOT EXISTS (SELECT 1 FROM fund_distributions d
                WHERE d.fund_allocation_id = fund_allocations.id
                  AND d.status IN ('PENDING', 'APPROVED'))
    AND fund_allocations.team_amount = (SELECT COALESCE(SUM(d.amount), 0)
                                        FROM fund_distributions d
                                        WHERE d.fund_allocation_id = fund_allocations.id
                                          AND d.status = 'PAID')"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FundDistribution {
    pub id: i64,
    pub fund_allocation_id: i64,
    pub talent_id: i64,
    pub amount: Money,
    /// Informational only; never used to compute `amount`.
    pub percentage: Option<Percentage>,
    #[serde(flatten)]
    pub status: PayoutStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct DistributionRow {
    id: i64,
    fund_allocation_id: i64,
    talent_id: i64,
    amount: Money,
    percentage: Option<Percentage>,
    #[sqlx(flatten)]
    lifecycle: PayoutColumns,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DistributionRow> for FundDistribution {
    type Error = FundError;

    fn try_from(row: DistributionRow) -> Result<Self> {
        Ok(FundDistribution {
            id: row.id,
            fund_allocation_id: row.fund_allocation_id,
            talent_id: row.talent_id,
            amount: row.amount,
            percentage: row.percentage,
            status: row.lifecycle.into_status("fund distribution", row.id)?,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const DISTRIBUTION_COLUMNS: &str = "id, fund_allocation_id, talent_id, amount, percentage, \
     status, approved_by, approved_at, paid_date, payment_method, transaction_reference, \
     cancel_reason, notes, created_at, updated_at";

/// Input for [`create_distribution`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewDistribution {
    pub fund_allocation_id: i64,
    pub talent_id: i64,
    pub amount: Money,
    pub percentage: Option<Percentage>,
    pub notes: Option<String>,
}

/// True when every non-cancelled distribution is paid and together they
/// account for the whole team bucket.
pub fn fully_distributed(allocation: &FundAllocation, distributions: &[FundDistribution]) -> bool {
    let live: Vec<&FundDistribution> = distributions
        .iter()
        .filter(|d| d.fund_allocation_id == allocation.id && !d.status.is_cancelled())
        .collect();
    live.iter().all(|d| d.status.is_paid())
        && live.iter().map(|d| d.amount).sum::<Money>() == allocation.amounts.team
}

// ─────────────────────────────────────────────────────────
// Writes
// ─────────────────────────────────────────────────────────

/// Create a `PENDING` distribution against an `ALLOCATED` allocation.
pub async fn create_distribution(
    pool: &SqlitePool,
    new: NewDistribution,
) -> Result<FundDistribution> {
    if !new.amount.is_positive() {
        return Err(FundError::Validation(format!(
            "distribution amount must be positive, got {}",
            new.amount
        )));
    }
    if let Some(pct) = new.percentage {
        if pct < Percentage::ZERO || pct > Percentage::HUNDRED {
            return Err(FundError::Validation(format!(
                "distribution percentage {pct} must be between 0.00 and 100.00"
            )));
        }
    }

    let allocation = allocations::get_allocation(pool, new.fund_allocation_id).await?;
    require_allocated(&allocation)?;

    let remaining = remaining_capacity_of(pool, &allocation).await?;
    if new.amount > remaining {
        return Err(exceeds_team_bucket(&allocation, new.amount, remaining));
    }

    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO fund_distributions
            (fund_allocation_id, talent_id, amount, percentage, status, notes,
             created_at, updated_at)
        SELECT ?1, ?2, ?3, ?4, 'PENDING', ?5, ?6, ?6
        WHERE  EXISTS (SELECT 1 FROM fund_allocations WHERE id = ?1 AND status = 'ALLOCATED')
        "#,
    )
    .bind(new.fund_allocation_id)
    .bind(new.talent_id)
    .bind(new.amount)
    .bind(new.percentage)
    .bind(&new.notes)
    .bind(now)
    .execute(pool)
    .await;

    let done = match result {
        Ok(done) => done,
        Err(e) if is_trigger_abort(&e, TEAM_BUCKET_EXCEEDED) => {
            // Lost a race against another writer; report the fresh remainder.
            let remaining = remaining_capacity_of(pool, &allocation).await?;
            return Err(exceeds_team_bucket(&allocation, new.amount, remaining));
        }
        Err(e) => return Err(e.into()),
    };
    if done.rows_affected() == 0 {
        let allocation = allocations::get_allocation(pool, new.fund_allocation_id).await?;
        require_allocated(&allocation)?;
        return Err(FundError::InvalidState(format!(
            "fund allocation {} changed while the distribution was being created",
            allocation.id
        )));
    }

    let id = done.last_insert_rowid();
    info!(
        distribution_id = id,
        allocation_id = new.fund_allocation_id,
        talent_id = new.talent_id,
        amount = %new.amount,
        "Fund distribution created"
    );
    get_distribution(pool, id).await
}

/// Status operation: `APPROVED` (requires an approver) or `CANCELLED`.
///
/// `PAID` goes through [`mark_as_paid`], which needs payment details.
pub async fn update_status(
    pool: &SqlitePool,
    id: i64,
    status: PayoutStatusKind,
    approved_by: Option<i64>,
    notes: Option<String>,
) -> Result<FundDistribution> {
    match status {
        PayoutStatusKind::Approved => {
            let approved_by = approved_by.ok_or_else(|| {
                FundError::Validation("approved_by is required to approve".to_string())
            })?;
            transition(
                pool,
                id,
                PayoutTransition::Approve {
                    approved_by,
                    notes: notes.as_deref(),
                },
            )
            .await
        }
        PayoutStatusKind::Cancelled => cancel(pool, id, notes).await,
        PayoutStatusKind::Paid => Err(FundError::Validation(
            "use mark-as-paid to record a payout".to_string(),
        )),
        PayoutStatusKind::Pending => {
            let current = get_distribution(pool, id).await?;
            Err(invalid_transition(&current, PayoutStatusKind::Pending))
        }
    }
}

/// Record the payout of a pending or approved distribution.
pub async fn mark_as_paid(
    pool: &SqlitePool,
    id: i64,
    details: PayoutDetails,
    paid_date: NaiveDate,
) -> Result<FundDistribution> {
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

/// Cancel an unpaid distribution, releasing its share of the team bucket.
pub async fn cancel(pool: &SqlitePool, id: i64, reason: Option<String>) -> Result<FundDistribution> {
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
) -> Result<FundDistribution> {
    let target = transition.target();
    let updated = apply_transition(pool, PayoutTable::Distributions, id, &transition).await?;
    let distribution = get_distribution(pool, id).await?;
    if !updated {
        return Err(invalid_transition(&distribution, target));
    }

    info!(
        distribution_id = id,
        allocation_id = distribution.fund_allocation_id,
        status = target.as_str(),
        amount = %distribution.amount,
        "Fund distribution status changed"
    );
    Ok(distribution)
}

fn invalid_transition(distribution: &FundDistribution, target: PayoutStatusKind) -> FundError {
    FundError::InvalidState(format!(
        "fund distribution {} is {}, cannot move to {}",
        distribution.id,
        distribution.status.kind().as_str(),
        target.as_str()
    ))
}

fn require_allocated(allocation: &FundAllocation) -> Result<()> {
    if allocation.status.kind() != AllocationStatusKind::Allocated {
        return Err(FundError::InvalidState(format!(
            "fund allocation {} is {}, distributions need ALLOCATED",
            allocation.id,
            allocation.status.kind().as_str()
        )));
    }
    Ok(())
}

fn exceeds_team_bucket(allocation: &FundAllocation, amount: Money, remaining: Money) -> FundError {
    FundError::InvariantViolation(format!(
        "distribution of {amount} exceeds the remaining team bucket of fund allocation {} \
         ({remaining} of {} left)",
        allocation.id, allocation.amounts.team
    ))
}

// ─────────────────────────────────────────────────────────
// Reads
// ─────────────────────────────────────────────────────────

pub async fn get_distribution(pool: &SqlitePool, id: i64) -> Result<FundDistribution> {
    let row = sqlx::query_as::<_, DistributionRow>(&format!(
        "SELECT {DISTRIBUTION_COLUMNS} FROM fund_distributions WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.ok_or_else(|| FundError::not_found("fund distribution", id))?
        .try_into()
}

pub async fn distributions_for_allocation(
    pool: &SqlitePool,
    fund_allocation_id: i64,
) -> Result<Vec<FundDistribution>> {
    let rows = sqlx::query_as::<_, DistributionRow>(&format!(
        "SELECT {DISTRIBUTION_COLUMNS} FROM fund_distributions \
         WHERE fund_allocation_id = ?1 ORDER BY id ASC"
    ))
    .bind(fund_allocation_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(FundDistribution::try_from).collect()
}

pub async fn distributions_for_talent(
    pool: &SqlitePool,
    talent_id: i64,
) -> Result<Vec<FundDistribution>> {
    let rows = sqlx::query_as::<_, DistributionRow>(&format!(
        "SELECT {DISTRIBUTION_COLUMNS} FROM fund_distributions WHERE talent_id = ?1 ORDER BY id ASC"
    ))
    .bind(talent_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(FundDistribution::try_from).collect()
}

/// Sum of non-cancelled distributions under an allocation.
pub async fn committed_amount(pool: &SqlitePool, fund_allocation_id: i64) -> Result<Money> {
    let (total,): (i64,) = sqlx::query_as(
        "SELECT COALESCE(SUM(amount), 0) FROM fund_distributions \
         WHERE fund_allocation_id = ?1 AND status <> 'CANCELLED'",
    )
    .bind(fund_allocation_id)
    .fetch_one(pool)
    .await?;
    Ok(Money::from_cents(total))
}

/// Team bucket still available for new distributions.
pub async fn remaining_team_capacity(pool: &SqlitePool, fund_allocation_id: i64) -> Result<Money> {
    let allocation = allocations::get_allocation(pool, fund_allocation_id).await?;
    remaining_capacity_of(pool, &allocation).await
}

async fn remaining_capacity_of(pool: &SqlitePool, allocation: &FundAllocation) -> Result<Money> {
    let committed = committed_amount(pool, allocation.id).await?;
    Ok(allocation.amounts.team - committed)
}

/// Whether the allocation's team bucket has been paid out in full.
pub async fn is_fully_distributed(pool: &SqlitePool, fund_allocation_id: i64) -> Result<bool> {
    let allocation = allocations::get_allocation(pool, fund_allocation_id).await?;
    let distributions = distributions_for_allocation(pool, fund_allocation_id).await?;
    Ok(fully_distributed(&allocation, &distributions))
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
