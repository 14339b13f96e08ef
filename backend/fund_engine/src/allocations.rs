//! # Fund allocation engine
//!
//! Splits a total (a completed payment's amount, or an explicit figure) into
//! team / mentor / lab buckets and owns the allocation lifecycle:
//!
//! ```text
//! Pending ──► Allocated ──► Distributed
//! ```
//!
//! No status is skipped or reversed.  `Allocated → Distributed` is only
//! accepted once the team bucket is fully paid out (see
//! [`crate::distributions::is_fully_distributed`]); that check runs inside the
//! same `UPDATE` that flips the status.
//!
//! At most one allocation exists per payment: the `payment_id` column carries
//! a unique index, so a second concurrent create fails at the write with
//! [`FundError::Conflict`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::db::is_unique_violation;
use crate::distributions::FULLY_PAID_GUARD;
use crate::errors::{FundError, Result};
use crate::money::{Money, Percentage};
use crate::payments::{self, PaymentStatusKind};
use crate::split::{split, BucketSplit, Percentages};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationStatusKind {
    Pending,
    Allocated,
    Distributed,
}

impl AllocationStatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Allocated => "ALLOCATED",
            Self::Distributed => "DISTRIBUTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "ALLOCATED" => Some(Self::Allocated),
            "DISTRIBUTED" => Some(Self::Distributed),
            _ => None,
        }
    }

    /// The single state that may precede `self`.
    pub fn predecessor(&self) -> Option<AllocationStatusKind> {
        match self {
            Self::Pending => None,
            Self::Allocated => Some(Self::Pending),
            Self::Distributed => Some(Self::Allocated),
        }
    }

    pub fn can_transition_to(&self, next: AllocationStatusKind) -> bool {
        next.predecessor() == Some(*self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationStatus {
    Pending,
    Allocated {
        allocated_by: Option<i64>,
        allocated_at: DateTime<Utc>,
    },
    Distributed {
        allocated_by: Option<i64>,
        allocated_at: DateTime<Utc>,
        distributed_at: DateTime<Utc>,
    },
}

impl AllocationStatus {
    pub fn kind(&self) -> AllocationStatusKind {
        match self {
            Self::Pending => AllocationStatusKind::Pending,
            Self::Allocated { .. } => AllocationStatusKind::Allocated,
            Self::Distributed { .. } => AllocationStatusKind::Distributed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FundAllocation {
    pub id: i64,
    pub payment_id: Option<i64>,
    pub project_id: i64,
    pub total_amount: Money,
    pub amounts: BucketSplit,
    pub percentages: Percentages,
    #[serde(flatten)]
    pub status: AllocationStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FundAllocation {
    pub fn is_ready_for_distribution(&self) -> bool {
        self.status.kind() == AllocationStatusKind::Allocated
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct AllocationRow {
    id: i64,
    payment_id: Option<i64>,
    project_id: i64,
    total_amount: Money,
    team_amount: Money,
    mentor_amount: Money,
    lab_amount: Money,
    team_percentage: Percentage,
    mentor_percentage: Percentage,
    lab_percentage: Percentage,
    status: String,
    allocated_by: Option<i64>,
    allocated_at: Option<DateTime<Utc>>,
    distributed_at: Option<DateTime<Utc>>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AllocationRow> for FundAllocation {
    type Error = FundError;

    fn try_from(row: AllocationRow) -> Result<Self> {
        let corrupt =
            |what: String| FundError::CorruptRecord(format!("fund allocation {}: {what}", row.id));

        let percentages =
            Percentages::new(row.team_percentage, row.mentor_percentage, row.lab_percentage)
                .map_err(|e| corrupt(e.to_string()))?;
        let amounts = BucketSplit {
            team: row.team_amount,
            mentor: row.mentor_amount,
            lab: row.lab_amount,
        };
        if amounts.total() != row.total_amount {
            return Err(corrupt(format!(
                "buckets sum to {} but total is {}",
                amounts.total(),
                row.total_amount
            )));
        }

        let allocated_at = || {
            row.allocated_at
                .ok_or_else(|| corrupt("allocated without allocated_at".to_string()))
        };
        let status = match AllocationStatusKind::parse(&row.status) {
            Some(AllocationStatusKind::Pending) => AllocationStatus::Pending,
            Some(AllocationStatusKind::Allocated) => AllocationStatus::Allocated {
                allocated_by: row.allocated_by,
                allocated_at: allocated_at()?,
            },
            Some(AllocationStatusKind::Distributed) => AllocationStatus::Distributed {
                allocated_by: row.allocated_by,
                allocated_at: allocated_at()?,
                distributed_at: row
                    .distributed_at
                    .ok_or_else(|| corrupt("distributed without distributed_at".to_string()))?,
            },
            None => return Err(corrupt(format!("unknown status '{}'", row.status))),
        };

        Ok(FundAllocation {
            id: row.id,
            payment_id: row.payment_id,
            project_id: row.project_id,
            total_amount: row.total_amount,
            amounts,
            percentages,
            status,
            notes: row.notes.clone(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const ALLOCATION_COLUMNS: &str = "id, payment_id, project_id, total_amount, team_amount, \
     mentor_amount, lab_amount, team_percentage, mentor_percentage, lab_percentage, status, \
     allocated_by, allocated_at, distributed_at, notes, created_at, updated_at";

/// Input for [`create_allocation`].
///
/// Either `payment_id` or `project_id` must be set.  `total_amount` defaults
/// to the payment's amount; `percentages` default to the configured split.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAllocation {
    pub payment_id: Option<i64>,
    pub project_id: Option<i64>,
    pub total_amount: Option<Money>,
    pub percentages: Option<Percentages>,
    pub notes: Option<String>,
}

// ─────────────────────────────────────────────────────────
// Writes
// ─────────────────────────────────────────────────────────

/// Create a `PENDING` allocation, from a completed payment or ad hoc.
pub async fn create_allocation(
    pool: &SqlitePool,
    new: NewAllocation,
    default_percentages: &Percentages,
) -> Result<FundAllocation> {
    let percentages = new.percentages.unwrap_or(*default_percentages);

    let (project_id, total_amount) = match new.payment_id {
        Some(payment_id) => {
            let payment = payments::get_payment(pool, payment_id).await?;
            if payment.status.kind() != PaymentStatusKind::Completed {
                return Err(FundError::InvalidState(format!(
                    "payment {payment_id} is {}, only COMPLETED payments can be allocated",
                    payment.status.kind().as_str()
                )));
            }
            if let Some(project_id) = new.project_id {
                if project_id != payment.project_id {
                    return Err(FundError::Validation(format!(
                        "payment {payment_id} belongs to project {}, not {project_id}",
                        payment.project_id
                    )));
                }
            }
            (payment.project_id, new.total_amount.unwrap_or(payment.amount))
        }
        None => {
            let project_id = new.project_id.ok_or_else(|| {
                FundError::Validation("either payment_id or project_id is required".to_string())
            })?;
            let total = new.total_amount.ok_or_else(|| {
                FundError::Validation(
                    "total_amount is required when no payment is referenced".to_string(),
                )
            })?;
            (project_id, total)
        }
    };

    if !total_amount.is_positive() {
        return Err(FundError::Validation(format!(
            "allocation total must be positive, got {total_amount}"
        )));
    }

    let amounts = split(total_amount, &percentages);
    let now = Utc::now();

    // The payment guard is re-evaluated inside the insert; the unique index
    // on payment_id rejects a second allocation for the same payment.
    let result = sqlx::query(
        r#"
        INSERT INTO fund_allocations
            (payment_id, project_id, total_amount, team_amount, mentor_amount, lab_amount,
             team_percentage, mentor_percentage, lab_percentage, status, notes,
             created_at, updated_at)
        SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'PENDING', ?10, ?11, ?11
        WHERE  ?1 IS NULL
           OR  EXISTS (SELECT 1 FROM payments WHERE id = ?1 AND status = 'COMPLETED')
        "#,
    )
    .bind(new.payment_id)
    .bind(project_id)
    .bind(total_amount)
    .bind(amounts.team)
    .bind(amounts.mentor)
    .bind(amounts.lab)
    .bind(percentages.team())
    .bind(percentages.mentor())
    .bind(percentages.lab())
    .bind(&new.notes)
    .bind(now)
    .execute(pool)
    .await;

    let done = match result {
        Ok(done) => done,
        Err(e) if is_unique_violation(&e) => {
            return Err(FundError::Conflict(format!(
                "payment {} already has a fund allocation",
                new.payment_id.unwrap_or_default()
            )))
        }
        Err(e) => return Err(e.into()),
    };
    if done.rows_affected() == 0 {
        return Err(FundError::InvalidState(format!(
            "payment {} is no longer COMPLETED",
            new.payment_id.unwrap_or_default()
        )));
    }

    let id = done.last_insert_rowid();
    info!(
        allocation_id = id,
        payment_id = ?new.payment_id,
        project_id,
        total = %total_amount,
        team = %amounts.team,
        mentor = %amounts.mentor,
        lab = %amounts.lab,
        "Fund allocation created"
    );
    get_allocation(pool, id).await
}

/// Move an allocation one step forward.
///
/// `actor` is recorded as `allocated_by` on `PENDING → ALLOCATED`.
pub async fn update_status(
    pool: &SqlitePool,
    id: i64,
    target: AllocationStatusKind,
    actor: Option<i64>,
    notes: Option<String>,
) -> Result<FundAllocation> {
    let now = Utc::now();

    let updated = match target {
        AllocationStatusKind::Pending => false,
        AllocationStatusKind::Allocated => {
            sqlx::query(
                r#"
                UPDATE fund_allocations
                SET    status = 'ALLOCATED', allocated_by = ?2, allocated_at = ?3,
                       notes = COALESCE(?4, notes), updated_at = ?3
                WHERE  id = ?1 AND status = 'PENDING'
                "#,
            )
            .bind(id)
            .bind(actor)
            .bind(now)
            .bind(&notes)
            .execute(pool)
            .await?
            .rows_affected()
                == 1
        }
        AllocationStatusKind::Distributed => {
            sqlx::query(&format!(
                r#"
                UPDATE fund_allocations
                SET    status = 'DISTRIBUTED', distributed_at = ?2,
                       notes = COALESCE(?3, notes), updated_at = ?2
                WHERE  id = ?1 AND status = 'ALLOCATED' AND {FULLY_PAID_GUARD}
                "#
            ))
            .bind(id)
            .bind(now)
            .bind(&notes)
            .execute(pool)
            .await?
            .rows_affected()
                == 1
        }
    };

    let allocation = get_allocation(pool, id).await?;
    if !updated {
        let current = allocation.status.kind();
        if current.can_transition_to(target) {
            // Only reachable for ALLOCATED → DISTRIBUTED with a guard miss.
            return Err(FundError::InvalidState(format!(
                "fund allocation {id} team bucket is not fully distributed"
            )));
        }
        return Err(FundError::InvalidState(format!(
            "fund allocation {id} is {}, cannot move to {}",
            current.as_str(),
            target.as_str()
        )));
    }

    info!(
        allocation_id = id,
        status = target.as_str(),
        actor = ?actor,
        "Fund allocation status changed"
    );
    Ok(allocation)
}

/// Recompute the bucket amounts from the stored total and percentages.
///
/// Status is left untouched.  The update is rejected if the recomputed team
/// bucket would fall below what is already committed to distributions.
pub async fn recalculate_amounts(pool: &SqlitePool, id: i64) -> Result<FundAllocation> {
    let before = get_allocation(pool, id).await?;
    let amounts = split(before.total_amount, &before.percentages);

    let updated = sqlx::query(
        r#"
        UPDATE fund_allocations
        SET    team_amount = ?2, mentor_amount = ?3, lab_amount = ?4, updated_at = ?5
        WHERE  id = ?1
          AND  total_amount = ?6
          AND  team_percentage = ?7 AND mentor_percentage = ?8 AND lab_percentage = ?9
          AND  ?2 >= (SELECT COALESCE(SUM(amount), 0) FROM fund_distributions
                      WHERE fund_allocation_id = ?1 AND status <> 'CANCELLED')
        "#,
    )
    .bind(id)
    .bind(amounts.team)
    .bind(amounts.mentor)
    .bind(amounts.lab)
    .bind(Utc::now())
    .bind(before.total_amount)
    .bind(before.percentages.team())
    .bind(before.percentages.mentor())
    .bind(before.percentages.lab())
    .execute(pool)
    .await?
    .rows_affected()
        == 1;

    let after = get_allocation(pool, id).await?;
    if !updated {
        if after.total_amount != before.total_amount || after.percentages != before.percentages {
            return Err(FundError::Conflict(format!(
                "fund allocation {id} changed while recalculating; retry"
            )));
        }
        return Err(FundError::InvariantViolation(format!(
            "recalculated buckets of fund allocation {id} fall below amounts already committed to distributions"
        )));
    }

    if after.amounts != before.amounts {
        warn!(
            allocation_id = id,
            team_before = %before.amounts.team,
            team_after = %after.amounts.team,
            "Recalculation changed stored bucket amounts"
        );
    }
    Ok(after)
}

/// Replace the percentages of a `PENDING` allocation and recompute its
/// buckets.
pub async fn update_percentages(
    pool: &SqlitePool,
    id: i64,
    percentages: Percentages,
) -> Result<FundAllocation> {
    let before = get_allocation(pool, id).await?;
    if before.status.kind() != AllocationStatusKind::Pending {
        return Err(FundError::InvalidState(format!(
            "fund allocation {id} is {}, percentages can only change while PENDING",
            before.status.kind().as_str()
        )));
    }
    let amounts = split(before.total_amount, &percentages);

    let updated = sqlx::query(
        r#"
        UPDATE fund_allocations
        SET    team_percentage = ?2, mentor_percentage = ?3, lab_percentage = ?4,
               team_amount = ?5, mentor_amount = ?6, lab_amount = ?7, updated_at = ?8
        WHERE  id = ?1 AND status = 'PENDING' AND total_amount = ?9
        "#,
    )
    .bind(id)
    .bind(percentages.team())
    .bind(percentages.mentor())
    .bind(percentages.lab())
    .bind(amounts.team)
    .bind(amounts.mentor)
    .bind(amounts.lab)
    .bind(Utc::now())
    .bind(before.total_amount)
    .execute(pool)
    .await?
    .rows_affected()
        == 1;

    let after = get_allocation(pool, id).await?;
    if !updated {
        return Err(FundError::InvalidState(format!(
            "fund allocation {id} is {}, percentages can only change while PENDING",
            after.status.kind().as_str()
        )));
    }

    info!(
        allocation_id = id,
        team = %percentages.team(),
        mentor = %percentages.mentor(),
        lab = %percentages.lab(),
        "Fund allocation percentages updated"
    );
    Ok(after)
}

// ─────────────────────────────────────────────────────────
// Reads
// ─────────────────────────────────────────────────────────

pub async fn get_allocation(pool: &SqlitePool, id: i64) -> Result<FundAllocation> {
    let row = sqlx::query_as::<_, AllocationRow>(&format!(
        "SELECT {ALLOCATION_COLUMNS} FROM fund_allocations WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.ok_or_else(|| FundError::not_found("fund allocation", id))?
        .try_into()
}

/// The allocation created from `payment_id`, if any.
pub async fn get_allocation_by_payment(
    pool: &SqlitePool,
    payment_id: i64,
) -> Result<FundAllocation> {
    let row = sqlx::query_as::<_, AllocationRow>(&format!(
        "SELECT {ALLOCATION_COLUMNS} FROM fund_allocations WHERE payment_id = ?1"
    ))
    .bind(payment_id)
    .fetch_optional(pool)
    .await?;

    row.ok_or_else(|| FundError::not_found("fund allocation for payment", payment_id))?
        .try_into()
}

pub async fn allocations_for_project(
    pool: &SqlitePool,
    project_id: i64,
) -> Result<Vec<FundAllocation>> {
    let rows = sqlx::query_as::<_, AllocationRow>(&format!(
        "SELECT {ALLOCATION_COLUMNS} FROM fund_allocations WHERE project_id = ?1 ORDER BY id ASC"
    ))
    .bind(project_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(FundAllocation::try_from).collect()
}

pub async fn is_ready_for_distribution(pool: &SqlitePool, id: i64) -> Result<bool> {
    Ok(get_allocation(pool, id).await?.is_ready_for_distribution())
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
