//! Shared approval-and-payment lifecycle of individual payouts.
//!
//! Team distributions and mentor payments walk the same state machine:
//!
//! ```text
//! Pending ──► Approved ──► Paid
//!    │  └──────────────────►┘
//!    └──────────┴──► Cancelled
//! ```
//!
//! `Paid` and `Cancelled` are terminal.  The status carries the data that
//! belongs to it, so a paid payout without a paid date cannot be built.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::db::status_list;
use crate::errors::{FundError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutStatusKind {
    Pending,
    Approved,
    Paid,
    Cancelled,
}

impl PayoutStatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Paid => "PAID",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "APPROVED" => Some(Self::Approved),
            "PAID" => Some(Self::Paid),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// States from which a transition into `self` is legal.
    pub fn sources(&self) -> &'static [PayoutStatusKind] {
        match self {
            Self::Pending => &[],
            Self::Approved => &[Self::Pending],
            Self::Paid | Self::Cancelled => &[Self::Pending, Self::Approved],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Approval {
    pub approved_by: i64,
    pub approved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayoutReceipt {
    pub paid_date: NaiveDate,
    pub payment_method: String,
    pub transaction_reference: String,
}

/// Payment details supplied when a payout is marked as paid.  The paid date
/// is always the day the payout is recorded, so it is not accepted here.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PayoutDetails {
    pub payment_method: String,
    pub transaction_reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutStatus {
    Pending,
    Approved {
        approval: Approval,
    },
    Paid {
        approval: Option<Approval>,
        receipt: PayoutReceipt,
    },
    Cancelled {
        approval: Option<Approval>,
        reason: Option<String>,
    },
}

impl PayoutStatus {
    pub fn kind(&self) -> PayoutStatusKind {
        match self {
            Self::Pending => PayoutStatusKind::Pending,
            Self::Approved { .. } => PayoutStatusKind::Approved,
            Self::Paid { .. } => PayoutStatusKind::Paid,
            Self::Cancelled { .. } => PayoutStatusKind::Cancelled,
        }
    }

    pub fn is_paid(&self) -> bool {
        matches!(self, Self::Paid { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// The lifecycle columns shared by `fund_distributions` and
/// `mentor_payments`, exactly as stored.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct PayoutColumns {
    pub status: String,
    pub approved_by: Option<i64>,
    pub approved_at: Option<DateTime<Utc>>,
    pub paid_date: Option<NaiveDate>,
    pub payment_method: Option<String>,
    pub transaction_reference: Option<String>,
    pub cancel_reason: Option<String>,
}

impl PayoutColumns {
    pub fn into_status(self, table: &str, id: i64) -> Result<PayoutStatus> {
        let corrupt = |what: &str| FundError::CorruptRecord(format!("{table} {id}: {what}"));

        let approval = match (self.approved_by, self.approved_at) {
            (Some(approved_by), Some(approved_at)) => Some(Approval {
                approved_by,
                approved_at,
            }),
            (None, None) => None,
            _ => return Err(corrupt("half-recorded approval")),
        };

        let kind = PayoutStatusKind::parse(&self.status)
            .ok_or_else(|| corrupt(&format!("unknown status '{}'", self.status)))?;

        Ok(match kind {
            PayoutStatusKind::Pending => PayoutStatus::Pending,
            PayoutStatusKind::Approved => PayoutStatus::Approved {
                approval: approval.ok_or_else(|| corrupt("approved without approver"))?,
            },
            PayoutStatusKind::Paid => match (
                self.paid_date,
                self.payment_method,
                self.transaction_reference,
            ) {
                (Some(paid_date), Some(payment_method), Some(transaction_reference)) => {
                    PayoutStatus::Paid {
                        approval,
                        receipt: PayoutReceipt {
                            paid_date,
                            payment_method,
                            transaction_reference,
                        },
                    }
                }
                _ => return Err(corrupt("paid without payment details")),
            },
            PayoutStatusKind::Cancelled => PayoutStatus::Cancelled {
                approval,
                reason: self.cancel_reason,
            },
        })
    }
}

// ─────────────────────────────────────────────────────────
// Transitions
// ─────────────────────────────────────────────────────────

/// Which payout table a transition targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PayoutTable {
    Distributions,
    MentorPayments,
}

impl PayoutTable {
    fn name(&self) -> &'static str {
        match self {
            Self::Distributions => "fund_distributions",
            Self::MentorPayments => "mentor_payments",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum PayoutTransition<'a> {
    Approve {
        approved_by: i64,
        notes: Option<&'a str>,
    },
    Pay {
        paid_date: NaiveDate,
        payment_method: &'a str,
        transaction_reference: &'a str,
    },
    Cancel {
        reason: Option<&'a str>,
    },
}

impl PayoutTransition<'_> {
    pub fn target(&self) -> PayoutStatusKind {
        match self {
            Self::Approve { .. } => PayoutStatusKind::Approved,
            Self::Pay { .. } => PayoutStatusKind::Paid,
            Self::Cancel { .. } => PayoutStatusKind::Cancelled,
        }
    }
}

/// Apply `transition` to row `id` if, and only if, its current status is a
/// legal source for the target.  Returns `false` when no row matched (the row
/// is missing or in the wrong state); the caller re-reads to tell which.
pub(crate) async fn apply_transition(
    pool: &SqlitePool,
    table: PayoutTable,
    id: i64,
    transition: &PayoutTransition<'_>,
) -> Result<bool> {
    let target = transition.target();
    let sources: Vec<&'static str> = target.sources().iter().map(|s| s.as_str()).collect();
    let guard = format!("WHERE id = ?1 AND status IN ({})", status_list(&sources));
    let now = Utc::now();

    let result = match transition {
        PayoutTransition::Approve { approved_by, notes } => {
            sqlx::query(&format!(
                "UPDATE {} SET status = ?2, approved_by = ?3, approved_at = ?4, \
                 notes = COALESCE(?5, notes), updated_at = ?4 {guard}",
                table.name()
            ))
            .bind(id)
            .bind(target.as_str())
            .bind(approved_by)
            .bind(now)
            .bind(notes)
            .execute(pool)
            .await?
        }
        PayoutTransition::Pay {
            paid_date,
            payment_method,
            transaction_reference,
        } => {
            sqlx::query(&format!(
                "UPDATE {} SET status = ?2, paid_date = ?3, payment_method = ?4, \
                 transaction_reference = ?5, updated_at = ?6 {guard}",
                table.name()
            ))
            .bind(id)
            .bind(target.as_str())
            .bind(paid_date)
            .bind(payment_method)
            .bind(transaction_reference)
            .bind(now)
            .execute(pool)
            .await?
        }
        PayoutTransition::Cancel { reason } => {
            sqlx::query(&format!(
                "UPDATE {} SET status = ?2, cancel_reason = ?3, updated_at = ?4 {guard}",
                table.name()
            ))
            .bind(id)
            .bind(target.as_str())
            .bind(reason)
            .bind(now)
            .execute(pool)
            .await?
        }
    };

    Ok(result.rows_affected() == 1)
}

/// Reject blank payment method / transaction reference before touching the
/// store.
pub(crate) fn validate_receipt(payment_method: &str, transaction_reference: &str) -> Result<()> {
    if payment_method.trim().is_empty() {
        return Err(FundError::Validation("payment_method is required".to_string()));
    }
    if transaction_reference.trim().is_empty() {
        return Err(FundError::Validation(
            "transaction_reference is required".to_string(),
        ));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
