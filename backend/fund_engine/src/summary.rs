//! Read-side view of an allocation and everything paid out of it.

use serde::Serialize;
use sqlx::SqlitePool;

use crate::allocations::{self, FundAllocation};
use crate::directory::{Directory, EntityKind};
use crate::distributions::{self, FundDistribution};
use crate::errors::Result;
use crate::mentor_payments::{self, MentorPayment};
use crate::money::Money;

#[derive(Debug, Serialize)]
pub struct NamedDistribution {
    #[serde(flatten)]
    pub distribution: FundDistribution,
    pub talent_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NamedMentorPayment {
    #[serde(flatten)]
    pub mentor_payment: MentorPayment,
    pub mentor_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AllocationSummary {
    pub allocation: FundAllocation,
    pub project_name: Option<String>,
    pub distributions: Vec<NamedDistribution>,
    pub mentor_payments: Vec<NamedMentorPayment>,
    pub remaining_team_capacity: Money,
    pub fully_distributed: bool,
}

pub async fn allocation_summary(
    pool: &SqlitePool,
    directory: &dyn Directory,
    id: i64,
) -> Result<AllocationSummary> {
    let allocation = allocations::get_allocation(pool, id).await?;
    let distributions = distributions::distributions_for_allocation(pool, id).await?;
    let mentor_payments = mentor_payments::mentor_payments_for_allocation(pool, id).await?;

    let committed: Money = distributions
        .iter()
        .filter(|d| !d.status.is_cancelled())
        .map(|d| d.amount)
        .sum();
    let fully_distributed = distributions::fully_distributed(&allocation, &distributions);

    Ok(AllocationSummary {
        project_name: directory.display_name(EntityKind::Project, allocation.project_id),
        remaining_team_capacity: allocation.amounts.team - committed,
        fully_distributed,
        distributions: distributions
            .into_iter()
            .map(|distribution| NamedDistribution {
                talent_name: directory.display_name(EntityKind::Talent, distribution.talent_id),
                distribution,
            })
            .collect(),
        mentor_payments: mentor_payments
            .into_iter()
            .map(|mentor_payment| NamedMentorPayment {
                mentor_name: directory.display_name(EntityKind::Mentor, mentor_payment.mentor_id),
                mentor_payment,
            })
            .collect(),
        allocation,
    })
}
