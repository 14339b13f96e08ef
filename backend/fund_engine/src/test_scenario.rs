//! End-to-end flows across every component.

use crate::advances::{self, NewAdvance};
use crate::allocations::{self, AllocationStatusKind, NewAllocation};
use crate::directory::{EntityKind, StaticDirectory};
use crate::distributions::{self, NewDistribution};
use crate::errors::FundError;
use crate::invariants::assert_allocation_consistent;
use crate::mentor_payments::{self, NewMentorPayment};
use crate::money::Money;
use crate::payments::{self, NewPayment, PaymentType};
use crate::split::Percentages;
use crate::summary::allocation_summary;
use crate::test_support::*;

#[tokio::test]
async fn test_full_payment_to_distribution_flow() {
    let pool = memory_pool().await;

    // Payment of 1,000,000.00 arrives and is confirmed.
    let payment = payments::create_payment(
        &pool,
        NewPayment {
            project_id: PROJECT,
            company_id: COMPANY,
            amount: money("1000000.00"),
            payment_type: PaymentType::Initial,
            due_date: None,
            notes: Some("kickoff".into()),
        },
    )
    .await
    .unwrap();
    payments::confirm_payment(&pool, payment.id).await.unwrap();

    // Allocate 70 / 20 / 10.
    let allocation = allocations::create_allocation(
        &pool,
        NewAllocation {
            payment_id: Some(payment.id),
            ..Default::default()
        },
        &Percentages::default(),
    )
    .await
    .unwrap();
    assert_eq!(allocation.amounts.team, money("700000.00"));
    assert_eq!(allocation.amounts.mentor, money("200000.00"));
    assert_eq!(allocation.amounts.lab, money("100000.00"));

    allocations::update_status(
        &pool,
        allocation.id,
        AllocationStatusKind::Allocated,
        Some(ADMIN),
        None,
    )
    .await
    .unwrap();

    // Two talents share the team bucket.
    let mut ids = Vec::new();
    for (talent_id, amount) in [(11, "400000.00"), (12, "300000.00")] {
        let d = distributions::create_distribution(
            &pool,
            NewDistribution {
                fund_allocation_id: allocation.id,
                talent_id,
                amount: money(amount),
                percentage: None,
                notes: None,
            },
        )
        .await
        .unwrap();
        ids.push(d.id);
    }
    for (i, id) in ids.iter().enumerate() {
        distributions::mark_as_paid(&pool, *id, details(&format!("TEAM-{i}")), today())
            .await
            .unwrap();
    }
    assert!(distributions::is_fully_distributed(&pool, allocation.id)
        .await
        .unwrap());

    // The mentor bucket goes to the mentor.
    let mentor = mentor_payments::create_from_allocation(
        &pool,
        NewMentorPayment {
            fund_allocation_id: allocation.id,
            mentor_id: 3,
            amount: money("200000.00"),
            notes: None,
        },
    )
    .await
    .unwrap();
    mentor_payments::approve(&pool, mentor.id, ADMIN).await.unwrap();
    mentor_payments::mark_as_paid(&pool, mentor.id, details("MENTOR-1"), today())
        .await
        .unwrap();

    // Nothing is left in the team bucket.
    let err = distributions::create_distribution(
        &pool,
        NewDistribution {
            fund_allocation_id: allocation.id,
            talent_id: 13,
            amount: money("1.00"),
            percentage: None,
            notes: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, FundError::InvariantViolation(_)));
    assert_allocation_consistent(&pool, allocation.id).await;

    let done = allocations::update_status(
        &pool,
        allocation.id,
        AllocationStatusKind::Distributed,
        Some(ADMIN),
        None,
    )
    .await
    .unwrap();
    assert_eq!(done.status.kind(), AllocationStatusKind::Distributed);

    let directory = StaticDirectory::default()
        .with_name(EntityKind::Talent, 11, "Ana")
        .with_name(EntityKind::Mentor, 3, "Dr. Okafor");
    let summary = allocation_summary(&pool, &directory, allocation.id).await.unwrap();
    assert!(summary.fully_distributed);
    assert_eq!(summary.remaining_team_capacity, Money::ZERO);
    assert_eq!(summary.distributions[0].talent_name.as_deref(), Some("Ana"));
    assert_eq!(summary.distributions[1].talent_name, None);
    assert_eq!(
        summary.mentor_payments[0].mentor_name.as_deref(),
        Some("Dr. Okafor")
    );
}

#[tokio::test]
async fn test_rounding_assigns_remainder_to_team() {
    let pool = memory_pool().await;
    let allocation = pending_allocation(&pool, "100.01").await;

    assert_eq!(allocation.amounts.team, money("70.01"));
    assert_eq!(allocation.amounts.mentor, money("20.00"));
    assert_eq!(allocation.amounts.lab, money("10.00"));
    assert_allocation_consistent(&pool, allocation.id).await;
}

#[tokio::test]
async fn test_advance_settled_by_later_payment() {
    let pool = memory_pool().await;

    let advance = advances::create_advance(
        &pool,
        NewAdvance {
            project_id: PROJECT,
            payment_id: None,
            advance_amount: money("25000.00"),
            advance_reason: "cloud credits before the first invoice".into(),
        },
    )
    .await
    .unwrap();
    assert_eq!(
        advances::total_outstanding(&pool, Some(PROJECT)).await.unwrap(),
        money("25000.00")
    );

    let payment = completed_payment(&pool, PROJECT, "100000.00").await;
    advances::approve(&pool, advance.id, ADMIN).await.unwrap();
    advances::settle(&pool, advance.id, payment.id, true)
        .await
        .unwrap();

    assert_eq!(
        advances::total_outstanding(&pool, Some(PROJECT)).await.unwrap(),
        Money::ZERO
    );
}
