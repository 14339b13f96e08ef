use crate::allocations::{self, AllocationStatus, AllocationStatusKind, NewAllocation};
use crate::distributions::{self, NewDistribution};
use crate::errors::FundError;
use crate::invariants::assert_buckets_reconcile;
use crate::money::{Money, Percentage};
use crate::split::Percentages;
use crate::test_support::*;

fn pct(team: i64, mentor: i64, lab: i64) -> Percentages {
    Percentages::new(
        Percentage::from_percent(team),
        Percentage::from_percent(mentor),
        Percentage::from_percent(lab),
    )
    .unwrap()
}

#[tokio::test]
async fn test_allocation_from_completed_payment_uses_its_amount() {
    let pool = memory_pool().await;
    let allocation = pending_allocation(&pool, "1000000.00").await;

    assert_eq!(allocation.status, AllocationStatus::Pending);
    assert_eq!(allocation.project_id, PROJECT);
    assert_eq!(allocation.total_amount, money("1000000.00"));
    assert_eq!(allocation.amounts.team, money("700000.00"));
    assert_eq!(allocation.amounts.mentor, money("200000.00"));
    assert_eq!(allocation.amounts.lab, money("100000.00"));
    assert_buckets_reconcile(&allocation);
}

#[tokio::test]
async fn test_allocation_requires_completed_payment() {
    let pool = memory_pool().await;
    let payment = pending_payment(&pool, PROJECT, "500.00").await;

    let err = allocations::create_allocation(
        &pool,
        NewAllocation {
            payment_id: Some(payment.id),
            ..Default::default()
        },
        &Percentages::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, FundError::InvalidState(_)));
}

#[tokio::test]
async fn test_second_allocation_for_payment_conflicts() {
    let pool = memory_pool().await;
    let first = pending_allocation(&pool, "500.00").await;
    let payment_id = first.payment_id.unwrap();

    let err = allocations::create_allocation(
        &pool,
        NewAllocation {
            payment_id: Some(payment_id),
            ..Default::default()
        },
        &Percentages::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, FundError::Conflict(_)));

    let found = allocations::get_allocation_by_payment(&pool, payment_id)
        .await
        .unwrap();
    assert_eq!(found.id, first.id);
}

#[tokio::test]
async fn test_explicit_total_overrides_payment_amount() {
    let pool = memory_pool().await;
    let payment = completed_payment(&pool, PROJECT, "1000.00").await;

    let allocation = allocations::create_allocation(
        &pool,
        NewAllocation {
            payment_id: Some(payment.id),
            total_amount: Some(money("800.00")),
            percentages: Some(pct(60, 30, 10)),
            ..Default::default()
        },
        &Percentages::default(),
    )
    .await
    .unwrap();
    assert_eq!(allocation.total_amount, money("800.00"));
    assert_eq!(allocation.amounts.team, money("480.00"));
    assert_eq!(allocation.amounts.mentor, money("240.00"));
    assert_eq!(allocation.amounts.lab, money("80.00"));
}

#[tokio::test]
async fn test_ad_hoc_allocation_needs_project_and_total() {
    let pool = memory_pool().await;

    let err = allocations::create_allocation(&pool, NewAllocation::default(), &Percentages::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FundError::Validation(_)));

    let err = allocations::create_allocation(
        &pool,
        NewAllocation {
            project_id: Some(5),
            ..Default::default()
        },
        &Percentages::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, FundError::Validation(_)));

    let allocation = allocations::create_allocation(
        &pool,
        NewAllocation {
            project_id: Some(5),
            total_amount: Some(money("100.01")),
            ..Default::default()
        },
        &Percentages::default(),
    )
    .await
    .unwrap();
    assert_eq!(allocation.payment_id, None);
    assert_eq!(allocation.amounts.team, money("70.01"));
    assert_eq!(allocation.amounts.mentor, money("20.00"));
    assert_eq!(allocation.amounts.lab, money("10.00"));
}

#[tokio::test]
async fn test_allocation_project_must_match_payment() {
    let pool = memory_pool().await;
    let payment = completed_payment(&pool, PROJECT, "100.00").await;

    let err = allocations::create_allocation(
        &pool,
        NewAllocation {
            payment_id: Some(payment.id),
            project_id: Some(PROJECT + 1),
            ..Default::default()
        },
        &Percentages::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, FundError::Validation(_)));
}

#[tokio::test]
async fn test_status_moves_one_step_at_a_time() {
    let pool = memory_pool().await;
    let allocation = pending_allocation(&pool, "100.00").await;

    let err = allocations::update_status(
        &pool,
        allocation.id,
        AllocationStatusKind::Distributed,
        Some(ADMIN),
        None,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, FundError::InvalidState(_)));

    let allocated = allocations::update_status(
        &pool,
        allocation.id,
        AllocationStatusKind::Allocated,
        Some(ADMIN),
        Some("approved by board".into()),
    )
    .await
    .unwrap();
    match allocated.status {
        AllocationStatus::Allocated { allocated_by, .. } => assert_eq!(allocated_by, Some(ADMIN)),
        other => panic!("expected ALLOCATED, got {other:?}"),
    }
    assert_eq!(allocated.notes.as_deref(), Some("approved by board"));
    assert!(allocated.is_ready_for_distribution());

    for target in [AllocationStatusKind::Pending, AllocationStatusKind::Allocated] {
        let err = allocations::update_status(&pool, allocation.id, target, Some(ADMIN), None)
            .await
            .unwrap_err();
        assert!(matches!(err, FundError::InvalidState(_)));
    }
}

#[tokio::test]
async fn test_distributed_requires_fully_paid_team_bucket() {
    let pool = memory_pool().await;
    let allocation = allocated(&pool, "100.00").await;

    let distribution = distributions::create_distribution(
        &pool,
        NewDistribution {
            fund_allocation_id: allocation.id,
            talent_id: 1,
            amount: money("70.00"),
            percentage: None,
            notes: None,
        },
    )
    .await
    .unwrap();

    let err = allocations::update_status(
        &pool,
        allocation.id,
        AllocationStatusKind::Distributed,
        Some(ADMIN),
        None,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, FundError::InvalidState(_)));

    distributions::mark_as_paid(&pool, distribution.id, details("TX-1"), today())
        .await
        .unwrap();
    let done = allocations::update_status(
        &pool,
        allocation.id,
        AllocationStatusKind::Distributed,
        Some(ADMIN),
        None,
    )
    .await
    .unwrap();
    assert!(matches!(done.status, AllocationStatus::Distributed { .. }));
    assert!(!done.is_ready_for_distribution());
}

#[tokio::test]
async fn test_recalculate_is_idempotent_and_keeps_status() {
    let pool = memory_pool().await;
    let allocation = allocated(&pool, "100.01").await;

    let recalculated = allocations::recalculate_amounts(&pool, allocation.id)
        .await
        .unwrap();
    assert_eq!(recalculated.amounts, allocation.amounts);
    assert_eq!(recalculated.status.kind(), AllocationStatusKind::Allocated);
    assert_buckets_reconcile(&recalculated);
}

#[tokio::test]
async fn test_update_percentages_only_while_pending() {
    let pool = memory_pool().await;
    let allocation = pending_allocation(&pool, "1000.00").await;

    let updated = allocations::update_percentages(&pool, allocation.id, pct(50, 30, 20))
        .await
        .unwrap();
    assert_eq!(updated.amounts.team, money("500.00"));
    assert_eq!(updated.amounts.mentor, money("300.00"));
    assert_eq!(updated.amounts.lab, money("200.00"));
    assert_buckets_reconcile(&updated);

    allocations::update_status(
        &pool,
        allocation.id,
        AllocationStatusKind::Allocated,
        Some(ADMIN),
        None,
    )
    .await
    .unwrap();
    let err = allocations::update_percentages(&pool, allocation.id, pct(70, 20, 10))
        .await
        .unwrap_err();
    assert!(matches!(err, FundError::InvalidState(_)));
}

#[tokio::test]
async fn test_allocations_for_project() {
    let pool = memory_pool().await;
    pending_allocation(&pool, "10.00").await;
    pending_allocation(&pool, "20.00").await;

    let found = allocations::allocations_for_project(&pool, PROJECT).await.unwrap();
    assert_eq!(found.len(), 2);
    let totals: Money = found.iter().map(|a| a.total_amount).sum();
    assert_eq!(totals, money("30.00"));
    assert!(allocations::allocations_for_project(&pool, 404)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_missing_allocation_is_not_found() {
    let pool = memory_pool().await;
    assert!(matches!(
        allocations::get_allocation(&pool, 8).await,
        Err(FundError::NotFound { .. })
    ));
    assert!(matches!(
        allocations::get_allocation_by_payment(&pool, 8).await,
        Err(FundError::NotFound { .. })
    ));
    assert!(matches!(
        allocations::is_ready_for_distribution(&pool, 8).await,
        Err(FundError::NotFound { .. })
    ));
}
