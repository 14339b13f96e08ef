use sqlx::SqlitePool;

use crate::allocations::{self, AllocationStatusKind, NewAllocation};
use crate::errors::FundError;
use crate::mentor_payments::{self, MentorPayment, MentorPaymentFilter, NewMentorPayment};
use crate::money::{Money, Percentage};
use crate::payout::{PayoutStatus, PayoutStatusKind};
use crate::split::Percentages;
use crate::test_support::*;

const MENTOR: i64 = 3;

async fn mentor_payment(
    pool: &SqlitePool,
    allocation_id: i64,
    amount: &str,
) -> Result<MentorPayment, FundError> {
    mentor_payments::create_from_allocation(
        pool,
        NewMentorPayment {
            fund_allocation_id: allocation_id,
            mentor_id: MENTOR,
            amount: money(amount),
            notes: None,
        },
    )
    .await
}

#[tokio::test]
async fn test_create_copies_project_from_allocation() {
    let pool = memory_pool().await;
    let allocation = allocated(&pool, "1000.00").await;

    let payment = mentor_payment(&pool, allocation.id, "200.00").await.unwrap();
    assert_eq!(payment.project_id, allocation.project_id);
    assert_eq!(payment.fund_allocation_id, allocation.id);
    assert_eq!(payment.status, PayoutStatus::Pending);
}

#[tokio::test]
async fn test_create_requires_allocated_and_positive_amount() {
    let pool = memory_pool().await;
    let pending = pending_allocation(&pool, "1000.00").await;
    let err = mentor_payment(&pool, pending.id, "200.00").await.unwrap_err();
    assert!(matches!(err, FundError::InvalidState(_)));

    let allocation = allocated(&pool, "1000.00").await;
    let err = mentor_payment(&pool, allocation.id, "0").await.unwrap_err();
    assert!(matches!(err, FundError::Validation(_)));

    let err = mentor_payment(&pool, 404, "1.00").await.unwrap_err();
    assert!(matches!(err, FundError::NotFound { .. }));
}

#[tokio::test]
async fn test_amount_below_bucket_is_accepted() {
    let pool = memory_pool().await;
    let allocation = allocated(&pool, "1000.00").await;

    let partial = mentor_payment(&pool, allocation.id, "150.00").await.unwrap();
    assert_eq!(partial.amount, money("150.00"));
    mentor_payment(&pool, allocation.id, "50.00").await.unwrap();
}

#[tokio::test]
async fn test_amount_above_bucket_is_accepted() {
    let pool = memory_pool().await;
    // Mentor bucket of 200.00.
    let allocation = allocated(&pool, "1000.00").await;

    let payment = mentor_payment(&pool, allocation.id, "250.00").await.unwrap();
    assert_eq!(payment.amount, money("250.00"));
    assert_eq!(payment.status, PayoutStatus::Pending);

    let extra = mentor_payment(&pool, allocation.id, "10.00").await.unwrap();
    assert_eq!(extra.amount, money("10.00"));
}

#[tokio::test]
async fn test_zero_mentor_share_still_accepts_payments() {
    let pool = memory_pool().await;
    let allocation = allocations::create_allocation(
        &pool,
        NewAllocation {
            project_id: Some(PROJECT),
            total_amount: Some(money("1000.00")),
            percentages: Some(
                Percentages::new(
                    Percentage::from_percent(90),
                    Percentage::from_percent(0),
                    Percentage::from_percent(10),
                )
                .unwrap(),
            ),
            ..Default::default()
        },
        &Percentages::default(),
    )
    .await
    .unwrap();
    assert_eq!(allocation.amounts.mentor, Money::ZERO);
    allocations::update_status(
        &pool,
        allocation.id,
        AllocationStatusKind::Allocated,
        Some(ADMIN),
        None,
    )
    .await
    .unwrap();

    let payment = mentor_payment(&pool, allocation.id, "50.00").await.unwrap();
    assert_eq!(payment.amount, money("50.00"));
}

#[tokio::test]
async fn test_approve_pay_lifecycle() {
    let pool = memory_pool().await;
    let allocation = allocated(&pool, "1000.00").await;
    let payment = mentor_payment(&pool, allocation.id, "200.00").await.unwrap();

    let approved = mentor_payments::approve(&pool, payment.id, ADMIN).await.unwrap();
    assert_eq!(approved.status.kind(), PayoutStatusKind::Approved);

    let err = mentor_payments::approve(&pool, payment.id, ADMIN).await.unwrap_err();
    assert!(matches!(err, FundError::InvalidState(_)));

    let paid = mentor_payments::mark_as_paid(&pool, payment.id, details("M-1"), today())
        .await
        .unwrap();
    assert!(paid.status.is_paid());

    let err = mentor_payments::cancel(&pool, payment.id, Some("oops".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, FundError::InvalidState(_)));
}

#[tokio::test]
async fn test_cancelled_payment_can_be_replaced() {
    let pool = memory_pool().await;
    let allocation = allocated(&pool, "1000.00").await;
    let payment = mentor_payment(&pool, allocation.id, "200.00").await.unwrap();

    let cancelled = mentor_payments::cancel(&pool, payment.id, Some("mentor swapped".into()))
        .await
        .unwrap();
    assert!(cancelled.status.is_cancelled());

    mentor_payment(&pool, allocation.id, "200.00").await.unwrap();
}

#[tokio::test]
async fn test_queries_and_total_paid() {
    let pool = memory_pool().await;
    let first = allocated(&pool, "1000.00").await;
    let second = allocated(&pool, "500.00").await;
    let a = mentor_payment(&pool, first.id, "200.00").await.unwrap();
    let b = mentor_payment(&pool, second.id, "100.00").await.unwrap();
    mentor_payments::mark_as_paid(&pool, a.id, details("M-A"), today())
        .await
        .unwrap();

    let by_mentor = mentor_payments::find_mentor_payments(
        &pool,
        &MentorPaymentFilter {
            mentor_id: Some(MENTOR),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(by_mentor.len(), 2);

    let pending = mentor_payments::find_mentor_payments(
        &pool,
        &MentorPaymentFilter {
            status: Some(PayoutStatusKind::Pending),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(pending.iter().map(|p| p.id).collect::<Vec<_>>(), vec![b.id]);

    assert_eq!(
        mentor_payments::total_paid_for_mentor(&pool, MENTOR).await.unwrap(),
        money("200.00")
    );
    assert_eq!(
        mentor_payments::total_paid_for_mentor(&pool, MENTOR + 1).await.unwrap(),
        Money::ZERO
    );
}
