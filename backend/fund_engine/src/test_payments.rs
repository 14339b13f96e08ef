use chrono::NaiveDate;
use sqlx::SqlitePool;

use crate::errors::FundError;
use crate::money::Money;
use crate::payments::{
    self, NewPayment, Payment, PaymentFilter, PaymentStatus, PaymentStatusKind, PaymentType,
};
use crate::test_support::*;

#[tokio::test]
async fn test_create_payment_starts_pending() {
    let pool = memory_pool().await;
    let payment = pending_payment(&pool, PROJECT, "1500.50").await;

    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.amount, Money::from_cents(150_050));
    assert_eq!(payment.company_id, COMPANY);
    assert_eq!(payment.payment_type, PaymentType::Milestone);
}

#[tokio::test]
async fn test_create_payment_rejects_non_positive_amount() {
    let pool = memory_pool().await;
    for amount in ["0", "-10.00"] {
        let err = payments::create_payment(
            &pool,
            NewPayment {
                project_id: PROJECT,
                company_id: COMPANY,
                amount: money(amount),
                payment_type: PaymentType::Initial,
                due_date: None,
                notes: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, FundError::Validation(_)), "{amount}: {err}");
    }
}

#[tokio::test]
async fn test_confirm_sets_payment_date() {
    let pool = memory_pool().await;
    let payment = completed_payment(&pool, PROJECT, "100.00").await;
    assert!(matches!(payment.status, PaymentStatus::Completed { .. }));
}

#[tokio::test]
async fn test_completed_is_terminal() {
    let pool = memory_pool().await;
    let payment = completed_payment(&pool, PROJECT, "100.00").await;

    let err = payments::cancel_payment(&pool, payment.id, Some("late".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, FundError::InvalidState(_)));

    let err = payments::confirm_payment(&pool, payment.id).await.unwrap_err();
    assert!(matches!(err, FundError::InvalidState(_)));

    let err = payments::update_status(&pool, payment.id, PaymentStatusKind::Processing, None)
        .await
        .unwrap_err();
    assert!(matches!(err, FundError::InvalidState(_)));

    let reloaded = payments::get_payment(&pool, payment.id).await.unwrap();
    assert_eq!(reloaded.status, payment.status);
}

#[tokio::test]
async fn test_cancelled_is_terminal() {
    let pool = memory_pool().await;
    let payment = pending_payment(&pool, PROJECT, "100.00").await;
    let cancelled = payments::cancel_payment(&pool, payment.id, Some("duplicate".into()))
        .await
        .unwrap();
    assert_eq!(
        cancelled.status,
        PaymentStatus::Cancelled {
            reason: Some("duplicate".into())
        }
    );

    let err = payments::confirm_payment(&pool, payment.id).await.unwrap_err();
    assert!(matches!(err, FundError::InvalidState(_)));
    let err = payments::cancel_payment(&pool, payment.id, None).await.unwrap_err();
    assert!(matches!(err, FundError::InvalidState(_)));
}

#[tokio::test]
async fn test_update_status_walks_processing() {
    let pool = memory_pool().await;
    let payment = pending_payment(&pool, PROJECT, "250.00").await;

    let processing = payments::update_status(
        &pool,
        payment.id,
        PaymentStatusKind::Processing,
        Some("WIRE-1".into()),
    )
    .await
    .unwrap();
    assert_eq!(processing.status, PaymentStatus::Processing);
    assert_eq!(processing.transaction_reference.as_deref(), Some("WIRE-1"));

    let err = payments::update_status(&pool, payment.id, PaymentStatusKind::Pending, None)
        .await
        .unwrap_err();
    assert!(matches!(err, FundError::InvalidState(_)));

    let completed = payments::update_status(&pool, payment.id, PaymentStatusKind::Completed, None)
        .await
        .unwrap();
    assert!(matches!(completed.status, PaymentStatus::Completed { .. }));
    assert_eq!(completed.transaction_reference.as_deref(), Some("WIRE-1"));
}

#[tokio::test]
async fn test_transaction_reference_is_unique() {
    let pool = memory_pool().await;
    let a = pending_payment(&pool, PROJECT, "10.00").await;
    let b = pending_payment(&pool, PROJECT, "20.00").await;

    payments::update_status(&pool, a.id, PaymentStatusKind::Processing, Some("TX-9".into()))
        .await
        .unwrap();
    let err = payments::update_status(&pool, b.id, PaymentStatusKind::Processing, Some("TX-9".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, FundError::Conflict(_)));

    let b = payments::get_payment(&pool, b.id).await.unwrap();
    assert_eq!(b.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_missing_payment_is_not_found() {
    let pool = memory_pool().await;
    let err = payments::confirm_payment(&pool, 404).await.unwrap_err();
    assert!(matches!(
        err,
        FundError::NotFound {
            entity: "payment",
            id: 404
        }
    ));
}

#[tokio::test]
async fn test_find_payments_filters() {
    let pool = memory_pool().await;
    completed_payment(&pool, 1, "100.00").await;
    pending_payment(&pool, 1, "50.00").await;
    completed_payment(&pool, 2, "70.00").await;

    let project_one = payments::find_payments(
        &pool,
        &PaymentFilter {
            project_id: Some(1),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(project_one.len(), 2);

    let completed = payments::find_payments(
        &pool,
        &PaymentFilter {
            status: Some(PaymentStatusKind::Completed),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(completed.len(), 2);

    let everything = payments::find_payments(&pool, &PaymentFilter::default())
        .await
        .unwrap();
    assert_eq!(everything.len(), 3);
}

async fn payment_due(pool: &SqlitePool, amount: &str, due_date: Option<NaiveDate>) -> Payment {
    payments::create_payment(
        pool,
        NewPayment {
            project_id: PROJECT,
            company_id: COMPANY,
            amount: money(amount),
            payment_type: PaymentType::Final,
            due_date,
            notes: None,
        },
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_overdue_payments() {
    let pool = memory_pool().await;
    let due = |y, m, d| NaiveDate::from_ymd_opt(y, m, d);

    let late = payment_due(&pool, "10.00", due(2026, 9, 1)).await;
    let on_time = payment_due(&pool, "20.00", due(2026, 12, 1)).await;
    let late_but_paid = payment_due(&pool, "30.00", due(2026, 8, 1)).await;
    payment_due(&pool, "40.00", None).await;
    payments::confirm_payment(&pool, late_but_paid.id).await.unwrap();

    let overdue = payments::overdue_payments(&pool, today()).await.unwrap();
    let ids: Vec<i64> = overdue.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![late.id]);
    assert!(!ids.contains(&on_time.id));
}

#[tokio::test]
async fn test_total_paid_counts_completed_only() {
    let pool = memory_pool().await;
    completed_payment(&pool, PROJECT, "100.01").await;
    completed_payment(&pool, PROJECT, "99.99").await;
    pending_payment(&pool, PROJECT, "500.00").await;
    completed_payment(&pool, 2, "1.00").await;

    let total = payments::total_paid_for_project(&pool, PROJECT).await.unwrap();
    assert_eq!(total, money("200.00"));
    assert_eq!(
        payments::total_paid_for_project(&pool, 77).await.unwrap(),
        Money::ZERO
    );
}
