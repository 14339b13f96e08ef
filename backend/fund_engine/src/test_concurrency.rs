//! Concurrent writers against a file-backed ledger with a real connection
//! pool.  Each test fires many requests at once and checks that exactly the
//! legal number of them commit.

use crate::allocations::{self, NewAllocation};
use crate::distributions::{self, NewDistribution};
use crate::errors::FundError;
use crate::invariants::assert_allocation_consistent;
use crate::payments;
use crate::split::Percentages;
use crate::test_support::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_distributions_never_exceed_team_bucket() {
    let (_dir, pool) = file_pool(8).await;
    // Team bucket of 700.00 fits exactly 35 distributions of 20.00.
    let allocation = allocated(&pool, "1000.00").await;

    let mut handles = Vec::new();
    for talent_id in 0..50 {
        let pool = pool.clone();
        let allocation_id = allocation.id;
        handles.push(tokio::spawn(async move {
            distributions::create_distribution(
                &pool,
                NewDistribution {
                    fund_allocation_id: allocation_id,
                    talent_id,
                    amount: money("20.00"),
                    percentage: None,
                    notes: None,
                },
            )
            .await
        }));
    }

    let mut created = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(FundError::InvariantViolation(_)) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(created, 35);
    assert_eq!(rejected, 15);

    assert_eq!(
        distributions::committed_amount(&pool, allocation.id)
            .await
            .unwrap(),
        money("700.00")
    );
    assert_allocation_consistent(&pool, allocation.id).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_allocations_for_one_payment() {
    let (_dir, pool) = file_pool(8).await;
    let payment = completed_payment(&pool, PROJECT, "1000.00").await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let pool = pool.clone();
        let payment_id = payment.id;
        handles.push(tokio::spawn(async move {
            allocations::create_allocation(
                &pool,
                NewAllocation {
                    payment_id: Some(payment_id),
                    ..Default::default()
                },
                &Percentages::default(),
            )
            .await
        }));
    }

    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(FundError::Conflict(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(created, 1);
    assert!(allocations::get_allocation_by_payment(&pool, payment.id)
        .await
        .is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_confirmations_apply_once() {
    let (_dir, pool) = file_pool(8).await;
    let payment = pending_payment(&pool, PROJECT, "10.00").await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let pool = pool.clone();
        let payment_id = payment.id;
        handles.push(tokio::spawn(async move {
            payments::confirm_payment(&pool, payment_id).await
        }));
    }

    let mut confirmed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => confirmed += 1,
            Err(FundError::InvalidState(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(confirmed, 1);
}
