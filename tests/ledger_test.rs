use bigdecimal::BigDecimal;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use pledge_core::adapters::{FaultPlan, InMemoryLedgerStore};
use pledge_core::domain::{Cause, CauseStatus, DonationStatus, NewCause, PaymentOutcome};
use pledge_core::error::AppError;
use pledge_core::ports::{LedgerStore, NotificationRepository, Page};
use pledge_core::services::{
    AggregateReader, BoundedIdempotencyGuard, DonationIntent, DonorPayload, LedgerWriter,
    NotificationDispatcher, RetryPolicy,
};

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        commit_timeout: Duration::from_millis(50),
    }
}

fn writer(store: &InMemoryLedgerStore) -> LedgerWriter {
    LedgerWriter::new(
        Arc::new(store.clone()),
        NotificationDispatcher::new(Arc::new(store.clone())),
        fast_retry(),
    )
}

async fn cause_with_status(store: &InMemoryLedgerStore, status: CauseStatus) -> Cause {
    cause_with_target(store, status, 10_000).await
}

async fn cause_with_target(store: &InMemoryLedgerStore, status: CauseStatus, target: i64) -> Cause {
    let mut cause = Cause::new(NewCause {
        title: "Community Garden".to_string(),
        description: Some("Raised beds for the east side".to_string()),
        category: "environment".to_string(),
        target_amount: BigDecimal::from(target),
        owner_id: Uuid::new_v4(),
    });
    cause.status = status;
    store.insert_cause(&cause).await.unwrap()
}

fn intent(cause_id: Uuid, amount: &str) -> DonationIntent {
    DonationIntent {
        cause_id,
        amount: BigDecimal::from_str(amount).unwrap(),
        donor: DonorPayload {
            first_name: Some("Jane".to_string()),
            last_name: Some("Doe".to_string()),
            email: Some("jane@example.com".to_string()),
            phone: None,
            address: None,
        },
        payment_method: "credit_card".to_string(),
        is_anonymous: false,
        message: None,
        payment_outcome: PaymentOutcome::Captured,
        submission_token: None,
    }
}

async fn stored_total(store: &InMemoryLedgerStore, cause_id: Uuid) -> BigDecimal {
    store.get_cause(cause_id).await.unwrap().unwrap().current_amount
}

async fn assert_consistent(store: &InMemoryLedgerStore, cause_id: Uuid) {
    let report = AggregateReader::new(Arc::new(store.clone()))
        .reconcile(cause_id)
        .await
        .unwrap();
    assert!(report.is_consistent(), "drift detected: {:?}", report);
}

#[tokio::test]
async fn test_completed_donation_increments_total() {
    let store = InMemoryLedgerStore::new();
    let cause = cause_with_status(&store, CauseStatus::Approved).await;

    let donation = writer(&store)
        .record_donation(intent(cause.id, "120.50"))
        .await
        .unwrap();

    assert_eq!(donation.status, DonationStatus::Completed);
    assert!(donation.transaction_token.starts_with("TXN-"));
    assert_eq!(stored_total(&store, cause.id).await, BigDecimal::from_str("120.50").unwrap());
    assert_consistent(&store, cause.id).await;
}

#[tokio::test]
async fn test_failed_increment_leaves_ledger_and_total_untouched() {
    let store = InMemoryLedgerStore::new();
    let cause = cause_with_status(&store, CauseStatus::Approved).await;
    store
        .inject_faults(FaultPlan {
            fail_increment: true,
            ..FaultPlan::default()
        })
        .await;

    let err = writer(&store)
        .record_donation(intent(cause.id, "50.00"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Internal(_)));
    assert_eq!(store.donation_count(cause.id).await, 0);
    assert_eq!(stored_total(&store, cause.id).await, BigDecimal::from(0));
    // Non-transient failures are not retried.
    assert_eq!(store.commit_attempts(), 1);
}

#[tokio::test]
async fn test_invalid_amount_changes_nothing() {
    let store = InMemoryLedgerStore::new();
    let cause = cause_with_status(&store, CauseStatus::Approved).await;

    for amount in ["0", "-10.00", "10.005"] {
        let err = writer(&store)
            .record_donation(intent(cause.id, amount))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)), "amount {}", amount);
    }

    assert_eq!(store.commit_attempts(), 0);
    assert_eq!(store.donation_count(cause.id).await, 0);
}

#[tokio::test]
async fn test_unknown_cause_is_not_found() {
    let store = InMemoryLedgerStore::new();

    let err = writer(&store)
        .record_donation(intent(Uuid::new_v4(), "10.00"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(store.commit_attempts(), 0);
}

#[tokio::test]
async fn test_unapproved_cause_rejects_donations() {
    let store = InMemoryLedgerStore::new();

    for status in [CauseStatus::Pending, CauseStatus::Rejected] {
        let cause = cause_with_status(&store, status).await;
        let err = writer(&store)
            .record_donation(intent(cause.id, "10.00"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(stored_total(&store, cause.id).await, BigDecimal::from(0));
    }
}

#[tokio::test]
async fn test_transaction_tokens_are_unique() {
    let store = InMemoryLedgerStore::new();
    let cause = cause_with_status(&store, CauseStatus::Approved).await;
    let writer = writer(&store);

    let mut tokens = std::collections::HashSet::new();
    for _ in 0..50 {
        let donation = writer.record_donation(intent(cause.id, "1.00")).await.unwrap();
        assert!(tokens.insert(donation.transaction_token));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_donations_are_all_counted() {
    let store = InMemoryLedgerStore::new();
    let cause = cause_with_status(&store, CauseStatus::Approved).await;
    let writer = writer(&store);

    let mut handles = Vec::new();
    for _ in 0..3 {
        let writer = writer.clone();
        let cause_id = cause.id;
        handles.push(tokio::spawn(async move {
            for _ in 0..100 {
                writer.record_donation(intent(cause_id, "1.00")).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(store.donation_count(cause.id).await, 300);
    assert_eq!(stored_total(&store, cause.id).await, BigDecimal::from(300));
    assert_consistent(&store, cause.id).await;
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let store = InMemoryLedgerStore::new();
    let cause = cause_with_status(&store, CauseStatus::Approved).await;
    store
        .inject_faults(FaultPlan {
            transient_failures: 2,
            ..FaultPlan::default()
        })
        .await;

    writer(&store)
        .record_donation(intent(cause.id, "30.00"))
        .await
        .unwrap();

    assert_eq!(store.commit_attempts(), 3);
    assert_eq!(store.donation_count(cause.id).await, 1);
    assert_eq!(stored_total(&store, cause.id).await, BigDecimal::from(30));
}

#[tokio::test]
async fn test_retries_exhausted_reports_transient_error() {
    let store = InMemoryLedgerStore::new();
    let cause = cause_with_status(&store, CauseStatus::Approved).await;
    store
        .inject_faults(FaultPlan {
            transient_failures: 10,
            ..FaultPlan::default()
        })
        .await;

    let err = writer(&store)
        .record_donation(intent(cause.id, "30.00"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::TransientStore(_)));
    assert!(err.is_retryable());
    assert_eq!(store.commit_attempts(), 3);
    assert_eq!(store.donation_count(cause.id).await, 0);
    assert_eq!(stored_total(&store, cause.id).await, BigDecimal::from(0));
}

#[tokio::test]
async fn test_timed_out_commit_is_retried() {
    let store = InMemoryLedgerStore::new();
    let cause = cause_with_status(&store, CauseStatus::Approved).await;
    store
        .inject_faults(FaultPlan {
            delay_before_commit: Some(Duration::from_millis(300)),
            ..FaultPlan::default()
        })
        .await;

    writer(&store)
        .record_donation(intent(cause.id, "15.00"))
        .await
        .unwrap();

    assert_eq!(store.commit_attempts(), 2);
    assert_eq!(store.donation_count(cause.id).await, 1);
    assert_eq!(stored_total(&store, cause.id).await, BigDecimal::from(15));
}

#[tokio::test]
async fn test_lost_acknowledgement_does_not_double_count() {
    let store = InMemoryLedgerStore::new();
    let cause = cause_with_status(&store, CauseStatus::Approved).await;
    store
        .inject_faults(FaultPlan {
            delay_after_commit: Some(Duration::from_millis(300)),
            ..FaultPlan::default()
        })
        .await;

    let donation = writer(&store)
        .record_donation(intent(cause.id, "15.00"))
        .await
        .unwrap();

    assert_eq!(store.donation_count(cause.id).await, 1);
    assert_eq!(stored_total(&store, cause.id).await, BigDecimal::from(15));
    let found = store
        .find_donation_by_token(&donation.transaction_token)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, donation.id);
    assert_consistent(&store, cause.id).await;
}

#[tokio::test]
async fn test_token_collision_regenerates_token() {
    let store = InMemoryLedgerStore::new();
    let cause = cause_with_status(&store, CauseStatus::Approved).await;
    store
        .inject_faults(FaultPlan {
            token_collision: true,
            ..FaultPlan::default()
        })
        .await;

    let donation = writer(&store)
        .record_donation(intent(cause.id, "42.00"))
        .await
        .unwrap();

    assert_eq!(store.commit_attempts(), 2);
    assert!(donation.transaction_token.starts_with("TXN-"));
    assert_eq!(stored_total(&store, cause.id).await, BigDecimal::from(42));
}

#[tokio::test]
async fn test_declined_payment_is_recorded_without_increment() {
    let store = InMemoryLedgerStore::new();
    let cause = cause_with_status(&store, CauseStatus::Approved).await;

    let donation = writer(&store)
        .record_donation(DonationIntent {
            payment_outcome: PaymentOutcome::Declined,
            ..intent(cause.id, "80.00")
        })
        .await
        .unwrap();

    assert_eq!(donation.status, DonationStatus::Failed);
    assert_eq!(store.donation_count(cause.id).await, 1);
    assert_eq!(stored_total(&store, cause.id).await, BigDecimal::from(0));
    assert_consistent(&store, cause.id).await;
}

#[tokio::test]
async fn test_owner_is_notified_of_completed_donation() {
    let store = InMemoryLedgerStore::new();
    let cause = cause_with_status(&store, CauseStatus::Approved).await;

    writer(&store)
        .record_donation(intent(cause.id, "25.00"))
        .await
        .unwrap();

    let mut notifications = Vec::new();
    for _ in 0..50 {
        notifications = store.list_notifications(false, Page::default()).await.unwrap();
        if !notifications.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].recipient_id, Some(cause.owner_id));
    assert!(notifications[0].message.contains("Jane D."));
}

#[tokio::test]
async fn test_notification_failure_does_not_fail_donation() {
    let store = InMemoryLedgerStore::new();
    let cause = cause_with_status(&store, CauseStatus::Approved).await;
    store
        .inject_faults(FaultPlan {
            fail_notifications: true,
            ..FaultPlan::default()
        })
        .await;

    let result = writer(&store).record_donation(intent(cause.id, "25.00")).await;

    assert!(result.is_ok());
    assert_eq!(stored_total(&store, cause.id).await, BigDecimal::from(25));
}

#[tokio::test]
async fn test_submission_guard_rejects_repeated_donation() {
    let store = InMemoryLedgerStore::new();
    let cause = cause_with_status(&store, CauseStatus::Approved).await;
    let writer = writer(&store).with_submission_guard(Arc::new(BoundedIdempotencyGuard::new(100)));

    let submission = DonationIntent {
        submission_token: Some("checkout-7781".to_string()),
        ..intent(cause.id, "60.00")
    };

    writer.record_donation(submission.clone()).await.unwrap();
    let err = writer.record_donation(submission).await.unwrap_err();

    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(store.donation_count(cause.id).await, 1);
    assert_eq!(stored_total(&store, cause.id).await, BigDecimal::from(60));
}

#[tokio::test]
async fn test_submission_token_released_when_donation_fails() {
    let store = InMemoryLedgerStore::new();
    let cause = cause_with_status(&store, CauseStatus::Pending).await;
    let writer = writer(&store).with_submission_guard(Arc::new(BoundedIdempotencyGuard::new(100)));

    let submission = DonationIntent {
        submission_token: Some("checkout-9000".to_string()),
        ..intent(cause.id, "60.00")
    };

    assert!(writer.record_donation(submission.clone()).await.is_err());

    store
        .update_cause_status(cause.id, CauseStatus::Approved)
        .await
        .unwrap();
    writer.record_donation(submission).await.unwrap();

    assert_eq!(stored_total(&store, cause.id).await, BigDecimal::from(60));
}

#[tokio::test]
async fn test_heal_repairs_drift() {
    let store = InMemoryLedgerStore::new();
    let cause = cause_with_status(&store, CauseStatus::Approved).await;
    writer(&store)
        .record_donation(intent(cause.id, "75.00"))
        .await
        .unwrap();
    store.corrupt_aggregate(cause.id, BigDecimal::from(10)).await;

    let reader = AggregateReader::new(Arc::new(store.clone()));
    let report = reader.reconcile(cause.id).await.unwrap();
    assert_eq!(report.drift, BigDecimal::from(-65));

    let denied = reader
        .heal(pledge_core::domain::Principal::Public, cause.id)
        .await
        .unwrap_err();
    assert!(matches!(denied, AppError::Permission(_)));

    let outcome = reader
        .heal(pledge_core::domain::Principal::Admin, cause.id)
        .await
        .unwrap();
    assert!(outcome.repaired);
    assert_eq!(outcome.after.current_amount, BigDecimal::from(75));
    assert_consistent(&store, cause.id).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_three_concurrent_donations_reach_exact_total() {
    let store = InMemoryLedgerStore::new();
    let cause = cause_with_target(&store, CauseStatus::Approved, 1000).await;
    let writer = writer(&store);

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let writer = writer.clone();
            let cause_id = cause.id;
            tokio::spawn(async move { writer.record_donation(intent(cause_id, "100")).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(store.donation_count(cause.id).await, 3);
    assert_eq!(stored_total(&store, cause.id).await, BigDecimal::from(300));
    let progress = AggregateReader::new(Arc::new(store.clone()))
        .get_progress(cause.id)
        .await
        .unwrap();
    assert_eq!(progress.percent_funded(), BigDecimal::from(30));
}

#[tokio::test]
async fn test_cancelled_donation_rolls_back() {
    let store = InMemoryLedgerStore::new();
    let cause = cause_with_status(&store, CauseStatus::Approved).await;
    store
        .inject_faults(FaultPlan {
            delay_before_commit: Some(Duration::from_millis(500)),
            ..FaultPlan::default()
        })
        .await;

    let cancelled = tokio::time::timeout(
        Duration::from_millis(20),
        writer(&store).record_donation(intent(cause.id, "40.00")),
    )
    .await;

    assert!(cancelled.is_err());
    assert_eq!(store.donation_count(cause.id).await, 0);
    assert_eq!(stored_total(&store, cause.id).await, BigDecimal::from(0));
    assert_consistent(&store, cause.id).await;
}

#[tokio::test]
async fn test_cancelled_donation_frees_submission_token() {
    let store = InMemoryLedgerStore::new();
    let cause = cause_with_status(&store, CauseStatus::Approved).await;
    let writer = writer(&store).with_submission_guard(Arc::new(BoundedIdempotencyGuard::new(100)));
    store
        .inject_faults(FaultPlan {
            delay_before_commit: Some(Duration::from_millis(500)),
            ..FaultPlan::default()
        })
        .await;

    let submission = DonationIntent {
        submission_token: Some("checkout-1".to_string()),
        ..intent(cause.id, "40.00")
    };

    let cancelled =
        tokio::time::timeout(Duration::from_millis(20), writer.record_donation(submission.clone())).await;
    assert!(cancelled.is_err());
    assert_eq!(store.donation_count(cause.id).await, 0);

    // The token is released on a background task.
    tokio::time::sleep(Duration::from_millis(20)).await;

    writer.record_donation(submission).await.unwrap();

    assert_eq!(store.donation_count(cause.id).await, 1);
    assert_eq!(stored_total(&store, cause.id).await, BigDecimal::from(40));
    assert_consistent(&store, cause.id).await;
}

#[tokio::test]
async fn test_submission_key_ignored_without_guard() {
    let store = InMemoryLedgerStore::new();
    let cause = cause_with_status(&store, CauseStatus::Approved).await;

    let submission = DonationIntent {
        submission_token: Some("q83v/Zm9v+YmFy== not a token".to_string()),
        ..intent(cause.id, "12.00")
    };

    writer(&store).record_donation(submission).await.unwrap();

    assert_eq!(stored_total(&store, cause.id).await, BigDecimal::from(12));
}

#[tokio::test]
async fn test_unconfirmed_commit_keeps_submission_token() {
    let store = InMemoryLedgerStore::new();
    let cause = cause_with_status(&store, CauseStatus::Approved).await;
    let writer = writer(&store).with_submission_guard(Arc::new(BoundedIdempotencyGuard::new(100)));
    store
        .inject_faults(FaultPlan {
            delay_after_commit: Some(Duration::from_millis(300)),
            fail_token_lookup: true,
            ..FaultPlan::default()
        })
        .await;

    let submission = DonationIntent {
        submission_token: Some("checkout-2".to_string()),
        ..intent(cause.id, "15.00")
    };

    let err = writer.record_donation(submission.clone()).await.unwrap_err();
    assert!(matches!(err, AppError::TransientStore(_)));
    // The first attempt landed; only its acknowledgement was lost.
    assert_eq!(store.donation_count(cause.id).await, 1);

    store.clear_faults().await;
    let retry = writer.record_donation(submission).await.unwrap_err();

    assert!(matches!(retry, AppError::Conflict(_)));
    assert_eq!(store.donation_count(cause.id).await, 1);
    assert_eq!(stored_total(&store, cause.id).await, BigDecimal::from(15));
    assert_consistent(&store, cause.id).await;
}
