//! In-process implementation of LedgerStore and NotificationRepository.
//!
//! A single lock guards all state, so each commit is atomic with respect to
//! every reader. Faults can be injected to exercise rollback and retry paths.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{Cause, CauseStatus, Donation, DonationStatus, Notification};
use crate::ports::{
    AggregateSnapshot, DonationFilter, LedgerStore, NotificationRepository, Page, StoreError,
    StoreResult,
};

/// Faults applied to subsequent store calls.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// The aggregate increment half of every commit fails.
    pub fail_increment: bool,
    /// The next N commits fail with a transient error before touching state.
    pub transient_failures: u32,
    /// The next commit sleeps this long before applying anything.
    pub delay_before_commit: Option<Duration>,
    /// The next commit applies, then sleeps this long before acknowledging.
    pub delay_after_commit: Option<Duration>,
    /// The next commit reports a transaction token collision.
    pub token_collision: bool,
    /// Every notification insert fails.
    pub fail_notifications: bool,
    /// Every lookup by transaction token fails transiently.
    pub fail_token_lookup: bool,
}

#[derive(Default)]
struct MemoryState {
    causes: HashMap<Uuid, Cause>,
    donations: Vec<Donation>,
    notifications: Vec<Notification>,
    faults: FaultPlan,
}

impl MemoryState {
    fn ledger_sum(&self, cause_id: Uuid) -> BigDecimal {
        self.donations
            .iter()
            .filter(|d| d.cause_id == cause_id && d.status.counts_towards_total())
            .fold(BigDecimal::from(0), |acc, d| acc + &d.amount)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    state: Arc<Mutex<MemoryState>>,
    commit_attempts: Arc<AtomicU32>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn inject_faults(&self, faults: FaultPlan) {
        self.state.lock().await.faults = faults;
    }

    pub async fn clear_faults(&self) {
        self.state.lock().await.faults = FaultPlan::default();
    }

    /// Number of times `commit_donation` has been entered.
    pub fn commit_attempts(&self) -> u32 {
        self.commit_attempts.load(Ordering::SeqCst)
    }

    pub async fn donation_count(&self, cause_id: Uuid) -> usize {
        self.state
            .lock()
            .await
            .donations
            .iter()
            .filter(|d| d.cause_id == cause_id)
            .count()
    }

    /// Overwrites a stored total without touching the ledger, simulating drift.
    pub async fn corrupt_aggregate(&self, cause_id: Uuid, amount: BigDecimal) {
        if let Some(cause) = self.state.lock().await.causes.get_mut(&cause_id) {
            cause.current_amount = amount;
        }
    }

    async fn take_delays(&self) -> (Option<Duration>, Option<Duration>) {
        let mut state = self.state.lock().await;
        (
            state.faults.delay_before_commit.take(),
            state.faults.delay_after_commit.take(),
        )
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn insert_cause(&self, cause: &Cause) -> StoreResult<Cause> {
        let mut state = self.state.lock().await;
        if state.causes.contains_key(&cause.id) {
            return Err(StoreError::Conflict("causes_pkey".to_string()));
        }
        state.causes.insert(cause.id, cause.clone());
        Ok(cause.clone())
    }

    async fn get_cause(&self, id: Uuid) -> StoreResult<Option<Cause>> {
        Ok(self.state.lock().await.causes.get(&id).cloned())
    }

    async fn update_cause_status(&self, id: Uuid, status: CauseStatus) -> StoreResult<Cause> {
        let mut state = self.state.lock().await;
        let cause = state
            .causes
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("cause {}", id)))?;
        cause.status = status;
        cause.updated_at = Utc::now();
        Ok(cause.clone())
    }

    async fn list_cause_ids(&self) -> StoreResult<Vec<Uuid>> {
        let state = self.state.lock().await;
        let mut causes: Vec<&Cause> = state.causes.values().collect();
        causes.sort_by_key(|c| c.created_at);
        Ok(causes.into_iter().map(|c| c.id).collect())
    }

    async fn commit_donation(&self, donation: &Donation) -> StoreResult<Donation> {
        self.commit_attempts.fetch_add(1, Ordering::SeqCst);

        let (delay_before, delay_after) = self.take_delays().await;
        if let Some(delay) = delay_before {
            tokio::time::sleep(delay).await;
        }

        {
            let mut state = self.state.lock().await;

            if state.faults.transient_failures > 0 {
                state.faults.transient_failures -= 1;
                return Err(StoreError::Transient("injected serialization failure".to_string()));
            }
            if state.faults.token_collision {
                state.faults.token_collision = false;
                return Err(StoreError::Conflict(
                    "donations_transaction_token_key".to_string(),
                ));
            }

            if !state.causes.contains_key(&donation.cause_id) {
                return Err(StoreError::NotFound(format!("cause {}", donation.cause_id)));
            }
            if state.donations.iter().any(|d| d.id == donation.id) {
                return Err(StoreError::Conflict("donations_pkey".to_string()));
            }
            if state
                .donations
                .iter()
                .any(|d| d.transaction_token == donation.transaction_token)
            {
                return Err(StoreError::Conflict(
                    "donations_transaction_token_key".to_string(),
                ));
            }

            // Stage both halves; nothing is applied unless both succeed.
            if donation.status.counts_towards_total() && state.faults.fail_increment {
                return Err(StoreError::Backend(
                    "injected failure incrementing cause total".to_string(),
                ));
            }

            if donation.status.counts_towards_total() {
                if let Some(cause) = state.causes.get_mut(&donation.cause_id) {
                    cause.current_amount = &cause.current_amount + &donation.amount;
                    cause.updated_at = Utc::now();
                }
            }
            state.donations.push(donation.clone());
        }

        if let Some(delay) = delay_after {
            tokio::time::sleep(delay).await;
        }

        Ok(donation.clone())
    }

    async fn find_donation_by_token(&self, token: &str) -> StoreResult<Option<Donation>> {
        let state = self.state.lock().await;
        if state.faults.fail_token_lookup {
            return Err(StoreError::Transient("injected lookup failure".to_string()));
        }
        Ok(state
            .donations
            .iter()
            .find(|d| d.transaction_token == token)
            .cloned())
    }

    async fn list_donations_for_cause(
        &self,
        cause_id: Uuid,
        status: DonationStatus,
        page: Page,
    ) -> StoreResult<Vec<Donation>> {
        let filter = DonationFilter {
            cause_id: Some(cause_id),
            status: Some(status),
            page,
        };
        self.list_donations(&filter).await
    }

    async fn list_donations(&self, filter: &DonationFilter) -> StoreResult<Vec<Donation>> {
        let state = self.state.lock().await;
        let mut matching: Vec<&Donation> = state
            .donations
            .iter()
            .filter(|d| filter.cause_id.map_or(true, |id| d.cause_id == id))
            .filter(|d| filter.status.map_or(true, |status| d.status == status))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        Ok(matching
            .into_iter()
            .skip(filter.page.offset as usize)
            .take(filter.page.limit as usize)
            .cloned()
            .collect())
    }

    async fn aggregate_snapshot(&self, cause_id: Uuid) -> StoreResult<Option<AggregateSnapshot>> {
        let state = self.state.lock().await;
        Ok(state.causes.get(&cause_id).map(|cause| AggregateSnapshot {
            stored: cause.current_amount.clone(),
            target: cause.target_amount.clone(),
            ledger: state.ledger_sum(cause_id),
        }))
    }

    async fn repair_aggregate(&self, cause_id: Uuid) -> StoreResult<Cause> {
        let mut state = self.state.lock().await;
        let ledger = state.ledger_sum(cause_id);
        let cause = state
            .causes
            .get_mut(&cause_id)
            .ok_or_else(|| StoreError::NotFound(format!("cause {}", cause_id)))?;
        cause.current_amount = ledger;
        cause.updated_at = Utc::now();
        Ok(cause.clone())
    }
}

#[async_trait]
impl NotificationRepository for InMemoryLedgerStore {
    async fn insert_notification(&self, notification: &Notification) -> StoreResult<Notification> {
        let mut state = self.state.lock().await;
        if state.faults.fail_notifications {
            return Err(StoreError::Backend("injected notification failure".to_string()));
        }
        state.notifications.push(notification.clone());
        Ok(notification.clone())
    }

    async fn list_notifications(&self, unread_only: bool, page: Page) -> StoreResult<Vec<Notification>> {
        let state = self.state.lock().await;
        let mut matching: Vec<&Notification> = state
            .notifications
            .iter()
            .filter(|n| !unread_only || !n.read)
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        Ok(matching
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .cloned()
            .collect())
    }

    async fn mark_notification_read(&self, id: Uuid) -> StoreResult<Notification> {
        let mut state = self.state.lock().await;
        let notification = state
            .notifications
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("notification {}", id)))?;
        notification.read = true;
        Ok(notification.clone())
    }
}
