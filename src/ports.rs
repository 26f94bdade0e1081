//! Storage ports. The services depend on these traits; adapters implement them.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{Cause, CauseStatus, Donation, DonationStatus, Notification};

pub const DEFAULT_PAGE_LIMIT: i64 = 20;
pub const MAX_PAGE_LIMIT: i64 = 100;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("uniqueness conflict: {0}")]
    Conflict(String),

    #[error("transient store failure: {0}")]
    Transient(String),

    #[error("store failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => StoreError::NotFound("row".to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Transient(err.to_string())
            }
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                // unique_violation
                Some("23505") => StoreError::Conflict(
                    db_err.constraint().unwrap_or("unique constraint").to_string(),
                ),
                // foreign_key_violation: the referenced cause is gone
                Some("23503") => StoreError::NotFound("cause".to_string()),
                // serialization_failure, deadlock_detected, lock_not_available, query_canceled
                Some("40001") | Some("40P01") | Some("55P03") | Some("57014") => {
                    StoreError::Transient(db_err.to_string())
                }
                _ => StoreError::Backend(err.to_string()),
            },
            _ => StoreError::Backend(err.to_string()),
        }
    }
}

/// Limit/offset window, clamped to sane bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT),
            offset: offset.unwrap_or(0).max(0),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Page::new(None, None)
    }
}

/// Administrative donation query.
#[derive(Debug, Clone, Default)]
pub struct DonationFilter {
    pub cause_id: Option<Uuid>,
    pub status: Option<DonationStatus>,
    pub page: Page,
}

/// A cause's stored aggregate next to the ledger sum, read from one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateSnapshot {
    pub stored: BigDecimal,
    pub target: BigDecimal,
    pub ledger: BigDecimal,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;

    async fn insert_cause(&self, cause: &Cause) -> StoreResult<Cause>;

    async fn get_cause(&self, id: Uuid) -> StoreResult<Option<Cause>>;

    async fn update_cause_status(&self, id: Uuid, status: CauseStatus) -> StoreResult<Cause>;

    async fn list_cause_ids(&self) -> StoreResult<Vec<Uuid>>;

    /// Inserts the donation and, when it is completed, adds its amount to the
    /// cause total as a relative increment. Both happen or neither does.
    async fn commit_donation(&self, donation: &Donation) -> StoreResult<Donation>;

    async fn find_donation_by_token(&self, token: &str) -> StoreResult<Option<Donation>>;

    /// Donations of one status for a cause, newest first.
    async fn list_donations_for_cause(
        &self,
        cause_id: Uuid,
        status: DonationStatus,
        page: Page,
    ) -> StoreResult<Vec<Donation>>;

    async fn list_donations(&self, filter: &DonationFilter) -> StoreResult<Vec<Donation>>;

    async fn aggregate_snapshot(&self, cause_id: Uuid) -> StoreResult<Option<AggregateSnapshot>>;

    /// Resets the stored total to the ledger sum. Audit path only.
    async fn repair_aggregate(&self, cause_id: Uuid) -> StoreResult<Cause>;
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn insert_notification(&self, notification: &Notification) -> StoreResult<Notification>;

    async fn list_notifications(&self, unread_only: bool, page: Page) -> StoreResult<Vec<Notification>>;

    async fn mark_notification_read(&self, id: Uuid) -> StoreResult<Notification>;
}
