//! Postgres implementation of LedgerStore and NotificationRepository.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::domain::{
    Cause, CauseStatus, Donation, DonationStatus, DonorInfo, Notification, UnknownVariant,
};
use crate::ports::{
    AggregateSnapshot, DonationFilter, LedgerStore, NotificationRepository, Page, StoreError,
    StoreResult,
};

const DONATION_COLUMNS: &str = "id, cause_id, amount, donor_first_name, donor_last_name, \
     donor_email, donor_phone, donor_address, is_anonymous, payment_method, message, status, \
     transaction_token, created_at";

/// Postgres-backed ledger store.
#[derive(Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_cause(&self, cause: &Cause) -> StoreResult<Cause> {
        let row = sqlx::query_as::<_, CauseRow>(
            r#"
            INSERT INTO causes (
                id, title, slug, description, category, target_amount, current_amount,
                status, owner_id, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(cause.id)
        .bind(&cause.title)
        .bind(&cause.slug)
        .bind(&cause.description)
        .bind(&cause.category)
        .bind(&cause.target_amount)
        .bind(&cause.current_amount)
        .bind(cause.status.as_str())
        .bind(cause.owner_id)
        .bind(cause.created_at)
        .bind(cause.updated_at)
        .fetch_one(&self.pool)
        .await?;

        row.into_domain()
    }

    async fn get_cause(&self, id: Uuid) -> StoreResult<Option<Cause>> {
        let row = sqlx::query_as::<_, CauseRow>("SELECT * FROM causes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(CauseRow::into_domain).transpose()
    }

    async fn update_cause_status(&self, id: Uuid, status: CauseStatus) -> StoreResult<Cause> {
        let row = sqlx::query_as::<_, CauseRow>(
            "UPDATE causes SET status = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
        )
        .bind(status.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| StoreError::NotFound(format!("cause {}", id)))?
            .into_domain()
    }

    async fn list_cause_ids(&self) -> StoreResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>("SELECT id FROM causes ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn commit_donation(&self, donation: &Donation) -> StoreResult<Donation> {
        // Dropping `tx` before commit (error or caller cancellation) rolls back.
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, DonationRow>(&format!(
            r#"
            INSERT INTO donations ({DONATION_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING {DONATION_COLUMNS}
            "#
        ))
        .bind(donation.id)
        .bind(donation.cause_id)
        .bind(&donation.amount)
        .bind(&donation.donor.first_name)
        .bind(&donation.donor.last_name)
        .bind(&donation.donor.email)
        .bind(&donation.donor.phone)
        .bind(&donation.donor.address)
        .bind(donation.is_anonymous)
        .bind(&donation.payment_method)
        .bind(&donation.message)
        .bind(donation.status.as_str())
        .bind(&donation.transaction_token)
        .bind(donation.created_at)
        .fetch_one(&mut *tx)
        .await?;

        if donation.status.counts_towards_total() {
            let updated = sqlx::query(
                "UPDATE causes SET current_amount = current_amount + $1, updated_at = NOW() WHERE id = $2",
            )
            .bind(&donation.amount)
            .bind(donation.cause_id)
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() != 1 {
                tx.rollback().await?;
                return Err(StoreError::NotFound(format!("cause {}", donation.cause_id)));
            }
        }

        tx.commit().await?;
        row.into_domain()
    }

    async fn find_donation_by_token(&self, token: &str) -> StoreResult<Option<Donation>> {
        let row = sqlx::query_as::<_, DonationRow>(&format!(
            "SELECT {DONATION_COLUMNS} FROM donations WHERE transaction_token = $1"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        row.map(DonationRow::into_domain).transpose()
    }

    async fn list_donations_for_cause(
        &self,
        cause_id: Uuid,
        status: DonationStatus,
        page: Page,
    ) -> StoreResult<Vec<Donation>> {
        let rows = sqlx::query_as::<_, DonationRow>(&format!(
            r#"
            SELECT {DONATION_COLUMNS} FROM donations
            WHERE cause_id = $1 AND status = $2
            ORDER BY created_at DESC, id
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(cause_id)
        .bind(status.as_str())
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DonationRow::into_domain).collect()
    }

    async fn list_donations(&self, filter: &DonationFilter) -> StoreResult<Vec<Donation>> {
        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {DONATION_COLUMNS} FROM donations WHERE TRUE"));

        if let Some(cause_id) = filter.cause_id {
            query.push(" AND cause_id = ").push_bind(cause_id);
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        query
            .push(" ORDER BY created_at DESC, id LIMIT ")
            .push_bind(filter.page.limit)
            .push(" OFFSET ")
            .push_bind(filter.page.offset);

        let rows = query
            .build_query_as::<DonationRow>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(DonationRow::into_domain).collect()
    }

    async fn aggregate_snapshot(&self, cause_id: Uuid) -> StoreResult<Option<AggregateSnapshot>> {
        // One statement, one snapshot: the stored total and the ledger sum agree
        // on which commits are visible.
        let row = sqlx::query_as::<_, (BigDecimal, BigDecimal, BigDecimal)>(
            r#"
            SELECT c.current_amount, c.target_amount,
                   COALESCE((
                       SELECT SUM(d.amount) FROM donations d
                       WHERE d.cause_id = c.id AND d.status = 'completed'
                   ), 0)
            FROM causes c
            WHERE c.id = $1
            "#,
        )
        .bind(cause_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(stored, target, ledger)| AggregateSnapshot {
            stored,
            target,
            ledger,
        }))
    }

    async fn repair_aggregate(&self, cause_id: Uuid) -> StoreResult<Cause> {
        let mut tx = self.pool.begin().await?;

        // Lock the cause row first so in-flight commits finish (or wait) before the sum is taken.
        let locked = sqlx::query_scalar::<_, Uuid>("SELECT id FROM causes WHERE id = $1 FOR UPDATE")
            .bind(cause_id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(StoreError::NotFound(format!("cause {}", cause_id)));
        }

        let row = sqlx::query_as::<_, CauseRow>(
            r#"
            UPDATE causes SET
                current_amount = COALESCE((
                    SELECT SUM(amount) FROM donations
                    WHERE cause_id = $1 AND status = 'completed'
                ), 0),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(cause_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.into_domain()
    }
}

#[async_trait]
impl NotificationRepository for PostgresLedgerStore {
    async fn insert_notification(&self, notification: &Notification) -> StoreResult<Notification> {
        let row = sqlx::query_as::<_, NotificationRow>(
            r#"
            INSERT INTO notifications (
                id, notification_type, recipient_id, message, details, read, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(notification.id)
        .bind(notification.notification_type.as_str())
        .bind(notification.recipient_id)
        .bind(&notification.message)
        .bind(&notification.details)
        .bind(notification.read)
        .bind(notification.created_at)
        .fetch_one(&self.pool)
        .await?;

        row.into_domain()
    }

    async fn list_notifications(&self, unread_only: bool, page: Page) -> StoreResult<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT * FROM notifications
            WHERE ($1 = FALSE OR read = FALSE)
            ORDER BY created_at DESC, id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(unread_only)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(NotificationRow::into_domain).collect()
    }

    async fn mark_notification_read(&self, id: Uuid) -> StoreResult<Notification> {
        let row = sqlx::query_as::<_, NotificationRow>(
            "UPDATE notifications SET read = TRUE WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| StoreError::NotFound(format!("notification {}", id)))?
            .into_domain()
    }
}

impl From<UnknownVariant> for StoreError {
    fn from(err: UnknownVariant) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Internal row types for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct CauseRow {
    id: Uuid,
    title: String,
    slug: String,
    description: Option<String>,
    category: String,
    target_amount: BigDecimal,
    current_amount: BigDecimal,
    status: String,
    owner_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CauseRow {
    fn into_domain(self) -> StoreResult<Cause> {
        Ok(Cause {
            id: self.id,
            title: self.title,
            slug: self.slug,
            description: self.description,
            category: self.category,
            target_amount: self.target_amount,
            current_amount: self.current_amount,
            status: self.status.parse()?,
            owner_id: self.owner_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DonationRow {
    id: Uuid,
    cause_id: Uuid,
    amount: BigDecimal,
    donor_first_name: String,
    donor_last_name: String,
    donor_email: String,
    donor_phone: Option<String>,
    donor_address: Option<String>,
    is_anonymous: bool,
    payment_method: String,
    message: Option<String>,
    status: String,
    transaction_token: String,
    created_at: DateTime<Utc>,
}

impl DonationRow {
    fn into_domain(self) -> StoreResult<Donation> {
        Ok(Donation {
            id: self.id,
            cause_id: self.cause_id,
            amount: self.amount,
            donor: DonorInfo {
                first_name: self.donor_first_name,
                last_name: self.donor_last_name,
                email: self.donor_email,
                phone: self.donor_phone,
                address: self.donor_address,
            },
            is_anonymous: self.is_anonymous,
            payment_method: self.payment_method,
            message: self.message,
            status: self.status.parse()?,
            transaction_token: self.transaction_token,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    notification_type: String,
    recipient_id: Option<Uuid>,
    message: String,
    details: serde_json::Value,
    read: bool,
    created_at: DateTime<Utc>,
}

impl NotificationRow {
    fn into_domain(self) -> StoreResult<Notification> {
        Ok(Notification {
            id: self.id,
            notification_type: self.notification_type.parse()?,
            recipient_id: self.recipient_id,
            message: self.message,
            details: self.details,
            read: self.read,
            created_at: self.created_at,
        })
    }
}
