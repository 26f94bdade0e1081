use bigdecimal::BigDecimal;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::domain::{Cause, Donation, Notification, NotificationType};
use crate::ports::{NotificationRepository, StoreError};
use crate::services::privacy::project_donor;

const DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum NotificationDispatchError {
    #[error("failed to store notification: {0}")]
    Store(#[from] StoreError),

    #[error("notification dispatch timed out after {0:?}")]
    Timeout(Duration),
}

/// What the cause owner is told about a committed donation.
#[derive(Debug, Clone)]
pub struct DonationSummary {
    pub donation_id: Uuid,
    pub transaction_token: String,
    pub amount: BigDecimal,
    pub donor_display: String,
    pub cause_title: String,
    pub owner_id: Uuid,
}

impl DonationSummary {
    pub fn new(donation: &Donation, cause: &Cause) -> Self {
        Self {
            donation_id: donation.id,
            transaction_token: donation.transaction_token.clone(),
            amount: donation.amount.clone(),
            donor_display: project_donor(donation).display_name(),
            cause_title: cause.title.clone(),
            owner_id: cause.owner_id,
        }
    }
}

/// Best-effort notification writer. Failures are logged and never surface to
/// the operation that triggered them.
#[derive(Clone)]
pub struct NotificationDispatcher {
    repository: Arc<dyn NotificationRepository>,
}

impl NotificationDispatcher {
    pub fn new(repository: Arc<dyn NotificationRepository>) -> Self {
        Self { repository }
    }

    /// Schedules the owner notification for a committed donation and returns
    /// immediately. The handle is only useful to tests; callers drop it.
    pub fn notify_donation(&self, cause_id: Uuid, summary: DonationSummary) -> JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            if let Err(e) = dispatcher.dispatch_donation(cause_id, &summary).await {
                tracing::error!(
                    cause_id = %cause_id,
                    donation_id = %summary.donation_id,
                    error = %e,
                    "Failed to dispatch donation notification"
                );
            }
        })
    }

    pub async fn dispatch_donation(
        &self,
        cause_id: Uuid,
        summary: &DonationSummary,
    ) -> Result<Notification, NotificationDispatchError> {
        let notification = Notification::new(
            NotificationType::Donation,
            Some(summary.owner_id),
            format!(
                "{} donated {} to \"{}\"",
                summary.donor_display, summary.amount, summary.cause_title
            ),
            json!({
                "cause_id": cause_id,
                "donation_id": summary.donation_id,
                "transaction_token": summary.transaction_token,
                "amount": summary.amount.to_string(),
            }),
        );

        self.store(notification).await
    }

    /// Schedules the owner notification for a moderation decision.
    pub fn notify_cause_status(&self, cause: Cause) -> JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            if let Err(e) = dispatcher.dispatch_cause_status(&cause).await {
                tracing::error!(
                    cause_id = %cause.id,
                    error = %e,
                    "Failed to dispatch cause status notification"
                );
            }
        })
    }

    pub async fn dispatch_cause_status(
        &self,
        cause: &Cause,
    ) -> Result<Notification, NotificationDispatchError> {
        let notification = Notification::new(
            NotificationType::Cause,
            Some(cause.owner_id),
            format!("Your cause \"{}\" is now {}", cause.title, cause.status),
            json!({
                "cause_id": cause.id,
                "status": cause.status.as_str(),
            }),
        );

        self.store(notification).await
    }

    async fn store(&self, notification: Notification) -> Result<Notification, NotificationDispatchError> {
        let stored = tokio::time::timeout(
            DISPATCH_TIMEOUT,
            self.repository.insert_notification(&notification),
        )
        .await
        .map_err(|_| NotificationDispatchError::Timeout(DISPATCH_TIMEOUT))??;

        tracing::debug!(
            notification_id = %stored.id,
            notification_type = %stored.notification_type,
            "Notification stored"
        );
        Ok(stored)
    }
}
