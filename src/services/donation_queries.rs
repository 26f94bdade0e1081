use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{Donation, DonationStatus, Principal};
use crate::error::AppError;
use crate::ports::{DonationFilter, LedgerStore, Page};
use crate::services::privacy::{project, PublicDonationView};

/// Read paths over the ledger. Public listings always go through the privacy
/// projection; raw donor records require an admin principal.
#[derive(Clone)]
pub struct DonationQueries {
    store: Arc<dyn LedgerStore>,
}

impl DonationQueries {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn list_donations_for_cause(
        &self,
        cause_id: Uuid,
        page: Page,
    ) -> Result<Vec<PublicDonationView>, AppError> {
        if self.store.get_cause(cause_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Cause {} not found", cause_id)));
        }

        let donations = self
            .store
            .list_donations_for_cause(cause_id, DonationStatus::Completed, page)
            .await?;

        Ok(donations.iter().map(project).collect())
    }

    pub async fn list_donations_admin(
        &self,
        principal: Principal,
        filter: DonationFilter,
    ) -> Result<Vec<Donation>, AppError> {
        principal.require_admin("listing donor records")?;

        let donations = self.store.list_donations(&filter).await?;
        tracing::info!(
            cause_id = ?filter.cause_id,
            count = donations.len(),
            "Admin donor records listed"
        );
        Ok(donations)
    }
}
