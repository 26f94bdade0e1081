use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Donation, DonationStatus, PaymentOutcome};
use crate::error::AppError;
use crate::handlers::causes::submission_token;
use crate::handlers::Pagination;
use crate::ports::Page;
use crate::services::{DonationIntent, DonorPayload};
use crate::validation::StrictPayload;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct DonationRequest {
    pub amount: BigDecimal,
    #[serde(default)]
    pub donor: DonorPayload,
    pub payment_method: String,
    #[serde(default)]
    pub is_anonymous: bool,
    pub message: Option<String>,
    #[serde(default)]
    pub payment_outcome: PaymentOutcome,
}

/// What the donor gets back: enough to reference the donation, nothing about who they are.
#[derive(Debug, Serialize)]
pub struct DonationReceipt {
    pub id: Uuid,
    pub cause_id: Uuid,
    pub amount: BigDecimal,
    pub status: DonationStatus,
    pub transaction_token: String,
    pub created_at: DateTime<Utc>,
}

impl From<Donation> for DonationReceipt {
    fn from(donation: Donation) -> Self {
        Self {
            id: donation.id,
            cause_id: donation.cause_id,
            amount: donation.amount,
            status: donation.status,
            transaction_token: donation.transaction_token,
            created_at: donation.created_at,
        }
    }
}

pub async fn record_donation(
    State(state): State<AppState>,
    Path(cause_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<StrictPayload<DonationRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let request = payload.data;
    let intent = DonationIntent {
        cause_id,
        amount: request.amount,
        donor: request.donor,
        payment_method: request.payment_method,
        is_anonymous: request.is_anonymous,
        message: request.message,
        payment_outcome: request.payment_outcome,
        submission_token: submission_token(&headers),
    };

    let donation = state.ledger.record_donation(intent).await?;
    Ok((StatusCode::CREATED, Json(DonationReceipt::from(donation))))
}

pub async fn list_donations(
    State(state): State<AppState>,
    Path(cause_id): Path<Uuid>,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let page = Page::new(pagination.limit, pagination.offset);
    let donations = state.donations.list_donations_for_cause(cause_id, page).await?;
    Ok(Json(donations))
}
