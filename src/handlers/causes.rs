use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use bigdecimal::BigDecimal;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::services::CauseSubmission;
use crate::validation::StrictPayload;
use crate::AppState;

pub const IDEMPOTENCY_HEADER: &str = "x-idempotency-key";

#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub cause_id: Uuid,
    pub current_amount: BigDecimal,
    pub target_amount: BigDecimal,
    pub percent_funded: BigDecimal,
}

/// Reads the client submission token; `None` when the header is absent or not ASCII.
pub fn submission_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub async fn create_cause(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<StrictPayload<CauseSubmission>>,
) -> Result<impl IntoResponse, AppError> {
    let token = submission_token(&headers).ok_or_else(|| {
        AppError::Validation(format!("{} header is required", IDEMPOTENCY_HEADER))
    })?;

    let cause = state.causes.create_cause(&token, payload.data).await?;
    Ok((StatusCode::CREATED, Json(cause)))
}

pub async fn get_cause(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let cause = state.causes.get_cause(id).await?;
    Ok(Json(cause))
}

pub async fn get_progress(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let progress = state.aggregates.get_progress(id).await?;
    let percent_funded = progress.percent_funded();

    Ok(Json(ProgressResponse {
        cause_id: progress.cause_id,
        current_amount: progress.current_amount,
        target_amount: progress.target_amount,
        percent_funded,
    }))
}
