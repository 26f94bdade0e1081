//! Operator endpoints. Every handler resolves a [`Principal`] and the service
//! layer refuses anything but an admin.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::{CauseStatus, DonationStatus, Principal};
use crate::error::AppError;
use crate::ports::{DonationFilter, Page};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct DonationQuery {
    pub cause_id: Option<Uuid>,
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModerationRequest {
    pub status: CauseStatus,
}

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_donations(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<DonationQuery>,
) -> Result<impl IntoResponse, AppError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<DonationStatus>)
        .transpose()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let filter = DonationFilter {
        cause_id: query.cause_id,
        status,
        page: Page::new(query.limit, query.offset),
    };

    let donations = state.donations.list_donations_admin(principal, filter).await?;
    Ok(Json(donations))
}

pub async fn moderate_cause(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    Json(request): Json<ModerationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let cause = state.causes.moderate(principal, id, request.status).await?;
    Ok(Json(cause))
}

pub async fn reconcile_cause(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    principal.require_admin("auditing a cause total")?;
    let report = state.aggregates.reconcile(id).await?;
    Ok(Json(report))
}

pub async fn heal_cause(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state.aggregates.heal(principal, id).await?;
    Ok(Json(outcome))
}

pub async fn list_notifications(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<NotificationQuery>,
) -> Result<impl IntoResponse, AppError> {
    principal.require_admin("reading notifications")?;
    let notifications = state
        .notifications
        .list_notifications(query.unread_only, Page::new(query.limit, query.offset))
        .await?;
    Ok(Json(notifications))
}

pub async fn mark_notification_read(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    principal.require_admin("updating notifications")?;
    let notification = state.notifications.mark_notification_read(id).await?;
    Ok(Json(notification))
}
