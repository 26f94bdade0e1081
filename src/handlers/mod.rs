pub mod admin;
pub mod causes;
pub mod donations;

use crate::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub store: String,
    pub uptime_secs: u64,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let store_status = match state.store.ping().await {
        Ok(()) => "connected",
        Err(e) => {
            tracing::warn!(error = %e, "Health check could not reach the ledger store");
            "disconnected"
        }
    };

    let healthy = store_status == "connected";
    let body = HealthStatus {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: store_status.to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    };

    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(body))
}
