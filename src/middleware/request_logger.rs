use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::time::Instant;
use uuid::Uuid;

use crate::AppState;

const MAX_BODY_LOG_SIZE: usize = 16 * 1024;
const REQUEST_ID_HEADER: &str = "x-request-id";

pub async fn request_logger_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let header_value = HeaderValue::from_str(&request_id).ok();
    let method = req.method().clone();
    let uri = req.uri().clone();
    let start = Instant::now();

    if let Some(value) = &header_value {
        req.headers_mut().insert(REQUEST_ID_HEADER, value.clone());
    }

    if state.log_request_body {
        let (parts, body) = req.into_parts();
        let bytes = match axum::body::to_bytes(body, MAX_BODY_LOG_SIZE).await {
            Ok(bytes) => bytes,
            Err(_) => {
                tracing::warn!(
                    request_id = %request_id,
                    method = %method,
                    uri = %uri,
                    "Request body too large or failed to read"
                );
                return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
            }
        };

        let sanitized_body = match serde_json::from_slice::<serde_json::Value>(&bytes) {
            Ok(json) => crate::utils::sanitize::sanitize_json(&json).to_string(),
            Err(_) => format!("[non-json, {} bytes]", bytes.len()),
        };

        tracing::info!(
            request_id = %request_id,
            method = %method,
            uri = %uri,
            body_size = bytes.len(),
            body = %sanitized_body,
            "Incoming request"
        );

        req = Request::from_parts(parts, Body::from(bytes));
    } else {
        tracing::info!(
            request_id = %request_id,
            method = %method,
            uri = %uri,
            "Incoming request"
        );
    }

    let response = next.run(req).await;

    tracing::info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %response.status().as_u16(),
        latency_ms = start.elapsed().as_millis() as u64,
        "Outgoing response"
    );

    let (mut parts, body) = response.into_parts();
    if let Some(value) = header_value {
        parts.headers.insert(REQUEST_ID_HEADER, value);
    }

    Response::from_parts(parts, body)
}
