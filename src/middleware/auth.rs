use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::domain::Principal;
use crate::error::AppError;
use crate::AppState;

/// Resolves the caller from `Authorization: Bearer <ADMIN_API_KEY>`.
///
/// No header means a public caller; a header with the wrong key is rejected
/// outright rather than downgraded.
#[async_trait]
impl FromRequestParts<AppState> for Principal {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(header) = parts.headers.get(AUTHORIZATION) else {
            return Ok(Principal::Public);
        };

        let auth = header
            .to_str()
            .map_err(|_| AppError::Unauthorized("malformed Authorization header".to_string()))?;
        let key = auth.strip_prefix("Bearer ").unwrap_or(auth).trim();

        if key == state.admin_api_key.as_ref() {
            Ok(Principal::Admin)
        } else {
            tracing::warn!(uri = %parts.uri, "Rejected request with invalid admin credentials");
            Err(AppError::Unauthorized("invalid credentials".to_string()))
        }
    }
}
