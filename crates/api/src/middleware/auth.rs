//! Shared-secret extractor for mutating handlers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use gridwatch_core::CoreError;

use crate::error::AppError;
use crate::state::AppState;

/// Proof that the request carried the configured shared secret.
///
/// Use this as an extractor parameter in any handler that mutates state:
///
/// ```ignore
/// async fn my_handler(_key: ApiKey, State(state): State<AppState>) -> AppResult<Json<()>> {
///     Ok(Json(()))
/// }
/// ```
///
/// When no `GRIDWATCH_API_KEY` is configured the check is disabled and every
/// request passes. Read-only handlers intentionally skip this extractor.
#[derive(Debug, Clone, Copy)]
pub struct ApiKey;

impl FromRequestParts<AppState> for ApiKey {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.api_key.as_deref() else {
            return Ok(ApiKey);
        };

        let provided = parts
            .headers
            .get("x-api-key")
            .and_then(|v| v.to_str().ok());

        match provided {
            Some(key) if key == expected => Ok(ApiKey),
            _ => Err(AppError::Core(CoreError::Unauthorized(
                "Missing or invalid x-api-key header".into(),
            ))),
        }
    }
}
