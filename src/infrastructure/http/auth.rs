//! Bearer-token middleware.
//!
//! Caller tokens are validated by forwarding them to the upstream `getMe`
//! endpoint on every request; nothing is cached.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use super::error::ApiError;
use super::state::AppState;

pub async fn require_bearer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::unauthorized("missing bearer token"))?;

    state
        .api
        .validate_token(token)
        .await
        .map_err(|_| ApiError::unauthorized("invalid token"))?;

    Ok(next.run(request).await)
}
