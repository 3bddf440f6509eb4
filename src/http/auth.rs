//! Bearer-token auth middleware, adapted from `imdanibytes-nexus`'s
//! `host_api::middleware::auth_middleware`. Applied to every route except
//! `/system/ping`.

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ApiError;
use crate::http::AppState;

pub async fn require_auth(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match token {
        Some(t) if t == state.auth_token.as_str() => Ok(next.run(req).await),
        _ => Err(ApiError::Unauthorized("missing or invalid bearer token".to_string())),
    }
}
