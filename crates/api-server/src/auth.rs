//! Bearer token gate for administrative routes.

use crate::rest::{AppState, ErrorResponse};
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::warn;

fn unauthorized(error: &str, message: &str) -> Response {
    metrics::counter!("api.auth_failures").increment(1);
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        }),
    )
        .into_response()
}

/// Axum middleware requiring `Authorization: Bearer <admin token>`.
pub async fn require_admin(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match auth_header.and_then(|value| value.strip_prefix("Bearer ")) {
        Some(token) if !state.admin_token.is_empty() && token == &*state.admin_token => {
            next.run(req).await
        }
        Some(_) => {
            warn!(path = %req.uri().path(), "Rejected admin request with invalid token");
            unauthorized("invalid_token", "Invalid bearer token")
        }
        None => unauthorized(
            "missing_auth",
            "Authorization header with Bearer token required",
        ),
    }
}
