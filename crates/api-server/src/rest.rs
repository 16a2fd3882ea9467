//! Shared REST state, error mapping and operational endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rewards_core::RewardsError;
use rewards_loyalty::{AccrualService, RewardsStore};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, warn};

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AccrualService>,
    pub admin_token: Arc<str>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(service: Arc<AccrualService>, admin_token: &str) -> Self {
        Self {
            service,
            admin_token: Arc::from(admin_token),
            start_time: Instant::now(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// A domain error on its way out of a handler.
#[derive(Debug)]
pub struct ApiError(pub RewardsError);

impl From<RewardsError> for ApiError {
    fn from(e: RewardsError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            RewardsError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_failed"),
            RewardsError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            RewardsError::EngineBusy => (StatusCode::CONFLICT, "engine_busy"),
            RewardsError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            RewardsError::ConfigurationMissing(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "configuration_missing")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = if status.is_server_error() {
            error!(error = %self.0, "Request failed");
            metrics::counter!("api.errors").increment(1);
            "Internal processing error".to_string()
        } else {
            warn!(error = %self.0, status = status.as_u16(), "Request rejected");
            metrics::counter!("api.rejections", "code" => code).increment(1);
            self.0.to_string()
        };
        (
            status,
            Json(ErrorResponse {
                error: code.to_string(),
                message,
            }),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready: 200 once the datastore answers.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.service.store().customer_ids() {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// GET /live
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}
