//! API server: REST router plus the Prometheus exporter.

use crate::auth;
use crate::loyalty_rest;
use crate::rest::{self, AppState};
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use rewards_core::config::AppConfig;
use rewards_loyalty::AccrualService;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// All REST routes. Engine triggers and adjustments require the admin token.
pub fn build_router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/v1/engine/initial", post(loyalty_rest::handle_run_initial))
        .route("/v1/engine/quarterly", post(loyalty_rest::handle_run_quarterly))
        .route(
            "/v1/customers/:id/adjustments",
            post(loyalty_rest::handle_adjustment),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_admin,
        ));

    Router::new()
        .route("/v1/transactions", post(loyalty_rest::handle_record_transaction))
        .route("/v1/customers/:id/balance", get(loyalty_rest::handle_balance))
        .route("/v1/customers/:id/periods", get(loyalty_rest::handle_periods))
        .route("/v1/customers/:id/ledger", get(loyalty_rest::handle_ledger))
        .merge(admin)
        // Operational endpoints
        .route("/health", get(rest::health_check))
        .route("/ready", get(rest::readiness))
        .route("/live", get(rest::liveness))
        // Middleware
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct ApiServer {
    config: AppConfig,
    service: Arc<AccrualService>,
}

impl ApiServer {
    pub fn new(config: AppConfig, service: Arc<AccrualService>) -> Self {
        Self { config, service }
    }

    /// Serve HTTP until `shutdown` resolves.
    pub async fn start_http<F>(&self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.config.api.admin_token.is_empty() {
            tracing::warn!("api.admin_token is empty, administrative routes are disabled");
        }
        let state = AppState::new(self.service.clone(), &self.config.api.admin_token);
        let app = build_router(state);

        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);
        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }

    /// Start the metrics exporter on a separate port.
    pub fn start_metrics(&self) -> anyhow::Result<()> {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");
        Ok(())
    }
}
