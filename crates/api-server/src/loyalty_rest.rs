//! Rewards REST API endpoints.

use crate::rest::{ApiResult, AppState};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use rewards_core::loyalty::{MembershipPeriod, RewardLedgerEntry};
use rewards_core::types::{Amount, Transaction};
use rewards_loyalty::ledger::{self, Adjustment};
use rewards_loyalty::shipments::{record_shipment, NewShipment};
use rewards_loyalty::{InitialRunReport, QuarterlyRunReport, RewardsStore};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
pub struct EngineRunParams {
    /// Evaluation date; falls back to the configured or current date.
    pub today: Option<NaiveDate>,
}

/// POST /v1/engine/initial: Grant first-period cashback and welcome bonus.
pub async fn handle_run_initial(
    State(state): State<AppState>,
    Query(params): Query<EngineRunParams>,
) -> ApiResult<Json<InitialRunReport>> {
    let today = params.today.unwrap_or_else(|| state.service.today());
    let report = state.service.run_initial_engine(today).await?;
    metrics::counter!("api.engine_runs", "engine" => "initial").increment(1);
    Ok(Json(report))
}

/// POST /v1/engine/quarterly: Rebuild period chains and back-fill points.
pub async fn handle_run_quarterly(
    State(state): State<AppState>,
    Query(params): Query<EngineRunParams>,
) -> ApiResult<Json<QuarterlyRunReport>> {
    let today = params.today.unwrap_or_else(|| state.service.today());
    let report = state.service.run_quarterly_engine(today).await?;
    metrics::counter!("api.engine_runs", "engine" => "quarterly").increment(1);
    Ok(Json(report))
}

/// POST /v1/transactions: Record a shipment.
pub async fn handle_record_transaction(
    State(state): State<AppState>,
    Json(shipment): Json<NewShipment>,
) -> ApiResult<(StatusCode, Json<Transaction>)> {
    let transaction = record_shipment(state.service.store().as_ref(), shipment)?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub customer_id: String,
    pub points: i64,
    pub cashback: Amount,
}

/// GET /v1/customers/:id/balance
pub async fn handle_balance(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> ApiResult<Json<BalanceResponse>> {
    let balance = ledger::customer_balance(state.service.store().as_ref(), &customer_id)?;
    Ok(Json(BalanceResponse {
        customer_id,
        points: balance.points,
        cashback: balance.cashback,
    }))
}

/// GET /v1/customers/:id/periods
pub async fn handle_periods(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> ApiResult<Json<Vec<MembershipPeriod>>> {
    Ok(Json(ledger::customer_periods(
        state.service.store().as_ref(),
        &customer_id,
    )?))
}

/// GET /v1/customers/:id/ledger
pub async fn handle_ledger(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> ApiResult<Json<Vec<RewardLedgerEntry>>> {
    Ok(Json(state.service.store().ledger_entries(&customer_id)?))
}

/// POST /v1/customers/:id/adjustments: Manual ledger correction.
pub async fn handle_adjustment(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
    Json(adjustment): Json<Adjustment>,
) -> ApiResult<(StatusCode, Json<RewardLedgerEntry>)> {
    let entry = ledger::adjust(state.service.store().as_ref(), &customer_id, adjustment)?;
    Ok((StatusCode::CREATED, Json(entry)))
}
