//! Cost estimation handler.

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use gateway_core::{Stage, StageCost, StageOptions};

use super::error::ApiResult;
use super::middleware::AuthUser;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct EstimateBody {
    /// Stages to price; all of them when omitted.
    #[serde(default)]
    pub operations: Option<Vec<Stage>>,
    #[serde(default)]
    pub options: StageOptions,
}

#[derive(Debug, Serialize)]
pub struct EstimateResponse {
    pub estimated: i64,
    pub breakdown: Vec<StageCost>,
    pub current_balance: i64,
    pub sufficient_balance: bool,
}

/// Price a stage selection against the caller's balance. Nothing is charged.
pub async fn estimate(
    State(state): State<Arc<AppState>>,
    AuthUser(account_id): AuthUser,
    body: Result<Json<EstimateBody>, JsonRejection>,
) -> ApiResult<Json<EstimateResponse>> {
    let Json(body) = body?;

    let estimate = state
        .orchestrator()
        .estimate(body.operations.as_deref(), &body.options)?;

    let balance = state
        .ledger()
        .account(&account_id)?
        .map(|a| a.balance)
        .unwrap_or(0);

    Ok(Json(EstimateResponse {
        estimated: estimate.total,
        sufficient_balance: balance >= estimate.total,
        breakdown: estimate.breakdown,
        current_balance: balance,
    }))
}
