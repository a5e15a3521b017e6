//! Account API handlers.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use gateway_core::{LedgerTransaction, Tier, UsageStats, MAX_PAGE_SIZE};

use super::error::{ApiError, ApiResult};
use super::middleware::AuthUser;
use super::jobs::Pagination;
use crate::state::AppState;

/// Default page size for the transaction history
const DEFAULT_LIMIT: i64 = 50;

#[derive(Debug, Serialize)]
pub struct RateLimitInfo {
    pub requests_per_minute: u32,
    /// Pipelines that may run at once, shared by all accounts.
    pub concurrent_jobs: usize,
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub account_id: String,
    pub tier: Tier,
    pub balance: i64,
    pub total_spent: i64,
    pub created_at: DateTime<Utc>,
    pub rate_limit: RateLimitInfo,
}

#[derive(Debug, Deserialize)]
pub struct TransactionParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct TransactionsResponse {
    pub transactions: Vec<LedgerTransaction>,
    pub pagination: Pagination,
}

/// Current balance, tier and limits.
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    AuthUser(account_id): AuthUser,
) -> ApiResult<Json<AccountResponse>> {
    let account = state
        .ledger()
        .account(&account_id)?
        .ok_or_else(|| ApiError::account_not_found(&account_id))?;

    Ok(Json(AccountResponse {
        rate_limit: RateLimitInfo {
            requests_per_minute: state.config().rate_limit.limit_for(account.tier),
            concurrent_jobs: state.config().orchestrator.max_concurrent_jobs,
        },
        account_id: account.id,
        tier: account.tier,
        balance: account.balance,
        total_spent: account.total_spent,
        created_at: account.created_at,
    }))
}

/// Job statistics for the last 30 days.
pub async fn get_usage(
    State(state): State<Arc<AppState>>,
    AuthUser(account_id): AuthUser,
) -> ApiResult<Json<UsageStats>> {
    Ok(Json(state.orchestrator().usage(&account_id)?))
}

/// Ledger audit trail, newest first.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    AuthUser(account_id): AuthUser,
    params: Result<Query<TransactionParams>, QueryRejection>,
) -> ApiResult<Json<TransactionsResponse>> {
    let Query(params) = params?;
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    let offset = params.offset.unwrap_or(0);

    if !(1..=MAX_PAGE_SIZE).contains(&limit) {
        return Err(ApiError::validation(format!(
            "limit must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }
    if offset < 0 {
        return Err(ApiError::validation("offset must not be negative"));
    }

    let page = state.ledger().transactions(&account_id, limit, offset)?;
    let has_more = offset + (page.transactions.len() as i64) < page.total;

    Ok(Json(TransactionsResponse {
        transactions: page.transactions,
        pagination: Pagination {
            total: page.total,
            limit,
            offset,
            has_more,
        },
    }))
}
