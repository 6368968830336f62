use axum::extract::{Path, State};
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use tracing::info;

use crate::api::envelope::ApiResponse;
use crate::api::routes::{audit, snapshot, ApiJson, ApiQuery, ApiState, CreatedId, PageQuery};
use crate::auth::AdminClaims;
use crate::config::{DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT};
use crate::db::models::{MarketRow, NewMarket, ResultRecord};
use crate::error::{AppError, Result};
use crate::types::{STATUS_ACTIVE, STATUS_INACTIVE};
use crate::validate;

pub fn routes() -> Router<ApiState> {
    Router::new()
        .route("/markets", get(list_active).post(create))
        .route("/markets/:id", get(get_one).put(update).delete(remove))
        .route("/markets/:id/results", get(history))
}

#[derive(Serialize)]
pub struct MarketHistory {
    pub market_id: i64,
    pub market_name: String,
    pub results: Vec<ResultRecord>,
    pub count: usize,
}

/// Trim and check an incoming market before it reaches the store.
pub fn checked(mut market: NewMarket) -> Result<NewMarket> {
    market.name = validate::market_name(&market.name)?.to_string();
    if market.status != STATUS_ACTIVE && market.status != STATUS_INACTIVE {
        return Err(AppError::Validation("status must be 0 or 1".to_string()));
    }
    if market.days.is_some_and(|d| !(0..=7).contains(&d)) {
        return Err(AppError::Validation("days must be between 0 and 7".to_string()));
    }
    Ok(market)
}

async fn list_active(State(state): State<ApiState>) -> Result<ApiResponse<Vec<MarketRow>>> {
    let markets = state.store.list_markets(true).await?;
    Ok(ApiResponse::ok("Markets fetched", markets))
}

async fn get_one(State(state): State<ApiState>, Path(id): Path<i64>) -> Result<ApiResponse<MarketRow>> {
    let market = state.store.get_market(id).await?.ok_or_else(|| AppError::not_found("Market"))?;
    Ok(ApiResponse::ok("Market fetched", market))
}

/// Latest first.
async fn history(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    ApiQuery(page): ApiQuery<PageQuery>,
) -> Result<ApiResponse<MarketHistory>> {
    let (limit, offset) = page.resolve(DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT)?;
    let market = state.store.get_market(id).await?.ok_or_else(|| AppError::not_found("Market"))?;
    let results = state.store.market_history(id, limit, offset).await?;
    Ok(ApiResponse::ok(
        "Market history fetched",
        MarketHistory { market_id: market.id, market_name: market.name, count: results.len(), results },
    ))
}

async fn create(
    State(state): State<ApiState>,
    admin: AdminClaims,
    ApiJson(market): ApiJson<NewMarket>,
) -> Result<ApiResponse<CreatedId>> {
    let market = checked(market)?;
    let id = state.store.create_market(&market).await?;
    state.cache.invalidate_markets();
    let created = state.store.get_market(id).await?;
    audit(&state.store, &admin.claims, "create", "market", Some(id), None, created.as_ref().and_then(snapshot)).await;
    info!(market_id = id, name = %market.name, "market created");
    Ok(ApiResponse::created("Market created", CreatedId { id }))
}

async fn update(
    State(state): State<ApiState>,
    admin: AdminClaims,
    Path(id): Path<i64>,
    ApiJson(market): ApiJson<NewMarket>,
) -> Result<ApiResponse<MarketRow>> {
    let market = checked(market)?;
    let old = state.store.get_market(id).await?.ok_or_else(|| AppError::not_found("Market"))?;
    if !state.store.update_market(id, &market).await? {
        return Err(AppError::not_found("Market"));
    }
    state.cache.invalidate_markets();
    let updated = state.store.get_market(id).await?.ok_or_else(|| AppError::not_found("Market"))?;
    audit(&state.store, &admin.claims, "update", "market", Some(id), snapshot(&old), snapshot(&updated)).await;
    Ok(ApiResponse::ok("Market updated", updated))
}

/// Removes the market and, by cascade, all of its results.
async fn remove(
    State(state): State<ApiState>,
    admin: AdminClaims,
    Path(id): Path<i64>,
) -> Result<ApiResponse<CreatedId>> {
    let old = state.store.get_market(id).await?.ok_or_else(|| AppError::not_found("Market"))?;
    state.store.delete_market(id).await?;
    state.cache.invalidate_markets();
    audit(&state.store, &admin.claims, "delete", "market", Some(id), snapshot(&old), None).await;
    info!(market_id = id, "market deleted");
    Ok(ApiResponse::ok("Market deleted", CreatedId { id }))
}
