use axum::extract::{Path, State};
use axum::routing::{get, put};
use axum::Router;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::envelope::ApiResponse;
use crate::api::markets::MarketHistory;
use crate::api::routes::{audit, snapshot, today, ApiJson, ApiQuery, ApiState, CreatedId, DateQuery, PageQuery};
use crate::auth::AdminClaims;
use crate::config::{DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT};
use crate::db::models::ResultRecord;
use crate::error::{AppError, Result};
use crate::state::LiveResult;
use crate::validate;

pub fn routes() -> Router<ApiState> {
    Router::new()
        .route("/results", get(by_date).post(create))
        .route("/results/live", get(live))
        .route("/results/:id", put(update).delete(remove))
        .route("/results/:id/history", get(history))
}

#[derive(Serialize)]
pub struct DayResults<T> {
    pub date: NaiveDate,
    pub count: usize,
    pub results: T,
}

#[derive(Deserialize)]
pub struct NewResult {
    pub market_id: i64,
    pub result: String,
    pub result_date: Option<NaiveDate>,
}

#[derive(Deserialize)]
pub struct ResultUpdate {
    pub result: String,
}

async fn by_date(
    State(state): State<ApiState>,
    ApiQuery(q): ApiQuery<DateQuery>,
) -> Result<ApiResponse<DayResults<Vec<ResultRecord>>>> {
    let date = q.date_or_today();
    let results = state.store.results_on(date).await?;
    Ok(ApiResponse::ok("Results fetched", DayResults { date, count: results.len(), results }))
}

/// Same data as `/results`, served from the in-memory cache.
async fn live(
    State(state): State<ApiState>,
    ApiQuery(q): ApiQuery<DateQuery>,
) -> Result<ApiResponse<DayResults<Vec<LiveResult>>>> {
    let date = q.date_or_today();
    let results = state.cache.results_on(&state.store, date).await?.as_ref().clone();
    Ok(ApiResponse::ok("Live results fetched", DayResults { date, count: results.len(), results }))
}

async fn history(
    State(state): State<ApiState>,
    Path(market_id): Path<i64>,
    ApiQuery(page): ApiQuery<PageQuery>,
) -> Result<ApiResponse<MarketHistory>> {
    let (limit, offset) = page.resolve(DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT)?;
    let market = state.store.get_market(market_id).await?.ok_or_else(|| AppError::not_found("Market"))?;
    let results = state.store.market_history(market_id, limit, offset).await?;
    Ok(ApiResponse::ok(
        "Market history fetched",
        MarketHistory { market_id, market_name: market.name, count: results.len(), results },
    ))
}

async fn create(
    State(state): State<ApiState>,
    admin: AdminClaims,
    ApiJson(req): ApiJson<NewResult>,
) -> Result<ApiResponse<CreatedId>> {
    let value = validate::result_value(&req.result)?;
    if state.store.get_market(req.market_id).await?.is_none() {
        return Err(AppError::not_found("Market"));
    }
    let date = req.result_date.unwrap_or_else(today);
    let id = state.store.create_result(req.market_id, value, date).await?;
    state.cache.invalidate(date);

    let created = state.store.get_result(id).await?;
    audit(&state.store, &admin.claims, "create", "result", Some(id), None, created.as_ref().and_then(snapshot)).await;
    info!(result_id = id, market_id = req.market_id, %date, "result published");
    Ok(ApiResponse::created("Result created", CreatedId { id }))
}

async fn update(
    State(state): State<ApiState>,
    admin: AdminClaims,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<ResultUpdate>,
) -> Result<ApiResponse<ResultRecord>> {
    let value = validate::result_value(&req.result)?;
    let old = state.store.get_result(id).await?.ok_or_else(|| AppError::not_found("Result"))?;
    state.store.update_result_value(id, value).await?;
    state.cache.invalidate(old.result_date);

    let updated = state.store.get_result(id).await?.ok_or_else(|| AppError::not_found("Result"))?;
    audit(&state.store, &admin.claims, "update", "result", Some(id), snapshot(&old), snapshot(&updated)).await;
    Ok(ApiResponse::ok("Result updated", updated))
}

async fn remove(
    State(state): State<ApiState>,
    admin: AdminClaims,
    Path(id): Path<i64>,
) -> Result<ApiResponse<CreatedId>> {
    let old = state.store.get_result(id).await?.ok_or_else(|| AppError::not_found("Result"))?;
    state.store.delete_result(id).await?;
    state.cache.invalidate(old.result_date);
    audit(&state.store, &admin.claims, "delete", "result", Some(id), snapshot(&old), None).await;
    Ok(ApiResponse::ok("Result deleted", CreatedId { id }))
}
