//! Starline numbers, rashi readings and free predictions.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::Router;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::analysis::analyzer::window_start;
use crate::analysis::frequency::{daily_counts, DayCount};
use crate::analysis::validate_period_days;
use crate::api::envelope::{ApiResponse, Page};
use crate::api::routes::{audit, today, ApiJson, ApiQuery, ApiState, CreatedId, DateQuery, PageQuery, PeriodQuery};
use crate::auth::AdminClaims;
use crate::config::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
use crate::db::content::StarlineFilter;
use crate::db::models::{PredictionRow, RashiRow, StarlineRow};
use crate::error::{AppError, Result};
use crate::validate;

pub fn routes() -> Router<ApiState> {
    Router::new()
        .route("/starline", get(list_starline).post(create_starline))
        .route("/starline/trends", get(starline_trends))
        .route("/starline/:id", get(starline_for_market))
        .route("/rashi", get(list_rashi).post(create_rashi))
        .route("/rashi/daily", get(daily_rashi))
        .route("/rashi/:rashi_name", get(rashi_by_name))
        .route("/predictions", get(list_predictions).post(create_prediction))
        .route("/predictions/today", get(todays_predictions))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub target_date: Option<NaiveDate>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListQuery {
    fn page(&self) -> Result<(i64, i64)> {
        PageQuery { limit: self.limit, offset: self.offset }.resolve(DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT)
    }
}

#[derive(Deserialize)]
pub struct NewStarline {
    pub market_id: i64,
    pub number: String,
    pub result_date: Option<NaiveDate>,
}

#[derive(Deserialize)]
pub struct NewRashi {
    pub rashi_name: String,
    pub result: String,
    pub result_date: Option<NaiveDate>,
}

#[derive(Deserialize)]
pub struct NewPrediction {
    pub market_id: i64,
    pub result: String,
    pub added_date: Option<NaiveDate>,
    pub accuracy: Option<i64>,
}

#[derive(Serialize)]
pub struct StarlineTrend {
    pub period_days: i64,
    pub days: Vec<DayCount>,
    pub total: usize,
}

// ---------------------------------------------------------------------------
// Starline
// ---------------------------------------------------------------------------

async fn list_starline(
    State(state): State<ApiState>,
    ApiQuery(q): ApiQuery<ListQuery>,
) -> Result<ApiResponse<Page<StarlineRow>>> {
    let (limit, offset) = q.page()?;
    let filter = StarlineFilter { market_id: None, date: q.target_date };
    let items = state.store.list_starline(filter, Some(limit), offset).await?;
    let total = state.store.count_starline(filter).await?;
    Ok(ApiResponse::ok("Starline results fetched", Page { items, total, limit, offset }))
}

async fn starline_for_market(
    State(state): State<ApiState>,
    Path(market_id): Path<i64>,
    ApiQuery(q): ApiQuery<ListQuery>,
) -> Result<ApiResponse<Page<StarlineRow>>> {
    let (limit, offset) = q.page()?;
    if state.store.get_market(market_id).await?.is_none() {
        return Err(AppError::not_found("Market"));
    }
    let filter = StarlineFilter { market_id: Some(market_id), date: q.target_date };
    let items = state.store.list_starline(filter, Some(limit), offset).await?;
    let total = state.store.count_starline(filter).await?;
    Ok(ApiResponse::ok("Starline results fetched", Page { items, total, limit, offset }))
}

/// Day-bucketed starline counts across all markets.
async fn starline_trends(
    State(state): State<ApiState>,
    ApiQuery(q): ApiQuery<PeriodQuery>,
) -> Result<ApiResponse<StarlineTrend>> {
    let period_days = validate_period_days(q.period_days)?;
    let rows = state.store.starline_since(window_start(today(), period_days)).await?;
    let trend = StarlineTrend {
        period_days,
        days: daily_counts(rows.iter().map(|r| r.result_date)),
        total: rows.len(),
    };
    Ok(ApiResponse::ok("Starline trends", trend))
}

pub async fn create_starline(
    State(state): State<ApiState>,
    admin: AdminClaims,
    ApiJson(req): ApiJson<NewStarline>,
) -> Result<ApiResponse<CreatedId>> {
    let number = validate::result_value(&req.number)?;
    if state.store.get_market(req.market_id).await?.is_none() {
        return Err(AppError::not_found("Market"));
    }
    let date = req.result_date.unwrap_or_else(today);
    let id = state.store.create_starline(req.market_id, number, date).await?;
    let new = serde_json::json!({ "market_id": req.market_id, "number": number, "result_date": date });
    audit(&state.store, &admin.claims, "create", "starline", Some(id), None, Some(new)).await;
    Ok(ApiResponse::created("Starline result created", CreatedId { id }))
}

// ---------------------------------------------------------------------------
// Rashi
// ---------------------------------------------------------------------------

async fn list_rashi(
    State(state): State<ApiState>,
    ApiQuery(q): ApiQuery<ListQuery>,
) -> Result<ApiResponse<Page<RashiRow>>> {
    let (limit, offset) = q.page()?;
    let items = state.store.list_rashi(q.target_date, Some(limit), offset).await?;
    let total = state.store.count_rashi(q.target_date).await?;
    Ok(ApiResponse::ok("Rashi results fetched", Page { items, total, limit, offset }))
}

async fn daily_rashi(State(state): State<ApiState>) -> Result<ApiResponse<Vec<RashiRow>>> {
    let rows = state.store.list_rashi(Some(today()), None, 0).await?;
    Ok(ApiResponse::ok("Daily rashi fetched", rows))
}

async fn rashi_by_name(
    State(state): State<ApiState>,
    Path(rashi_name): Path<String>,
) -> Result<ApiResponse<Vec<RashiRow>>> {
    let rows = state.store.rashi_by_name(rashi_name.trim()).await?;
    if rows.is_empty() {
        return Err(AppError::not_found("Rashi"));
    }
    Ok(ApiResponse::ok("Rashi fetched", rows))
}

pub async fn create_rashi(
    State(state): State<ApiState>,
    admin: AdminClaims,
    ApiJson(req): ApiJson<NewRashi>,
) -> Result<ApiResponse<CreatedId>> {
    let name = req.rashi_name.trim();
    let result = req.result.trim();
    if name.is_empty() || name.chars().count() > 50 {
        return Err(AppError::Validation("rashi_name must be 1-50 characters".to_string()));
    }
    if result.is_empty() {
        return Err(AppError::Validation("result cannot be empty".to_string()));
    }
    let date = req.result_date.unwrap_or_else(today);
    let id = state.store.create_rashi(name, result, date).await?;
    let new = serde_json::json!({ "rashi_name": name, "result": result, "result_date": date });
    audit(&state.store, &admin.claims, "create", "rashi", Some(id), None, Some(new)).await;
    Ok(ApiResponse::created("Rashi result created", CreatedId { id }))
}

// ---------------------------------------------------------------------------
// Predictions
// ---------------------------------------------------------------------------

async fn list_predictions(
    State(state): State<ApiState>,
    ApiQuery(q): ApiQuery<DateQuery>,
) -> Result<ApiResponse<Vec<PredictionRow>>> {
    let rows = state.store.list_predictions(q.target_date).await?;
    Ok(ApiResponse::ok("Predictions fetched", rows))
}

async fn todays_predictions(State(state): State<ApiState>) -> Result<ApiResponse<Vec<PredictionRow>>> {
    let rows = state.store.list_predictions(Some(today())).await?;
    Ok(ApiResponse::ok("Today's predictions fetched", rows))
}

pub async fn create_prediction(
    State(state): State<ApiState>,
    admin: AdminClaims,
    ApiJson(req): ApiJson<NewPrediction>,
) -> Result<ApiResponse<CreatedId>> {
    let result = validate::result_value(&req.result)?;
    if req.accuracy.is_some_and(|a| !(0..=100).contains(&a)) {
        return Err(AppError::Validation("accuracy must be between 0 and 100".to_string()));
    }
    if state.store.get_market(req.market_id).await?.is_none() {
        return Err(AppError::not_found("Market"));
    }
    let date = req.added_date.unwrap_or_else(today);
    let id = state.store.create_prediction(req.market_id, result, date, req.accuracy).await?;
    let new = serde_json::json!({
        "market_id": req.market_id,
        "result": result,
        "added_date": date,
        "accuracy": req.accuracy,
    });
    audit(&state.store, &admin.claims, "create", "prediction", Some(id), None, Some(new)).await;
    Ok(ApiResponse::created("Prediction created", CreatedId { id }))
}
