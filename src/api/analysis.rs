use axum::extract::{Path, State};
use axum::routing::get;
use axum::Router;

use crate::analysis::analyzer::{ComparisonReport, FrequencyReport, TrendReport};
use crate::analysis::validate_period_days;
use crate::api::envelope::ApiResponse;
use crate::api::routes::{ApiQuery, ApiState, PeriodQuery};
use crate::error::Result;

pub fn routes() -> Router<ApiState> {
    Router::new()
        .route("/analysis/jodi/:market_id", get(jodi))
        .route("/analysis/panel/:market_id", get(panel))
        .route("/analysis/trends/:market_id", get(trends))
        .route("/analysis/comparison", get(comparison))
}

async fn jodi(
    State(state): State<ApiState>,
    Path(market_id): Path<i64>,
    ApiQuery(q): ApiQuery<PeriodQuery>,
) -> Result<ApiResponse<FrequencyReport>> {
    let period = validate_period_days(q.period_days)?;
    let report = state.analyzer.jodi_frequency(market_id, period).await?;
    Ok(ApiResponse::ok("Jodi frequency analysis", report))
}

async fn panel(
    State(state): State<ApiState>,
    Path(market_id): Path<i64>,
    ApiQuery(q): ApiQuery<PeriodQuery>,
) -> Result<ApiResponse<FrequencyReport>> {
    let period = validate_period_days(q.period_days)?;
    let report = state.analyzer.panel_frequency(market_id, period).await?;
    Ok(ApiResponse::ok("Panel frequency analysis", report))
}

async fn trends(
    State(state): State<ApiState>,
    Path(market_id): Path<i64>,
    ApiQuery(q): ApiQuery<PeriodQuery>,
) -> Result<ApiResponse<TrendReport>> {
    let period = validate_period_days(q.period_days)?;
    let report = state.analyzer.market_trend(market_id, period).await?;
    Ok(ApiResponse::ok("Market trend analysis", report))
}

async fn comparison(
    State(state): State<ApiState>,
    ApiQuery(q): ApiQuery<PeriodQuery>,
) -> Result<ApiResponse<ComparisonReport>> {
    let period = validate_period_days(q.period_days)?;
    let report = state.analyzer.compare_markets(period).await?;
    Ok(ApiResponse::ok("Market comparison", report))
}
