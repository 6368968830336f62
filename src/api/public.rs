//! Unauthenticated read-only views for the public site.

use axum::extract::State;
use axum::routing::get;
use axum::Router;

use crate::api::envelope::ApiResponse;
use crate::api::results::DayResults;
use crate::api::routes::{today, ApiQuery, ApiState, DateQuery};
use crate::db::models::{MarketRow, OfferRow, RashiRow};
use crate::error::Result;
use crate::state::LiveResult;

pub fn routes() -> Router<ApiState> {
    Router::new()
        .route("/public/markets", get(markets))
        .route("/public/results", get(results))
        .route("/public/rashi", get(rashi))
        .route("/public/offers", get(offers))
}

async fn markets(State(state): State<ApiState>) -> Result<ApiResponse<Vec<MarketRow>>> {
    let markets = state.store.list_markets(true).await?;
    Ok(ApiResponse::ok("Markets fetched", markets))
}

async fn results(
    State(state): State<ApiState>,
    ApiQuery(q): ApiQuery<DateQuery>,
) -> Result<ApiResponse<DayResults<Vec<LiveResult>>>> {
    let date = q.date_or_today();
    let results = state.cache.results_on(&state.store, date).await?.as_ref().clone();
    Ok(ApiResponse::ok("Results fetched", DayResults { date, count: results.len(), results }))
}

async fn rashi(
    State(state): State<ApiState>,
    ApiQuery(q): ApiQuery<DateQuery>,
) -> Result<ApiResponse<DayResults<Vec<RashiRow>>>> {
    let date = q.date_or_today();
    let results = state.store.list_rashi(Some(date), None, 0).await?;
    Ok(ApiResponse::ok("Rashi fetched", DayResults { date, count: results.len(), results }))
}

/// Active offers valid today.
async fn offers(State(state): State<ApiState>) -> Result<ApiResponse<Vec<OfferRow>>> {
    let offers = state.store.current_offers(today()).await?;
    Ok(ApiResponse::ok("Offers fetched", offers))
}
