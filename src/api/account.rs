//! Endpoints for a signed-in caller's own account.

use axum::extract::State;
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};

use crate::api::envelope::ApiResponse;
use crate::api::routes::{today, ApiState};
use crate::auth::UserClaims;
use crate::error::{AppError, Result};
use crate::types::Role;

pub fn routes() -> Router<ApiState> {
    Router::new()
        .route("/user/profile", get(profile))
        .route("/user/dashboard", get(dashboard))
}

async fn profile(State(state): State<ApiState>, caller: UserClaims) -> Result<ApiResponse<Value>> {
    let c = &caller.claims;
    let profile = match c.role {
        Role::User => {
            let user = state.store.user_by_id(c.sub).await?.ok_or_else(|| AppError::not_found("User"))?;
            json!({
                "id": user.id,
                "username": user.username,
                "mobile": user.mobile,
                "email": user.email,
                "status": user.status,
                "added_on": user.added_on,
                "last_login": user.last_login,
                "role": Role::User,
            })
        }
        Role::Admin => json!({ "id": c.sub, "username": c.username, "role": Role::Admin }),
    };
    Ok(ApiResponse::ok("Profile fetched", profile))
}

async fn dashboard(State(state): State<ApiState>, caller: UserClaims) -> Result<ApiResponse<Value>> {
    let date = today();
    let active_markets = state.store.count_active_markets().await?;
    let todays_results = state.cache.results_on(&state.store, date).await?.len();
    Ok(ApiResponse::ok(
        "Dashboard fetched",
        json!({
            "username": caller.claims.username,
            "date": date,
            "active_markets": active_markets,
            "todays_results": todays_results,
        }),
    ))
}
