use axum::extract::State;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::envelope::ApiResponse;
use crate::api::routes::{ApiJson, ApiState};
use crate::auth::login::{login_admin, login_user, LoginOutcome};
use crate::auth::{TokenPair, UserClaims};
use crate::error::Result;

pub fn routes() -> Router<ApiState> {
    Router::new()
        .route("/auth/login/user", post(user_login))
        .route("/auth/login/admin", post(admin_login))
        .route("/auth/tokens/refresh", post(refresh))
        .route("/auth/tokens/verify", get(verify))
        .route("/auth/logout", post(logout))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

async fn user_login(
    State(state): State<ApiState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<ApiResponse<LoginOutcome>> {
    let outcome = login_user(&state.store, &state.creds, req.username.trim(), &req.password).await?;
    Ok(ApiResponse::ok("Login successful", outcome))
}

async fn admin_login(
    State(state): State<ApiState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<ApiResponse<LoginOutcome>> {
    let outcome = login_admin(&state.store, &state.creds, req.username.trim(), &req.password).await?;
    Ok(ApiResponse::ok("Login successful", outcome))
}

async fn refresh(
    State(state): State<ApiState>,
    ApiJson(req): ApiJson<RefreshRequest>,
) -> Result<ApiResponse<TokenPair>> {
    let pair = state.creds.refresh(&req.refresh_token)?;
    Ok(ApiResponse::ok("Token refreshed", pair))
}

async fn verify(caller: UserClaims) -> ApiResponse<Value> {
    let c = caller.claims;
    ApiResponse::ok(
        "Token valid",
        json!({ "sub": c.sub, "username": c.username, "role": c.role, "exp": c.exp }),
    )
}

async fn logout(State(state): State<ApiState>, caller: UserClaims) -> ApiResponse<Value> {
    state.creds.revoke(&caller.token, caller.claims.exp);
    ApiResponse::ok("Logged out", json!({ "message": "Logged out successfully" }))
}
