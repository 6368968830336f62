use axum::extract::{Path, State};
use axum::routing::{delete, get, post, put};
use axum::Router;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::api::content::{create_prediction, create_rashi, ListQuery};
use crate::api::envelope::{ApiResponse, Page};
use crate::api::routes::{audit, snapshot, today, ApiJson, ApiQuery, ApiState, CreatedId, PageQuery};
use crate::auth::AdminClaims;
use crate::config::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
use crate::db::content::StarlineFilter;
use crate::db::models::{AuditRow, MarketRow, NewOffer, NewUser, OfferRow, RashiRow, StarlineRow, UserChanges, UserRow};
use crate::error::{AppError, Result};
use crate::jobs::SyncStats;
use crate::types::{STATUS_ACTIVE, STATUS_INACTIVE};
use crate::validate;

pub fn routes() -> Router<ApiState> {
    Router::new()
        .route("/admin/dashboard", get(dashboard))
        .route("/admin/users", get(list_users).post(create_user))
        .route("/admin/users/:id", put(update_user).delete(delete_user))
        .route("/admin/users/:id/activate", post(activate_user))
        .route("/admin/users/:id/deactivate", post(deactivate_user))
        .route("/admin/markets", get(list_markets))
        .route("/admin/rashi", get(list_rashi).post(create_rashi))
        .route("/admin/starline", get(list_starline))
        .route("/admin/predictions", post(create_prediction))
        .route("/admin/offers", get(list_offers).post(create_offer))
        .route("/admin/offers/:id", delete(delete_offer))
        .route("/admin/sync", post(sync))
        .route("/admin/logs", get(logs))
}

#[derive(Deserialize)]
pub struct NewUserRequest {
    pub username: String,
    pub mobile: String,
    pub email: Option<String>,
    pub password: String,
}

#[derive(Deserialize)]
pub struct UserUpdateRequest {
    pub mobile: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub status: Option<i64>,
}

#[derive(Deserialize)]
pub struct StarlineQuery {
    pub market_id: Option<i64>,
    pub target_date: Option<NaiveDate>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Deserialize)]
pub struct LogsQuery {
    pub actor_id: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn admin_page(limit: Option<i64>, offset: Option<i64>) -> Result<(i64, i64)> {
    PageQuery { limit, offset }.resolve(DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT)
}

async fn dashboard(State(state): State<ApiState>, _admin: AdminClaims) -> Result<ApiResponse<Value>> {
    let date = today();
    let health = state.health.snapshot();
    Ok(ApiResponse::ok(
        "Dashboard fetched",
        json!({
            "date": date,
            "total_users": state.store.count_users(false).await?,
            "active_users": state.store.count_users(true).await?,
            "active_markets": state.store.count_active_markets().await?,
            "total_results": state.store.count_results().await?,
            "todays_results": state.store.results_on(date).await?.len(),
            "last_sync_at": health.last_sync_at,
            "last_sync_ok": health.last_sync_ok,
        }),
    ))
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

async fn list_users(
    State(state): State<ApiState>,
    _admin: AdminClaims,
    ApiQuery(page): ApiQuery<PageQuery>,
) -> Result<ApiResponse<Page<UserRow>>> {
    let (limit, offset) = page.resolve(DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT)?;
    let items = state.store.list_users(limit, offset).await?;
    let total = state.store.count_users(false).await?;
    Ok(ApiResponse::ok("Users fetched", Page { items, total, limit, offset }))
}

async fn create_user(
    State(state): State<ApiState>,
    admin: AdminClaims,
    ApiJson(req): ApiJson<NewUserRequest>,
) -> Result<ApiResponse<CreatedId>> {
    let username = validate::username(&req.username)?.to_string();
    let mobile = validate::mobile(&req.mobile)?.to_string();
    let email = match req.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
        Some(e) => Some(validate::email(e)?.to_string()),
        None => None,
    };
    validate::password(&req.password)?;

    let password_hash = state.creds.hash_password(&req.password).await?;
    let user = NewUser { username, mobile, email, password_hash };
    let id = state.store.create_user(&user).await?;
    let created = state.store.user_by_id(id).await?;
    audit(&state.store, &admin.claims, "create", "user", Some(id), None, created.as_ref().and_then(snapshot)).await;
    info!(user_id = id, username = %user.username, "user created");
    Ok(ApiResponse::created("User created", CreatedId { id }))
}

async fn update_user(
    State(state): State<ApiState>,
    admin: AdminClaims,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<UserUpdateRequest>,
) -> Result<ApiResponse<UserRow>> {
    let mut changes = UserChanges::default();
    if let Some(mobile) = &req.mobile {
        changes.mobile = Some(validate::mobile(mobile)?.to_string());
    }
    if let Some(email) = &req.email {
        changes.email = Some(validate::email(email)?.to_string());
    }
    if let Some(password) = &req.password {
        validate::password(password)?;
        changes.password_hash = Some(state.creds.hash_password(password).await?);
    }
    if let Some(status) = req.status {
        if status != STATUS_ACTIVE && status != STATUS_INACTIVE {
            return Err(AppError::Validation("status must be 0 or 1".to_string()));
        }
        changes.status = Some(status);
    }

    let old = state.store.user_by_id(id).await?.ok_or_else(|| AppError::not_found("User"))?;
    state.store.update_user(id, &changes).await?;
    let updated = state.store.user_by_id(id).await?.ok_or_else(|| AppError::not_found("User"))?;
    audit(&state.store, &admin.claims, "update", "user", Some(id), snapshot(&old), snapshot(&updated)).await;
    Ok(ApiResponse::ok("User updated", updated))
}

async fn delete_user(
    State(state): State<ApiState>,
    admin: AdminClaims,
    Path(id): Path<i64>,
) -> Result<ApiResponse<CreatedId>> {
    let old = state.store.user_by_id(id).await?.ok_or_else(|| AppError::not_found("User"))?;
    state.store.delete_user(id).await?;
    audit(&state.store, &admin.claims, "delete", "user", Some(id), snapshot(&old), None).await;
    Ok(ApiResponse::ok("User deleted", CreatedId { id }))
}

async fn activate_user(
    State(state): State<ApiState>,
    admin: AdminClaims,
    Path(id): Path<i64>,
) -> Result<ApiResponse<CreatedId>> {
    set_status(&state, &admin, id, STATUS_ACTIVE).await?;
    Ok(ApiResponse::ok("User activated", CreatedId { id }))
}

async fn deactivate_user(
    State(state): State<ApiState>,
    admin: AdminClaims,
    Path(id): Path<i64>,
) -> Result<ApiResponse<CreatedId>> {
    set_status(&state, &admin, id, STATUS_INACTIVE).await?;
    Ok(ApiResponse::ok("User deactivated", CreatedId { id }))
}

async fn set_status(state: &ApiState, admin: &AdminClaims, id: i64, status: i64) -> Result<()> {
    let old = state.store.user_by_id(id).await?.ok_or_else(|| AppError::not_found("User"))?;
    state.store.set_user_status(id, status).await?;
    let action = if status == STATUS_ACTIVE { "activate" } else { "deactivate" };
    audit(
        &state.store,
        &admin.claims,
        action,
        "user",
        Some(id),
        Some(json!({ "status": old.status })),
        Some(json!({ "status": status })),
    )
    .await;
    Ok(())
}

// ---------------------------------------------------------------------------
// Markets, rashi, starline
// ---------------------------------------------------------------------------

/// Every market, inactive ones included, paged in id order.
async fn list_markets(
    State(state): State<ApiState>,
    _admin: AdminClaims,
    ApiQuery(q): ApiQuery<PageQuery>,
) -> Result<ApiResponse<Page<MarketRow>>> {
    let (limit, offset) = admin_page(q.limit, q.offset)?;
    let all = state.store.list_markets(false).await?;
    let total = all.len() as i64;
    let items = all.into_iter().skip(offset as usize).take(limit as usize).collect();
    Ok(ApiResponse::ok("Markets fetched", Page { items, total, limit, offset }))
}

async fn list_rashi(
    State(state): State<ApiState>,
    _admin: AdminClaims,
    ApiQuery(q): ApiQuery<ListQuery>,
) -> Result<ApiResponse<Page<RashiRow>>> {
    let (limit, offset) = admin_page(q.limit, q.offset)?;
    let items = state.store.list_rashi(q.target_date, Some(limit), offset).await?;
    let total = state.store.count_rashi(q.target_date).await?;
    Ok(ApiResponse::ok("Rashi results fetched", Page { items, total, limit, offset }))
}

async fn list_starline(
    State(state): State<ApiState>,
    _admin: AdminClaims,
    ApiQuery(q): ApiQuery<StarlineQuery>,
) -> Result<ApiResponse<Page<StarlineRow>>> {
    let (limit, offset) = admin_page(q.limit, q.offset)?;
    let filter = StarlineFilter { market_id: q.market_id, date: q.target_date };
    let items = state.store.list_starline(filter, Some(limit), offset).await?;
    let total = state.store.count_starline(filter).await?;
    Ok(ApiResponse::ok("Starline results fetched", Page { items, total, limit, offset }))
}

// ---------------------------------------------------------------------------
// Offers
// ---------------------------------------------------------------------------

async fn list_offers(State(state): State<ApiState>, _admin: AdminClaims) -> Result<ApiResponse<Vec<OfferRow>>> {
    let offers = state.store.list_offers().await?;
    Ok(ApiResponse::ok("Offers fetched", offers))
}

async fn create_offer(
    State(state): State<ApiState>,
    admin: AdminClaims,
    ApiJson(mut offer): ApiJson<NewOffer>,
) -> Result<ApiResponse<CreatedId>> {
    offer.title = offer.title.trim().to_string();
    if offer.title.is_empty() || offer.title.chars().count() > 200 {
        return Err(AppError::Validation("title must be 1-200 characters".to_string()));
    }
    if offer.valid_till < offer.valid_from {
        return Err(AppError::Validation("valid_till must not be before valid_from".to_string()));
    }
    if offer.status != STATUS_ACTIVE && offer.status != STATUS_INACTIVE {
        return Err(AppError::Validation("status must be 0 or 1".to_string()));
    }
    let id = state.store.create_offer(&offer).await?;
    let new = json!({
        "title": offer.title,
        "valid_from": offer.valid_from,
        "valid_till": offer.valid_till,
        "status": offer.status,
    });
    audit(&state.store, &admin.claims, "create", "offer", Some(id), None, Some(new)).await;
    Ok(ApiResponse::created("Offer created", CreatedId { id }))
}

async fn delete_offer(
    State(state): State<ApiState>,
    admin: AdminClaims,
    Path(id): Path<i64>,
) -> Result<ApiResponse<CreatedId>> {
    if !state.store.delete_offer(id).await? {
        return Err(AppError::not_found("Offer"));
    }
    audit(&state.store, &admin.claims, "delete", "offer", Some(id), None, None).await;
    Ok(ApiResponse::ok("Offer deleted", CreatedId { id }))
}

// ---------------------------------------------------------------------------
// Sync and audit log
// ---------------------------------------------------------------------------

async fn sync(State(state): State<ApiState>, admin: AdminClaims) -> Result<ApiResponse<SyncStats>> {
    let stats = state.sync.sync_now().await?;
    audit(&state.store, &admin.claims, "sync", "results", None, None, snapshot(&stats)).await;
    let message = if stats.skipped { "Sync skipped: no source configured" } else { "Sync complete" };
    Ok(ApiResponse::ok(message, stats))
}

/// Newest first.
async fn logs(
    State(state): State<ApiState>,
    _admin: AdminClaims,
    ApiQuery(q): ApiQuery<LogsQuery>,
) -> Result<ApiResponse<Page<AuditRow>>> {
    let (limit, offset) = admin_page(q.limit, q.offset)?;
    let items = state.store.list_audit(q.actor_id, limit, offset).await?;
    let total = state.store.count_audit(q.actor_id).await?;
    Ok(ApiResponse::ok("Audit log fetched", Page { items, total, limit, offset }))
}
