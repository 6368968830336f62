use std::sync::Arc;

use axum::extract::{FromRef, FromRequest, FromRequestParts};
use axum::http::{HeaderValue, Method};
use axum::{middleware, Router};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::analysis::Analyzer;
use crate::api::health::HealthState;
use crate::api::latency::{track_latency, LatencyStats};
use crate::api::{account, admin, analysis, content, markets, public, results, session, system};
use crate::auth::{Claims, CredentialService};
use crate::config::Config;
use crate::db::models::AuditEntry;
use crate::db::Store;
use crate::error::{AppError, Result};
use crate::jobs::ResultSync;
use crate::state::ResultsCache;

#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<Config>,
    pub store: Store,
    pub analyzer: Arc<Analyzer<Store>>,
    pub creds: Arc<CredentialService>,
    pub cache: Arc<ResultsCache>,
    pub health: Arc<HealthState>,
    pub latency: Arc<LatencyStats>,
    pub sync: Arc<ResultSync>,
}

impl ApiState {
    /// Wire the shared services around an open store.
    pub fn new(config: Config, store: Store) -> Result<Self> {
        let cache = ResultsCache::new();
        let health = Arc::new(HealthState::new());
        let sync = ResultSync::new(&config, store.clone(), cache.clone(), health.clone())?;
        Ok(Self {
            creds: Arc::new(CredentialService::from_config(&config)),
            analyzer: Arc::new(Analyzer::new(store.clone())),
            latency: Arc::new(LatencyStats::new()),
            sync: Arc::new(sync),
            config: Arc::new(config),
            store,
            cache,
            health,
        })
    }
}

impl FromRef<ApiState> for Arc<CredentialService> {
    fn from_ref(state: &ApiState) -> Self {
        state.creds.clone()
    }
}

pub fn router(state: ApiState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    Router::new()
        .merge(system::routes())
        .merge(session::routes())
        .merge(markets::routes())
        .merge(results::routes())
        .merge(analysis::routes())
        .merge(content::routes())
        .merge(public::routes())
        .merge(account::routes())
        .merge(admin::routes())
        .layer(middleware::from_fn_with_state(state.clone(), track_latency))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring unparsable CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(parsed)
}

// ---------------------------------------------------------------------------
// Extractors with envelope-shaped rejections
// ---------------------------------------------------------------------------

/// `axum::Json` whose rejection renders as a 400 envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// `axum::extract::Query` whose rejection renders as a 400 envelope.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct DateQuery {
    pub target_date: Option<NaiveDate>,
}

impl DateQuery {
    pub fn date_or_today(&self) -> NaiveDate {
        self.target_date.unwrap_or_else(today)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PeriodQuery {
    pub period_days: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageQuery {
    /// `(limit, offset)`, rejecting a limit outside `1..=max` or a negative offset.
    pub fn resolve(&self, default_limit: i64, max_limit: i64) -> Result<(i64, i64)> {
        let limit = self.limit.unwrap_or(default_limit);
        if !(1..=max_limit).contains(&limit) {
            return Err(AppError::Validation(format!("limit must be between 1 and {max_limit}")));
        }
        let offset = self.offset.unwrap_or(0);
        if offset < 0 {
            return Err(AppError::Validation("offset must not be negative".to_string()));
        }
        Ok((limit, offset))
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

#[derive(Debug, Serialize)]
pub struct CreatedId {
    pub id: i64,
}

/// Serialize a row for the audit trail.
pub fn snapshot<T: Serialize>(value: &T) -> Option<serde_json::Value> {
    serde_json::to_value(value).ok()
}

/// Append an audit row for an admin mutation. A failed write is logged, not surfaced:
/// the mutation itself already happened.
pub async fn audit(
    store: &Store,
    actor: &Claims,
    action: &str,
    entity_type: &str,
    entity_id: Option<i64>,
    old_value: Option<serde_json::Value>,
    new_value: Option<serde_json::Value>,
) {
    let encode = |v: Option<serde_json::Value>| v.map(|v| v.to_string());
    let entry = AuditEntry {
        actor_id: Some(actor.sub),
        actor_role: actor.role.to_string(),
        action: action.to_string(),
        entity_type: entity_type.to_string(),
        entity_id,
        old_value: encode(old_value),
        new_value: encode(new_value),
    };
    if let Err(e) = store.record_audit(&entry).await {
        warn!(action, entity_type, ?entity_id, "audit write failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_bounds() {
        let q = PageQuery::default();
        assert_eq!(q.resolve(30, 100).unwrap(), (30, 0));

        let q = PageQuery { limit: Some(101), offset: None };
        assert!(matches!(q.resolve(30, 100), Err(AppError::Validation(_))));

        let q = PageQuery { limit: Some(0), offset: None };
        assert!(q.resolve(30, 100).is_err());

        let q = PageQuery { limit: Some(10), offset: Some(-1) };
        assert!(q.resolve(30, 100).is_err());
    }
}
