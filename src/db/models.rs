//! Row types matching `migrations/0001_init.sql`.
//! Used by sqlx for typed queries and serialized straight into API responses.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MarketRow {
    pub id: i64,
    pub name: String,
    pub open_time: Option<NaiveTime>,
    pub close_time: Option<NaiveTime>,
    pub status: i64,
    pub days: Option<i64>,
}

/// One published result. At most one per `(market_id, result_date)`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ResultRecord {
    pub id: i64,
    pub market_id: i64,
    pub result: String,
    pub result_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub status: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RashiRow {
    pub id: i64,
    pub rashi_name: String,
    pub result: String,
    pub result_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub status: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StarlineRow {
    pub id: i64,
    pub market_id: i64,
    pub number: String,
    pub result_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub status: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PredictionRow {
    pub id: i64,
    pub market_id: i64,
    pub result: String,
    pub added_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub status: i64,
    pub accuracy: Option<i64>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OfferRow {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub valid_from: NaiveDate,
    pub valid_till: NaiveDate,
    pub status: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub mobile: String,
    pub email: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub status: i64,
    pub added_on: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub login_attempts: i64,
    pub account_locked_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AdminRow {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub status: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AuditRow {
    pub id: i64,
    pub actor_id: Option<i64>,
    pub actor_role: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<i64>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Write-side inputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct NewMarket {
    #[serde(alias = "game")]
    pub name: String,
    pub open_time: Option<NaiveTime>,
    pub close_time: Option<NaiveTime>,
    #[serde(default = "default_active")]
    pub status: i64,
    pub days: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewOffer {
    pub title: String,
    pub description: Option<String>,
    pub valid_from: NaiveDate,
    pub valid_till: NaiveDate,
    #[serde(default = "default_active")]
    pub status: i64,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub mobile: String,
    pub email: Option<String>,
    pub password_hash: String,
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub mobile: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub status: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub actor_id: Option<i64>,
    pub actor_role: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<i64>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

fn default_active() -> i64 {
    crate::types::STATUS_ACTIVE
}
