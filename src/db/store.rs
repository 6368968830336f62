use std::str::FromStr;

use chrono::{NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::db::models::{MarketRow, NewMarket, ResultRecord};
use crate::error::{AppError, Result};
use crate::types::STATUS_ACTIVE;

/// Record store over SQLite. Cheap to clone; every handler and job gets its own copy.
#[derive(Debug, Clone)]
pub struct Store {
    pub(crate) pool: SqlitePool,
}

/// Open (creating if needed) the database file and bring the schema up to date.
pub async fn connect(db_path: &str) -> Result<Store> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(Store::new(pool))
}

pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Markets
    // -----------------------------------------------------------------------

    pub async fn list_markets(&self, active_only: bool) -> Result<Vec<MarketRow>> {
        let rows = if active_only {
            sqlx::query_as::<_, MarketRow>(
                "SELECT id, name, open_time, close_time, status, days FROM markets WHERE status = ? ORDER BY id",
            )
            .bind(STATUS_ACTIVE)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, MarketRow>(
                "SELECT id, name, open_time, close_time, status, days FROM markets ORDER BY id",
            )
            .fetch_all(&self.pool)
            .await?
        };
        Ok(rows)
    }

    pub async fn get_market(&self, id: i64) -> Result<Option<MarketRow>> {
        let row = sqlx::query_as::<_, MarketRow>(
            "SELECT id, name, open_time, close_time, status, days FROM markets WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn market_by_name(&self, name: &str) -> Result<Option<MarketRow>> {
        let row = sqlx::query_as::<_, MarketRow>(
            "SELECT id, name, open_time, close_time, status, days FROM markets WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Fails with `BadRequest` when the name is taken.
    pub async fn create_market(&self, market: &NewMarket) -> Result<i64> {
        let res = sqlx::query(
            r#"
            INSERT INTO markets (name, open_time, close_time, status, days)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&market.name)
        .bind(market.open_time)
        .bind(market.close_time)
        .bind(market.status)
        .bind(market.days)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::BadRequest("Market already exists".to_string())
            } else {
                e.into()
            }
        })?;
        Ok(res.last_insert_rowid())
    }

    /// Returns false when no market has this id.
    pub async fn update_market(&self, id: i64, market: &NewMarket) -> Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE markets
            SET name = ?, open_time = ?, close_time = ?, status = ?, days = ?
            WHERE id = ?
            "#,
        )
        .bind(&market.name)
        .bind(market.open_time)
        .bind(market.close_time)
        .bind(market.status)
        .bind(market.days)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::BadRequest("Market already exists".to_string())
            } else {
                e.into()
            }
        })?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn delete_market(&self, id: i64) -> Result<bool> {
        let res = sqlx::query("DELETE FROM markets WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn count_active_markets(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM markets WHERE status = ?")
            .bind(STATUS_ACTIVE)
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    // -----------------------------------------------------------------------
    // Results
    // -----------------------------------------------------------------------

    pub async fn results_on(&self, date: NaiveDate) -> Result<Vec<ResultRecord>> {
        let rows = sqlx::query_as::<_, ResultRecord>(
            r#"
            SELECT id, market_id, result, result_date, created_at, status
            FROM results
            WHERE result_date = ?
            ORDER BY market_id
            "#,
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_result(&self, id: i64) -> Result<Option<ResultRecord>> {
        let row = sqlx::query_as::<_, ResultRecord>(
            "SELECT id, market_id, result, result_date, created_at, status FROM results WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn result_for(&self, market_id: i64, date: NaiveDate) -> Result<Option<ResultRecord>> {
        let row = sqlx::query_as::<_, ResultRecord>(
            r#"
            SELECT id, market_id, result, result_date, created_at, status
            FROM results
            WHERE market_id = ? AND result_date = ?
            "#,
        )
        .bind(market_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Latest first.
    pub async fn market_history(&self, market_id: i64, limit: i64, offset: i64) -> Result<Vec<ResultRecord>> {
        let rows = sqlx::query_as::<_, ResultRecord>(
            r#"
            SELECT id, market_id, result, result_date, created_at, status
            FROM results
            WHERE market_id = ?
            ORDER BY result_date DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(market_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Results on or after `start`, oldest first (ties by insertion order).
    pub async fn results_since(&self, market_id: i64, start: NaiveDate) -> Result<Vec<ResultRecord>> {
        let rows = sqlx::query_as::<_, ResultRecord>(
            r#"
            SELECT id, market_id, result, result_date, created_at, status
            FROM results
            WHERE market_id = ? AND result_date >= ?
            ORDER BY result_date ASC, id ASC
            "#,
        )
        .bind(market_id)
        .bind(start)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn count_results_since(&self, market_id: i64, start: NaiveDate) -> Result<i64> {
        let n: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM results WHERE market_id = ? AND result_date >= ?",
        )
        .bind(market_id)
        .bind(start)
        .fetch_one(&self.pool)
        .await?;
        Ok(n)
    }

    pub async fn count_results(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM results")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    /// Fails with `BadRequest` when the market already has a result for that date.
    pub async fn create_result(&self, market_id: i64, result: &str, date: NaiveDate) -> Result<i64> {
        let res = sqlx::query(
            r#"
            INSERT INTO results (market_id, result, result_date, created_at, status)
            VALUES (?, ?, ?, ?, 0)
            "#,
        )
        .bind(market_id)
        .bind(result)
        .bind(date)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::BadRequest("Result already exists for this date".to_string())
            } else {
                e.into()
            }
        })?;
        Ok(res.last_insert_rowid())
    }

    pub async fn update_result_value(&self, id: i64, result: &str) -> Result<bool> {
        let res = sqlx::query("UPDATE results SET result = ? WHERE id = ?")
            .bind(result)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn delete_result(&self, id: i64) -> Result<bool> {
        let res = sqlx::query("DELETE FROM results WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

#[cfg(test)]
impl Store {
    /// Fresh migrated in-memory database. One connection, never recycled, so the
    /// schema and data live as long as the store.
    pub async fn in_memory() -> Store {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(
                SqliteConnectOptions::from_str("sqlite::memory:")
                    .expect("in-memory url")
                    .foreign_keys(true),
            )
            .await
            .expect("open in-memory sqlite");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("run migrations");
        Store::new(pool)
    }

    pub async fn seed_market(&self, name: &str, active: bool) -> i64 {
        let market = NewMarket {
            name: name.to_string(),
            open_time: None,
            close_time: None,
            status: if active { STATUS_ACTIVE } else { crate::types::STATUS_INACTIVE },
            days: None,
        };
        self.create_market(&market).await.expect("seed market")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, d).unwrap()
    }

    #[tokio::test]
    async fn duplicate_market_name_is_rejected() {
        let store = Store::in_memory().await;
        store.seed_market("Kalyan", true).await;

        let dup = NewMarket {
            name: "Kalyan".to_string(),
            open_time: None,
            close_time: None,
            status: STATUS_ACTIVE,
            days: None,
        };
        let err = store.create_market(&dup).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn one_result_per_market_and_date() {
        let store = Store::in_memory().await;
        let m = store.seed_market("Kalyan", true).await;

        store.create_result(m, "123-45-678", day(6)).await.unwrap();
        let err = store.create_result(m, "111-22-333", day(6)).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)), "got {err:?}");

        // Different date is fine.
        store.create_result(m, "111-22-333", day(7)).await.unwrap();
        assert_eq!(store.count_results().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn results_since_is_inclusive_and_oldest_first() {
        let store = Store::in_memory().await;
        let m = store.seed_market("Kalyan", true).await;
        store.create_result(m, "333-33-333", day(9)).await.unwrap();
        store.create_result(m, "111-11-111", day(5)).await.unwrap();
        store.create_result(m, "222-22-222", day(7)).await.unwrap();

        let rows = store.results_since(m, day(7)).await.unwrap();
        let dates: Vec<_> = rows.iter().map(|r| r.result_date).collect();
        assert_eq!(dates, vec![day(7), day(9)]);
        assert_eq!(store.count_results_since(m, day(7)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn deleting_market_cascades_results() {
        let store = Store::in_memory().await;
        let m = store.seed_market("Kalyan", true).await;
        store.create_result(m, "123-45-678", day(6)).await.unwrap();

        assert!(store.delete_market(m).await.unwrap());
        assert_eq!(store.count_results().await.unwrap(), 0);
        assert!(!store.delete_market(m).await.unwrap());
    }

    #[tokio::test]
    async fn active_filter_excludes_inactive_markets() {
        let store = Store::in_memory().await;
        store.seed_market("Kalyan", true).await;
        store.seed_market("Closed", false).await;

        assert_eq!(store.list_markets(true).await.unwrap().len(), 1);
        assert_eq!(store.list_markets(false).await.unwrap().len(), 2);
        assert_eq!(store.count_active_markets().await.unwrap(), 1);
    }
}
