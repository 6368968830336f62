use chrono::{NaiveDate, Utc};
use sqlx::{QueryBuilder, Sqlite};

use crate::db::models::{NewOffer, OfferRow, PredictionRow, RashiRow, StarlineRow};
use crate::db::store::Store;
use crate::error::Result;
use crate::types::STATUS_ACTIVE;

const RASHI_COLUMNS: &str = "SELECT id, rashi_name, result, result_date, created_at, status FROM rashi";
const STARLINE_COLUMNS: &str = "SELECT id, market_id, number, result_date, created_at, status FROM starline";
const PREDICTION_COLUMNS: &str =
    "SELECT id, market_id, result, added_date, created_at, status, accuracy FROM predictions";
const OFFER_COLUMNS: &str = "SELECT id, title, description, valid_from, valid_till, status FROM offers";

/// Optional filters for the admin starline listing.
#[derive(Debug, Clone, Copy, Default)]
pub struct StarlineFilter {
    pub market_id: Option<i64>,
    pub date: Option<NaiveDate>,
}

impl StarlineFilter {
    fn push_where(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        qb.push(" WHERE 1 = 1");
        if let Some(market_id) = self.market_id {
            qb.push(" AND market_id = ").push_bind(market_id);
        }
        if let Some(date) = self.date {
            qb.push(" AND result_date = ").push_bind(date);
        }
    }
}

impl Store {
    // -----------------------------------------------------------------------
    // Rashi
    // -----------------------------------------------------------------------

    /// Newest first. `date` narrows to a single day.
    pub async fn list_rashi(&self, date: Option<NaiveDate>, limit: Option<i64>, offset: i64) -> Result<Vec<RashiRow>> {
        let mut qb = QueryBuilder::<Sqlite>::new(RASHI_COLUMNS);
        if let Some(date) = date {
            qb.push(" WHERE result_date = ").push_bind(date);
        }
        qb.push(" ORDER BY result_date DESC, id DESC");
        push_page(&mut qb, limit, offset);
        let rows = qb.build_query_as::<RashiRow>().fetch_all(&self.pool).await?;
        Ok(rows)
    }

    pub async fn count_rashi(&self, date: Option<NaiveDate>) -> Result<i64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM rashi");
        if let Some(date) = date {
            qb.push(" WHERE result_date = ").push_bind(date);
        }
        let n: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(n)
    }

    pub async fn rashi_by_name(&self, rashi_name: &str) -> Result<Vec<RashiRow>> {
        let rows = sqlx::query_as::<_, RashiRow>(&format!(
            "{RASHI_COLUMNS} WHERE rashi_name = ? ORDER BY result_date DESC, id DESC"
        ))
        .bind(rashi_name)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn create_rashi(&self, rashi_name: &str, result: &str, date: NaiveDate) -> Result<i64> {
        let res = sqlx::query(
            r#"
            INSERT INTO rashi (rashi_name, result, result_date, created_at, status)
            VALUES (?, ?, ?, ?, 0)
            "#,
        )
        .bind(rashi_name)
        .bind(result)
        .bind(date)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(res.last_insert_rowid())
    }

    // -----------------------------------------------------------------------
    // Starline
    // -----------------------------------------------------------------------

    pub async fn list_starline(&self, filter: StarlineFilter, limit: Option<i64>, offset: i64) -> Result<Vec<StarlineRow>> {
        let mut qb = QueryBuilder::<Sqlite>::new(STARLINE_COLUMNS);
        filter.push_where(&mut qb);
        qb.push(" ORDER BY result_date DESC, id DESC");
        push_page(&mut qb, limit, offset);
        let rows = qb.build_query_as::<StarlineRow>().fetch_all(&self.pool).await?;
        Ok(rows)
    }

    pub async fn count_starline(&self, filter: StarlineFilter) -> Result<i64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM starline");
        filter.push_where(&mut qb);
        let n: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(n)
    }

    /// Across all markets, oldest first.
    pub async fn starline_since(&self, start: NaiveDate) -> Result<Vec<StarlineRow>> {
        let rows = sqlx::query_as::<_, StarlineRow>(&format!(
            "{STARLINE_COLUMNS} WHERE result_date >= ? ORDER BY result_date ASC, id ASC"
        ))
        .bind(start)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn create_starline(&self, market_id: i64, number: &str, date: NaiveDate) -> Result<i64> {
        let res = sqlx::query(
            r#"
            INSERT INTO starline (market_id, number, result_date, created_at, status)
            VALUES (?, ?, ?, ?, 0)
            "#,
        )
        .bind(market_id)
        .bind(number)
        .bind(date)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(res.last_insert_rowid())
    }

    // -----------------------------------------------------------------------
    // Free predictions
    // -----------------------------------------------------------------------

    pub async fn list_predictions(&self, date: Option<NaiveDate>) -> Result<Vec<PredictionRow>> {
        let mut qb = QueryBuilder::<Sqlite>::new(PREDICTION_COLUMNS);
        if let Some(date) = date {
            qb.push(" WHERE added_date = ").push_bind(date);
        }
        qb.push(" ORDER BY added_date DESC, id DESC");
        let rows = qb.build_query_as::<PredictionRow>().fetch_all(&self.pool).await?;
        Ok(rows)
    }

    pub async fn create_prediction(
        &self,
        market_id: i64,
        result: &str,
        added_date: NaiveDate,
        accuracy: Option<i64>,
    ) -> Result<i64> {
        let res = sqlx::query(
            r#"
            INSERT INTO predictions (market_id, result, added_date, created_at, status, accuracy)
            VALUES (?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(market_id)
        .bind(result)
        .bind(added_date)
        .bind(Utc::now())
        .bind(accuracy)
        .execute(&self.pool)
        .await?;
        Ok(res.last_insert_rowid())
    }

    // -----------------------------------------------------------------------
    // Offers
    // -----------------------------------------------------------------------

    /// Active offers whose validity range covers `today` (both ends inclusive).
    pub async fn current_offers(&self, today: NaiveDate) -> Result<Vec<OfferRow>> {
        let rows = sqlx::query_as::<_, OfferRow>(&format!(
            "{OFFER_COLUMNS} WHERE status = ? AND valid_from <= ? AND valid_till >= ? ORDER BY valid_till, id"
        ))
        .bind(STATUS_ACTIVE)
        .bind(today)
        .bind(today)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn list_offers(&self) -> Result<Vec<OfferRow>> {
        let rows = sqlx::query_as::<_, OfferRow>(&format!("{OFFER_COLUMNS} ORDER BY id DESC"))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn create_offer(&self, offer: &NewOffer) -> Result<i64> {
        let res = sqlx::query(
            r#"
            INSERT INTO offers (title, description, valid_from, valid_till, status)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&offer.title)
        .bind(&offer.description)
        .bind(offer.valid_from)
        .bind(offer.valid_till)
        .bind(offer.status)
        .execute(&self.pool)
        .await?;
        Ok(res.last_insert_rowid())
    }

    pub async fn delete_offer(&self, id: i64) -> Result<bool> {
        let res = sqlx::query("DELETE FROM offers WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

/// SQLite needs a LIMIT before OFFSET; -1 means unbounded.
pub(crate) fn push_page(qb: &mut QueryBuilder<'_, Sqlite>, limit: Option<i64>, offset: i64) {
    qb.push(" LIMIT ").push_bind(limit.unwrap_or(-1));
    qb.push(" OFFSET ").push_bind(offset);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, d).unwrap()
    }

    #[tokio::test]
    async fn rashi_filter_and_paging() {
        let store = Store::in_memory().await;
        store.create_rashi("Aries", "Lucky", day(5)).await.unwrap();
        store.create_rashi("Taurus", "Calm", day(6)).await.unwrap();
        store.create_rashi("Aries", "Bold", day(6)).await.unwrap();

        assert_eq!(store.count_rashi(None).await.unwrap(), 3);
        assert_eq!(store.count_rashi(Some(day(6))).await.unwrap(), 2);

        let page = store.list_rashi(None, Some(2), 0).await.unwrap();
        assert_eq!(page.len(), 2);
        assert!(page.iter().all(|r| r.result_date == day(6)));

        let aries = store.rashi_by_name("Aries").await.unwrap();
        assert_eq!(aries.len(), 2);
        assert_eq!(aries[0].result, "Bold");
    }

    #[tokio::test]
    async fn starline_filters_combine() {
        let store = Store::in_memory().await;
        let a = store.seed_market("A", true).await;
        let b = store.seed_market("B", true).await;
        store.create_starline(a, "12", day(5)).await.unwrap();
        store.create_starline(a, "34", day(6)).await.unwrap();
        store.create_starline(b, "56", day(6)).await.unwrap();

        let only_a = StarlineFilter { market_id: Some(a), date: None };
        assert_eq!(store.count_starline(only_a).await.unwrap(), 2);

        let a_on_6 = StarlineFilter { market_id: Some(a), date: Some(day(6)) };
        let rows = store.list_starline(a_on_6, None, 0).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].number, "34");

        assert_eq!(store.starline_since(day(6)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn current_offers_respect_validity_and_status() {
        let store = Store::in_memory().await;
        let offer = |title: &str, from: u32, till: u32, status: i64| NewOffer {
            title: title.to_string(),
            description: None,
            valid_from: day(from),
            valid_till: day(till),
            status,
        };
        store.create_offer(&offer("running", 1, 10, 1)).await.unwrap();
        store.create_offer(&offer("ends today", 1, 6, 1)).await.unwrap();
        store.create_offer(&offer("expired", 1, 5, 1)).await.unwrap();
        store.create_offer(&offer("disabled", 1, 10, 0)).await.unwrap();

        let titles: Vec<_> = store
            .current_offers(day(6))
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.title)
            .collect();
        assert_eq!(titles, vec!["ends today", "running"]);
    }
}
