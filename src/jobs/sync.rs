use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::api::health::HealthState;
use crate::config::{Config, SYNC_HTTP_TIMEOUT_SECS};
use crate::db::Store;
use crate::error::{AppError, Result};
use crate::state::ResultsCache;
use crate::validate;

/// One entry of the external feed. The market is named by id or by name.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteResult {
    pub market_id: Option<i64>,
    pub market: Option<String>,
    pub result: String,
    pub result_date: NaiveDate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub skipped: bool,
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub rejected: usize,
}

/// Imports results from `EXTERNAL_SYNC_SOURCE` once a day, and on demand.
pub struct ResultSync {
    source: Option<String>,
    hour: u32,
    store: Store,
    cache: Arc<ResultsCache>,
    health: Arc<HealthState>,
    client: reqwest::Client,
    /// Held for the duration of a run; a second caller is turned away.
    running: Mutex<()>,
}

impl ResultSync {
    pub fn new(config: &Config, store: Store, cache: Arc<ResultsCache>, health: Arc<HealthState>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(SYNC_HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            source: config.sync_source.clone(),
            hour: config.sync_hour,
            store,
            cache,
            health,
            client,
            running: Mutex::new(()),
        })
    }

    pub async fn run(self: Arc<Self>) {
        if self.source.is_none() {
            info!("EXTERNAL_SYNC_SOURCE not set; daily result sync disabled");
            return;
        }
        loop {
            let now = Local::now().naive_local();
            let next = next_run_after(now, self.hour);
            let wait = (next - now).to_std().unwrap_or(Duration::from_secs(60));
            debug!(%next, "next result sync scheduled");
            tokio::time::sleep(wait).await;

            match self.sync_now().await {
                Ok(stats) => info!(?stats, "Scheduled result sync complete"),
                Err(e) => error!("Result sync failed: {e}"),
            }
        }
    }

    /// Fetch and apply the feed now. Reports a skipped run when no source is configured.
    pub async fn sync_now(&self) -> Result<SyncStats> {
        let Some(source) = self.source.as_deref() else {
            info!("Result sync skipped: no source configured");
            return Ok(SyncStats { skipped: true, ..Default::default() });
        };
        let Ok(_guard) = self.running.try_lock() else {
            return Err(AppError::BadRequest("Sync already running".to_string()));
        };

        let outcome = async {
            let payload: serde_json::Value = self
                .client
                .get(source)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            let (items, malformed) = parse_payload(payload)?;
            let mut stats = self.apply(items).await?;
            stats.fetched += malformed;
            stats.rejected += malformed;
            Ok::<_, AppError>(stats)
        }
        .await;

        self.health.record_sync(Utc::now().timestamp(), outcome.is_ok());
        if let Ok(stats) = &outcome {
            info!(
                fetched = stats.fetched,
                inserted = stats.inserted,
                updated = stats.updated,
                unchanged = stats.unchanged,
                rejected = stats.rejected,
                "Result sync complete",
            );
        }
        outcome
    }

    /// Upsert feed entries by `(market, date)`. Each written date is invalidated
    /// as soon as its row lands, so an error later in the batch cannot leave a
    /// committed write behind a stale cache entry. An entry that loses a race
    /// with a concurrent publish for the same day is counted as rejected.
    pub async fn apply(&self, items: Vec<RemoteResult>) -> Result<SyncStats> {
        let mut stats = SyncStats { fetched: items.len(), ..Default::default() };

        for item in items {
            let Some(market_id) = self.resolve_market(&item).await? else {
                warn!(market_id = ?item.market_id, market = ?item.market, "sync entry for unknown market");
                stats.rejected += 1;
                continue;
            };
            let Ok(value) = validate::result_value(&item.result) else {
                warn!(market_id, result = %item.result, "sync entry with malformed result");
                stats.rejected += 1;
                continue;
            };

            match self.store.result_for(market_id, item.result_date).await? {
                None => match self.store.create_result(market_id, value, item.result_date).await {
                    Ok(_) => {
                        self.cache.invalidate(item.result_date);
                        stats.inserted += 1;
                    }
                    Err(AppError::BadRequest(reason)) => {
                        warn!(market_id, date = %item.result_date, "sync entry conflicted: {reason}");
                        stats.rejected += 1;
                    }
                    Err(e) => return Err(e),
                },
                Some(existing) if existing.result == value => stats.unchanged += 1,
                Some(existing) => {
                    if self.store.update_result_value(existing.id, value).await? {
                        self.cache.invalidate(item.result_date);
                        stats.updated += 1;
                    } else {
                        warn!(market_id, date = %item.result_date, "sync target removed during update");
                        stats.rejected += 1;
                    }
                }
            }
        }

        Ok(stats)
    }

    async fn resolve_market(&self, item: &RemoteResult) -> Result<Option<i64>> {
        if let Some(id) = item.market_id {
            return Ok(self.store.get_market(id).await?.map(|m| m.id));
        }
        match item.market.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => Ok(self.store.market_by_name(name).await?.map(|m| m.id)),
            _ => Ok(None),
        }
    }
}

/// Split the feed into well-formed entries and a count of entries that did not parse.
pub fn parse_payload(payload: serde_json::Value) -> Result<(Vec<RemoteResult>, usize)> {
    let serde_json::Value::Array(entries) = payload else {
        return Err(AppError::Sync("sync source did not return a JSON array".to_string()));
    };
    let mut items = Vec::with_capacity(entries.len());
    let mut malformed = 0;
    for entry in entries {
        match serde_json::from_value::<RemoteResult>(entry) {
            Ok(item) => items.push(item),
            Err(e) => {
                debug!("skipping malformed sync entry: {e}");
                malformed += 1;
            }
        }
    }
    Ok((items, malformed))
}

/// The first `hour:00` local time strictly after `now`.
pub fn next_run_after(now: NaiveDateTime, hour: u32) -> NaiveDateTime {
    let today = now.date().and_hms_opt(hour, 0, 0).unwrap_or(now);
    if today > now {
        today
    } else {
        today + chrono::Duration::days(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, d).unwrap()
    }

    async fn sync_with(store: Store) -> (ResultSync, Arc<ResultsCache>) {
        let cache = ResultsCache::new();
        let sync = ResultSync::new(&Config::for_tests(), store, cache.clone(), Arc::new(HealthState::new())).unwrap();
        (sync, cache)
    }

    fn item(market_id: Option<i64>, market: Option<&str>, result: &str, date: NaiveDate) -> RemoteResult {
        RemoteResult {
            market_id,
            market: market.map(str::to_string),
            result: result.to_string(),
            result_date: date,
        }
    }

    #[test]
    fn next_run_is_later_today_or_tomorrow() {
        let at = |d: u32, h: u32, m: u32| day(d).and_hms_opt(h, m, 0).unwrap();
        assert_eq!(next_run_after(at(6, 9, 30), 21), at(6, 21, 0));
        assert_eq!(next_run_after(at(6, 21, 0), 21), at(7, 21, 0));
        assert_eq!(next_run_after(at(6, 22, 15), 21), at(7, 21, 0));
    }

    #[test]
    fn payload_must_be_an_array() {
        assert!(matches!(parse_payload(json!({"results": []})), Err(AppError::Sync(_))));

        let (items, malformed) = parse_payload(json!([
            {"market_id": 1, "result": "123-45-678", "result_date": "2025-12-06"},
            {"market": "Kalyan", "result": "111-22-333", "result_date": "2025-12-06"},
            {"market_id": 1, "result": "123-45-678"},
            "nonsense"
        ]))
        .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(malformed, 2);
    }

    #[tokio::test]
    async fn apply_inserts_updates_and_rejects() {
        let store = Store::in_memory().await;
        let kalyan = store.seed_market("Kalyan", true).await;
        let milan = store.seed_market("Milan", true).await;
        store.create_result(kalyan, "123-45-678", day(5)).await.unwrap();
        store.create_result(milan, "111-11-111", day(5)).await.unwrap();
        let (sync, cache) = sync_with(store.clone()).await;
        cache.results_on_as_of(&store, day(5), day(5)).await.unwrap();
        assert_eq!(cache.cached_dates(), 1);

        let stats = sync
            .apply(vec![
                item(Some(kalyan), None, "123-45-678", day(5)),
                item(None, Some("Milan"), "222-22-222", day(5)),
                item(None, Some("Kalyan"), "333-33-333", day(6)),
                item(Some(999), None, "123-45-678", day(6)),
                item(Some(kalyan), None, "abc", day(7)),
            ])
            .await
            .unwrap();

        assert_eq!(
            stats,
            SyncStats { skipped: false, fetched: 5, inserted: 1, updated: 1, unchanged: 1, rejected: 2 }
        );
        assert_eq!(store.result_for(milan, day(5)).await.unwrap().unwrap().result, "222-22-222");
        assert!(store.result_for(kalyan, day(6)).await.unwrap().is_some());
        // Day 5 was touched, so the cached copy is gone.
        assert_eq!(cache.cached_dates(), 0);
    }

    #[tokio::test]
    async fn conflicting_publish_is_rejected_without_aborting_the_batch() {
        let store = Store::in_memory().await;
        let kalyan = store.seed_market("Kalyan", true).await;
        // Another writer publishes day 7 between our lookup and our insert.
        sqlx::query(
            r#"
            CREATE TRIGGER publish_first BEFORE INSERT ON results
            WHEN NEW.result_date = '2025-12-07' AND NEW.result <> '999-99-999'
            BEGIN
                INSERT INTO results (market_id, result, result_date, created_at, status)
                VALUES (NEW.market_id, '999-99-999', NEW.result_date, NEW.created_at, 0);
            END
            "#,
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let (sync, cache) = sync_with(store.clone()).await;
        cache.results_on_as_of(&store, day(6), day(7)).await.unwrap();
        assert!(cache.results_on_as_of(&store, day(6), day(7)).await.unwrap().is_empty());

        let stats = sync
            .apply(vec![
                item(Some(kalyan), None, "123-45-678", day(6)),
                item(Some(kalyan), None, "222-22-222", day(7)),
                item(Some(kalyan), None, "333-33-333", day(5)),
            ])
            .await
            .unwrap();

        assert_eq!(stats, SyncStats { fetched: 3, inserted: 2, rejected: 1, ..Default::default() });
        let day6 = cache.results_on_as_of(&store, day(6), day(7)).await.unwrap();
        assert_eq!(day6.len(), 1);
        assert_eq!(day6[0].result, "123-45-678");
        assert!(store.result_for(kalyan, day(5)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn without_source_the_run_is_skipped() {
        let store = Store::in_memory().await;
        let (sync, _) = sync_with(store).await;
        let stats = sync.sync_now().await.unwrap();
        assert!(stats.skipped);
        assert_eq!(stats.fetched, 0);
    }
}
