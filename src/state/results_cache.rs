use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Duration, Local, NaiveDate};
use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

use crate::config::CACHE_RETENTION_DAYS;
use crate::db::models::MarketRow;
use crate::db::Store;
use crate::error::Result;

/// A published result joined with its market's name, as served by `/results/live`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveResult {
    pub id: i64,
    pub market_id: i64,
    pub market_name: Option<String>,
    pub result: String,
    pub result_date: NaiveDate,
}

// ---------------------------------------------------------------------------
// ResultsCache
// ---------------------------------------------------------------------------

/// Read-through cache of results by date plus market names.
///
/// Only dates in `[today - CACHE_RETENTION_DAYS, today]` are kept; any other
/// date is read straight from the store. Entries are replaced wholesale:
/// writers call [`ResultsCache::invalidate`] for the affected date and the next
/// read reloads it.
pub struct ResultsCache {
    /// result_date → results on that date, ordered by market id
    by_date: DashMap<NaiveDate, Arc<Vec<LiveResult>>>,
    /// market_id → market, for name lookups
    markets: DashMap<i64, MarketRow>,
    /// Bumped by every invalidation. A load that read the store under an older
    /// value returns its rows but does not install them.
    generation: AtomicU64,
}

impl ResultsCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { by_date: DashMap::new(), markets: DashMap::new(), generation: AtomicU64::new(0) })
    }

    /// Cached results for `date`, loading them from the store on a miss.
    pub async fn results_on(&self, store: &Store, date: NaiveDate) -> Result<Arc<Vec<LiveResult>>> {
        self.results_on_as_of(store, date, Local::now().date_naive()).await
    }

    pub async fn results_on_as_of(
        &self,
        store: &Store,
        date: NaiveDate,
        today: NaiveDate,
    ) -> Result<Arc<Vec<LiveResult>>> {
        if let Some(hit) = self.by_date.get(&date) {
            return Ok(hit.clone());
        }
        self.load(store, date, today).await
    }

    /// Reload `date` from the store, caching it when it falls inside the window.
    pub async fn load(&self, store: &Store, date: NaiveDate, today: NaiveDate) -> Result<Arc<Vec<LiveResult>>> {
        let seen = self.generation.load(Ordering::SeqCst);
        let live = self.fetch(store, date).await?;
        if in_window(date, today) && self.install(date, live.clone(), seen) {
            debug!(%date, results = live.len(), "results cache loaded");
        }
        Ok(live)
    }

    async fn fetch(&self, store: &Store, date: NaiveDate) -> Result<Arc<Vec<LiveResult>>> {
        let rows = store.results_on(date).await?;
        if rows.iter().any(|r| !self.markets.contains_key(&r.market_id)) {
            self.replace_markets(store.list_markets(false).await?);
        }
        let live: Vec<LiveResult> = rows
            .into_iter()
            .map(|r| LiveResult {
                id: r.id,
                market_id: r.market_id,
                market_name: self.market_name(r.market_id),
                result: r.result,
                result_date: r.result_date,
            })
            .collect();
        Ok(Arc::new(live))
    }

    /// Store `live` unless an invalidation happened since `seen` was read.
    /// The generation is checked while holding the entry's shard lock, so an
    /// invalidation either fails the check or removes the entry afterwards.
    fn install(&self, date: NaiveDate, live: Arc<Vec<LiveResult>>, seen: u64) -> bool {
        let entry = self.by_date.entry(date);
        if self.generation.load(Ordering::SeqCst) != seen {
            return false;
        }
        entry.insert(live);
        true
    }

    pub fn invalidate(&self, date: NaiveDate) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.by_date.remove(&date);
    }

    /// Drop market names too, e.g. after a market is renamed or removed.
    pub fn invalidate_markets(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.markets.clear();
        self.by_date.clear();
    }

    pub fn replace_markets(&self, markets: Vec<MarketRow>) {
        self.markets.clear();
        for m in markets {
            self.markets.insert(m.id, m);
        }
    }

    pub fn market_name(&self, market_id: i64) -> Option<String> {
        self.markets.get(&market_id).map(|m| m.name.clone())
    }

    /// Remove every date outside the retention window ending at `today`,
    /// future dates included. Returns how many dates were dropped.
    pub fn retain_window(&self, today: NaiveDate) -> usize {
        let before = self.by_date.len();
        self.by_date.retain(|date, _| in_window(*date, today));
        before - self.by_date.len()
    }

    pub fn cached_dates(&self) -> usize {
        self.by_date.len()
    }
}

fn in_window(date: NaiveDate, today: NaiveDate) -> bool {
    date <= today && date >= today - Duration::days(CACHE_RETENTION_DAYS)
}
