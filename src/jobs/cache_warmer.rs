use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate, Utc};
use tracing::{error, info};

use crate::api::health::HealthState;
use crate::auth::CredentialService;
use crate::config::CACHE_WARM_INTERVAL_SECS;
use crate::db::Store;
use crate::error::Result;
use crate::state::ResultsCache;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarmStats {
    pub markets: usize,
    pub results_today: usize,
    pub evicted_dates: usize,
    pub purged_revocations: usize,
}

/// Background task that refreshes the results cache every hour.
/// Also drops cache dates outside the retention window and expired token revocations.
pub struct CacheWarmer {
    store: Store,
    cache: Arc<ResultsCache>,
    creds: Arc<CredentialService>,
    health: Arc<HealthState>,
}

impl CacheWarmer {
    pub fn new(store: Store, cache: Arc<ResultsCache>, creds: Arc<CredentialService>, health: Arc<HealthState>) -> Self {
        Self { store, cache, creds, health }
    }

    pub async fn run(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(CACHE_WARM_INTERVAL_SECS));

        loop {
            // first tick fires immediately, so the cache is warm right after startup
            interval.tick().await;
            if let Err(e) = self.warm_as_of(Local::now().date_naive()).await {
                error!("Cache warm failed: {e}");
            }
        }
    }

    pub async fn warm_as_of(&self, today: NaiveDate) -> Result<WarmStats> {
        let markets = self.store.list_markets(false).await?;
        let market_count = markets.len();
        self.cache.replace_markets(markets);

        let today_results = self.cache.load(&self.store, today, today).await?;
        let evicted_dates = self.cache.retain_window(today);

        let now = Utc::now().timestamp();
        let purged_revocations = self.creds.purge_expired(now);
        self.health.record_cache_warm(now);

        let stats = WarmStats {
            markets: market_count,
            results_today: today_results.len(),
            evicted_dates,
            purged_revocations,
        };
        info!(
            markets = stats.markets,
            results_today = stats.results_today,
            evicted_dates = stats.evicted_dates,
            purged_revocations = stats.purged_revocations,
            "Cache warm complete",
        );
        Ok(stats)
    }
}
