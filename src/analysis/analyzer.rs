use async_trait::async_trait;
use chrono::{Duration, Local, NaiveDate};
use serde::ser::{SerializeSeq, SerializeStruct, Serializer};
use serde::Serialize;

use crate::analysis::frequency::{daily_counts, jodi_table, panel_table, DayCount, FrequencyItem};
use crate::config::{DEFAULT_PERIOD_DAYS, MAX_PERIOD_DAYS, MIN_PERIOD_DAYS};
use crate::db::models::ResultRecord;
use crate::db::Store;
use crate::error::{AppError, Result};

/// Market existence and naming, as seen by the analyzer.
#[async_trait]
pub trait MarketLookup: Send + Sync {
    async fn exists(&self, market_id: i64) -> Result<bool>;
    async fn name(&self, market_id: i64) -> Result<Option<String>>;
}

/// Read-only access to historical results.
#[async_trait]
pub trait ResultSource: Send + Sync {
    /// Results with `result_date >= start`, ordered by date then insertion.
    async fn records_since(&self, market_id: i64, start: NaiveDate) -> Result<Vec<ResultRecord>>;

    /// Active markets as `(id, name)`, ordered by id.
    async fn active_markets(&self) -> Result<Vec<(i64, String)>>;

    async fn count_since(&self, market_id: i64, start: NaiveDate) -> Result<usize> {
        Ok(self.records_since(market_id, start).await?.len())
    }
}

/// Which segment a frequency report counts. Decides the JSON key names:
/// `jodi_analysis: [{jodi, ..}]` or `panel_analysis: [{panel, ..}]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrequencyKind {
    Jodi,
    Panel,
}

impl FrequencyKind {
    fn list_key(self) -> &'static str {
        match self {
            FrequencyKind::Jodi => "jodi_analysis",
            FrequencyKind::Panel => "panel_analysis",
        }
    }

    fn value_key(self) -> &'static str {
        match self {
            FrequencyKind::Jodi => "jodi",
            FrequencyKind::Panel => "panel",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyReport {
    pub kind: FrequencyKind,
    pub market_id: i64,
    pub period_days: i64,
    pub total_results: usize,
    pub items: Vec<FrequencyItem>,
}

impl Serialize for FrequencyReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut report = serializer.serialize_struct("FrequencyReport", 4)?;
        report.serialize_field("market_id", &self.market_id)?;
        report.serialize_field("period_days", &self.period_days)?;
        report.serialize_field("total_results", &self.total_results)?;
        report.serialize_field(self.kind.list_key(), &KeyedItems(self.kind, &self.items))?;
        report.end()
    }
}

/// Items rendered with the kind's value key in place of `value`.
struct KeyedItems<'a>(FrequencyKind, &'a [FrequencyItem]);

impl Serialize for KeyedItems<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.1.len()))?;
        for item in self.1 {
            seq.serialize_element(&KeyedItem(self.0, item))?;
        }
        seq.end()
    }
}

struct KeyedItem<'a>(FrequencyKind, &'a FrequencyItem);

impl Serialize for KeyedItem<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut item = serializer.serialize_struct("FrequencyItem", 3)?;
        item.serialize_field(self.0.value_key(), &self.1.value)?;
        item.serialize_field("count", &self.1.count)?;
        item.serialize_field("percentage", &self.1.percentage)?;
        item.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendReport {
    pub market_id: i64,
    pub period_days: i64,
    pub days: Vec<DayCount>,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketCount {
    pub market_id: i64,
    pub market_name: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonReport {
    pub period_days: i64,
    pub markets: Vec<MarketCount>,
}

/// Resolve the optional `period_days` query parameter.
pub fn validate_period_days(period_days: Option<i64>) -> Result<i64> {
    let period = period_days.unwrap_or(DEFAULT_PERIOD_DAYS);
    if !(MIN_PERIOD_DAYS..=MAX_PERIOD_DAYS).contains(&period) {
        return Err(AppError::Validation(format!(
            "period_days must be between {MIN_PERIOD_DAYS} and {MAX_PERIOD_DAYS}"
        )));
    }
    Ok(period)
}

/// First day inside a lookback window ending today.
pub fn window_start(today: NaiveDate, period_days: i64) -> NaiveDate {
    today - Duration::days(period_days)
}

/// Stateless frequency analysis over a result source. Every call reads fresh
/// records; nothing is cached between calls.
#[derive(Debug, Clone)]
pub struct Analyzer<S> {
    source: S,
}

impl<S> Analyzer<S>
where
    S: MarketLookup + ResultSource,
{
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub async fn jodi_frequency(&self, market_id: i64, period_days: i64) -> Result<FrequencyReport> {
        self.jodi_frequency_as_of(today(), market_id, period_days).await
    }

    pub async fn panel_frequency(&self, market_id: i64, period_days: i64) -> Result<FrequencyReport> {
        self.panel_frequency_as_of(today(), market_id, period_days).await
    }

    pub async fn market_trend(&self, market_id: i64, period_days: i64) -> Result<TrendReport> {
        self.market_trend_as_of(today(), market_id, period_days).await
    }

    pub async fn compare_markets(&self, period_days: i64) -> Result<ComparisonReport> {
        self.compare_markets_as_of(today(), period_days).await
    }

    pub async fn jodi_frequency_as_of(
        &self,
        today: NaiveDate,
        market_id: i64,
        period_days: i64,
    ) -> Result<FrequencyReport> {
        let records = self.window(today, market_id, period_days).await?;
        let table = jodi_table(&records);
        Ok(FrequencyReport {
            kind: FrequencyKind::Jodi,
            market_id,
            period_days,
            total_results: table.total,
            items: table.items,
        })
    }

    pub async fn panel_frequency_as_of(
        &self,
        today: NaiveDate,
        market_id: i64,
        period_days: i64,
    ) -> Result<FrequencyReport> {
        let records = self.window(today, market_id, period_days).await?;
        let table = panel_table(&records);
        Ok(FrequencyReport {
            kind: FrequencyKind::Panel,
            market_id,
            period_days,
            total_results: table.total,
            items: table.items,
        })
    }

    pub async fn market_trend_as_of(
        &self,
        today: NaiveDate,
        market_id: i64,
        period_days: i64,
    ) -> Result<TrendReport> {
        let records = self.window(today, market_id, period_days).await?;
        Ok(TrendReport {
            market_id,
            period_days,
            days: daily_counts(records.iter().map(|r| r.result_date)),
            total: records.len(),
        })
    }

    /// Result counts per active market, highest first. Markets are visited in id
    /// order and the sort is stable, so equal counts stay in ascending id order.
    pub async fn compare_markets_as_of(&self, today: NaiveDate, period_days: i64) -> Result<ComparisonReport> {
        let start = window_start(today, period_days);
        let mut markets = Vec::new();
        for (market_id, market_name) in self.source.active_markets().await? {
            let count = self.source.count_since(market_id, start).await?;
            markets.push(MarketCount { market_id, market_name, count });
        }
        markets.sort_by(|a, b| b.count.cmp(&a.count));
        Ok(ComparisonReport { period_days, markets })
    }

    async fn window(&self, today: NaiveDate, market_id: i64, period_days: i64) -> Result<Vec<ResultRecord>> {
        if !self.source.exists(market_id).await? {
            return Err(AppError::not_found("Market"));
        }
        self.source.records_since(market_id, window_start(today, period_days)).await
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

// ---------------------------------------------------------------------------
// SQLite-backed collaborators
// ---------------------------------------------------------------------------

#[async_trait]
impl MarketLookup for Store {
    async fn exists(&self, market_id: i64) -> Result<bool> {
        Ok(self.get_market(market_id).await?.is_some())
    }

    async fn name(&self, market_id: i64) -> Result<Option<String>> {
        Ok(self.get_market(market_id).await?.map(|m| m.name))
    }
}

#[async_trait]
impl ResultSource for Store {
    async fn records_since(&self, market_id: i64, start: NaiveDate) -> Result<Vec<ResultRecord>> {
        self.results_since(market_id, start).await
    }

    async fn active_markets(&self) -> Result<Vec<(i64, String)>> {
        Ok(self
            .list_markets(true)
            .await?
            .into_iter()
            .map(|m| (m.id, m.name))
            .collect())
    }

    async fn count_since(&self, market_id: i64, start: NaiveDate) -> Result<usize> {
        let n = self.count_results_since(market_id, start).await?;
        Ok(usize::try_from(n).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    /// In-memory markets and results; `active` marks which markets count as active.
    #[derive(Default)]
    struct FakeSource {
        markets: BTreeMap<i64, (String, bool)>,
        results: Vec<ResultRecord>,
    }

    impl FakeSource {
        fn market(mut self, id: i64, name: &str, active: bool) -> Self {
            self.markets.insert(id, (name.to_string(), active));
            self
        }

        fn result(mut self, market_id: i64, result: &str, date: NaiveDate) -> Self {
            let id = self.results.len() as i64 + 1;
            self.results.push(ResultRecord {
                id,
                market_id,
                result: result.to_string(),
                result_date: date,
                created_at: Utc::now(),
                status: 0,
            });
            self
        }
    }

    #[async_trait]
    impl MarketLookup for FakeSource {
        async fn exists(&self, market_id: i64) -> Result<bool> {
            Ok(self.markets.contains_key(&market_id))
        }

        async fn name(&self, market_id: i64) -> Result<Option<String>> {
            Ok(self.markets.get(&market_id).map(|(n, _)| n.clone()))
        }
    }

    #[async_trait]
    impl ResultSource for FakeSource {
        async fn records_since(&self, market_id: i64, start: NaiveDate) -> Result<Vec<ResultRecord>> {
            let mut rows: Vec<_> = self
                .results
                .iter()
                .filter(|r| r.market_id == market_id && r.result_date >= start)
                .cloned()
                .collect();
            rows.sort_by_key(|r| (r.result_date, r.id));
            Ok(rows)
        }

        async fn active_markets(&self) -> Result<Vec<(i64, String)>> {
            Ok(self
                .markets
                .iter()
                .filter(|(_, (_, active))| *active)
                .map(|(id, (name, _))| (*id, name.clone()))
                .collect())
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, 10).unwrap()
    }

    fn days_ago(n: i64) -> NaiveDate {
        today() - Duration::days(n)
    }

    #[test]
    fn period_days_bounds() {
        assert_eq!(validate_period_days(None).unwrap(), 30);
        assert_eq!(validate_period_days(Some(1)).unwrap(), 1);
        assert_eq!(validate_period_days(Some(365)).unwrap(), 365);
        for bad in [0, -5, 366] {
            let err = validate_period_days(Some(bad)).unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "period {bad} gave {err:?}");
        }
    }

    #[tokio::test]
    async fn jodi_frequency_over_two_days() {
        let source = FakeSource::default()
            .market(1, "Kalyan", true)
            .result(1, "123-45-678", days_ago(2))
            .result(1, "111-45-999", days_ago(1));
        let analyzer = Analyzer::new(source);

        let report = analyzer.jodi_frequency_as_of(today(), 1, 30).await.unwrap();
        assert_eq!(report.market_id, 1);
        assert_eq!(report.period_days, 30);
        assert_eq!(report.total_results, 2);
        assert_eq!(
            report.items,
            vec![FrequencyItem { value: "45".to_string(), count: 2, percentage: 100.0 }]
        );
    }

    #[tokio::test]
    async fn panel_frequency_over_two_days() {
        let source = FakeSource::default()
            .market(1, "Kalyan", true)
            .result(1, "123-45-678", days_ago(2))
            .result(1, "111-45-999", days_ago(1));
        let analyzer = Analyzer::new(source);

        let report = analyzer.panel_frequency_as_of(today(), 1, 30).await.unwrap();
        assert_eq!(report.total_results, 4);
        let values: Vec<_> = report.items.iter().map(|i| i.value.as_str()).collect();
        assert_eq!(values, vec!["123", "678", "111", "999"]);
        assert!(report.items.iter().all(|i| i.count == 1 && i.percentage == 25.0));
    }

    #[tokio::test]
    async fn reports_serialize_with_segment_keys() {
        let source = FakeSource::default()
            .market(1, "Kalyan", true)
            .result(1, "123-45-678", days_ago(1));
        let analyzer = Analyzer::new(source);

        let jodi = serde_json::to_value(analyzer.jodi_frequency_as_of(today(), 1, 30).await.unwrap()).unwrap();
        assert_eq!(
            jodi,
            serde_json::json!({
                "market_id": 1,
                "period_days": 30,
                "total_results": 1,
                "jodi_analysis": [{"jodi": "45", "count": 1, "percentage": 100.0}],
            })
        );

        let panel = serde_json::to_value(analyzer.panel_frequency_as_of(today(), 1, 30).await.unwrap()).unwrap();
        assert_eq!(panel["panel_analysis"][0]["panel"], "123");
        assert_eq!(panel["panel_analysis"][1]["panel"], "678");
        assert!(panel.get("items").is_none());
        assert!(panel.get("jodi_analysis").is_none());
    }

    #[tokio::test]
    async fn unknown_market_is_not_found() {
        let analyzer = Analyzer::new(FakeSource::default().market(1, "Kalyan", true));

        let err = analyzer.jodi_frequency_as_of(today(), 99, 30).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)), "got {err:?}");
        let err = analyzer.panel_frequency_as_of(today(), 99, 30).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        let err = analyzer.market_trend_as_of(today(), 99, 30).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn empty_window_is_zero_not_error() {
        let source = FakeSource::default()
            .market(1, "Kalyan", true)
            .result(1, "123-45-678", days_ago(40));
        let analyzer = Analyzer::new(source);

        let report = analyzer.jodi_frequency_as_of(today(), 1, 30).await.unwrap();
        assert_eq!(report.total_results, 0);
        assert!(report.items.is_empty());

        let trend = analyzer.market_trend_as_of(today(), 1, 30).await.unwrap();
        assert_eq!(trend.total, 0);
        assert!(trend.days.is_empty());
    }

    #[tokio::test]
    async fn window_lower_bound_is_inclusive() {
        let source = FakeSource::default()
            .market(1, "Kalyan", true)
            .result(1, "123-45-678", days_ago(7))
            .result(1, "123-46-678", days_ago(8));
        let analyzer = Analyzer::new(source);

        let report = analyzer.jodi_frequency_as_of(today(), 1, 7).await.unwrap();
        assert_eq!(report.total_results, 1);
        assert_eq!(report.items[0].value, "45");
    }

    #[tokio::test]
    async fn trend_buckets_by_day() {
        let source = FakeSource::default()
            .market(1, "Kalyan", true)
            .result(1, "123-45-678", days_ago(1))
            .result(1, "123-45-678", days_ago(5))
            .result(1, "12", days_ago(3));
        let analyzer = Analyzer::new(source);

        let trend = analyzer.market_trend_as_of(today(), 1, 30).await.unwrap();
        let dates: Vec<_> = trend.days.iter().map(|d| d.date).collect();
        assert_eq!(dates, vec![days_ago(5), days_ago(3), days_ago(1)]);
        assert_eq!(trend.total, 3);
        assert_eq!(trend.days.iter().map(|d| d.count).sum::<usize>(), trend.total);
    }

    #[tokio::test]
    async fn comparison_ranks_active_markets_only() {
        let source = FakeSource::default()
            .market(1, "Alpha", true)
            .market(2, "Beta", true)
            .market(3, "Gamma", true)
            .market(4, "Closed", false)
            .result(2, "123-45-678", days_ago(1))
            .result(2, "123-45-678", days_ago(2))
            .result(3, "123-45-678", days_ago(1))
            .result(1, "123-45-678", days_ago(1))
            .result(4, "123-45-678", days_ago(1))
            .result(4, "123-45-678", days_ago(2))
            .result(4, "123-45-678", days_ago(3));
        let analyzer = Analyzer::new(source);

        let report = analyzer.compare_markets_as_of(today(), 30).await.unwrap();
        let ranked: Vec<_> = report
            .markets
            .iter()
            .map(|m| (m.market_id, m.market_name.as_str(), m.count))
            .collect();
        // Alpha and Gamma tie; ascending id breaks the tie.
        assert_eq!(ranked, vec![(2, "Beta", 2), (1, "Alpha", 1), (3, "Gamma", 1)]);
    }

    #[tokio::test]
    async fn store_backed_analyzer_matches_fake() {
        let store = Store::in_memory().await;
        let m = store.seed_market("Kalyan", true).await;
        let today = Local::now().date_naive();
        store.create_result(m, "123-45-678", today - Duration::days(1)).await.unwrap();
        store.create_result(m, "111-45-999", today).await.unwrap();
        store.create_result(m, "12", today - Duration::days(2)).await.unwrap();

        let analyzer = Analyzer::new(store.clone());
        let jodi = analyzer.jodi_frequency(m, 30).await.unwrap();
        assert_eq!(jodi.total_results, 2);
        assert_eq!(jodi.items.len(), 1);

        let comparison = analyzer.compare_markets(30).await.unwrap();
        assert_eq!(comparison.markets[0].count, 3);
        assert_eq!(store.name(m).await.unwrap().as_deref(), Some("Kalyan"));
    }
}
