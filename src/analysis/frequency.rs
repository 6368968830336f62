use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::Serialize;

use crate::db::models::ResultRecord;
use crate::types::ResultParts;

/// One distinct value and how often it occurred in the window.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyItem {
    pub value: String,
    pub count: usize,
    pub percentage: f64,
}

/// Output of [`tally`]: the denominator plus items sorted by count, highest first.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrequencyTable {
    pub total: usize,
    pub items: Vec<FrequencyItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DayCount {
    pub date: NaiveDate,
    pub count: usize,
}

/// Count occurrences of each distinct value.
///
/// `total` is the number of observations, not the number of distinct values.
/// Items are ordered by count descending; equal counts keep the order in which
/// the value was first seen.
pub fn tally<'a, I>(values: I) -> FrequencyTable
where
    I: IntoIterator<Item = &'a str>,
{
    let mut index: HashMap<&'a str, usize> = HashMap::new();
    let mut counts: Vec<(&'a str, usize)> = Vec::new();
    let mut total = 0usize;

    for value in values {
        total += 1;
        match index.get(value) {
            Some(&slot) => counts[slot].1 += 1,
            None => {
                index.insert(value, counts.len());
                counts.push((value, 1));
            }
        }
    }

    // sort_by is stable, so first-seen order survives among equal counts
    counts.sort_by(|a, b| b.1.cmp(&a.1));

    let items = counts
        .into_iter()
        .map(|(value, count)| FrequencyItem {
            value: value.to_string(),
            count,
            percentage: percentage(count, total),
        })
        .collect();

    FrequencyTable { total, items }
}

fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

/// Jodi of every record that has one; records without a second segment are skipped.
pub fn jodi_table(records: &[ResultRecord]) -> FrequencyTable {
    tally(records.iter().filter_map(|r| ResultParts::parse(&r.result).jodi()))
}

/// Open and close panels pooled into one table; each record adds 0, 1 or 2 observations.
pub fn panel_table(records: &[ResultRecord]) -> FrequencyTable {
    tally(records.iter().flat_map(|r| ResultParts::parse(&r.result).panels()))
}

/// Observations per calendar day, oldest first. Days without observations are absent.
pub fn daily_counts<I>(dates: I) -> Vec<DayCount>
where
    I: IntoIterator<Item = NaiveDate>,
{
    let mut by_day: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for date in dates {
        *by_day.entry(date).or_default() += 1;
    }
    by_day
        .into_iter()
        .map(|(date, count)| DayCount { date, count })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(id: i64, result: &str, date: NaiveDate) -> ResultRecord {
        ResultRecord {
            id,
            market_id: 1,
            result: result.to_string(),
            result_date: date,
            created_at: Utc::now(),
            status: 0,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, d).unwrap()
    }

    fn assert_table_invariants(table: &FrequencyTable) {
        let sum: usize = table.items.iter().map(|i| i.count).sum();
        assert_eq!(sum, table.total);
        assert!(table.items.windows(2).all(|w| w[0].count >= w[1].count));
        if table.total > 0 {
            let pct: f64 = table.items.iter().map(|i| i.percentage).sum();
            assert!((pct - 100.0).abs() < 1e-9, "percentages sum to {pct}");
        } else {
            assert!(table.items.iter().all(|i| i.percentage == 0.0));
        }
    }

    #[test]
    fn same_jodi_on_two_days_is_one_item() {
        let records = vec![record(1, "123-45-678", day(6)), record(2, "111-45-999", day(7))];
        let table = jodi_table(&records);

        assert_eq!(table.total, 2);
        assert_eq!(
            table.items,
            vec![FrequencyItem { value: "45".to_string(), count: 2, percentage: 100.0 }]
        );
        assert_table_invariants(&table);
    }

    #[test]
    fn open_and_close_panels_share_one_table() {
        let records = vec![record(1, "123-45-678", day(6)), record(2, "111-45-999", day(7))];
        let table = panel_table(&records);

        assert_eq!(table.total, 4);
        let values: Vec<_> = table.items.iter().map(|i| i.value.as_str()).collect();
        assert_eq!(values, vec!["123", "678", "111", "999"]);
        assert!(table.items.iter().all(|i| i.count == 1 && i.percentage == 25.0));
        assert_table_invariants(&table);
    }

    #[test]
    fn short_results_do_not_count_towards_jodi_total() {
        let records = vec![record(1, "12", day(6)), record(2, "123-45-678", day(7))];
        let table = jodi_table(&records);

        assert_eq!(table.total, 1);
        assert!(table.items.iter().all(|i| i.value != "12"));
        assert_table_invariants(&table);
    }

    #[test]
    fn malformed_panels_are_skipped_individually() {
        // open panel too long, close panel fine
        let records = vec![record(1, "1234-56-789", day(6)), record(2, "", day(7))];
        let table = panel_table(&records);

        assert_eq!(table.total, 1);
        assert_eq!(table.items[0].value, "789");
        assert_table_invariants(&table);
    }

    #[test]
    fn ties_keep_first_seen_order() {
        let table = tally(["30", "10", "20", "10", "30", "20"]);
        let values: Vec<_> = table.items.iter().map(|i| i.value.as_str()).collect();
        assert_eq!(values, vec!["30", "10", "20"]);

        let table = tally(["5", "9", "9", "5", "1", "1", "1"]);
        let values: Vec<_> = table.items.iter().map(|i| i.value.as_str()).collect();
        assert_eq!(values, vec!["1", "5", "9"]);
        assert_table_invariants(&table);
    }

    #[test]
    fn empty_input_is_an_empty_table() {
        let table = tally(std::iter::empty());
        assert_eq!(table, FrequencyTable::default());
        assert_table_invariants(&table);
    }

    #[test]
    fn percentages_hold_for_uneven_splits() {
        let table = tally(["a", "b", "b", "c", "c", "c"]);
        assert_eq!(table.items[0].value, "c");
        assert!((table.items[0].percentage - 50.0).abs() < 1e-9);
        assert_table_invariants(&table);
    }

    #[test]
    fn daily_counts_skip_empty_days_and_sort() {
        let counts = daily_counts([day(9), day(6), day(9), day(6), day(9)]);
        assert_eq!(
            counts,
            vec![DayCount { date: day(6), count: 2 }, DayCount { date: day(9), count: 3 }]
        );
        assert!(counts.iter().all(|c| c.count > 0));
        assert_eq!(counts.iter().map(|c| c.count).sum::<usize>(), 5);
    }
}
