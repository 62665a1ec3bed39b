//! Daily counts with a trailing rolling baseline
//!
//! For each category and calendar day (UTC) the view reports how many
//! complaints were created, next to the mean daily count over the preceding
//! window. The current day is never part of its own baseline. Spike
//! detection is left to whoever reads the view.

use crate::records::ComplaintRecord;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Default trailing window length in days
pub const DEFAULT_WINDOW_DAYS: u32 = 30;

/// One row of the anomaly view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyCount {
    pub category: String,
    pub day: NaiveDate,
    pub count: u64,
    /// Mean count over days in `[day - window, day - 1]` that had records;
    /// `None` when there are none
    pub rolling_average: Option<f64>,
}

/// Build the view, optionally restricted to one category
pub fn daily_counts(
    records: &[ComplaintRecord],
    window_days: u32,
    category: Option<&str>,
) -> Vec<DailyCount> {
    let mut grouped: BTreeMap<(&str, NaiveDate), u64> = BTreeMap::new();
    for record in records {
        if category.is_some_and(|c| c != record.category) {
            continue;
        }
        *grouped
            .entry((record.category.as_str(), record.created_at.date_naive()))
            .or_insert(0) += 1;
    }

    let window = Duration::days(i64::from(window_days));
    let mut rows = Vec::with_capacity(grouped.len());
    let mut current: Option<&str> = None;
    let mut trailing: VecDeque<(NaiveDate, u64)> = VecDeque::new();
    let mut trailing_sum: u64 = 0;

    for ((cat, day), count) in grouped {
        if current != Some(cat) {
            current = Some(cat);
            trailing.clear();
            trailing_sum = 0;
        }

        while let Some(&(oldest, oldest_count)) = trailing.front() {
            if oldest < day - window {
                trailing.pop_front();
                trailing_sum -= oldest_count;
            } else {
                break;
            }
        }

        let rolling_average =
            (!trailing.is_empty()).then(|| trailing_sum as f64 / trailing.len() as f64);

        rows.push(DailyCount {
            category: cat.to_string(),
            day,
            count,
            rolling_average,
        });

        trailing.push_back((day, count));
        trailing_sum += count;
    }

    rows
}
