//! Lag and rolling-window features over daily max AQI.
//!
//! Each location's series is handled independently: rows are sorted by
//! `(location_id, date)` and every location's run is walked on its own, so
//! no lag or window ever reaches across a location boundary.
//!
//! Features for row `t` of a location's series:
//! - `lag1..lag3`: max AQI at `t-1..t-3`
//! - `roll3`, `roll7`: mean of the last 3 / 7 values, `t` inclusive
//! - `target` (training only): max AQI at `t+1`
//!
//! A row is usable once `roll7` is defined (7 values), which also covers the
//! lags. Training rows additionally need a next day, so a location with `N`
//! days yields `max(0, N - 7)` training rows.

use std::collections::{BTreeMap, VecDeque};

use chrono::NaiveDate;

use crate::model::DailyAggregate;

pub const SHORT_WINDOW: usize = 3;
pub const LONG_WINDOW: usize = 7;

/// Number of model inputs per row.
pub const FEATURE_COUNT: usize = 5;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = ["lag1", "lag2", "lag3", "roll3", "roll7"];

/// Engineered inputs for one (location, day).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LagFeatures {
    pub lag1: f64,
    pub lag2: f64,
    pub lag3: f64,
    pub roll3: f64,
    pub roll7: f64,
}

impl LagFeatures {
    /// Values in `FEATURE_NAMES` order.
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [self.lag1, self.lag2, self.lag3, self.roll3, self.roll7]
    }
}

/// One supervised example: features for `date`, target from the next row.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingRow {
    pub location_id: i32,
    pub date: NaiveDate,
    pub max_aqi: f64,
    pub features: LagFeatures,
    pub target: f64,
}

// ---------------------------------------------------------------------------
// Sliding window
// ---------------------------------------------------------------------------

/// Fixed-size trailing mean with a running sum.
#[derive(Debug, Clone)]
struct RollingMean {
    size: usize,
    values: VecDeque<f64>,
    sum: f64,
}

impl RollingMean {
    fn new(size: usize) -> Self {
        RollingMean {
            size,
            values: VecDeque::with_capacity(size),
            sum: 0.0,
        }
    }

    fn push(&mut self, value: f64) {
        self.values.push_back(value);
        self.sum += value;
        if self.values.len() > self.size {
            if let Some(oldest) = self.values.pop_front() {
                self.sum -= oldest;
            }
        }
    }

    /// `None` until the window is full.
    fn mean(&self) -> Option<f64> {
        (self.values.len() == self.size).then(|| self.sum / self.size as f64)
    }
}

// ---------------------------------------------------------------------------
// Per-series computation
// ---------------------------------------------------------------------------

/// Features for every position of one location's ascending series.
/// Entry `i` is `None` while the history before `i` is too short.
fn series_features(series: &[f64]) -> Vec<Option<LagFeatures>> {
    let mut short = RollingMean::new(SHORT_WINDOW);
    let mut long = RollingMean::new(LONG_WINDOW);

    series
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            short.push(value);
            long.push(value);
            let lag = |k: usize| i.checked_sub(k).map(|j| series[j]);
            Some(LagFeatures {
                lag1: lag(1)?,
                lag2: lag(2)?,
                lag3: lag(3)?,
                roll3: short.mean()?,
                roll7: long.mean()?,
            })
        })
        .collect()
}

/// Sorted copy, grouped into one slice per location.
fn sorted_by_location(rows: &[DailyAggregate]) -> Vec<DailyAggregate> {
    let mut sorted = rows.to_vec();
    sorted.sort_by_key(|r| (r.location_id, r.date));
    sorted
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Builds the supervised training table. Rows lacking any feature or the
/// next-day target are dropped; empty input gives an empty table.
pub fn build_training_table(rows: &[DailyAggregate]) -> Vec<TrainingRow> {
    let sorted = sorted_by_location(rows);
    let mut table = Vec::new();

    for group in sorted.chunk_by(|a, b| a.location_id == b.location_id) {
        let series: Vec<f64> = group.iter().map(|r| r.max_aqi as f64).collect();
        let features = series_features(&series);

        for (i, row) in group.iter().enumerate() {
            let (Some(features), Some(&target)) = (features[i], series.get(i + 1)) else {
                continue;
            };
            table.push(TrainingRow {
                location_id: row.location_id,
                date: row.date,
                max_aqi: series[i],
                features,
                target,
            });
        }
    }

    table
}

/// Features of each location's most recent day, for inference.
///
/// Returns the features keyed by location, and for locations whose history
/// is too short, the number of rows that were available.
pub fn latest_features(
    history: &[DailyAggregate],
) -> (BTreeMap<i32, LagFeatures>, BTreeMap<i32, usize>) {
    let sorted = sorted_by_location(history);
    let mut ready = BTreeMap::new();
    let mut short = BTreeMap::new();

    for group in sorted.chunk_by(|a, b| a.location_id == b.location_id) {
        let location_id = group[0].location_id;
        let series: Vec<f64> = group.iter().map(|r| r.max_aqi as f64).collect();
        match series_features(&series).last().copied().flatten() {
            Some(features) => {
                ready.insert(location_id, features);
            }
            None => {
                short.insert(location_id, series.len());
            }
        }
    }

    (ready, short)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap() + chrono::Days::new(n as u64)
    }

    fn series(location_id: i32, values: &[i32]) -> Vec<DailyAggregate> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| DailyAggregate {
                location_id,
                date: day(i as u32),
                max_aqi: v,
                mean_aqi: v as f64,
                min_aqi: v,
            })
            .collect()
    }

    #[test]
    fn test_empty_input_gives_empty_table() {
        assert!(build_training_table(&[]).is_empty());
    }

    #[test]
    fn test_row_count_is_n_minus_seven() {
        for n in 0..15 {
            let values: Vec<i32> = (0..n).map(|v| v * 3).collect();
            let table = build_training_table(&series(1, &values));
            let expected = (n as usize).saturating_sub(7);
            assert_eq!(table.len(), expected, "n = {}", n);
        }
    }

    #[test]
    fn test_location_with_seven_days_yields_nothing() {
        let table = build_training_table(&series(1, &[1, 2, 3, 4, 5, 6, 7]));
        assert!(table.is_empty());
    }

    #[test]
    fn test_first_usable_row_is_the_seventh_day() {
        let values = [10, 20, 30, 40, 50, 60, 70, 80];
        let table = build_training_table(&series(1, &values));
        assert_eq!(table.len(), 1);

        let row = &table[0];
        assert_eq!(row.date, day(6));
        assert_eq!(row.max_aqi, 70.0);
        assert_eq!(row.features.lag1, 60.0);
        assert_eq!(row.features.lag2, 50.0);
        assert_eq!(row.features.lag3, 40.0);
        assert_eq!(row.features.roll3, 60.0);
        assert_eq!(row.features.roll7, 40.0);
        assert_eq!(row.target, 80.0);
    }

    #[test]
    fn test_windows_slide_forward() {
        let values = [1, 1, 1, 1, 1, 1, 1, 8, 15];
        let table = build_training_table(&series(1, &values));
        assert_eq!(table.len(), 2);
        // Second row: window of 7 ends at value 8.
        let row = &table[1];
        assert_eq!(row.features.roll3, (1.0 + 1.0 + 8.0) / 3.0);
        assert_eq!(row.features.roll7, (6.0 + 8.0) / 7.0);
        assert_eq!(row.target, 15.0);
    }

    #[test]
    fn test_locations_do_not_leak_into_each_other() {
        let mut rows = series(1, &[5; 8]);
        rows.extend(series(2, &[100, 100, 100]));
        let table = build_training_table(&rows);
        assert_eq!(table.len(), 1);
        assert!(table.iter().all(|r| r.location_id == 1));
        assert_eq!(table[0].features.roll7, 5.0);
    }

    #[test]
    fn test_unsorted_input_is_grouped_per_location() {
        let mut rows = series(2, &[2; 9]);
        rows.extend(series(1, &[1; 9]));
        rows.reverse();
        let table = build_training_table(&rows);
        assert_eq!(table.len(), 4);
        assert_eq!(table[0].location_id, 1);
        assert!(table[..2].iter().all(|r| r.target == 1.0));
        assert!(table[2..].iter().all(|r| r.target == 2.0));
    }

    #[test]
    fn test_latest_features_use_the_last_day() {
        let mut rows = series(1, &[10, 20, 30, 40, 50, 60, 70, 80]);
        rows.extend(series(2, &[1, 2]));
        let (ready, short) = latest_features(&rows);

        let f = ready.get(&1).expect("location 1 has enough history");
        assert_eq!(f.lag1, 70.0);
        assert_eq!(f.roll3, 70.0);
        assert_eq!(f.roll7, 50.0);
        assert_eq!(short.get(&2), Some(&2));
    }

    #[test]
    fn test_feature_array_order_matches_names() {
        let f = LagFeatures {
            lag1: 1.0,
            lag2: 2.0,
            lag3: 3.0,
            roll3: 4.0,
            roll7: 5.0,
        };
        assert_eq!(f.to_array(), [1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(FEATURE_NAMES[4], "roll7");
    }
}
