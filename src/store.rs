//! Storage seam between the pipeline and the database.
//!
//! [`ForecastStore`] covers exactly what a forecast run reads and writes.
//! `db::PgStore` implements it over PostgreSQL; [`MemoryStore`] implements
//! the same contract in memory for tests and dry runs.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::error::{ForecastError, Result};
use crate::model::{DailyAggregate, Forecast};

pub trait ForecastStore {
    /// The max-date aggregate of every location with history, ordered by
    /// location id. Exactly one row per location.
    fn latest_daily_aggregates(&mut self) -> Result<Vec<DailyAggregate>>;

    /// The most recent `per_location` aggregates of every location, ordered
    /// by location id then date.
    fn recent_daily_aggregates(&mut self, per_location: usize) -> Result<Vec<DailyAggregate>>;

    /// Inserts or overwrites forecasts keyed by
    /// `(location_id, target_date, model_name)` as one atomic batch.
    /// Returns the number of rows written.
    fn upsert_forecasts(&mut self, forecasts: &[Forecast]) -> Result<usize>;
}

impl<S: ForecastStore + ?Sized> ForecastStore for &mut S {
    fn latest_daily_aggregates(&mut self) -> Result<Vec<DailyAggregate>> {
        (**self).latest_daily_aggregates()
    }

    fn recent_daily_aggregates(&mut self, per_location: usize) -> Result<Vec<DailyAggregate>> {
        (**self).recent_daily_aggregates(per_location)
    }

    fn upsert_forecasts(&mut self, forecasts: &[Forecast]) -> Result<usize> {
        (**self).upsert_forecasts(forecasts)
    }
}

type ForecastKey = (i32, NaiveDate, String);

/// In-memory store with the same uniqueness rules as the SQL schema.
#[derive(Debug, Default)]
pub struct MemoryStore {
    aggregates: BTreeMap<(i32, NaiveDate), DailyAggregate>,
    forecasts: BTreeMap<ForecastKey, i32>,
    fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn with_aggregates(rows: impl IntoIterator<Item = DailyAggregate>) -> Self {
        let mut store = MemoryStore::new();
        for row in rows {
            store.insert_aggregate(row);
        }
        store
    }

    /// Insert-if-absent on `(location_id, date)`. Returns whether a row was
    /// added.
    pub fn insert_aggregate(&mut self, row: DailyAggregate) -> bool {
        let key = (row.location_id, row.date);
        if self.aggregates.contains_key(&key) {
            return false;
        }
        self.aggregates.insert(key, row);
        true
    }

    /// Makes every subsequent `upsert_forecasts` fail without writing.
    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    pub fn forecasts(&self) -> Vec<Forecast> {
        self.forecasts
            .iter()
            .map(|((location_id, target_date, model_name), &aqi)| Forecast {
                location_id: *location_id,
                target_date: *target_date,
                forecast_aqi: aqi,
                model_name: model_name.clone(),
            })
            .collect()
    }

    fn by_location(&self) -> BTreeMap<i32, Vec<&DailyAggregate>> {
        let mut groups: BTreeMap<i32, Vec<&DailyAggregate>> = BTreeMap::new();
        for row in self.aggregates.values() {
            groups.entry(row.location_id).or_default().push(row);
        }
        groups
    }
}

impl ForecastStore for MemoryStore {
    fn latest_daily_aggregates(&mut self) -> Result<Vec<DailyAggregate>> {
        // BTreeMap order is (location, date), so each group ends at its max date.
        Ok(self
            .by_location()
            .into_values()
            .filter_map(|rows| rows.last().map(|r| (*r).clone()))
            .collect())
    }

    fn recent_daily_aggregates(&mut self, per_location: usize) -> Result<Vec<DailyAggregate>> {
        Ok(self
            .by_location()
            .into_values()
            .flat_map(|rows| {
                let skip = rows.len().saturating_sub(per_location);
                rows.into_iter().skip(skip).cloned().collect::<Vec<_>>()
            })
            .collect())
    }

    fn upsert_forecasts(&mut self, forecasts: &[Forecast]) -> Result<usize> {
        if self.fail_writes {
            return Err(ForecastError::WriteFailed(
                "simulated write failure".to_string(),
            ));
        }
        for f in forecasts {
            self.forecasts.insert(
                (f.location_id, f.target_date, f.model_name.clone()),
                f.forecast_aqi,
            );
        }
        Ok(forecasts.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agg(location_id: i32, day: u32, max_aqi: i32) -> DailyAggregate {
        DailyAggregate {
            location_id,
            date: NaiveDate::from_ymd_opt(2025, 1, day).unwrap(),
            max_aqi,
            mean_aqi: max_aqi as f64,
            min_aqi: max_aqi,
        }
    }

    fn forecast(aqi: i32) -> Forecast {
        Forecast {
            location_id: 5,
            target_date: NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
            forecast_aqi: aqi,
            model_name: "m1".to_string(),
        }
    }

    #[test]
    fn test_latest_is_one_row_per_location_at_max_date() {
        let mut store = MemoryStore::with_aggregates(vec![
            agg(2, 3, 20),
            agg(1, 5, 15),
            agg(1, 9, 19),
            agg(2, 1, 21),
        ]);
        let latest = store.latest_daily_aggregates().unwrap();
        assert_eq!(latest, vec![agg(1, 9, 19), agg(2, 3, 20)]);
    }

    #[test]
    fn test_aggregates_are_insert_if_absent() {
        let mut store = MemoryStore::new();
        assert!(store.insert_aggregate(agg(1, 1, 10)));
        assert!(!store.insert_aggregate(agg(1, 1, 99)));
        assert_eq!(store.latest_daily_aggregates().unwrap()[0].max_aqi, 10);
    }

    #[test]
    fn test_recent_keeps_the_last_n_per_location() {
        let mut store =
            MemoryStore::with_aggregates((1..=10).map(|d| agg(1, d, d as i32)).chain([agg(2, 1, 7)]));
        let recent = store.recent_daily_aggregates(3).unwrap();
        let days: Vec<(i32, i32)> = recent.iter().map(|r| (r.location_id, r.max_aqi)).collect();
        assert_eq!(days, vec![(1, 8), (1, 9), (1, 10), (2, 7)]);
    }

    #[test]
    fn test_upsert_overwrites_existing_key() {
        let mut store = MemoryStore::new();
        store.upsert_forecasts(&[forecast(60)]).unwrap();
        store.upsert_forecasts(&[forecast(75)]).unwrap();
        assert_eq!(store.forecasts(), vec![forecast(75)]);
    }

    #[test]
    fn test_failed_write_leaves_prior_state() {
        let mut store = MemoryStore::new();
        store.upsert_forecasts(&[forecast(60)]).unwrap();
        store.fail_writes(true);
        assert!(matches!(
            store.upsert_forecasts(&[forecast(75)]),
            Err(ForecastError::WriteFailed(_))
        ));
        assert_eq!(store.forecasts(), vec![forecast(60)]);
    }
}
