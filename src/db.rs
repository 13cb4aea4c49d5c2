//! PostgreSQL access.
//!
//! Tables are created by `sql/001_schema.sql` (see [`apply_schema`]).
//! Everything else here only reads and writes rows.

use postgres::{Client, NoTls};

use crate::config::Config;
use crate::error::{ForecastError, Result};
use crate::locations::SeedLocation;
use crate::logging::{self, Component};
use crate::model::{DailyAggregate, Forecast, LatestForecast, Location, Observation};
use crate::store::ForecastStore;

/// Tables the service expects to exist.
pub const REQUIRED_TABLES: &[&str] = &["locations", "observations", "daily_aggregates", "forecasts"];

const LATEST_AGGREGATES_SQL: &str = "
    SELECT da.location_id, da.date, da.max_aqi, da.mean_aqi, da.min_aqi
    FROM daily_aggregates da
    JOIN (
        SELECT location_id, MAX(date) AS max_date
        FROM daily_aggregates
        GROUP BY location_id
    ) latest
      ON da.location_id = latest.location_id
     AND da.date = latest.max_date
    ORDER BY da.location_id
";

const RECENT_AGGREGATES_SQL: &str = "
    SELECT location_id, date, max_aqi, mean_aqi, min_aqi
    FROM (
        SELECT da.*,
               ROW_NUMBER() OVER (PARTITION BY location_id ORDER BY date DESC) AS rn
        FROM daily_aggregates da
    ) ranked
    WHERE rn <= $1
    ORDER BY location_id, date
";

const UPSERT_FORECAST_SQL: &str = "
    INSERT INTO forecasts (location_id, target_date, forecast_aqi, model_name)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (location_id, target_date, model_name) DO UPDATE
    SET forecast_aqi = EXCLUDED.forecast_aqi
";

const DAILY_AGGREGATION_SQL: &str = "
    INSERT INTO daily_aggregates (location_id, date, max_aqi, mean_aqi, min_aqi)
    SELECT
        o.location_id,
        o.timestamp_utc::date AS date,
        MAX(o.aqi) AS max_aqi,
        AVG(o.aqi)::double precision AS mean_aqi,
        MIN(o.aqi) AS min_aqi
    FROM observations o
    LEFT JOIN daily_aggregates da
      ON da.location_id = o.location_id
     AND da.date = o.timestamp_utc::date
    WHERE da.id IS NULL
      AND o.aqi IS NOT NULL
    GROUP BY o.location_id, o.timestamp_utc::date
    ON CONFLICT (location_id, date) DO NOTHING
";

const INSERT_OBSERVATION_SQL: &str = "
    INSERT INTO observations (location_id, timestamp_utc, aqi, category, pollutant, raw_json)
    VALUES ($1, $2, $3, $4, $5, $6::text::jsonb)
    ON CONFLICT (location_id, timestamp_utc, pollutant) DO NOTHING
";

/// One row per location at its most recent target date. When several
/// models forecast that date, the alphabetically first model name wins.
const LATEST_FORECASTS_SQL: &str = "
    SELECT DISTINCT ON (f.location_id)
        f.location_id,
        l.name AS location_name,
        f.target_date,
        f.forecast_aqi,
        f.model_name
    FROM forecasts f
    JOIN locations l ON l.id = f.location_id
    ORDER BY f.location_id, f.target_date DESC, f.model_name
";

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

pub fn connect(config: &Config) -> Result<Client> {
    let client = Client::connect(&config.database.connection_string(), NoTls)?;
    logging::debug(
        Component::Database,
        None,
        &format!(
            "Connected to {}:{}/{}",
            config.database.host, config.database.port, config.database.name
        ),
    );
    Ok(client)
}

/// Connects and checks that every table in `tables` exists.
pub fn connect_and_verify(config: &Config, tables: &[&str]) -> Result<Client> {
    let mut client = connect(config)?;

    let rows = client.query(
        "SELECT table_name::text
         FROM information_schema.tables
         WHERE table_schema = current_schema()
           AND table_name::text = ANY($1::text[])",
        &[&tables],
    )?;
    let present: Vec<String> = rows.iter().map(|r| r.get(0)).collect();
    let missing: Vec<&str> = tables
        .iter()
        .copied()
        .filter(|t| !present.iter().any(|p| p == t))
        .collect();

    if !missing.is_empty() {
        return Err(ForecastError::Configuration(format!(
            "Database is missing table(s): {}. Apply sql/001_schema.sql first.",
            missing.join(", ")
        )));
    }
    Ok(client)
}

/// Schema shipped with the binary. Idempotent.
pub const SCHEMA_SQL: &str = include_str!("../sql/001_schema.sql");

pub fn apply_schema(client: &mut Client) -> Result<()> {
    client.batch_execute(SCHEMA_SQL)?;
    logging::info(Component::Database, None, "Schema applied (sql/001_schema.sql)");
    Ok(())
}

pub fn check_connection(client: &mut Client) -> Result<()> {
    let row = client.query_one("SELECT 1", &[])?;
    let one: i32 = row.get(0);
    if one != 1 {
        return Err(ForecastError::Configuration(format!(
            "SELECT 1 returned {}",
            one
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

fn aggregate_from_row(row: &postgres::Row) -> DailyAggregate {
    DailyAggregate {
        location_id: row.get(0),
        date: row.get(1),
        max_aqi: row.get(2),
        mean_aqi: row.get(3),
        min_aqi: row.get(4),
    }
}

pub fn load_locations(client: &mut Client) -> Result<Vec<Location>> {
    let rows = client.query(
        "SELECT id, name, latitude, longitude FROM locations ORDER BY id",
        &[],
    )?;
    Ok(rows
        .iter()
        .map(|row| Location {
            id: row.get(0),
            name: row.get(1),
            latitude: row.get(2),
            longitude: row.get(3),
        })
        .collect())
}

/// All aggregates ordered by location then date, for training.
pub fn load_daily_aggregates(client: &mut Client) -> Result<Vec<DailyAggregate>> {
    let rows = client.query(
        "SELECT location_id, date, max_aqi, mean_aqi, min_aqi
         FROM daily_aggregates
         ORDER BY location_id, date",
        &[],
    )?;
    Ok(rows.iter().map(aggregate_from_row).collect())
}

pub fn latest_forecasts(client: &mut Client) -> Result<Vec<LatestForecast>> {
    let rows = client.query(LATEST_FORECASTS_SQL, &[])?;
    Ok(rows
        .iter()
        .map(|row| LatestForecast {
            location_id: row.get(0),
            location_name: row.get(1),
            target_date: row.get(2),
            forecast_aqi: row.get(3),
            model_name: row.get(4),
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Inserts observations, skipping duplicates of
/// `(location_id, timestamp_utc, pollutant)`. Returns rows actually inserted.
pub fn insert_observations(client: &mut Client, observations: &[Observation]) -> Result<u64> {
    if observations.is_empty() {
        return Ok(0);
    }
    let mut tx = client.transaction()?;
    let stmt = tx.prepare(INSERT_OBSERVATION_SQL)?;
    let mut inserted = 0;
    for obs in observations {
        inserted += tx.execute(
            &stmt,
            &[
                &obs.location_id,
                &obs.timestamp_utc,
                &obs.aqi,
                &obs.category,
                &obs.pollutant,
                &obs.raw_payload.as_str(),
            ],
        )?;
    }
    tx.commit()?;
    Ok(inserted)
}

/// Aggregates observations into `daily_aggregates`, adding only
/// `(location, date)` pairs not yet present. Returns rows inserted.
pub fn run_daily_aggregation(client: &mut Client) -> Result<u64> {
    Ok(client.execute(DAILY_AGGREGATION_SQL, &[])?)
}

/// Inserts locations by name, leaving existing rows untouched.
pub fn seed_locations(client: &mut Client, locations: &[SeedLocation]) -> Result<u64> {
    let mut tx = client.transaction()?;
    let stmt = tx.prepare(
        "INSERT INTO locations (name, latitude, longitude)
         VALUES ($1, $2, $3)
         ON CONFLICT (name) DO NOTHING",
    )?;
    let mut inserted = 0;
    for loc in locations {
        inserted += tx.execute(&stmt, &[&loc.name, &loc.latitude, &loc.longitude])?;
    }
    tx.commit()?;
    Ok(inserted)
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

pub struct PgStore {
    client: Client,
}

impl PgStore {
    pub fn new(client: Client) -> Self {
        PgStore { client }
    }

    pub fn client(&mut self) -> &mut Client {
        &mut self.client
    }

    fn write_batch(&mut self, forecasts: &[Forecast]) -> std::result::Result<usize, postgres::Error> {
        let mut tx = self.client.transaction()?;
        let stmt = tx.prepare(UPSERT_FORECAST_SQL)?;
        for f in forecasts {
            tx.execute(
                &stmt,
                &[&f.location_id, &f.target_date, &f.forecast_aqi, &f.model_name],
            )?;
        }
        tx.commit()?;
        Ok(forecasts.len())
    }
}

impl ForecastStore for PgStore {
    fn latest_daily_aggregates(&mut self) -> Result<Vec<DailyAggregate>> {
        let rows = self.client.query(LATEST_AGGREGATES_SQL, &[])?;
        Ok(rows.iter().map(aggregate_from_row).collect())
    }

    fn recent_daily_aggregates(&mut self, per_location: usize) -> Result<Vec<DailyAggregate>> {
        let limit = per_location as i64;
        let rows = self.client.query(RECENT_AGGREGATES_SQL, &[&limit])?;
        Ok(rows.iter().map(aggregate_from_row).collect())
    }

    /// One transaction for the whole batch; on any error nothing is
    /// committed and the error is returned as `WriteFailed`.
    fn upsert_forecasts(&mut self, forecasts: &[Forecast]) -> Result<usize> {
        if forecasts.is_empty() {
            return Ok(0);
        }
        self.write_batch(forecasts)
            .map_err(|e| ForecastError::WriteFailed(e.to_string()))
    }
}
