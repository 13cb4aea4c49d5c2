//! Forecast-and-notify run.
//!
//! Stages, strictly in order:
//! 1. load the model artifact (missing artifact aborts before any write)
//! 2. open the store, then load the latest daily aggregate per location
//!    (none: warn, succeed)
//! 3. predict, with `target_date = aggregate date + 1 day`
//! 4. upsert every forecast in one batch
//! 5. evaluate the alert threshold and write the alert lines
//!
//! Every outcome, including failures, is echoed to stdout and appended to
//! the alert log. A failing alert-log write is reported through the
//! diagnostic logger and never stops the run.

use chrono::NaiveDate;

use crate::alert::{AlertEvaluation, AlertNotifier, evaluate_forecasts};
use crate::config::{Config, DEFAULT_MODEL_NAME};
use crate::error::{ForecastError, Result};
use crate::features;
use crate::forecast::{Forecaster, PredictionInput};
use crate::logging::{self, Component};
use crate::model::{DailyAggregate, Forecast};
use crate::store::ForecastStore;

pub const NO_DATA_MESSAGE: &str =
    "WARNING: No daily aggregates found. Run ingestion + aggregation first.";

/// Operator hint for a location whose history is shorter than the model
/// window. The run still fails; this says how to unblock it.
pub fn short_history_message(location_id: i32, available: usize, needed: usize) -> String {
    format!(
        "WARNING: Location {} has only {} daily aggregate(s); the model needs {}. \
         No forecasts are written until every location has enough history. \
         Run ingestion + aggregation, or switch MODEL_PATH to a baseline model.",
        location_id, available, needed
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub forecasts: Vec<Forecast>,
    pub rows_written: usize,
    pub alerts: AlertEvaluation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// No daily aggregates yet. Nothing was written.
    NoData,
    Completed(RunSummary),
}

/// Prints to the operator stream and appends to the alert log.
fn notify(notifier: &AlertNotifier, message: &str) {
    println!("{}", message);
    if let Err(e) = notifier.record(message) {
        logging::warn(
            Component::Alert,
            None,
            &format!(
                "Failed to append to alert log {}: {}",
                notifier.path().display(),
                e
            ),
        );
    }
}

pub fn next_day(date: NaiveDate) -> Result<NaiveDate> {
    date.succ_opt().ok_or(ForecastError::DateOutOfRange(date))
}

/// Builds model inputs for the latest rows, loading trailing history and
/// engineering features when the model needs them.
fn prediction_inputs<S: ForecastStore + ?Sized>(
    model: &Forecaster,
    latest: &[DailyAggregate],
    store: &mut S,
    notifier: &AlertNotifier,
) -> Result<Vec<PredictionInput>> {
    let mut inputs: Vec<PredictionInput> = latest.iter().map(PredictionInput::from).collect();

    let Some(window) = model.history_window() else {
        return Ok(inputs);
    };

    let history = store.recent_daily_aggregates(window)?;
    let (ready, short) = features::latest_features(&history);

    for input in &mut inputs {
        match ready.get(&input.location_id) {
            Some(f) => input.features = Some(*f),
            None => {
                let available = short.get(&input.location_id).copied().unwrap_or(0);
                notify(
                    notifier,
                    &short_history_message(input.location_id, available, window),
                );
                return Err(ForecastError::InsufficientHistory {
                    location_id: input.location_id,
                    needed: window,
                    available,
                });
            }
        }
    }

    Ok(inputs)
}

fn run_stages<S, F>(config: &Config, open_store: F, notifier: &AlertNotifier) -> Result<RunOutcome>
where
    S: ForecastStore,
    F: FnOnce() -> Result<S>,
{
    // 1. Model
    let model = Forecaster::load(&config.model_path)?;
    notify(
        notifier,
        &format!(
            "Using model from: {} (strategy: {})",
            config.model_path.display(),
            model.strategy_name()
        ),
    );
    if config.model_name == DEFAULT_MODEL_NAME && !matches!(model, Forecaster::Persistence) {
        logging::warn(
            Component::Pipeline,
            None,
            &format!(
                "A {} model is writing forecasts as '{}'. Set MODEL_NAME to tell strategies apart.",
                model.strategy_name(),
                DEFAULT_MODEL_NAME
            ),
        );
    }

    // 2. Latest aggregates
    let mut store = open_store()?;
    let latest = store.latest_daily_aggregates()?;
    if latest.is_empty() {
        notify(notifier, NO_DATA_MESSAGE);
        return Ok(RunOutcome::NoData);
    }
    notify(
        notifier,
        &format!("Loaded {} latest daily aggregate row(s).", latest.len()),
    );

    // 3. Predict
    let inputs = prediction_inputs(&model, &latest, &mut store, notifier)?;
    let predicted = model.predict_aqi(&inputs)?;
    let forecasts = inputs
        .iter()
        .zip(predicted)
        .map(|(input, forecast_aqi)| {
            Ok(Forecast {
                location_id: input.location_id,
                target_date: next_day(input.date)?,
                forecast_aqi,
                model_name: config.model_name.clone(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    // 4. Upsert
    let rows_written = store.upsert_forecasts(&forecasts)?;
    notify(
        notifier,
        &format!(
            "Inserted/updated {} forecast row(s) in the database.",
            rows_written
        ),
    );

    // 5. Alerts
    let alerts = evaluate_forecasts(&forecasts, config.alert_threshold);
    for line in alerts.messages() {
        notify(notifier, &line);
    }

    Ok(RunOutcome::Completed(RunSummary {
        forecasts,
        rows_written,
        alerts,
    }))
}

/// Runs one forecast-and-notify pass against `store`.
pub fn run_forecast_and_notify<S: ForecastStore + ?Sized>(
    config: &Config,
    store: &mut S,
    notifier: &AlertNotifier,
) -> Result<RunOutcome> {
    run_forecast_with(config, || Ok(store), notifier)
}

/// Like [`run_forecast_and_notify`], but the store is opened only after the
/// model has loaded. A failure to open it is reported like any other stage
/// failure.
pub fn run_forecast_with<S, F>(config: &Config, open_store: F, notifier: &AlertNotifier) -> Result<RunOutcome>
where
    S: ForecastStore,
    F: FnOnce() -> Result<S>,
{
    notify(notifier, "Starting forecast_and_notify run");
    logging::info(
        Component::Pipeline,
        None,
        &format!("Forecast run using model name '{}'", config.model_name),
    );

    match run_stages(config, open_store, notifier) {
        Ok(outcome) => {
            if let RunOutcome::Completed(summary) = &outcome {
                logging::info(
                    Component::Pipeline,
                    None,
                    &format!(
                        "Forecast run complete: {} row(s), {} alert(s)",
                        summary.rows_written,
                        summary.alerts.flagged.len()
                    ),
                );
            }
            Ok(outcome)
        }
        Err(e) => {
            logging::error(Component::Pipeline, None, &format!("Forecast run failed: {}", e));
            notify(notifier, &format!("ERROR: forecast run failed: {}", e));
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_day_crosses_month_and_year() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
        assert_eq!(next_day(d(2025, 6, 1)).unwrap(), d(2025, 6, 2));
        assert_eq!(next_day(d(2025, 2, 28)).unwrap(), d(2025, 3, 1));
        assert_eq!(next_day(d(2024, 2, 28)).unwrap(), d(2024, 2, 29));
        assert_eq!(next_day(d(2025, 12, 31)).unwrap(), d(2026, 1, 1));
    }

    #[test]
    fn test_next_day_at_max_date_is_an_error() {
        assert!(matches!(
            next_day(NaiveDate::MAX),
            Err(ForecastError::DateOutOfRange(_))
        ));
    }
}
