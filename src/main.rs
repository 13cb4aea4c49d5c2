use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};

use aqi_forecast_service::alert::AlertNotifier;
use aqi_forecast_service::api::{self, DEFAULT_BIND_ADDR};
use aqi_forecast_service::config::Config;
use aqi_forecast_service::db::{self, PgStore, REQUIRED_TABLES};
use aqi_forecast_service::forecast::forest::ForestParams;
use aqi_forecast_service::forecast::train::{self, NaiveStrategy};
use aqi_forecast_service::ingest::airnow::{self, AirNowClient, DEFAULT_DISTANCE_MILES, IngestOptions};
use aqi_forecast_service::locations::LOCATION_REGISTRY;
use aqi_forecast_service::logging::{self, Component};
use aqi_forecast_service::model::HealthStatus;
use aqi_forecast_service::pipeline::{self, RunOutcome};

const DEFAULT_FOREST_MODEL_PATH: &str = "models/aqi_rf_model.json";

#[derive(Parser)]
#[command(author, version, about = "Next-day AQI forecasting and alerting")]
struct Cli {
    /// TOML config file. Without it, settings come from the environment (.env).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    Persistence,
    Mean,
    Forest,
}

#[derive(Subcommand)]
enum Commands {
    /// Forecast tomorrow's AQI for every location, store it and raise alerts
    Forecast,

    /// Fit a model on all daily aggregates and save the artifact
    Train {
        #[arg(long, value_enum, default_value = "persistence")]
        strategy: StrategyArg,

        /// Artifact path (default: MODEL_PATH, or models/aqi_rf_model.json for forest)
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Build daily aggregates from raw observations
    Aggregate,

    /// Fetch current AirNow observations for every location
    Ingest {
        /// Search radius around each location, in miles
        #[arg(long, default_value_t = DEFAULT_DISTANCE_MILES)]
        distance: u32,

        /// Keep only these pollutants (repeatable, e.g. --pollutant PM2.5)
        #[arg(long)]
        pollutant: Vec<String>,
    },

    /// Insert the default location registry
    Seed,

    /// Create tables from sql/001_schema.sql
    InitDb,

    /// Print the latest forecast per location as JSON
    Latest,

    /// Print the health check body
    Health,

    /// Serve GET /health and GET /forecasts/latest over HTTP
    Serve {
        /// Address to listen on
        #[arg(long, default_value = DEFAULT_BIND_ADDR)]
        bind: String,
    },

    /// Check database connectivity and required tables
    CheckDb,
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(p) => Config::from_toml_file(p)
            .with_context(|| format!("failed to load config from {}", p.display()))?,
        None => Config::from_env().context("failed to read settings from environment")?,
    };
    Ok(config)
}

fn run_forecast(config: &Config) -> Result<()> {
    let notifier = AlertNotifier::new(&config.alerts_log_path);
    let open_store = || db::connect_and_verify(config, REQUIRED_TABLES).map(PgStore::new);

    match pipeline::run_forecast_with(config, open_store, &notifier)? {
        RunOutcome::NoData => {}
        RunOutcome::Completed(summary) => {
            println!(
                "Forecast run complete: {} row(s) written, {} alert(s).",
                summary.rows_written,
                summary.alerts.flagged.len()
            );
        }
    }
    Ok(())
}

fn run_train(config: &Config, strategy: StrategyArg, output: Option<PathBuf>) -> Result<()> {
    let mut client = db::connect_and_verify(config, &["daily_aggregates"])?;
    let history = db::load_daily_aggregates(&mut client)?;
    if history.is_empty() {
        logging::warn(
            Component::Model,
            None,
            "No data in daily_aggregates. Run ingestion + aggregation first.",
        );
        return Ok(());
    }
    println!("Loaded {} daily aggregate row(s).", history.len());

    let (model, path) = match strategy {
        StrategyArg::Persistence | StrategyArg::Mean => {
            let naive = match strategy {
                StrategyArg::Mean => NaiveStrategy::Mean,
                _ => NaiveStrategy::Persistence,
            };
            let model = train::train_baseline(&history, naive)?;
            (model, output.unwrap_or_else(|| config.model_path.clone()))
        }
        StrategyArg::Forest => {
            let (model, report) = train::train_forest(&history, ForestParams::default())?;
            println!(
                "Baseline (persistence) MAE: {:.3}  RandomForest MAE: {:.3}{}",
                report.baseline_mae,
                report.model_mae,
                if report.evaluated_in_sample() {
                    "  (in-sample, too few rows for a split)"
                } else {
                    ""
                }
            );
            (
                model,
                output.unwrap_or_else(|| PathBuf::from(DEFAULT_FOREST_MODEL_PATH)),
            )
        }
    };

    model.save(&path)?;
    println!("Saved {} model to: {}", model.strategy_name(), path.display());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    logging::init_logger(config.min_log_level()?, config.log_file_str()?, false);
    logging::debug(Component::System, None, &config.summary());

    match cli.command {
        Commands::Forecast => run_forecast(&config)?,

        Commands::Train { strategy, output } => run_train(&config, strategy, output)?,

        Commands::Aggregate => {
            let mut client = db::connect_and_verify(&config, &["observations", "daily_aggregates"])?;
            let inserted = db::run_daily_aggregation(&mut client)?;
            println!("Inserted {} new daily aggregate row(s).", inserted);
        }

        Commands::Ingest {
            distance,
            pollutant,
        } => {
            let airnow = AirNowClient::new(&config)?;
            let mut client = db::connect_and_verify(&config, &["locations", "observations"])?;
            let options = IngestOptions {
                distance_miles: distance,
                pollutants: pollutant,
            };
            let report = airnow::run_ingestion(&mut client, &airnow, &options)?;
            if report.locations == 0 {
                bail!("no locations in the database; run `aqi_forecast seed` first");
            }
            println!(
                "Done. {}/{} location(s) ingested, {} new observation(s).",
                report.successful, report.locations, report.inserted
            );
        }

        Commands::Seed => {
            let mut client = db::connect_and_verify(&config, &["locations"])?;
            let inserted = db::seed_locations(&mut client, LOCATION_REGISTRY)?;
            println!(
                "Seeded {} new location(s) ({} in registry).",
                inserted,
                LOCATION_REGISTRY.len()
            );
        }

        Commands::InitDb => {
            let mut client = db::connect(&config)?;
            db::apply_schema(&mut client)?;
            println!("Database schema initialized.");
        }

        Commands::Latest => {
            let mut client = db::connect_and_verify(&config, &["locations", "forecasts"])?;
            let rows = db::latest_forecasts(&mut client)?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }

        Commands::Health => {
            println!("{}", serde_json::to_string(&HealthStatus::ok())?);
        }

        Commands::Serve { bind } => {
            if let Err(e) = db::connect_and_verify(&config, &["locations", "forecasts"]) {
                logging::warn(
                    Component::Api,
                    None,
                    &format!("Database not ready, /forecasts/latest will fail until it is: {}", e),
                );
            }
            api::serve(config, &bind)?;
        }

        Commands::CheckDb => {
            println!("{}", config.summary());
            let mut client = match db::connect_and_verify(&config, REQUIRED_TABLES) {
                Ok(client) => client,
                Err(e) => bail!("database check failed: {}", e),
            };
            db::check_connection(&mut client)?;
            println!("Database OK: {} table(s) present.", REQUIRED_TABLES.len());
        }
    }

    Ok(())
}
