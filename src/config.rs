//! Service configuration.
//!
//! A single [`Config`] is built at process start, either from the
//! environment (with `.env` support via `dotenv`) or from a TOML file, and
//! then passed by reference to every component. Nothing reads the
//! environment after startup.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::alert::thresholds::DEFAULT_ALERT_THRESHOLD;
use crate::error::{ForecastError, Result};
use crate::logging::LogLevel;

/// Identifier written to `forecasts.model_name` unless overridden.
pub const DEFAULT_MODEL_NAME: &str = "baseline_persistence_v1";

/// Where `train` writes and `forecast` reads the model artifact.
pub const DEFAULT_MODEL_PATH: &str = "models/aqi_baseline_model.json";

pub const DEFAULT_ALERTS_LOG_PATH: &str = "logs/alerts.log";

/// Values shipped in example `.env` files that must never reach the API.
const API_KEY_PLACEHOLDERS: &[&str] = &["YOUR_AIRNOW_API_KEY_HERE", "REPLACE_ME"];

// ---------------------------------------------------------------------------
// Database settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub name: String,
    /// Full connection URL. When set, the individual fields are ignored.
    pub url: Option<String>,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            user: "postgres".to_string(),
            password: String::new(),
            host: "localhost".to_string(),
            port: 5433,
            name: "aqi_db".to_string(),
            url: None,
        }
    }
}

impl DatabaseSettings {
    /// Connection string accepted by `postgres::Client::connect`.
    pub fn connection_string(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        format!(
            "host={} port={} user={} password={} dbname={}",
            quote_conn_value(&self.host),
            self.port,
            quote_conn_value(&self.user),
            quote_conn_value(&self.password),
            quote_conn_value(&self.name),
        )
    }
}

/// Quotes a value for the libpq key/value connection format.
fn quote_conn_value(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}

// ---------------------------------------------------------------------------
// Service configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseSettings,
    pub airnow_api_key: Option<String>,
    pub model_path: PathBuf,
    pub model_name: String,
    pub alert_threshold: i32,
    pub alerts_log_path: PathBuf,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database: DatabaseSettings::default(),
            airnow_api_key: None,
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            model_name: DEFAULT_MODEL_NAME.to_string(),
            alert_threshold: DEFAULT_ALERT_THRESHOLD,
            alerts_log_path: PathBuf::from(DEFAULT_ALERTS_LOG_PATH),
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

impl Config {
    /// Loads `.env` (if present) and reads settings from the process
    /// environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. Unset keys keep their
    /// defaults; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Config::default();

        if let Some(v) = get("DB_USER") {
            config.database.user = v;
        }
        if let Some(v) = get("DB_PASSWORD") {
            config.database.password = v;
        }
        if let Some(v) = get("DB_HOST") {
            config.database.host = v;
        }
        if let Some(v) = get("DB_PORT") {
            config.database.port = parse_setting("DB_PORT", &v)?;
        }
        if let Some(v) = get("DB_NAME") {
            config.database.name = v;
        }
        config.database.url = get("DATABASE_URL");
        config.airnow_api_key = get("AIRNOW_API_KEY");

        if let Some(v) = get("MODEL_PATH") {
            config.model_path = PathBuf::from(v);
        }
        if let Some(v) = get("MODEL_NAME") {
            config.model_name = v;
        }
        if let Some(v) = get("ALERT_THRESHOLD") {
            config.alert_threshold = parse_setting("ALERT_THRESHOLD", &v)?;
        }
        if let Some(v) = get("ALERTS_LOG_PATH") {
            config.alerts_log_path = PathBuf::from(v);
        }
        if let Some(v) = get("LOG_LEVEL") {
            config.log_level = v;
        }
        config.log_file = get("LOG_FILE").map(PathBuf::from);

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    fn validate(&self) -> Result<()> {
        if self.model_name.trim().is_empty() {
            return Err(ForecastError::Configuration(
                "model_name must not be empty".to_string(),
            ));
        }
        self.min_log_level()?;
        self.log_file_str()?;
        Ok(())
    }

    /// `log_file` as UTF-8, which the logger needs. A non-UTF-8 path is a
    /// configuration error rather than silently disabling file logging.
    pub fn log_file_str(&self) -> Result<Option<&str>> {
        match &self.log_file {
            None => Ok(None),
            Some(path) => path.to_str().map(Some).ok_or_else(|| {
                ForecastError::Configuration(format!(
                    "LOG_FILE is not valid UTF-8: {}",
                    path.display()
                ))
            }),
        }
    }

    pub fn min_log_level(&self) -> Result<LogLevel> {
        LogLevel::from_str(&self.log_level).map_err(ForecastError::Configuration)
    }

    /// The AirNow API key, rejecting unset and placeholder values.
    pub fn airnow_api_key(&self) -> Result<&str> {
        match self.airnow_api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() && !API_KEY_PLACEHOLDERS.contains(&key) => Ok(key),
            _ => Err(ForecastError::Configuration(
                "AIRNOW_API_KEY is not set or is a placeholder. Set it in your .env file."
                    .to_string(),
            )),
        }
    }

    /// Printable summary of the database target. The password is never shown.
    pub fn summary(&self) -> String {
        match &self.database.url {
            Some(_) => "Database settings:\n  DATABASE_URL = (set)".to_string(),
            None => format!(
                "Database settings:\n  DB_USER = {}\n  DB_HOST = {}\n  DB_PORT = {}\n  DB_NAME = {}",
                self.database.user, self.database.host, self.database.port, self.database.name
            ),
        }
    }
}

fn parse_setting<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        ForecastError::Configuration(format!("{} has an invalid value: '{}'", key, value))
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
