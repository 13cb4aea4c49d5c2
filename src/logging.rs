/// Structured logging for the AQI forecasting service
///
/// Provides context-rich logging with component tags, location
/// identifiers, timestamps, and severity levels. Supports both console
/// output and file-based logging for scheduled runs.
///
/// This is the operator/diagnostic log. The alert log written by
/// `alert::notifier` is a separate audit artifact.

use chrono::Utc;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::str::FromStr;
use std::sync::Mutex;

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Pipeline,
    Model,
    Database,
    Ingest,
    Alert,
    Api,
    System,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Pipeline => write!(f, "PIPE"),
            Component::Model => write!(f, "MODEL"),
            Component::Database => write!(f, "DB"),
            Component::Ingest => write!(f, "INGEST"),
            Component::Alert => write!(f, "ALERT"),
            Component::Api => write!(f, "API"),
            Component::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - no monitor near the location, or no current data
    Expected,
    /// Unexpected failure - indicates service degradation or configuration issue
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Logger Configuration
// ---------------------------------------------------------------------------

/// Process-wide logger instance
static LOGGER: Mutex<Option<Logger>> = Mutex::new(None);

pub struct Logger {
    /// Minimum log level to display
    min_level: LogLevel,
    /// Optional file path for logging
    log_file: Option<String>,
    /// Whether to include timestamps in console output
    console_timestamps: bool,
}

impl Logger {
    pub fn init(min_level: LogLevel, log_file: Option<String>, console_timestamps: bool) {
        let logger = Logger {
            min_level,
            log_file,
            console_timestamps,
        };

        if let Ok(mut slot) = LOGGER.lock() {
            *slot = Some(logger);
        }
    }

    fn format_entry(
        level: LogLevel,
        component: Component,
        location_id: Option<i32>,
        message: &str,
    ) -> String {
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        let location_part = location_id
            .map(|id| format!(" [location {}]", id))
            .unwrap_or_default();
        format!(
            "{} {} {}{}: {}",
            timestamp, level, component, location_part, message
        )
    }

    fn log(&self, level: LogLevel, component: Component, location_id: Option<i32>, message: &str) {
        if level < self.min_level {
            return;
        }

        let log_entry = Self::format_entry(level, component, location_id, message);
        let location_part = location_id
            .map(|id| format!(" [location {}]", id))
            .unwrap_or_default();

        if self.console_timestamps {
            match level {
                LogLevel::Error | LogLevel::Warning => eprintln!("{}", log_entry),
                LogLevel::Info | LogLevel::Debug => println!("{}", log_entry),
            }
        } else {
            match level {
                LogLevel::Error => eprintln!("   ✗ {}{}: {}", component, location_part, message),
                LogLevel::Warning => eprintln!("   ⚠ {}{}: {}", component, location_part, message),
                LogLevel::Info => println!("   {}", message),
                LogLevel::Debug => println!("   [DEBUG] {}", message),
            }
        }

        if let Some(ref path) = self.log_file {
            if let Err(e) = Self::append_to_file(path, &log_entry) {
                eprintln!("Failed to write to log file {}: {}", path, e);
            }
        }
    }

    fn append_to_file(path: &str, entry: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", entry)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

pub fn init_logger(min_level: LogLevel, log_file: Option<&str>, console_timestamps: bool) {
    Logger::init(min_level, log_file.map(String::from), console_timestamps);
}

fn dispatch(level: LogLevel, component: Component, location_id: Option<i32>, message: &str) {
    if let Ok(slot) = LOGGER.lock() {
        if let Some(logger) = slot.as_ref() {
            logger.log(level, component, location_id, message);
        }
    }
}

pub fn info(component: Component, location_id: Option<i32>, message: &str) {
    dispatch(LogLevel::Info, component, location_id, message);
}

pub fn warn(component: Component, location_id: Option<i32>, message: &str) {
    dispatch(LogLevel::Warning, component, location_id, message);
}

pub fn error(component: Component, location_id: Option<i32>, message: &str) {
    dispatch(LogLevel::Error, component, location_id, message);
}

pub fn debug(component: Component, location_id: Option<i32>, message: &str) {
    dispatch(LogLevel::Debug, component, location_id, message);
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify an AirNow fetch/normalize failure for one location
pub fn classify_ingest_failure(error_message: &str) -> FailureType {
    // An empty response just means no monitor reported near the location
    if error_message.contains("No observations returned")
        || error_message.contains("No valid normalized records")
    {
        FailureType::Expected
    }
    // HTTP errors and timeouts point at the service or our credentials
    else if error_message.contains("HTTP") || error_message.contains("timed out") {
        FailureType::Unexpected
    }
    // Parse errors suggest API changes
    else if error_message.contains("Serialization error") || error_message.contains("decod") {
        FailureType::Unexpected
    } else {
        FailureType::Unknown
    }
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Log an ingestion failure with automatic classification
pub fn log_ingest_failure(location_id: i32, operation: &str, err: &dyn std::error::Error) {
    let error_msg = err.to_string();
    let failure_type = classify_ingest_failure(&error_msg);

    let message = format!("{} failed [{}]: {}", operation, failure_type, error_msg);

    match failure_type {
        FailureType::Expected => debug(Component::Ingest, Some(location_id), &message),
        FailureType::Unexpected => error(Component::Ingest, Some(location_id), &message),
        FailureType::Unknown => warn(Component::Ingest, Some(location_id), &message),
    }
}

// ---------------------------------------------------------------------------
// Ingestion Summary Logging
// ---------------------------------------------------------------------------

pub fn log_ingest_summary(total: usize, successful: usize, failed: usize, inserted: usize) {
    let message = format!(
        "Ingestion complete: {}/{} locations successful, {} failed, {} observation(s) inserted",
        successful, total, failed, inserted
    );

    if failed == 0 {
        info(Component::Ingest, None, &message);
    } else if successful == 0 {
        error(Component::Ingest, None, &message);
    } else {
        warn(Component::Ingest, None, &message);
    }
}
