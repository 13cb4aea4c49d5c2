//! Append-only alert log.
//!
//! Every line has the form `[YYYY-MM-DDTHH:MM:SS UTC] <message>`. The file
//! and its parent directory are created on first write; existing content
//! is never truncated or rewritten.
//!
//! # Clock injection
//! `record_at` takes the timestamp explicitly so tests can pin it.
//! `record` uses the real current time.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct AlertNotifier {
    path: PathBuf,
}

impl AlertNotifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        AlertNotifier { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, message: &str) -> io::Result<()> {
        self.record_at(message, Utc::now())
    }

    pub fn record_at(&self, message: &str, now: DateTime<Utc>) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", format_line(message, now))
    }
}

pub fn format_line(message: &str, now: DateTime<Utc>) -> String {
    format!("[{} UTC] {}", now.format("%Y-%m-%dT%H:%M:%S"), message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 13, 5, 9).unwrap()
    }

    #[test]
    fn test_line_format_has_second_precision() {
        assert_eq!(
            format_line("Starting forecast run", fixed_now()),
            "[2025-06-01T13:05:09 UTC] Starting forecast run"
        );
    }

    #[test]
    fn test_creates_directory_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("alerts.log");
        let notifier = AlertNotifier::new(&path);

        notifier.record_at("first", fixed_now()).unwrap();
        notifier.record_at("second", fixed_now()).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("] first"));
        assert!(lines[1].ends_with("] second"));
    }

    #[test]
    fn test_existing_content_is_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.log");
        fs::write(&path, "[2024-01-01T00:00:00 UTC] older entry\n").unwrap();

        AlertNotifier::new(&path).record_at("newer entry", fixed_now()).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("[2024-01-01T00:00:00 UTC] older entry\n"));
        assert!(contents.ends_with("newer entry\n"));
    }

    #[test]
    fn test_unwritable_path_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the log file should be.
        let notifier = AlertNotifier::new(dir.path());
        assert!(notifier.record("cannot land").is_err());
    }
}
