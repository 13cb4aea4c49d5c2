//! Forecast AQI threshold checking.
//!
//! Splits a run's forecasts into those at or above the alert threshold and
//! the rest, and renders the alert-log lines for the result.

use chrono::NaiveDate;

use crate::model::Forecast;

/// Forecast AQI at or above this value raises an alert.
pub const DEFAULT_ALERT_THRESHOLD: i32 = 100;

/// EPA AQI categories, in ascending order of severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AqiCategory {
    Good,
    Moderate,
    UnhealthyForSensitiveGroups,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl AqiCategory {
    pub fn from_aqi(aqi: i32) -> Self {
        match aqi {
            i32::MIN..=50 => AqiCategory::Good,
            51..=100 => AqiCategory::Moderate,
            101..=150 => AqiCategory::UnhealthyForSensitiveGroups,
            151..=200 => AqiCategory::Unhealthy,
            201..=300 => AqiCategory::VeryUnhealthy,
            _ => AqiCategory::Hazardous,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AqiCategory::Good => "Good",
            AqiCategory::Moderate => "Moderate",
            AqiCategory::UnhealthyForSensitiveGroups => "Unhealthy for Sensitive Groups",
            AqiCategory::Unhealthy => "Unhealthy",
            AqiCategory::VeryUnhealthy => "Very Unhealthy",
            AqiCategory::Hazardous => "Hazardous",
        }
    }
}

/// A forecast that reached the alert threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastAlert {
    pub location_id: i32,
    pub target_date: NaiveDate,
    pub forecast_aqi: i32,
    pub category: AqiCategory,
}

impl ForecastAlert {
    pub fn message(&self) -> String {
        format!(
            "ALERT: location_id={}, target_date={}, forecast_aqi={} ({})",
            self.location_id,
            self.target_date,
            self.forecast_aqi,
            self.category.label()
        )
    }
}

/// Returns an alert if the forecast is at or above `threshold`.
pub fn check_forecast(forecast: &Forecast, threshold: i32) -> Option<ForecastAlert> {
    (forecast.forecast_aqi >= threshold).then(|| ForecastAlert {
        location_id: forecast.location_id,
        target_date: forecast.target_date,
        forecast_aqi: forecast.forecast_aqi,
        category: AqiCategory::from_aqi(forecast.forecast_aqi),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvaluation {
    pub threshold: i32,
    pub flagged: Vec<ForecastAlert>,
    pub max_forecast: Option<i32>,
}

impl AlertEvaluation {
    /// Alert-log lines: one summary line when nothing is flagged, otherwise
    /// a header followed by one line per flagged location.
    pub fn messages(&self) -> Vec<String> {
        if self.flagged.is_empty() {
            let max = self
                .max_forecast
                .map(|m| m.to_string())
                .unwrap_or_else(|| "n/a".to_string());
            return vec![format!(
                "No locations exceed AQI threshold {}. Max forecast AQI = {}",
                self.threshold, max
            )];
        }

        let mut lines = Vec::with_capacity(self.flagged.len() + 1);
        lines.push(format!(
            "ALERT: Locations with forecast AQI >= {}:",
            self.threshold
        ));
        lines.extend(self.flagged.iter().map(ForecastAlert::message));
        lines
    }
}

pub fn evaluate_forecasts(forecasts: &[Forecast], threshold: i32) -> AlertEvaluation {
    AlertEvaluation {
        threshold,
        flagged: forecasts
            .iter()
            .filter_map(|f| check_forecast(f, threshold))
            .collect(),
        max_forecast: forecasts.iter().map(|f| f.forecast_aqi).max(),
    }
}
