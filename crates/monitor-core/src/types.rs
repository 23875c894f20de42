use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::MonitorError;

/// Result label reported by a KYC sub-check. `Clear` is the only pass label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Clear,
    Consider,
    Unidentified,
}

impl CheckStatus {
    pub fn is_pass(&self) -> bool {
        matches!(self, CheckStatus::Clear)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Clear => "clear",
            CheckStatus::Consider => "consider",
            CheckStatus::Unidentified => "unidentified",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckStatus {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clear" => Ok(CheckStatus::Clear),
            "consider" => Ok(CheckStatus::Consider),
            "unidentified" => Ok(CheckStatus::Unidentified),
            other => Err(MonitorError::InvalidData(format!(
                "unknown check status '{}'",
                other
            ))),
        }
    }
}

/// A single recorded sub-check result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub check_name: String,
    pub timestamp: DateTime<Utc>,
    pub status: CheckStatus,
}

impl CheckOutcome {
    pub fn new(check_name: impl Into<String>, timestamp: DateTime<Utc>, status: CheckStatus) -> Self {
        Self {
            check_name: check_name.into(),
            timestamp,
            status,
        }
    }
}

/// Clear-rate aggregate over the half-open interval `[start, end)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateWindow {
    pub check_name: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub total_count: u64,
    pub pass_count: u64,
}

impl RateWindow {
    pub fn empty(check_name: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            check_name: check_name.to_string(),
            start,
            end,
            total_count: 0,
            pass_count: 0,
        }
    }

    /// Fraction of `Clear` outcomes. `None` when nothing was observed.
    pub fn rate(&self) -> Option<f64> {
        if self.total_count == 0 {
            None
        } else {
            Some(self.pass_count as f64 / self.total_count as f64)
        }
    }

    pub fn has_data(&self) -> bool {
        self.total_count > 0
    }
}

/// Trailing reference rate for one check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub check_name: String,
    /// Mean of prior window rates; `None` when no history exists at all.
    pub rate: Option<f64>,
    pub window_count: usize,
    pub min_windows: usize,
}

impl Baseline {
    pub fn is_established(&self) -> bool {
        self.rate.is_some() && self.window_count >= self.min_windows
    }

    /// Rate usable for regression checks, only once established.
    pub fn established_rate(&self) -> Option<f64> {
        if self.is_established() {
            self.rate
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MEDIUM" => Ok(Severity::Medium),
            "HIGH" => Ok(Severity::High),
            other => Err(MonitorError::InvalidData(format!("unknown severity '{}'", other))),
        }
    }
}

/// Outcome of comparing a window against its baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "classification", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    Ok {
        current_rate: f64,
        baseline_rate: f64,
    },
    Regressed {
        current_rate: f64,
        baseline_rate: f64,
        severity: Severity,
    },
    InsufficientData {
        reason: InsufficientReason,
    },
}

impl Classification {
    pub fn is_regressed(&self) -> bool {
        matches!(self, Classification::Regressed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Classification::Ok { .. } => "OK",
            Classification::Regressed { .. } => "REGRESSED",
            Classification::InsufficientData { .. } => "INSUFFICIENT_DATA",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsufficientReason {
    /// The window under evaluation had zero observations
    NoObservations,
    /// Fewer than `min_windows` historical windows exist
    BaselineNotEstablished,
}

/// A detected regression ready for delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub check_name: String,
    pub current_rate: f64,
    pub baseline_rate: f64,
    pub severity: Severity,
    pub detected_at: DateTime<Utc>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

impl Alert {
    /// Absolute drop in percentage points (as a fraction)
    pub fn drop(&self) -> f64 {
        self.baseline_rate - self.current_rate
    }

    pub fn title(&self) -> String {
        format!("[{}] {} clear rate regressed", self.severity, self.check_name)
    }

    pub fn message(&self) -> String {
        format!(
            "{} clear rate {:.1}% vs baseline {:.1}% (-{:.1} pts) for window {} to {}",
            self.check_name,
            self.current_rate * 100.0,
            self.baseline_rate * 100.0,
            self.drop() * 100.0,
            self.window_start.format("%Y-%m-%d %H:%M"),
            self.window_end.format("%Y-%m-%d %H:%M"),
        )
    }
}

/// Per-check lifecycle of the dispatcher state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckState {
    #[default]
    ColdStart,
    Ok,
    Regressed,
    InsufficientData,
}

impl CheckState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckState::ColdStart => "COLD_START",
            CheckState::Ok => "OK",
            CheckState::Regressed => "REGRESSED",
            CheckState::InsufficientData => "INSUFFICIENT_DATA",
        }
    }
}

impl FromStr for CheckState {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "COLD_START" => Ok(CheckState::ColdStart),
            "OK" => Ok(CheckState::Ok),
            "REGRESSED" => Ok(CheckState::Regressed),
            "INSUFFICIENT_DATA" => Ok(CheckState::InsufficientData),
            other => Err(MonitorError::InvalidData(format!("unknown check state '{}'", other))),
        }
    }
}

/// Dispatcher state persisted between ticks
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AlertState {
    pub state: CheckState,
    pub last_alert_at: Option<DateTime<Utc>>,
    pub last_severity: Option<Severity>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn window(total: u64, pass: u64) -> RateWindow {
        let start = Utc.with_ymd_and_hms(2017, 10, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2017, 10, 1, 1, 0, 0).unwrap();
        RateWindow {
            check_name: "image_integrity_result".to_string(),
            start,
            end,
            total_count: total,
            pass_count: pass,
        }
    }

    #[test]
    fn test_rate_is_undefined_without_observations() {
        assert_eq!(window(0, 0).rate(), None);
        assert!(!window(0, 0).has_data());
    }

    #[test]
    fn test_rate_bounds() {
        for total in 1..50u64 {
            for pass in 0..=total {
                let rate = window(total, pass).rate().unwrap();
                assert!((0.0..=1.0).contains(&rate));
            }
        }
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("clear".parse::<CheckStatus>().unwrap(), CheckStatus::Clear);
        assert_eq!(" Consider ".parse::<CheckStatus>().unwrap(), CheckStatus::Consider);
        assert!("rejected".parse::<CheckStatus>().is_err());
        assert!(CheckStatus::Clear.is_pass());
        assert!(!CheckStatus::Unidentified.is_pass());
    }

    #[test]
    fn test_baseline_established() {
        let mut baseline = Baseline {
            check_name: "face_comparison_result".to_string(),
            rate: Some(0.97),
            window_count: 6,
            min_windows: 7,
        };
        assert!(!baseline.is_established());
        assert_eq!(baseline.established_rate(), None);

        baseline.window_count = 7;
        assert_eq!(baseline.established_rate(), Some(0.97));
    }

    #[test]
    fn test_classification_serializes_with_tag() {
        let c = Classification::Regressed {
            current_rate: 0.62,
            baseline_rate: 0.95,
            severity: Severity::High,
        };
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["classification"], "REGRESSED");
        assert_eq!(json["severity"], "HIGH");
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::High > Severity::Medium);
    }
}
