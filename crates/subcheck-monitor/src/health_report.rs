//! Sub-Check Health Reporting
//!
//! Dashboard-style summary of each check: current window against baseline,
//! the difference in points and a coarse status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use monitor_core::{Baseline, Classification, RateWindow};

/// Health status classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Clear rate is in line with the baseline
    Healthy,
    /// Clear rate rose noticeably above the baseline
    Improving,
    /// Clear rate dropped, but not past the regression threshold
    Warning,
    /// Clear rate regressed past the threshold
    Critical,
    /// No observations or no established baseline
    Unknown,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Improving => "improving",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
            HealthStatus::Unknown => "unknown",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "#3fb950",
            HealthStatus::Improving => "#1f6feb",
            HealthStatus::Warning => "#f5a623",
            HealthStatus::Critical => "#f55459",
            HealthStatus::Unknown => "#6e7781",
        }
    }

    /// `watch_margin` is the smallest move (either way) worth flagging
    pub fn from_classification(classification: &Classification, watch_margin: f64) -> Self {
        match classification {
            Classification::Regressed { .. } => HealthStatus::Critical,
            Classification::InsufficientData { .. } => HealthStatus::Unknown,
            Classification::Ok {
                current_rate,
                baseline_rate,
            } => {
                let difference = current_rate - baseline_rate;
                if difference < -watch_margin {
                    HealthStatus::Warning
                } else if difference > watch_margin {
                    HealthStatus::Improving
                } else {
                    HealthStatus::Healthy
                }
            }
        }
    }
}

/// Health of one check for one evaluated window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckHealth {
    pub check_name: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub total_count: u64,
    pub current_rate: Option<f64>,
    pub baseline_rate: Option<f64>,
    pub baseline_windows: usize,
    /// `current - baseline` in percentage points
    pub difference_pts: Option<f64>,
    pub classification: Classification,
    pub status: HealthStatus,
}

/// Health summary across all checks evaluated in a tick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub checks: Vec<CheckHealth>,
    pub generated_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn count(&self, status: HealthStatus) -> usize {
        self.checks.iter().filter(|c| c.status == status).count()
    }

    /// Checks ordered worst first, as the dashboard lists them
    pub fn worst_first(&self) -> Vec<&CheckHealth> {
        let mut checks: Vec<&CheckHealth> = self.checks.iter().collect();
        checks.sort_by(|a, b| {
            let da = a.difference_pts.unwrap_or(f64::INFINITY);
            let db = b.difference_pts.unwrap_or(f64::INFINITY);
            da.total_cmp(&db).then_with(|| a.check_name.cmp(&b.check_name))
        });
        checks
    }
}

/// Builder for generating health reports
pub struct HealthReportBuilder {
    watch_margin: f64,
    checks: Vec<CheckHealth>,
}

impl HealthReportBuilder {
    /// Moves smaller than a fifth of the regression threshold count as noise.
    pub fn new(threshold: f64) -> Self {
        Self {
            watch_margin: threshold / 5.0,
            checks: Vec::new(),
        }
    }

    pub fn with_check(
        mut self,
        window: &RateWindow,
        baseline: &Baseline,
        classification: &Classification,
    ) -> Self {
        self.add_check(window, baseline, classification);
        self
    }

    pub fn add_check(
        &mut self,
        window: &RateWindow,
        baseline: &Baseline,
        classification: &Classification,
    ) {
        let current_rate = window.rate();
        let baseline_rate = baseline.rate;
        let difference_pts = match (current_rate, baseline.established_rate()) {
            (Some(current), Some(base)) => Some((current - base) * 100.0),
            _ => None,
        };

        self.checks.push(CheckHealth {
            check_name: window.check_name.clone(),
            window_start: window.start,
            window_end: window.end,
            total_count: window.total_count,
            current_rate,
            baseline_rate,
            baseline_windows: baseline.window_count,
            difference_pts,
            classification: classification.clone(),
            status: HealthStatus::from_classification(classification, self.watch_margin),
        });
    }

    /// `generated_at` is the evaluation time of the tick, not wall-clock time
    pub fn build(mut self, generated_at: DateTime<Utc>) -> HealthReport {
        self.checks.sort_by(|a, b| a.check_name.cmp(&b.check_name));
        HealthReport {
            checks: self.checks,
            generated_at,
        }
    }
}
