//! Regression Detector
//!
//! Classifies a window against its baseline using an absolute drop in
//! clear rate.

use monitor_core::{Baseline, Classification, InsufficientReason, RateWindow, Severity};

#[derive(Debug, Clone, Copy)]
pub struct RegressionDetector {
    /// Drop (fraction of 1.0) beyond which a window is regressed
    threshold: f64,
    /// Drop at or beyond which a regression is `High` severity
    high_severity_threshold: f64,
}

impl Default for RegressionDetector {
    fn default() -> Self {
        Self::new(0.10, 0.20)
    }
}

impl RegressionDetector {
    pub fn new(threshold: f64, high_severity_threshold: f64) -> Self {
        Self {
            threshold,
            high_severity_threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Classify the current window against an established baseline.
    pub fn classify(&self, current: &RateWindow, baseline: &Baseline) -> Classification {
        let Some(current_rate) = current.rate() else {
            return Classification::InsufficientData {
                reason: InsufficientReason::NoObservations,
            };
        };
        let Some(baseline_rate) = baseline.established_rate() else {
            return Classification::InsufficientData {
                reason: InsufficientReason::BaselineNotEstablished,
            };
        };

        self.classify_rates(current_rate, baseline_rate)
    }

    /// Compare two rates directly. Equality with `baseline - threshold` is OK.
    pub fn classify_rates(&self, current_rate: f64, baseline_rate: f64) -> Classification {
        // A check that always failed cannot regress further
        if baseline_rate <= 0.0 {
            return Classification::Ok {
                current_rate,
                baseline_rate,
            };
        }

        if current_rate < baseline_rate - self.threshold {
            Classification::Regressed {
                current_rate,
                baseline_rate,
                severity: self.severity(baseline_rate - current_rate),
            }
        } else {
            Classification::Ok {
                current_rate,
                baseline_rate,
            }
        }
    }

    fn severity(&self, drop: f64) -> Severity {
        if drop >= self.high_severity_threshold {
            Severity::High
        } else {
            Severity::Medium
        }
    }
}
