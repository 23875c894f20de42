//! Alert Dispatcher
//!
//! Per-check cool-down state machine in front of an external alert sink.
//!
//! ```text
//! COLD_START -> OK <-> REGRESSED
//!               OK / REGRESSED -> INSUFFICIENT_DATA -> OK / REGRESSED
//! ```

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use monitor_core::{Alert, AlertSink, AlertState, CheckState, Classification, RateWindow};
use serde::{Deserialize, Serialize};

/// Result of a single delivery attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered,
    Failed(String),
    TimedOut,
}

pub struct AlertDispatcher {
    cooldown: Duration,
    states: DashMap<String, AlertState>,
}

impl AlertDispatcher {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            states: DashMap::new(),
        }
    }

    /// Seed a check's state, e.g. from persisted storage
    pub fn restore(&self, check_name: &str, state: AlertState) {
        self.states.insert(check_name.to_string(), state);
    }

    pub fn state(&self, check_name: &str) -> AlertState {
        self.states
            .get(check_name)
            .map(|s| s.value().clone())
            .unwrap_or_default()
    }

    /// Advance the state machine and decide whether an alert fires.
    ///
    /// A regression fires immediately when the check was not already
    /// regressed. A sustained regression fires again only once the cool-down
    /// has elapsed since the last alert, or when its severity escalates.
    pub fn observe(
        &self,
        window: &RateWindow,
        classification: &Classification,
        now: DateTime<Utc>,
    ) -> Option<Alert> {
        let mut entry = self.states.entry(window.check_name.clone()).or_default();
        let previous = entry.state;

        match classification {
            Classification::Ok { .. } => {
                entry.state = CheckState::Ok;
                None
            }
            Classification::InsufficientData { reason } => {
                // Cold start is only left once a baseline is established
                entry.state = if previous == CheckState::ColdStart {
                    CheckState::ColdStart
                } else {
                    tracing::debug!(
                        "{} has insufficient data ({:?})",
                        window.check_name,
                        reason
                    );
                    CheckState::InsufficientData
                };
                None
            }
            Classification::Regressed {
                current_rate,
                baseline_rate,
                severity,
            } => {
                entry.state = CheckState::Regressed;

                let fire = if previous != CheckState::Regressed {
                    true
                } else {
                    let cooled_down = entry
                        .last_alert_at
                        .map(|at| now - at >= self.cooldown)
                        .unwrap_or(true);
                    let escalated = entry
                        .last_severity
                        .map(|last| *severity > last)
                        .unwrap_or(true);
                    cooled_down || escalated
                };

                if !fire {
                    tracing::debug!(
                        "Suppressing {} alert for {} (cool-down until {:?})",
                        severity,
                        window.check_name,
                        entry.last_alert_at.map(|at| at + self.cooldown)
                    );
                    return None;
                }

                entry.last_alert_at = Some(now);
                entry.last_severity = Some(*severity);

                Some(Alert {
                    check_name: window.check_name.clone(),
                    current_rate: *current_rate,
                    baseline_rate: *baseline_rate,
                    severity: *severity,
                    detected_at: now,
                    window_start: window.start,
                    window_end: window.end,
                })
            }
        }
    }

    /// One best-effort delivery attempt bounded by `timeout`. Never retried.
    pub async fn deliver(
        &self,
        sink: &dyn AlertSink,
        alert: &Alert,
        timeout: StdDuration,
    ) -> DeliveryOutcome {
        match tokio::time::timeout(timeout, sink.submit(alert)).await {
            Ok(Ok(())) => {
                tracing::info!(
                    "Dispatched {} alert for {} via {}",
                    alert.severity,
                    alert.check_name,
                    sink.name()
                );
                DeliveryOutcome::Delivered
            }
            Ok(Err(e)) => {
                tracing::error!(
                    "Failed to deliver {} alert for {} via {}: {}",
                    alert.severity,
                    alert.check_name,
                    sink.name(),
                    e
                );
                DeliveryOutcome::Failed(e.to_string())
            }
            Err(_) => {
                tracing::error!(
                    "Alert delivery for {} via {} timed out after {:?}",
                    alert.check_name,
                    sink.name(),
                    timeout
                );
                DeliveryOutcome::TimedOut
            }
        }
    }
}
