use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crate::{Alert, AlertState, CheckOutcome, MonitorError};

/// Source of recorded sub-check outcomes, queried by time range
#[async_trait]
pub trait OutcomeSource: Send + Sync {
    /// Checks that have produced outcomes and should be evaluated
    async fn list_checks(&self) -> Result<Vec<String>, MonitorError>;

    /// Outcomes for `check_name` with `start <= timestamp < end`
    async fn fetch_outcomes(
        &self,
        check_name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CheckOutcome>, MonitorError>;
}

/// Persistence for baseline history and dispatcher state across runs
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Window rates ending after `since`, oldest first
    async fn load_history(
        &self,
        check_name: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, f64)>, MonitorError>;

    /// Append a closed window and drop entries older than `prune_before`
    async fn append_window(
        &self,
        check_name: &str,
        window_end: DateTime<Utc>,
        rate: f64,
        prune_before: DateTime<Utc>,
    ) -> Result<(), MonitorError>;

    async fn load_alert_state(&self, check_name: &str) -> Result<Option<AlertState>, MonitorError>;

    async fn save_alert_state(&self, check_name: &str, state: &AlertState) -> Result<(), MonitorError>;
}

/// Destination for regression alerts. Submission is a single delivery attempt.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn submit(&self, alert: &Alert) -> Result<(), MonitorError>;
    fn name(&self) -> &str;
}
