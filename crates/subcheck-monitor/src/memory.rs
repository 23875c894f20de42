//! In-memory collaborators for local runs and tests

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use monitor_core::{
    Alert, AlertSink, AlertState, CheckOutcome, MonitorError, OutcomeSource, StateStore,
};
use tokio::sync::Mutex;

#[derive(Default)]
pub struct InMemoryOutcomeSource {
    outcomes: Mutex<Vec<CheckOutcome>>,
}

impl InMemoryOutcomeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, outcome: CheckOutcome) {
        self.outcomes.lock().await.push(outcome);
    }

    pub async fn extend(&self, outcomes: impl IntoIterator<Item = CheckOutcome>) {
        self.outcomes.lock().await.extend(outcomes);
    }
}

#[async_trait]
impl OutcomeSource for InMemoryOutcomeSource {
    async fn list_checks(&self) -> Result<Vec<String>, MonitorError> {
        let outcomes = self.outcomes.lock().await;
        let names: BTreeSet<&str> = outcomes.iter().map(|o| o.check_name.as_str()).collect();
        Ok(names.into_iter().map(str::to_string).collect())
    }

    async fn fetch_outcomes(
        &self,
        check_name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CheckOutcome>, MonitorError> {
        let outcomes = self.outcomes.lock().await;
        Ok(outcomes
            .iter()
            .filter(|o| o.check_name == check_name && o.timestamp >= start && o.timestamp < end)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryStateStore {
    history: Mutex<HashMap<String, Vec<(DateTime<Utc>, f64)>>>,
    alert_states: Mutex<HashMap<String, AlertState>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn history_len(&self, check_name: &str) -> usize {
        self.history
            .lock()
            .await
            .get(check_name)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn load_history(
        &self,
        check_name: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, f64)>, MonitorError> {
        let history = self.history.lock().await;
        Ok(history
            .get(check_name)
            .map(|entries| entries.iter().filter(|(end, _)| *end > since).copied().collect())
            .unwrap_or_default())
    }

    async fn append_window(
        &self,
        check_name: &str,
        window_end: DateTime<Utc>,
        rate: f64,
        prune_before: DateTime<Utc>,
    ) -> Result<(), MonitorError> {
        let mut history = self.history.lock().await;
        let entries = history.entry(check_name.to_string()).or_default();
        if !entries.iter().any(|(end, _)| *end == window_end) {
            entries.push((window_end, rate));
        }
        entries.retain(|(end, _)| *end >= prune_before);
        Ok(())
    }

    async fn load_alert_state(&self, check_name: &str) -> Result<Option<AlertState>, MonitorError> {
        Ok(self.alert_states.lock().await.get(check_name).cloned())
    }

    async fn save_alert_state(&self, check_name: &str, state: &AlertState) -> Result<(), MonitorError> {
        self.alert_states
            .lock()
            .await
            .insert(check_name.to_string(), state.clone());
        Ok(())
    }
}

/// Sink that keeps every submitted alert
#[derive(Default)]
pub struct RecordingSink {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().await.clone()
    }
}

#[async_trait]
impl AlertSink for RecordingSink {
    async fn submit(&self, alert: &Alert) -> Result<(), MonitorError> {
        tracing::info!("{}", alert.message());
        self.alerts.lock().await.push(alert.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}
