//! Sub-Check Regression Monitor
//!
//! Runs one evaluation tick: for every check, aggregate the last closed
//! window, compare it with the trailing baseline, update history and
//! dispatch deduplicated alerts.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use futures_util::stream::{self, StreamExt};
use monitor_core::{
    Alert, AlertSink, Baseline, Classification, MonitorConfig, MonitorError, OutcomeSource,
    RateWindow, StateStore,
};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::aggregator::RateAggregator;
use crate::baseline::BaselineTracker;
use crate::detector::RegressionDetector;
use crate::dispatcher::{AlertDispatcher, DeliveryOutcome};
use crate::health_report::{HealthReport, HealthReportBuilder};

/// Result of evaluating one check in a tick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckEvaluation {
    pub window: RateWindow,
    pub baseline: Baseline,
    pub classification: Classification,
    pub baseline_updated: bool,
    pub alert: Option<Alert>,
    pub delivery: Option<DeliveryOutcome>,
}

/// A check whose evaluation was aborted by a collaborator failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckFailure {
    pub check_name: String,
    pub error: String,
    /// Outcome source or state store could not be reached
    pub unreachable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickReport {
    pub evaluated_at: DateTime<Utc>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub evaluations: Vec<CheckEvaluation>,
    pub failures: Vec<CheckFailure>,
    /// Checks skipped because the tick deadline elapsed
    pub not_evaluated: Vec<String>,
    pub health: HealthReport,
}

impl TickReport {
    /// Clean unless the outcome source or state store was unreachable
    pub fn is_clean(&self) -> bool {
        !self.failures.iter().any(|f| f.unreachable)
    }

    pub fn alerts(&self) -> impl Iterator<Item = &Alert> {
        self.evaluations.iter().filter_map(|e| e.alert.as_ref())
    }

    pub fn evaluation(&self, check_name: &str) -> Option<&CheckEvaluation> {
        self.evaluations
            .iter()
            .find(|e| e.window.check_name == check_name)
    }
}

enum CheckResult {
    Evaluated(CheckEvaluation),
    Failed(CheckFailure),
    Skipped,
}

pub struct SubCheckMonitor {
    config: MonitorConfig,
    aggregator: RateAggregator,
    baselines: BaselineTracker,
    detector: RegressionDetector,
    dispatcher: AlertDispatcher,
    source: Arc<dyn OutcomeSource>,
    store: Option<Arc<dyn StateStore>>,
    sink: Arc<dyn AlertSink>,
    hydrated: DashSet<String>,
}

impl SubCheckMonitor {
    /// Create a monitor. The configuration must already be validated.
    pub fn new(
        config: MonitorConfig,
        source: Arc<dyn OutcomeSource>,
        sink: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            aggregator: RateAggregator::new(config.window()),
            baselines: BaselineTracker::new(config.lookback(), config.min_windows),
            detector: RegressionDetector::new(config.threshold, config.high_severity_threshold),
            dispatcher: AlertDispatcher::new(config.cooldown()),
            config,
            source,
            store: None,
            sink,
            hydrated: DashSet::new(),
        }
    }

    /// Persist baselines and cool-down state across process restarts
    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn baselines(&self) -> &BaselineTracker {
        &self.baselines
    }

    pub fn dispatcher(&self) -> &AlertDispatcher {
        &self.dispatcher
    }

    /// Run one evaluation pass as of `now`.
    ///
    /// Fails only when the set of checks cannot be listed. Per-check
    /// collaborator failures are reported in the returned [`TickReport`].
    pub async fn run_tick(&self, now: DateTime<Utc>) -> Result<TickReport, MonitorError> {
        let timeout = self.config.collaborator_timeout();
        let deadline = Instant::now() + self.config.tick_deadline();
        let (window_start, window_end) = self.aggregator.closed_window(now);

        let checks = with_timeout("list_checks", timeout, self.source.list_checks()).await?;
        tracing::info!(
            "Evaluating {} checks for window {} to {}",
            checks.len(),
            window_start,
            window_end
        );

        let mut results = stream::iter(checks.iter().cloned())
            .map(|check| async move {
                let result = self.evaluate_check(&check, now, deadline).await;
                (check, result)
            })
            .buffer_unordered(self.config.max_parallel_checks);

        let mut finished = HashSet::new();
        let mut evaluations = Vec::new();
        let mut failures = Vec::new();

        while let Some((check, result)) = results.next().await {
            match result {
                CheckResult::Evaluated(evaluation) => {
                    finished.insert(check);
                    evaluations.push(evaluation);
                }
                CheckResult::Failed(failure) => {
                    finished.insert(check);
                    failures.push(failure);
                }
                CheckResult::Skipped => {}
            }
        }

        let mut not_evaluated: Vec<String> = checks
            .iter()
            .filter(|c| !finished.contains(*c))
            .cloned()
            .collect();
        not_evaluated.sort();
        if !not_evaluated.is_empty() {
            tracing::warn!(
                "Tick deadline of {:?} exceeded; {} checks not evaluated: {}",
                self.config.tick_deadline(),
                not_evaluated.len(),
                not_evaluated.join(", ")
            );
        }

        evaluations.sort_by(|a, b| a.window.check_name.cmp(&b.window.check_name));
        failures.sort_by(|a, b| a.check_name.cmp(&b.check_name));

        let mut health = HealthReportBuilder::new(self.config.threshold);
        for evaluation in &evaluations {
            health.add_check(
                &evaluation.window,
                &evaluation.baseline,
                &evaluation.classification,
            );
        }

        let report = TickReport {
            evaluated_at: now,
            window_start,
            window_end,
            evaluations,
            failures,
            not_evaluated,
            health: health.build(now),
        };

        tracing::info!(
            "Tick complete: {} evaluated, {} alerts, {} failed, {} not evaluated",
            report.evaluations.len(),
            report.alerts().count(),
            report.failures.len(),
            report.not_evaluated.len()
        );

        Ok(report)
    }

    async fn evaluate_check(
        &self,
        check_name: &str,
        now: DateTime<Utc>,
        deadline: Instant,
    ) -> CheckResult {
        if Instant::now() >= deadline {
            return CheckResult::Skipped;
        }

        match self.try_evaluate_check(check_name, now, deadline).await {
            Ok(Some(evaluation)) => CheckResult::Evaluated(evaluation),
            Ok(None) => CheckResult::Skipped,
            Err(e) => {
                tracing::error!("Evaluation of {} aborted: {}", check_name, e);
                CheckResult::Failed(CheckFailure {
                    check_name: check_name.to_string(),
                    unreachable: e.is_collaborator_unreachable(),
                    error: e.to_string(),
                })
            }
        }
    }

    /// Returns `Ok(None)` when the deadline passed before any state changed.
    async fn try_evaluate_check(
        &self,
        check_name: &str,
        now: DateTime<Utc>,
        deadline: Instant,
    ) -> Result<Option<CheckEvaluation>, MonitorError> {
        let timeout = self.config.collaborator_timeout();
        let (start, end) = self.aggregator.closed_window(now);

        self.hydrate(check_name, start).await?;

        let outcomes = with_timeout(
            "fetch_outcomes",
            timeout,
            self.source.fetch_outcomes(check_name, start, end),
        )
        .await?;

        // Nothing below may be interrupted by the deadline
        if Instant::now() >= deadline {
            return Ok(None);
        }

        let window = self.aggregator.aggregate(check_name, &outcomes, start, end);
        let baseline = self.baselines.baseline(check_name, start);
        let classification = self.detector.classify(&window, &baseline);

        tracing::debug!(
            "{}: {} (rate {:?}, baseline {:?} over {} windows)",
            check_name,
            classification.label(),
            window.rate(),
            baseline.rate,
            baseline.window_count
        );

        let baseline_updated = self.update_baseline(&window).await?;

        let previous_state = self.dispatcher.state(check_name);
        let alert = self.dispatcher.observe(&window, &classification, now);
        let current_state = self.dispatcher.state(check_name);

        if current_state != previous_state {
            if let Some(store) = &self.store {
                let saved = with_timeout(
                    "save_alert_state",
                    timeout,
                    store.save_alert_state(check_name, &current_state),
                )
                .await;
                if let Err(e) = saved {
                    self.dispatcher.restore(check_name, previous_state);
                    return Err(e);
                }
            }
        }

        let delivery = match &alert {
            Some(alert) => Some(self.dispatcher.deliver(self.sink.as_ref(), alert, timeout).await),
            None => None,
        };

        Ok(Some(CheckEvaluation {
            window,
            baseline,
            classification,
            baseline_updated,
            alert,
            delivery,
        }))
    }

    /// Append a non-empty window to persisted and in-memory history.
    ///
    /// The store is written first so a failure leaves both untouched.
    async fn update_baseline(&self, window: &RateWindow) -> Result<bool, MonitorError> {
        let Some(rate) = window.rate() else {
            return Ok(false);
        };
        if self
            .baselines
            .latest(&window.check_name)
            .is_some_and(|latest| window.end <= latest)
        {
            return Ok(false);
        }

        if let Some(store) = &self.store {
            with_timeout(
                "append_window",
                self.config.collaborator_timeout(),
                store.append_window(
                    &window.check_name,
                    window.end,
                    rate,
                    window.end - self.baselines.lookback(),
                ),
            )
            .await?;
        }

        Ok(self.baselines.record(&window.check_name, window.end, rate))
    }

    /// Load persisted history and cool-down state the first time a check is seen
    async fn hydrate(&self, check_name: &str, window_start: DateTime<Utc>) -> Result<(), MonitorError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        if self.hydrated.contains(check_name) {
            return Ok(());
        }

        let timeout = self.config.collaborator_timeout();
        let since = window_start - self.baselines.lookback();
        let history = with_timeout("load_history", timeout, store.load_history(check_name, since)).await?;
        let alert_state =
            with_timeout("load_alert_state", timeout, store.load_alert_state(check_name)).await?;

        tracing::debug!(
            "Hydrated {} with {} historical windows",
            check_name,
            history.len()
        );
        self.baselines.restore(check_name, history);
        if let Some(state) = alert_state {
            self.dispatcher.restore(check_name, state);
        }
        self.hydrated.insert(check_name.to_string());
        Ok(())
    }
}

async fn with_timeout<T>(
    operation: &str,
    timeout: StdDuration,
    fut: impl Future<Output = Result<T, MonitorError>>,
) -> Result<T, MonitorError> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(MonitorError::Timeout {
            operation: operation.to_string(),
            seconds: timeout.as_secs(),
        }),
    }
}
