use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use crate::MonitorError;

/// Upper bounds keeping every derived duration and timestamp in range
const MAX_LOOKBACK_DAYS: i64 = 3650;
const MAX_COOLDOWN_MINUTES: i64 = MAX_LOOKBACK_DAYS * 24 * 60;
const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    // Baseline tracker
    pub lookback_days: i64, // 7
    pub min_windows: usize, // 24

    // Regression detector (absolute drop, fraction of 1.0)
    pub threshold: f64,               // 0.10
    pub high_severity_threshold: f64, // 0.20

    // Alert dispatcher
    pub cooldown_minutes: i64, // 60

    // Rate aggregator
    pub window_minutes: i64, // 60

    // Tick execution
    pub collaborator_timeout_secs: u64, // 30
    pub tick_deadline_secs: u64,        // 300
    pub max_parallel_checks: usize,     // 8

    pub database_url: String,
    pub print_report: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            lookback_days: 7,
            min_windows: 24,
            threshold: 0.10,
            high_severity_threshold: 0.20,
            cooldown_minutes: 60,
            window_minutes: 60,
            collaborator_timeout_secs: 30,
            tick_deadline_secs: 300,
            max_parallel_checks: 8,
            database_url: "sqlite:kyc_monitor.db".to_string(),
            print_report: false,
        }
    }
}

impl MonitorConfig {
    /// Load from environment variables, then validate.
    pub fn from_env() -> Result<Self, MonitorError> {
        let defaults = Self::default();
        let config = Self {
            lookback_days: env_or("LOOKBACK_DAYS", defaults.lookback_days)?,
            min_windows: env_or("MIN_WINDOWS", defaults.min_windows)?,
            threshold: env_or("REGRESSION_THRESHOLD", defaults.threshold)?,
            high_severity_threshold: env_or(
                "HIGH_SEVERITY_THRESHOLD",
                defaults.high_severity_threshold,
            )?,
            cooldown_minutes: env_or("ALERT_COOLDOWN_MINUTES", defaults.cooldown_minutes)?,
            window_minutes: env_or("WINDOW_MINUTES", defaults.window_minutes)?,
            collaborator_timeout_secs: env_or(
                "COLLABORATOR_TIMEOUT_SECS",
                defaults.collaborator_timeout_secs,
            )?,
            tick_deadline_secs: env_or("TICK_DEADLINE_SECS", defaults.tick_deadline_secs)?,
            max_parallel_checks: env_or("MAX_PARALLEL_CHECKS", defaults.max_parallel_checks)?,
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            print_report: env_or("MONITOR_PRINT_REPORT", defaults.print_report)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make every evaluation meaningless.
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.min_windows == 0 {
            return Err(MonitorError::Config("MIN_WINDOWS must be at least 1".into()));
        }
        if !(1..=MAX_LOOKBACK_DAYS).contains(&self.lookback_days) {
            return Err(MonitorError::Config(format!(
                "LOOKBACK_DAYS must be within [1, {}], got {}",
                MAX_LOOKBACK_DAYS, self.lookback_days
            )));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(MonitorError::Config(format!(
                "REGRESSION_THRESHOLD must be within [0, 1], got {}",
                self.threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.high_severity_threshold) {
            return Err(MonitorError::Config(format!(
                "HIGH_SEVERITY_THRESHOLD must be within [0, 1], got {}",
                self.high_severity_threshold
            )));
        }
        if self.high_severity_threshold < self.threshold {
            return Err(MonitorError::Config(format!(
                "HIGH_SEVERITY_THRESHOLD ({}) must not be below REGRESSION_THRESHOLD ({})",
                self.high_severity_threshold, self.threshold
            )));
        }
        if !(0..=MAX_COOLDOWN_MINUTES).contains(&self.cooldown_minutes) {
            return Err(MonitorError::Config(format!(
                "ALERT_COOLDOWN_MINUTES must be within [0, {}], got {}",
                MAX_COOLDOWN_MINUTES, self.cooldown_minutes
            )));
        }
        if self.window_minutes <= 0 {
            return Err(MonitorError::Config("WINDOW_MINUTES must be positive".into()));
        }
        if self.window_minutes > self.lookback_days * 24 * 60 {
            return Err(MonitorError::Config(
                "WINDOW_MINUTES must fit inside the lookback horizon".into(),
            ));
        }
        for (key, secs) in [
            ("COLLABORATOR_TIMEOUT_SECS", self.collaborator_timeout_secs),
            ("TICK_DEADLINE_SECS", self.tick_deadline_secs),
        ] {
            if !(1..=MAX_TIMEOUT_SECS).contains(&secs) {
                return Err(MonitorError::Config(format!(
                    "{} must be within [1, {}], got {}",
                    key, MAX_TIMEOUT_SECS, secs
                )));
            }
        }
        if self.max_parallel_checks == 0 {
            return Err(MonitorError::Config("MAX_PARALLEL_CHECKS must be at least 1".into()));
        }
        Ok(())
    }

    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.window_minutes)
    }

    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::days(self.lookback_days)
    }

    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.cooldown_minutes)
    }

    pub fn collaborator_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.collaborator_timeout_secs)
    }

    pub fn tick_deadline(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.tick_deadline_secs)
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T, MonitorError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| MonitorError::Config(format!("{} has invalid value '{}': {}", key, raw, e))),
        _ => Ok(default),
    }
}
