use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use monitor_core::MonitorConfig;
use notification_service::{NotificationConfig, NotificationService};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use subcheck_monitor::{SqliteStore, SubCheckMonitor, TickReport};

fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(filter()).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter()).init();
    }
}

async fn connect_store(config: &MonitorConfig) -> Result<SqliteStore> {
    let options = SqliteConnectOptions::from_str(&config.database_url)
        .with_context(|| format!("Invalid DATABASE_URL {}", config.database_url))?
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_parallel_checks.max(1) as u32)
        .acquire_timeout(config.collaborator_timeout())
        .connect_with(options)
        .await
        .context("Failed to open state database")?;

    let store = SqliteStore::new(pool);
    store.ping().await?;
    store.init_tables().await?;
    Ok(store)
}

fn log_summary(report: &TickReport) {
    for alert in report.alerts() {
        tracing::warn!("{}", alert.message());
    }
    for failure in &report.failures {
        tracing::error!("{} not evaluated: {}", failure.check_name, failure.error);
    }
    for check in report.health.worst_first() {
        tracing::info!(
            "  {:<40} {:<9} current {:>7} baseline {:>7} ({} windows)",
            check.check_name,
            check.status.as_str(),
            format_rate(check.current_rate),
            format_rate(check.baseline_rate),
            check.baseline_windows
        );
    }
}

fn format_rate(rate: Option<f64>) -> String {
    rate.map(|r| format!("{:.1}%", r * 100.0))
        .unwrap_or_else(|| "n/a".to_string())
}

async fn run() -> Result<ExitCode> {
    // 1. Configuration
    let config = MonitorConfig::from_env().context("Invalid monitor configuration")?;
    tracing::info!("Configuration loaded and validated");
    tracing::info!(
        "  Window: {} min, lookback: {} days, min windows: {}",
        config.window_minutes,
        config.lookback_days,
        config.min_windows
    );
    tracing::info!(
        "  Threshold: {:.1} pts (high severity at {:.1} pts), cool-down: {} min",
        config.threshold * 100.0,
        config.high_severity_threshold * 100.0,
        config.cooldown_minutes
    );

    // 2. Outcome source and state store
    let store = match connect_store(&config).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!("State store unreachable: {:#}", e);
            return Ok(ExitCode::FAILURE);
        }
    };
    tracing::info!("State store ready ({})", config.database_url);

    // 3. Alert sink
    let notifications = Arc::new(NotificationService::new(&NotificationConfig::from_env()));
    tracing::info!(
        "Alert channels: {}",
        notifications.channel_names().join(", ")
    );

    // 4. One evaluation tick
    let print_report = config.print_report;
    let monitor =
        SubCheckMonitor::new(config, store.clone(), notifications).with_store(store);

    let report = match monitor.run_tick(Utc::now()).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("Tick aborted: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    log_summary(&report);
    if print_report {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize tick report")?
        );
    }

    if report.is_clean() {
        Ok(ExitCode::SUCCESS)
    } else {
        tracing::error!(
            "{} checks failed because a collaborator was unreachable",
            report.failures.iter().filter(|f| f.unreachable).count()
        );
        Ok(ExitCode::FAILURE)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    // Panic hook: log panic info before crashing
    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    tracing::info!("Starting KYC sub-check regression monitor");

    match run().await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
