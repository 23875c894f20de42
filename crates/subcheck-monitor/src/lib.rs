//! Sub-Check Regression Monitor
//!
//! Tracks the clear rate of KYC sub-checks over closed windows and alerts
//! when it drops below a trailing baseline.

pub mod aggregator;
pub mod baseline;
pub mod detector;
pub mod dispatcher;
pub mod health_report;
pub mod memory;
pub mod monitor;
pub mod store;


pub use aggregator::RateAggregator;
pub use baseline::BaselineTracker;
pub use detector::RegressionDetector;
pub use dispatcher::{AlertDispatcher, DeliveryOutcome};
pub use health_report::{CheckHealth, HealthReport, HealthReportBuilder, HealthStatus};
pub use memory::{InMemoryOutcomeSource, InMemoryStateStore, RecordingSink};
pub use monitor::{CheckEvaluation, CheckFailure, SubCheckMonitor, TickReport};
pub use store::SqliteStore;
