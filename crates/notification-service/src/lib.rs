mod discord;
mod smtp;
mod templates;

pub use discord::DiscordWebhookNotifier;
pub use smtp::SmtpNotifier;
pub use templates::EmailTemplate;

use std::sync::Arc;

use async_trait::async_trait;
use monitor_core::{Alert, AlertSink, MonitorError, Severity};

/// Trait for notification channels.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, alert: &Alert) -> Result<(), NotificationError>;
    fn name(&self) -> &str;
}

/// Errors from the notification system.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("SMTP error: {0}")]
    Smtp(String),
    #[error("Discord webhook error: {0}")]
    Discord(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Configuration for the notification service.
#[derive(Debug, Clone, Default)]
pub struct NotificationConfig {
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: Option<String>,
    pub smtp_to: Vec<String>,
    pub smtp_tls: SmtpTls,
    pub discord_webhook_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SmtpTls {
    #[default]
    StartTls,
    Tls,
    None,
}

impl SmtpTls {
    fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "tls" => SmtpTls::Tls,
            "none" => SmtpTls::None,
            _ => SmtpTls::StartTls,
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

/// Comma-separated recipient list, blanks dropped
fn parse_recipients(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl NotificationConfig {
    /// Load from environment variables.
    pub fn from_env() -> Self {
        Self {
            smtp_host: non_empty_var("SMTP_HOST"),
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(587),
            smtp_username: non_empty_var("SMTP_USERNAME"),
            smtp_password: non_empty_var("SMTP_PASSWORD"),
            smtp_from: non_empty_var("SMTP_FROM_ADDRESS"),
            smtp_to: parse_recipients(&std::env::var("NOTIFICATION_EMAIL_TO").unwrap_or_default()),
            smtp_tls: SmtpTls::parse(&std::env::var("SMTP_TLS").unwrap_or_default()),
            discord_webhook_url: non_empty_var("DISCORD_WEBHOOK_URL"),
        }
    }

    pub fn smtp_enabled(&self) -> bool {
        self.smtp_host.is_some() && self.smtp_from.is_some() && !self.smtp_to.is_empty()
    }
}

/// Writes alerts to the log. Used when no other channel is configured.
pub struct LogNotifier;

#[async_trait]
impl NotificationChannel for LogNotifier {
    async fn send(&self, alert: &Alert) -> Result<(), NotificationError> {
        match alert.severity {
            Severity::High => tracing::error!("{}: {}", alert.title(), alert.message()),
            Severity::Medium => tracing::warn!("{}: {}", alert.title(), alert.message()),
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Fans regression alerts out to every configured channel.
pub struct NotificationService {
    channels: Arc<Vec<Box<dyn NotificationChannel>>>,
}

impl NotificationService {
    pub fn new(config: &NotificationConfig) -> Self {
        let mut channels: Vec<Box<dyn NotificationChannel>> = Vec::new();

        if config.smtp_enabled() {
            match SmtpNotifier::new(config) {
                Ok(notifier) => {
                    tracing::info!(
                        "Email notifications enabled (SMTP -> {} recipients)",
                        config.smtp_to.len()
                    );
                    channels.push(Box::new(notifier));
                }
                Err(e) => {
                    tracing::warn!("Failed to initialize SMTP notifier: {}", e);
                }
            }
        }

        if let Some(ref webhook_url) = config.discord_webhook_url {
            channels.push(Box::new(DiscordWebhookNotifier::new(webhook_url.clone())));
            tracing::info!("Discord webhook notifications enabled");
        }

        if channels.is_empty() {
            tracing::info!(
                "No notification channels configured (set SMTP_HOST or DISCORD_WEBHOOK_URL); alerts go to the log"
            );
            channels.push(Box::new(LogNotifier));
        }

        Self::with_channels(channels)
    }

    pub fn with_channels(channels: Vec<Box<dyn NotificationChannel>>) -> Self {
        Self {
            channels: Arc::new(channels),
        }
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Send an alert once through every channel, awaiting completion.
    ///
    /// Every channel is attempted even when an earlier one fails; the
    /// returned errors name the channels that failed.
    pub async fn send_alert(&self, alert: &Alert) -> Vec<(String, NotificationError)> {
        let mut failures = Vec::new();
        for channel in self.channels.iter() {
            match channel.send(alert).await {
                Ok(()) => tracing::debug!("Sent notification via {}", channel.name()),
                Err(e) => {
                    tracing::warn!("Failed to send notification via {}: {}", channel.name(), e);
                    failures.push((channel.name().to_string(), e));
                }
            }
        }
        failures
    }
}

#[async_trait]
impl AlertSink for NotificationService {
    async fn submit(&self, alert: &Alert) -> Result<(), MonitorError> {
        let failures = self.send_alert(alert).await;
        if failures.is_empty() {
            return Ok(());
        }

        let detail = failures
            .iter()
            .map(|(channel, e)| format!("{}: {}", channel, e))
            .collect::<Vec<_>>()
            .join("; ");
        Err(MonitorError::Sink(detail))
    }

    fn name(&self) -> &str {
        "notification-service"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn alert(severity: Severity) -> Alert {
        Alert {
            check_name: "face_comparison_result".to_string(),
            current_rate: 0.62,
            baseline_rate: 0.95,
            severity,
            detected_at: Utc.with_ymd_and_hms(2017, 10, 29, 14, 0, 0).unwrap(),
            window_start: Utc.with_ymd_and_hms(2017, 10, 29, 13, 0, 0).unwrap(),
            window_end: Utc.with_ymd_and_hms(2017, 10, 29, 14, 0, 0).unwrap(),
        }
    }

    struct CountingChannel {
        name: &'static str,
        fail: bool,
        sent: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl NotificationChannel for CountingChannel {
        async fn send(&self, _alert: &Alert) -> Result<(), NotificationError> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(NotificationError::Discord("HTTP 500".into()))
            } else {
                Ok(())
            }
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    #[tokio::test]
    async fn test_failed_channel_does_not_stop_others() {
        let sent = Arc::new(AtomicUsize::new(0));
        let service = NotificationService::with_channels(vec![
            Box::new(CountingChannel {
                name: "broken",
                fail: true,
                sent: sent.clone(),
            }),
            Box::new(CountingChannel {
                name: "working",
                fail: false,
                sent: sent.clone(),
            }),
        ]);

        let result = service.submit(&alert(Severity::High)).await;
        assert_eq!(sent.load(Ordering::SeqCst), 2);
        match result {
            Err(MonitorError::Sink(detail)) => assert!(detail.starts_with("broken:")),
            other => panic!("expected sink error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_all_channels_succeed() {
        let sent = Arc::new(AtomicUsize::new(0));
        let service = NotificationService::with_channels(vec![Box::new(CountingChannel {
            name: "working",
            fail: false,
            sent: sent.clone(),
        })]);
        assert!(service.submit(&alert(Severity::Medium)).await.is_ok());
        assert_eq!(sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_service_falls_back_to_log() {
        let service = NotificationService::new(&NotificationConfig::default());
        assert_eq!(service.channel_names(), vec!["log"]);
        assert!(service.submit(&alert(Severity::High)).await.is_ok());
    }

    #[test]
    fn test_parse_recipients() {
        assert_eq!(
            parse_recipients(" risk@example.com, ,ops@example.com "),
            vec!["risk@example.com", "ops@example.com"]
        );
        assert!(parse_recipients("").is_empty());
    }

    #[test]
    fn test_smtp_tls_parse() {
        assert_eq!(SmtpTls::parse("TLS"), SmtpTls::Tls);
        assert_eq!(SmtpTls::parse("none"), SmtpTls::None);
        assert_eq!(SmtpTls::parse(""), SmtpTls::StartTls);
    }

    #[test]
    fn test_smtp_requires_host_sender_and_recipients() {
        let mut config = NotificationConfig {
            smtp_host: Some("smtp.example.com".into()),
            smtp_from: Some("monitor@example.com".into()),
            ..NotificationConfig::default()
        };
        assert!(!config.smtp_enabled());
        config.smtp_to = vec!["risk@example.com".into()];
        assert!(config.smtp_enabled());
    }
}
