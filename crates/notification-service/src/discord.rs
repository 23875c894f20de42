use async_trait::async_trait;
use monitor_core::{Alert, Severity};

use crate::{NotificationChannel, NotificationError};

/// Discord webhook notifier.
pub struct DiscordWebhookNotifier {
    webhook_url: String,
    client: reqwest::Client,
}

impl DiscordWebhookNotifier {
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            client: reqwest::Client::new(),
        }
    }

    pub fn color(severity: Severity) -> u32 {
        match severity {
            Severity::High => 0xff0000,
            Severity::Medium => 0xff6600,
        }
    }

    pub fn payload(alert: &Alert) -> serde_json::Value {
        serde_json::json!({
            "embeds": [{
                "title": alert.title(),
                "description": alert.message(),
                "color": Self::color(alert.severity),
                "timestamp": alert.detected_at.to_rfc3339(),
                "fields": [
                    { "name": "Current", "value": format!("{:.1}%", alert.current_rate * 100.0), "inline": true },
                    { "name": "Baseline", "value": format!("{:.1}%", alert.baseline_rate * 100.0), "inline": true },
                    { "name": "Drop", "value": format!("{:.1} pts", alert.drop() * 100.0), "inline": true },
                ],
            }]
        })
    }
}

#[async_trait]
impl NotificationChannel for DiscordWebhookNotifier {
    async fn send(&self, alert: &Alert) -> Result<(), NotificationError> {
        self.client
            .post(&self.webhook_url)
            .json(&Self::payload(alert))
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| NotificationError::Discord(e.to_string()))?;

        Ok(())
    }

    fn name(&self) -> &str {
        "discord-webhook"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_payload_colour_follows_severity() {
        let mut alert = Alert {
            check_name: "image_integrity_result".to_string(),
            current_rate: 0.80,
            baseline_rate: 0.95,
            severity: Severity::Medium,
            detected_at: Utc.with_ymd_and_hms(2017, 10, 29, 14, 0, 0).unwrap(),
            window_start: Utc.with_ymd_and_hms(2017, 10, 29, 13, 0, 0).unwrap(),
            window_end: Utc.with_ymd_and_hms(2017, 10, 29, 14, 0, 0).unwrap(),
        };

        let payload = DiscordWebhookNotifier::payload(&alert);
        let embed = &payload["embeds"][0];
        assert_eq!(embed["color"], 0xff6600);
        assert_eq!(embed["title"], "[MEDIUM] image_integrity_result clear rate regressed");
        assert_eq!(embed["fields"][2]["value"], "15.0 pts");

        alert.severity = Severity::High;
        let payload = DiscordWebhookNotifier::payload(&alert);
        assert_eq!(payload["embeds"][0]["color"], 0xff0000);
    }
}
