use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox, Mailboxes};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use monitor_core::Alert;

use crate::templates::EmailTemplate;
use crate::{NotificationChannel, NotificationConfig, NotificationError, SmtpTls};

type Transport = AsyncSmtpTransport<Tokio1Executor>;

/// Emails regression alerts as one message addressed to every recipient.
pub struct SmtpNotifier {
    transport: Transport,
    from: Mailbox,
    recipients: Mailboxes,
}

fn config_err(msg: impl Into<String>) -> NotificationError {
    NotificationError::Config(msg.into())
}

fn recipients(addresses: &[String]) -> Mailboxes {
    addresses
        .iter()
        .filter_map(|addr| match addr.parse::<Mailbox>() {
            Ok(mailbox) => Some(mailbox),
            Err(e) => {
                tracing::warn!("Skipping invalid recipient {}: {}", addr, e);
                None
            }
        })
        .collect()
}

fn transport(config: &NotificationConfig, host: &str) -> Result<Transport, NotificationError> {
    let builder = match config.smtp_tls {
        SmtpTls::Tls => Transport::relay(host),
        SmtpTls::StartTls => Transport::starttls_relay(host),
        SmtpTls::None => Ok(Transport::builder_dangerous(host)),
    }
    .map_err(|e| NotificationError::Smtp(format!("SMTP transport error: {}", e)))?
    .port(config.smtp_port);

    let builder = match (&config.smtp_username, &config.smtp_password) {
        (Some(user), Some(pass)) => builder.credentials(Credentials::new(user.clone(), pass.clone())),
        _ => builder,
    };

    Ok(builder.build())
}

impl SmtpNotifier {
    pub fn new(config: &NotificationConfig) -> Result<Self, NotificationError> {
        let host = config
            .smtp_host
            .as_deref()
            .ok_or_else(|| config_err("SMTP_HOST not set"))?;
        let from = config
            .smtp_from
            .as_deref()
            .ok_or_else(|| config_err("SMTP_FROM_ADDRESS not set"))?
            .parse::<Mailbox>()
            .map_err(|e| config_err(format!("Invalid from address: {}", e)))?;

        let recipients = recipients(&config.smtp_to);
        if recipients.iter().next().is_none() {
            return Err(config_err("No valid NOTIFICATION_EMAIL_TO addresses"));
        }

        Ok(Self {
            transport: transport(config, host)?,
            from,
            recipients,
        })
    }

    pub fn recipient_count(&self) -> usize {
        self.recipients.iter().count()
    }

    fn message(&self, alert: &Alert) -> Result<Message, NotificationError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(EmailTemplate::subject(alert))
            .header(ContentType::TEXT_HTML);
        for recipient in self.recipients.iter() {
            builder = builder.to(recipient.clone());
        }

        builder
            .body(EmailTemplate::render(alert))
            .map_err(|e| NotificationError::Smtp(format!("Failed to build email: {}", e)))
    }
}

#[async_trait]
impl NotificationChannel for SmtpNotifier {
    async fn send(&self, alert: &Alert) -> Result<(), NotificationError> {
        let email = self.message(alert)?;
        self.transport
            .send(email)
            .await
            .map_err(|e| NotificationError::Smtp(format!("Failed to send email: {}", e)))?;
        Ok(())
    }

    fn name(&self) -> &str {
        "smtp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use monitor_core::Severity;

    fn config(to: &[&str]) -> NotificationConfig {
        NotificationConfig {
            smtp_host: Some("localhost".into()),
            smtp_port: 2525,
            smtp_from: Some("kyc-monitor@example.com".into()),
            smtp_to: to.iter().map(|s| s.to_string()).collect(),
            smtp_tls: SmtpTls::None,
            ..NotificationConfig::default()
        }
    }

    #[test]
    fn test_rejects_missing_recipients() {
        let err = SmtpNotifier::new(&config(&["not an address"])).err();
        assert!(matches!(err, Some(NotificationError::Config(_))));
    }

    #[test]
    fn test_message_addresses_all_valid_recipients() {
        let notifier =
            SmtpNotifier::new(&config(&["risk@example.com", "bogus", "ops@example.com"])).unwrap();
        assert_eq!(notifier.recipient_count(), 2);
        assert_eq!(notifier.name(), "smtp");

        let alert = Alert {
            check_name: "image_integrity_result".to_string(),
            current_rate: 0.62,
            baseline_rate: 0.95,
            severity: Severity::High,
            detected_at: Utc.with_ymd_and_hms(2017, 10, 29, 14, 0, 0).unwrap(),
            window_start: Utc.with_ymd_and_hms(2017, 10, 29, 13, 0, 0).unwrap(),
            window_end: Utc.with_ymd_and_hms(2017, 10, 29, 14, 0, 0).unwrap(),
        };
        let message = notifier.message(&alert).unwrap();
        assert_eq!(message.envelope().to().len(), 2);
    }
}
