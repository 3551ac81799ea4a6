use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use super::Notification;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("mail relay rejected the alert with status {0}")]
    Rejected(StatusCode),
}

/// Delivers alert messages. Delivery failures are reported to the caller,
/// which logs and drops them.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes alerts to the log instead of delivering them.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            device_id = %notification.device_id,
            recipient = %notification.recipient,
            subject = %notification.subject,
            body = %notification.body,
            "Alert notification"
        );
        Ok(())
    }
}

const RELAY_TIMEOUT: Duration = Duration::from_secs(10);

/// Hands alerts to a mail relay as a JSON `POST`.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    http: Client,
    url: String,
    sender: String,
}

#[derive(Debug, Serialize)]
struct MailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

impl WebhookNotifier {
    pub fn new(url: &str, sender: &str) -> Result<Self, NotifyError> {
        let http = Client::builder().timeout(RELAY_TIMEOUT).build()?;
        Ok(Self {
            http,
            url: url.to_owned(),
            sender: sender.to_owned(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        debug!(
            device_id = %notification.device_id,
            url = %self.url,
            "Posting alert to mail relay"
        );

        let body = MailRequest {
            from: &self.sender,
            to: &notification.recipient,
            subject: &notification.subject,
            body: &notification.body,
        };

        let status = self.http.post(&self.url).json(&body).send().await?.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(status));
        }

        info!(
            device_id = %notification.device_id,
            recipient = %notification.recipient,
            "Alert delivered to mail relay"
        );
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Captures every notification; optionally fails each delivery.
    #[derive(Debug, Clone, Default)]
    pub struct RecordingNotifier {
        sent: Arc<Mutex<Vec<Notification>>>,
        fail: bool,
    }

    impl RecordingNotifier {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn sent(&self) -> Vec<Notification> {
            self.sent.lock().unwrap().clone()
        }

        /// Let background deliveries run, then return what was sent.
        pub async fn settle(&self) -> Vec<Notification> {
            for _ in 0..32 {
                tokio::task::yield_now().await;
            }
            self.sent()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(notification.clone());
            if self.fail {
                return Err(NotifyError::Rejected(StatusCode::SERVICE_UNAVAILABLE));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertKind;

    fn notification() -> Notification {
        Notification {
            device_id: "dev1".to_owned(),
            kind: AlertKind::High,
            recipient: "admin@example.com".to_owned(),
            subject: "ALARM".to_owned(),
            body: "hot".to_owned(),
        }
    }

    #[tokio::test]
    async fn log_notifier_always_succeeds() {
        assert!(LogNotifier.send(&notification()).await.is_ok());
    }

    #[test]
    fn mail_request_serialises_expected_fields() {
        let n = notification();
        let req = MailRequest {
            from: "system@animallogic.pl",
            to: &n.recipient,
            subject: &n.subject,
            body: &n.body,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["from"], "system@animallogic.pl");
        assert_eq!(v["to"], "admin@example.com");
        assert_eq!(v["subject"], "ALARM");
        assert_eq!(v["body"], "hot");
    }

    #[tokio::test]
    async fn webhook_notifier_reports_unreachable_relay() {
        // port 9 (discard) on localhost is not expected to accept HTTP
        let notifier = WebhookNotifier::new("http://127.0.0.1:9/mail", "system@animallogic.pl").unwrap();
        let err = notifier.send(&notification()).await.unwrap_err();
        assert!(matches!(err, NotifyError::Transport(_)));
    }
}
