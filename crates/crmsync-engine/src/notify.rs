//! Outbound notifications for sync outcomes.
//!
//! Delivery is behind a trait so deployments can plug in email or chat
//! without the engine knowing; the default sink just logs. Sends are
//! fire-and-forget: a failed notification never fails a sync run.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::Result;

/// A message to deliver out-of-band.
#[derive(Debug, Clone)]
pub struct Notification {
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl Notification {
    pub fn new(
        recipients: Vec<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            recipients,
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// Delivery backend for notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Notifier that writes to the log instead of delivering.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        info!(
            recipients = notification.recipients.len(),
            subject = %notification.subject,
            "notification"
        );
        Ok(())
    }
}

/// Send without waiting; failures are logged and swallowed.
pub fn send_detached(notifier: Arc<dyn Notifier>, notification: Notification) {
    tokio::spawn(async move {
        if let Err(e) = notifier.send(&notification).await {
            warn!(error = %e, subject = %notification.subject, "notification failed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<Notification>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, notification: &Notification) -> Result<()> {
            self.sent.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_tracing_notifier_accepts_anything() {
        let notification = Notification::new(
            vec!["ops@example.com".to_string()],
            "sync disabled",
            "connection disabled after repeated auth failures",
        );
        TracingNotifier.send(&notification).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_detached_delivers() {
        let notifier = Arc::new(RecordingNotifier::default());
        send_detached(
            notifier.clone(),
            Notification::new(vec![], "subject", "body"),
        );
        // Yield so the spawned send runs.
        tokio::task::yield_now().await;
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
    }
}
