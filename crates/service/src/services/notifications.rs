//! Notifier trait and its implementations.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tracing::info;

use crate::error::{Result, ServiceError};

/// Sends a human-readable message to a destination (an e-mail address, a
/// phone number...).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, destination: &str, message: &str) -> Result<()>;
}

/// Formats messages as allocation-service e-mails and writes them to the log.
///
/// Delivery over SMTP is left to the log pipeline.
#[derive(Debug, Clone)]
pub struct EmailNotifier {
    subject: String,
}

impl EmailNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Renders the e-mail body for a message.
    pub fn render(&self, message: &str) -> String {
        format!("Subject: {}\n{}", self.subject, message)
    }
}

impl Default for EmailNotifier {
    fn default() -> Self {
        Self {
            subject: "allocation service notification".to_string(),
        }
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, destination: &str, message: &str) -> Result<()> {
        info!(destination, email = %self.render(message), "Sending notification");
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    sent: HashMap<String, Vec<String>>,
    fail_on_send: bool,
}

/// In-memory notifier for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<RwLock<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    /// Creates a new in-memory notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the notifier to fail every send.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_on_send = fail;
    }

    /// Returns the messages sent to a destination, oldest first.
    pub fn sent_to(&self, destination: &str) -> Vec<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sent
            .get(destination)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the number of messages sent to any destination.
    pub fn sent_count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sent
            .values()
            .map(Vec::len)
            .sum()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn send(&self, destination: &str, message: &str) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.fail_on_send {
            return Err(ServiceError::Notification(format!(
                "cannot reach {destination}"
            )));
        }
        state
            .sent
            .entry(destination.to_string())
            .or_default()
            .push(message.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_messages_per_destination() {
        let notifier = InMemoryNotifier::new();
        notifier.send("a@example.com", "one").await.unwrap();
        notifier.send("a@example.com", "two").await.unwrap();
        notifier.send("b@example.com", "three").await.unwrap();

        assert_eq!(notifier.sent_to("a@example.com"), vec!["one", "two"]);
        assert_eq!(notifier.sent_count(), 3);
    }

    #[tokio::test]
    async fn test_fail_on_send() {
        let notifier = InMemoryNotifier::new();
        notifier.set_fail_on_send(true);

        let result = notifier.send("a@example.com", "one").await;
        assert!(matches!(result, Err(ServiceError::Notification(_))));
        assert_eq!(notifier.sent_count(), 0);
    }

    #[test]
    fn test_email_rendering() {
        let body = EmailNotifier::new().render("Out of stock for LAMP");
        assert_eq!(
            body,
            "Subject: allocation service notification\nOut of stock for LAMP"
        );
    }
}
