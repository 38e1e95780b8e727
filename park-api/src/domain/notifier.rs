use async_trait::async_trait;

use super::Email;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("mail transport failed: {0}")]
    Transport(String),
}

/// Outbound capability for delivering a completion notification. A failed
/// delivery is reported back, never retried here.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, recipient: &Email, subject: &str, body: &str)
        -> Result<(), NotifyError>;
}

/// Sends mail through the Gmail API as the configured account.
pub struct GmailNotifier {
    client: gmail::GmailClient,
}

impl GmailNotifier {
    pub fn new(client: gmail::GmailClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Notifier for GmailNotifier {
    async fn notify(
        &self,
        recipient: &Email,
        subject: &str,
        body: &str,
    ) -> Result<(), NotifyError> {
        let email = gmail::OutgoingEmail::new(recipient.as_ref(), subject, body);
        self.client
            .send(&email)
            .await
            .map_err(|err| NotifyError::Transport(err.to_string()))
    }
}

/// Stand-in used when mail is disabled; logs instead of sending.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        recipient: &Email,
        subject: &str,
        _body: &str,
    ) -> Result<(), NotifyError> {
        tracing::info!("Mail is disabled, skipping '{}' to {}", subject, recipient);
        Ok(())
    }
}
