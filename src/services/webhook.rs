use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

use crate::models::BatchNotification;

/// Errors that can occur when informing the downstream workflow
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Webhook returned status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Receives a notice once a batch has been matched.
///
/// Callers treat failures as non-fatal.
#[async_trait]
pub trait BatchNotifier: Send + Sync {
    async fn batch_completed(&self, notification: &BatchNotification) -> Result<(), NotifyError>;
}

/// Notifier used when no webhook is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl BatchNotifier for NoopNotifier {
    async fn batch_completed(&self, notification: &BatchNotification) -> Result<(), NotifyError> {
        tracing::debug!(
            "No webhook configured, skipping notification for batch {}",
            notification.batch_id
        );
        Ok(())
    }
}

/// Posts batch notifications to `<base_url>/webhook/matching-trigger`
pub struct WebhookNotifier {
    base_url: String,
    client: Client,
}

impl WebhookNotifier {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/webhook/matching-trigger", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl BatchNotifier for WebhookNotifier {
    async fn batch_completed(&self, notification: &BatchNotification) -> Result<(), NotifyError> {
        let url = self.endpoint();
        tracing::debug!("Posting batch notification to: {}", url);

        let response = self.client.post(&url).json(notification).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Status {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!(
            "Notified workflow of batch {} ({} applicants)",
            notification.batch_id,
            notification.user_count
        );
        Ok(())
    }
}
