//! Webhook notification sink
//!
//! Posts `{"text": "<message>"}` to the configured webhook URL.
//! Delivery is best-effort: failures are logged and never retried, and
//! the reconciler's cycle never depends on the outcome.

use async_trait::async_trait;
use failover_core::traits::{Notifier, NotifyEvent};
use std::time::Duration;

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// JSON-posting webhook notifier
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: NotifyEvent, message: &str) {
        let payload = serde_json::json!({ "text": message });
        match self.client.post(&self.url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(event = %event, "notification sent");
            }
            Ok(response) => {
                tracing::warn!(event = %event, status = %response.status(), "notification rejected");
            }
            Err(e) => {
                tracing::warn!(event = %event, error = %e, "notification failed");
            }
        }
    }
}
