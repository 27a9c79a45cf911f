use std::time::Duration;

use async_trait::async_trait;

use reviews_core::ports::{Notifier, NotifyError};

/// Posts alerts to a chat webhook (Slack, Discord, ...) as `{"text": ..}`.
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();

        Self {
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, message: &str) -> Result<(), NotifyError> {
        let payload = serde_json::json!({ "text": format!("[reviews] {message}") });

        self.client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| NotifyError::Send(e.to_string()))?;

        Ok(())
    }
}
