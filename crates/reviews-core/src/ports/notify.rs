//! Notification port - out-of-band alerts for operators.

use async_trait::async_trait;

/// Accepts plain-text alerts. Used for shutdown failures only.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> Result<(), NotifyError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Failed to send notification: {0}")]
    Send(String),
}
