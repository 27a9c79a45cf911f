use async_trait::async_trait;

use reviews_core::ports::{Notifier, NotifyError};

/// Writes alerts to the log - used when no webhook is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn notify(&self, message: &str) -> Result<(), NotifyError> {
        tracing::error!(alert = true, "{}", message);
        Ok(())
    }
}
