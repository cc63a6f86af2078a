//! Notification delivery
//!
//! Fire-and-forget user notifications. Callers log delivery failures and
//! carry on; nothing downstream depends on a notification arriving.

use crate::HalError;

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, title: &str, body: &str) -> Result<(), HalError>;
}

/// Desktop notifications through `notify-send`
pub struct DesktopNotifier {
    app_name: String,
}

impl DesktopNotifier {
    pub fn new(app_name: &str) -> Self {
        Self {
            app_name: app_name.to_string(),
        }
    }
}

impl Default for DesktopNotifier {
    fn default() -> Self {
        Self::new("Pacer")
    }
}

#[async_trait::async_trait]
impl Notifier for DesktopNotifier {
    async fn notify(&self, title: &str, body: &str) -> Result<(), HalError> {
        tracing::info!("Notification: {} - {}", title, body);

        let status = tokio::process::Command::new("notify-send")
            .arg("--app-name")
            .arg(&self.app_name)
            .arg("--urgency=critical")
            .arg(title)
            .arg(body)
            .status()
            .await?;

        if !status.success() {
            return Err(HalError::CommunicationError(format!("notify-send exited with {}", status)));
        }
        Ok(())
    }
}

/// Notifier that only writes to the log
#[derive(Debug, Default)]
pub struct LoggingNotifier;

#[async_trait::async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(&self, title: &str, body: &str) -> Result<(), HalError> {
        tracing::info!(title, body, "Notification");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_logging_notifier_never_fails() {
        let notifier = LoggingNotifier;
        assert!(notifier.notify("Run started", "Go!").await.is_ok());
    }
}
