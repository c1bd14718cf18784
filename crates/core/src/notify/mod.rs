//! Run-result and escalation notifications.
//!
//! The [`Notifier`] facade posts to the Slack incoming webhook when one is
//! configured and does nothing otherwise. Delivery failures are returned to
//! the caller, which logs them; they never change the run's exit status.

pub mod slack;

use tracing::info;

use crate::config::NotificationConfig;
use crate::errors::NotificationError;

/// Unified notifier over the configured channels.
pub struct Notifier {
    slack: Option<slack::SlackNotifier>,
}

impl Notifier {
    /// Create a new notifier from the notification configuration.
    pub fn new(config: &NotificationConfig) -> Result<Self, NotificationError> {
        let slack = match config.slack_webhook_url.as_ref() {
            Some(url) => {
                info!("Slack notifications enabled");
                Some(slack::SlackNotifier::new(url.clone())?)
            }
            None => None,
        };
        Ok(Self { slack })
    }

    /// Post a successful run report.
    pub async fn notify_result(&self, message: &str) -> Result<(), NotificationError> {
        self.send(&format_result(message)).await
    }

    /// Post an error that needs a human.
    pub async fn notify_escalation(&self, message: &str) -> Result<(), NotificationError> {
        self.send(&format_escalation(message)).await
    }

    /// Return whether any notification channel is configured.
    pub fn is_configured(&self) -> bool {
        self.slack.is_some()
    }

    async fn send(&self, text: &str) -> Result<(), NotificationError> {
        match self.slack {
            Some(ref slack) => slack.send_message(text).await,
            None => Ok(()),
        }
    }
}

fn format_result(message: &str) -> String {
    format!(":white_check_mark: {message}")
}

fn format_escalation(message: &str) -> String {
    format!(":warning: {message}")
}
