//! Incoming-webhook delivery of run reports to a Slack channel.
//!
//! Reports carry PR and repository URLs; link unfurling is switched off so
//! the channel shows the sentence and nothing else.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::errors::NotificationError;

/// Webhook deliveries give up after this long rather than holding the run.
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    text: &'a str,
    unfurl_links: bool,
    unfurl_media: bool,
}

impl<'a> WebhookMessage<'a> {
    fn plain(text: &'a str) -> Self {
        Self {
            text,
            unfurl_links: false,
            unfurl_media: false,
        }
    }
}

pub struct SlackNotifier {
    webhook_url: String,
    http: reqwest::Client,
}

impl SlackNotifier {
    pub fn new(webhook_url: String) -> Result<Self, NotificationError> {
        let http = reqwest::Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .build()?;
        Ok(Self { webhook_url, http })
    }

    /// Post `text` to the webhook. Slack answers anything but 2xx with a
    /// short plain-text reason (`invalid_payload`, `channel_not_found`),
    /// which becomes the error.
    #[instrument(skip_all, fields(len = text.len()))]
    pub async fn send_message(&self, text: &str) -> Result<(), NotificationError> {
        let resp = self
            .http
            .post(&self.webhook_url)
            .json(&WebhookMessage::plain(text))
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            debug!("report delivered to Slack");
            return Ok(());
        }
        let reason = resp.text().await.unwrap_or_default();
        warn!(%status, %reason, "Slack rejected the report");
        Err(NotificationError::SlackError(format!("HTTP {status}: {reason}")))
    }
}
