use crate::classifier::LogEvent;
use crate::config::SlackConfig;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Failed to serialize notification: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to build HTTP client: {0}")]
    Client(reqwest::Error),

    #[error("Webhook request failed: {0}")]
    Request(reqwest::Error),

    #[error("Webhook request timed out")]
    Timeout,

    #[error("Webhook rejected notification: HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },
}

/// A sink for login events.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &LogEvent) -> Result<(), NotifyError>;
}

#[derive(Debug, Serialize)]
struct SlackPayload<'a> {
    channel: &'a str,
    username: &'a str,
    icon_emoji: &'a str,
    text: String,
}

/// Posts events to a Slack-compatible incoming webhook.
///
/// The event itself is sent as a JSON document in the message text.
#[derive(Debug, Clone)]
pub struct SlackNotifier {
    client: Client,
    webhook_url: Url,
    channel: String,
    username: String,
    icon: String,
}

impl SlackNotifier {
    pub fn new(config: &SlackConfig) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(NotifyError::Client)?;

        Ok(Self {
            client,
            webhook_url: config.webhook_url.clone(),
            channel: config.channel.clone(),
            username: config.username.clone(),
            icon: config.icon.clone(),
        })
    }

    fn payload(&self, event: &LogEvent) -> Result<SlackPayload<'_>, NotifyError> {
        Ok(SlackPayload {
            channel: &self.channel,
            username: &self.username,
            icon_emoji: &self.icon,
            text: serde_json::to_string(event)?,
        })
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify(&self, event: &LogEvent) -> Result<(), NotifyError> {
        info!(
            user = %event.username,
            ip = %event.ip_address,
            at = %event.login_time,
            kind = %event.event_kind,
            webhook_host = self.webhook_url.host_str().unwrap_or(""),
            "Sending notification"
        );

        let payload = self.payload(event)?;
        let response = self
            .client
            .post(self.webhook_url.clone())
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NotifyError::Timeout
                } else {
                    NotifyError::Request(e)
                }
            })?;

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                debug!(%status, error = %e, "Failed to read webhook response body");
                String::new()
            }
        };
        debug!(%status, body = %body, "Webhook responded");

        if status != StatusCode::OK {
            return Err(NotifyError::Status { status, body });
        }

        Ok(())
    }
}
