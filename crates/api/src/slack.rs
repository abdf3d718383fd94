//! Slack webhook notification sink.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;
use serde::Serialize;
use tracing::{info, warn};

use crate::client::{RequestClient, RequestError};

/// Failure to deliver a notification.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("webhook delivery failed: {0}")]
    Delivery(#[from] RequestError),
}

/// Destination for formatted alert text.
///
/// Delivery is best-effort: callers log failures and move on.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send `text` under `topic`.
    async fn send(&self, topic: &str, text: &str) -> Result<(), NotifyError>;
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    text: &'a str,
}

/// Notifier posting `{"text": ...}` to a Slack incoming webhook.
#[derive(Debug, Clone)]
pub struct SlackNotifier {
    client: Arc<RequestClient>,
    webhook: String,
}

impl SlackNotifier {
    pub fn new(client: Arc<RequestClient>, webhook: impl Into<String>) -> Self {
        Self {
            client,
            webhook: webhook.into(),
        }
    }

    /// Render the final message line.
    pub fn render(topic: &str, text: &str) -> String {
        format!("{} [{}] {}", topic, Local::now().format("%m-%d %H:%M:%S"), text)
    }
}

/// Slack acknowledges a delivered webhook with a plain `ok` body.
pub fn slack_ack(body: &[u8]) -> Result<(), String> {
    let body = String::from_utf8_lossy(body);
    if body.trim() == "ok" {
        Ok(())
    } else {
        Err(format!("slack response need ok, but got {}", body))
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn send(&self, topic: &str, text: &str) -> Result<(), NotifyError> {
        let content = Self::render(topic, text);
        match self
            .client
            .post_json_validated(&self.webhook, &Message { text: &content }, &slack_ack)
            .await
        {
            Ok(_) => {
                info!(content = %content, "Sent slack message");
                Ok(())
            }
            Err(e) => {
                warn!(content = %content, error = %e, "Failed to send slack message");
                Err(e.into())
            }
        }
    }
}
