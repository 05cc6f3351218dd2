use anyhow::{Context, Result};
use async_trait::async_trait;
use edge::error::{http_error, Error as EdgeError, HttpErrorKind};
use edge::queue::{ActionDispatcher, QueuedAction};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    /// Liveness probe; fails fast when the backend is not reachable.
    pub async fn health(&self) -> Result<String> {
        let url = format!("{}/health", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to reach the backend")?;

        if !response.status().is_success() {
            anyhow::bail!("Health check failed: {}", response.status());
        }

        response
            .text()
            .await
            .context("Failed to read health response")
    }

    pub async fn publish_listing_created(&self, listing: Value) -> Result<()> {
        self.publish(&json!({
            "type": "listing_created",
            "data": {
                "listing": listing,
            }
        }))
        .await
    }

    pub async fn publish_message_sent(
        &self,
        conversation_id: &str,
        message: Value,
        sender: &str,
        recipient: &str,
    ) -> Result<()> {
        self.publish(&json!({
            "type": "message_sent",
            "data": {
                "conversation_id": conversation_id,
                "message": message,
                "sender": sender,
                "recipient": recipient,
            }
        }))
        .await
    }

    async fn publish(&self, event: &Value) -> Result<()> {
        let url = format!("{}/internal/events", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(event)
            .send()
            .await
            .context("Failed to publish event")?;

        if response.status() != StatusCode::ACCEPTED {
            anyhow::bail!("Failed to publish event: {}", response.status());
        }

        Ok(())
    }
}

/// Replays queued offline actions against the live publish endpoint.
///
/// Each queued action carries a complete event body in its payload, so a
/// dispatch is a straight POST of that payload.
pub struct QueueDispatcher {
    client: Client,
    publish_url: String,
}

impl QueueDispatcher {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            publish_url: format!("{}/internal/events", base_url),
        }
    }
}

#[async_trait]
impl ActionDispatcher for QueueDispatcher {
    async fn dispatch(&self, action: &QueuedAction) -> Result<(), EdgeError> {
        let response = self
            .client
            .post(&self.publish_url)
            .json(&action.payload)
            .send()
            .await?;

        if response.status() != StatusCode::ACCEPTED {
            return Err(http_error(
                HttpErrorKind::RequestFailed,
                &format!("publish endpoint returned {}", response.status()),
            ));
        }

        Ok(())
    }
}
