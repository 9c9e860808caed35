use anyhow::{Context, Result};
use async_nats::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

/// Thin JSON-over-NATS wrapper shared by the chat link and the recognizer
#[derive(Clone)]
pub struct NatsClient {
    client: Client,
    url: String,
}

impl NatsClient {
    /// Connect to NATS server
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Publish a JSON payload
    pub async fn publish_json<T: Serialize>(&self, subject: String, message: &T) -> Result<()> {
        let payload = serde_json::to_vec(message)?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .with_context(|| format!("Failed to publish to {}", subject))?;

        debug!("Published to {}", subject);
        Ok(())
    }

    /// Publish a JSON payload with a reply subject
    pub async fn publish_json_with_reply<T: Serialize>(
        &self,
        subject: String,
        reply: String,
        message: &T,
    ) -> Result<()> {
        let payload = serde_json::to_vec(message)?;

        self.client
            .publish_with_reply(subject.clone(), reply, payload.into())
            .await
            .with_context(|| format!("Failed to publish to {}", subject))?;

        debug!("Published to {} (with reply inbox)", subject);
        Ok(())
    }

    /// Request/reply with JSON payloads
    pub async fn request_json<T: Serialize, R: DeserializeOwned>(
        &self,
        subject: String,
        message: &T,
    ) -> Result<R> {
        let payload = serde_json::to_vec(message)?;

        let reply = self
            .client
            .request(subject.clone(), payload.into())
            .await
            .with_context(|| format!("Request on {} failed", subject))?;

        serde_json::from_slice(&reply.payload).context("Malformed reply payload")
    }

    /// Subscribe to a subject (wildcards allowed)
    pub async fn subscribe(&self, subject: String) -> Result<async_nats::Subscriber> {
        info!("Subscribing to {}", subject);

        let subscriber = self
            .client
            .subscribe(subject.clone())
            .await
            .with_context(|| format!("Failed to subscribe to {}", subject))?;

        Ok(subscriber)
    }

    /// Fresh reply inbox subject
    pub fn new_inbox(&self) -> String {
        self.client.new_inbox()
    }

    /// Flush pending publishes before the client is dropped
    pub async fn close(&self) -> Result<()> {
        info!("Closing NATS connection to {}", self.url);
        self.client.flush().await.context("Failed to flush NATS")?;
        Ok(())
    }
}
