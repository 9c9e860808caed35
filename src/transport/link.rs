use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::chat::MessageKind;
use crate::error::TransportError;

/// Outbound chat request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub request_id: String,
    pub content: String,
    pub kind: MessageKind,
    /// Raw voice asset bytes, voice messages only
    #[serde(skip)]
    pub audio: Option<Vec<u8>>,
}

impl ChatRequest {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            kind: MessageKind::Text,
            audio: None,
        }
    }

    pub fn voice(content: impl Into<String>, audio: Vec<u8>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            kind: MessageKind::Voice,
            audio: Some(audio),
        }
    }
}

/// Server reply to one chat request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub request_id: String,
    pub content: String,
    pub received_at: DateTime<Utc>,
}

impl ChatResponse {
    pub fn new(request_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            content: content.into(),
            received_at: Utc::now(),
        }
    }
}

/// One event of a streamed reply, in server order
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Partial(String),
    Completed(ChatResponse),
    Failed(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// The underlying connection is gone
    #[error("link closed")]
    Closed,

    /// The request could not be completed
    #[error("{0}")]
    Failed(String),
}

impl From<LinkError> for TransportError {
    fn from(e: LinkError) -> Self {
        match e {
            LinkError::Closed => TransportError::ConnectionLost,
            LinkError::Failed(reason) => TransportError::RequestFailed(reason),
        }
    }
}

/// Establishes links to a server address (the raw connect primitive)
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    /// Perform the transport handshake
    async fn open(&self, connection_id: &str, address: &str) -> Result<Arc<dyn Link>>;

    fn name(&self) -> &str;
}

/// An established connection to the chat server
#[async_trait::async_trait]
pub trait Link: Send + Sync {
    /// Send one request and wait for its reply
    async fn request(&self, request: &ChatRequest) -> Result<ChatResponse, LinkError>;

    /// Send one request and receive its reply as an ordered event stream
    ///
    /// The channel closes without a terminal event if the link drops.
    async fn request_stream(
        &self,
        request: &ChatRequest,
    ) -> Result<mpsc::Receiver<LinkEvent>, LinkError>;

    /// Tear the connection down; ends all in-flight streams
    async fn close(&self);
}
