use anyhow::Result;
use base64::Engine;
use futures::stream::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::link::{ChatRequest, ChatResponse, Connector, Link, LinkError, LinkEvent};
use crate::chat::MessageKind;
use crate::nats::{ChatReplyMessage, ChatRequestMessage, ChatStreamChunk, NatsClient};

/// Subjects the chat server listens on
#[derive(Debug, Clone)]
pub struct ChatSubjects {
    /// Request/reply subject for plain sends
    pub request: String,
    /// Subject for streamed replies (reply inbox carries the chunks)
    pub stream: String,
}

impl Default for ChatSubjects {
    fn default() -> Self {
        Self {
            request: "chat.request".to_string(),
            stream: "chat.stream".to_string(),
        }
    }
}

/// Opens chat links over NATS
pub struct NatsConnector {
    subjects: ChatSubjects,
}

impl NatsConnector {
    pub fn new(subjects: ChatSubjects) -> Self {
        Self { subjects }
    }
}

#[async_trait::async_trait]
impl Connector for NatsConnector {
    async fn open(&self, connection_id: &str, address: &str) -> Result<Arc<dyn Link>> {
        let client = NatsClient::connect(address).await?;
        let (closed, _) = watch::channel(false);

        Ok(Arc::new(NatsLink {
            client,
            connection_id: connection_id.to_string(),
            subjects: self.subjects.clone(),
            closed,
        }))
    }

    fn name(&self) -> &str {
        "nats"
    }
}

pub struct NatsLink {
    client: NatsClient,
    connection_id: String,
    subjects: ChatSubjects,
    closed: watch::Sender<bool>,
}

impl NatsLink {
    fn encode(&self, request: &ChatRequest, stream: bool) -> ChatRequestMessage {
        ChatRequestMessage {
            connection_id: self.connection_id.clone(),
            request_id: request.request_id.clone(),
            content: request.content.clone(),
            kind: match request.kind {
                MessageKind::Text => "text".to_string(),
                MessageKind::Voice => "voice".to_string(),
            },
            audio: request
                .audio
                .as_ref()
                .map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes)),
            timestamp: chrono::Utc::now().to_rfc3339(),
            stream,
        }
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

#[async_trait::async_trait]
impl Link for NatsLink {
    async fn request(&self, request: &ChatRequest) -> Result<ChatResponse, LinkError> {
        if self.is_closed() {
            return Err(LinkError::Closed);
        }

        let message = self.encode(request, false);
        let reply: ChatReplyMessage = self
            .client
            .request_json(self.subjects.request.clone(), &message)
            .await
            .map_err(|e| LinkError::Failed(format!("{e:#}")))?;

        if let Some(error) = reply.error {
            return Err(LinkError::Failed(error));
        }

        Ok(ChatResponse::new(reply.request_id, reply.content))
    }

    async fn request_stream(
        &self,
        request: &ChatRequest,
    ) -> Result<mpsc::Receiver<LinkEvent>, LinkError> {
        if self.is_closed() {
            return Err(LinkError::Closed);
        }

        let inbox = self.client.new_inbox();
        let mut subscriber = self
            .client
            .subscribe(inbox.clone())
            .await
            .map_err(|e| LinkError::Failed(format!("{e:#}")))?;

        let message = self.encode(request, true);
        self.client
            .publish_json_with_reply(self.subjects.stream.clone(), inbox, &message)
            .await
            .map_err(|e| LinkError::Failed(format!("{e:#}")))?;

        let (tx, rx) = mpsc::channel(100);
        let mut closed = self.closed.subscribe();
        let request_id = request.request_id.clone();

        tokio::spawn(async move {
            let mut accumulated = String::new();
            let mut expected = 0u32;

            loop {
                let msg = tokio::select! {
                    _ = closed.wait_for(|c| *c) => {
                        // Dropping tx without a terminal event reports the loss
                        debug!("Stream {} cut by link close", request_id);
                        return;
                    }
                    msg = subscriber.next() => msg,
                };

                let Some(msg) = msg else {
                    warn!("Reply inbox for {} closed", request_id);
                    return;
                };

                let chunk = match serde_json::from_slice::<ChatStreamChunk>(&msg.payload) {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!("Failed to parse stream chunk: {}", e);
                        continue;
                    }
                };

                if chunk.request_id != request_id {
                    continue;
                }
                if chunk.sequence != expected {
                    warn!(
                        "Stream {} chunk {} out of order (expected {})",
                        request_id, chunk.sequence, expected
                    );
                }
                expected = chunk.sequence.wrapping_add(1);

                let terminal = if let Some(error) = chunk.error {
                    Some(LinkEvent::Failed(error))
                } else {
                    if !chunk.delta.is_empty() {
                        accumulated.push_str(&chunk.delta);
                        if tx.send(LinkEvent::Partial(chunk.delta)).await.is_err() {
                            return;
                        }
                    }
                    chunk.done.then(|| {
                        let content = chunk.content.unwrap_or_else(|| accumulated.clone());
                        LinkEvent::Completed(ChatResponse::new(request_id.clone(), content))
                    })
                };

                if let Some(event) = terminal {
                    let _ = tx.send(event).await;
                    return;
                }
            }
        });

        Ok(rx)
    }

    async fn close(&self) {
        self.closed.send_replace(true);
        if let Err(e) = self.client.close().await {
            warn!("NATS flush on close failed: {:#}", e);
        }
        info!("Chat link {} closed", self.connection_id);
    }
}
