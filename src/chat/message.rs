use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::transport::{ChatRequest, ChatResponse};

/// How a message was authored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Voice,
}

/// A single entry in the chat log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Opaque message identifier
    pub id: String,

    /// Message text (the transcript for voice messages)
    pub content: String,

    pub kind: MessageKind,

    /// Whether the local user wrote this message
    pub is_from_user: bool,

    /// When the message was created
    pub timestamp: DateTime<Utc>,

    /// Recorded voice asset, voice messages only
    pub voice_asset: Option<String>,
}

impl ChatMessage {
    pub fn text(content: impl Into<String>, is_from_user: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            kind: MessageKind::Text,
            is_from_user,
            timestamp: Utc::now(),
            voice_asset: None,
        }
    }

    /// User voice message: transcript plus the recorded asset
    pub fn voice(transcript: impl Into<String>, voice_asset: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: transcript.into(),
            kind: MessageKind::Voice,
            is_from_user: true,
            timestamp: Utc::now(),
            voice_asset: Some(voice_asset.into()),
        }
    }

    /// Server reply as a chat entry
    pub fn reply(response: &ChatResponse) -> Self {
        Self {
            id: response.request_id.clone(),
            content: response.content.clone(),
            kind: MessageKind::Text,
            is_from_user: false,
            timestamp: response.received_at,
            voice_asset: None,
        }
    }

    /// Package this message for the transport, attaching the voice asset bytes
    pub async fn to_request(&self) -> Result<ChatRequest> {
        let mut request = match (&self.kind, &self.voice_asset) {
            (MessageKind::Voice, Some(asset)) => {
                let audio = tokio::fs::read(asset)
                    .await
                    .with_context(|| format!("Failed to read voice asset {}", asset))?;
                ChatRequest::voice(self.content.clone(), audio)
            }
            _ => ChatRequest::text(self.content.clone()),
        };
        request.request_id = self.id.clone();
        Ok(request)
    }
}
