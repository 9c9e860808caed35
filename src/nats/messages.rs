use serde::{Deserialize, Serialize};

/// Audio frame message published to the speech recognizer
#[derive(Debug, Serialize, Deserialize)]
pub struct AudioFrameMessage {
    pub session_id: String,
    pub sequence: u32,
    pub pcm: String,  // Base64-encoded PCM bytes
    pub sample_rate: u32,
    pub channels: u16,
    pub timestamp: String,  // RFC3339 timestamp
    #[serde(rename = "final")]
    pub final_frame: bool,
}

/// Transcript message received from the speech recognizer
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub session_id: String,
    pub text: String,
    pub partial: bool,
    pub timestamp: String,
    #[serde(default)]
    pub confidence: Option<f32>,
    /// Recognizer-side failure; ends the session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Chat request sent to the chat server
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequestMessage {
    pub connection_id: String,
    pub request_id: String,
    pub content: String,
    pub kind: String,  // "text" or "voice"
    /// Base64-encoded voice asset, voice messages only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    pub timestamp: String,
    pub stream: bool,
}

/// Reply to a non-streaming chat request
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatReplyMessage {
    pub request_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One fragment of a streamed chat reply
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatStreamChunk {
    pub request_id: String,
    pub sequence: u32,
    #[serde(default)]
    pub delta: String,
    #[serde(default)]
    pub done: bool,
    /// Full reply text, sent with the final chunk when the server has it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
