//! Error types for the capture engine and the session transport
//!
//! Every error is terminal for the operation that raised it and is reported
//! exactly once through that operation's completion channel.

use thiserror::Error;

/// Errors raised by the speech capture engine and its playback sub-protocol
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// Microphone or speech recognition permission has not been granted
    #[error("speech capture permission denied")]
    PermissionDenied,

    /// A start request arrived while another capture was active
    #[error("capture engine is busy")]
    EngineBusy,

    /// Recognition ended without a usable transcript
    #[error("recognition failed: {0}")]
    RecognitionFailed(String),

    /// Audio asset could not be decoded or rendered
    #[error("playback failed: {0}")]
    PlaybackFailed(String),
}

/// Errors raised by connection endpoints and the session transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Endpoint address was empty
    #[error("invalid server address: {0:?}")]
    InvalidAddress(String),

    /// Transport handshake with the server failed
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// A connect attempt is already in progress
    #[error("already connecting")]
    AlreadyConnecting,

    /// The transport already holds a live connection
    #[error("already connected")]
    AlreadyConnected,

    /// Send issued outside the Connected phase
    #[error("not connected")]
    NotConnected,

    /// The connection dropped while a request was in flight
    #[error("connection lost")]
    ConnectionLost,

    /// The server rejected or failed a single request
    #[error("request failed: {0}")]
    RequestFailed(String),
}

impl TransportError {
    /// Whether the request was rejected by a phase check before any network activity
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            TransportError::AlreadyConnecting
                | TransportError::AlreadyConnected
                | TransportError::NotConnected
        )
    }
}
