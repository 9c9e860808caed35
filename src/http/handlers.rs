use super::state::AppState;
use crate::audio::{PlaybackOutcome, PlaybackState};
use crate::chat::ChatMessage;
use crate::error::{CaptureError, TransportError};
use crate::speech::{CaptureState, StreamingEvent};
use crate::transport::{ConnectionPhase, EndpointStatus};
use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    /// Server address; falls back to the address used last
    pub address: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConnectionResponse {
    pub phase: ConnectionPhase,
    pub endpoint: Option<EndpointStatus>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub request: ChatMessage,
    pub reply: ChatMessage,
}

#[derive(Debug, Serialize)]
pub struct PermissionResponse {
    pub granted: bool,
}

#[derive(Debug, Serialize)]
pub struct VoiceStatusResponse {
    pub capture: CaptureState,
    pub description: &'static str,
    pub playback: PlaybackState,
}

#[derive(Debug, Deserialize)]
pub struct PlayRequest {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl ToString) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

fn status_response(status: &str) -> Response {
    (
        StatusCode::OK,
        Json(StatusResponse {
            status: status.to_string(),
        }),
    )
        .into_response()
}

fn transport_status(e: &TransportError) -> StatusCode {
    match e {
        TransportError::InvalidAddress(_) => StatusCode::BAD_REQUEST,
        TransportError::AlreadyConnecting
        | TransportError::AlreadyConnected
        | TransportError::NotConnected => StatusCode::CONFLICT,
        TransportError::ConnectFailed(_)
        | TransportError::ConnectionLost
        | TransportError::RequestFailed(_) => StatusCode::BAD_GATEWAY,
    }
}

fn capture_status(e: &CaptureError) -> StatusCode {
    match e {
        CaptureError::PermissionDenied => StatusCode::FORBIDDEN,
        CaptureError::EngineBusy => StatusCode::CONFLICT,
        CaptureError::RecognitionFailed(_) | CaptureError::PlaybackFailed(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
    }
}

// ============================================================================
// Connection
// ============================================================================

/// GET /connection
pub async fn connection_status(State(state): State<AppState>) -> impl IntoResponse {
    let endpoint = match state.transport.active_endpoint() {
        Some(endpoint) => Some(endpoint.status().await),
        None => None,
    };

    Json(ConnectionResponse {
        phase: state.transport.phase(),
        endpoint,
    })
}

/// POST /connection
/// Connect the transport to a chat server
pub async fn connect(
    State(state): State<AppState>,
    Json(req): Json<ConnectRequest>,
) -> impl IntoResponse {
    let address = match req.address {
        Some(address) => address,
        None => match state.last_address().await {
            Some(address) => address,
            None => return error_response(StatusCode::BAD_REQUEST, "No server address given"),
        },
    };

    let endpoint = match state.endpoint(&address).await {
        Ok(endpoint) => endpoint,
        Err(e) => return error_response(transport_status(&e), e),
    };

    match state.transport.connect(endpoint.clone()).await {
        Ok(()) => {
            info!("Connected to {}", address);
            (
                StatusCode::OK,
                Json(ConnectionResponse {
                    phase: state.transport.phase(),
                    endpoint: Some(endpoint.status().await),
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to connect to {}: {}", address, e);
            error_response(transport_status(&e), e)
        }
    }
}

/// DELETE /connection
pub async fn disconnect(State(state): State<AppState>) -> impl IntoResponse {
    state.transport.disconnect().await;
    status_response("disconnected")
}

// ============================================================================
// Chat
// ============================================================================

/// GET /chat/messages
pub async fn list_messages(State(state): State<AppState>) -> impl IntoResponse {
    let chat = state.chat.read().await;
    Json(chat.messages.clone())
}

/// POST /chat/messages
/// Send a text message and append both sides to the conversation
pub async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> impl IntoResponse {
    let message = ChatMessage::text(req.content, true);
    let request = match message.to_request().await {
        Ok(request) => request,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("{e:#}")),
    };

    match state.transport.send(request).await {
        Ok(response) => {
            let reply = ChatMessage::reply(&response);
            {
                let mut chat = state.chat.write().await;
                chat.add_message(message.clone());
                chat.add_message(reply.clone());
            }
            (
                StatusCode::OK,
                Json(SendMessageResponse {
                    request: message,
                    reply,
                }),
            )
                .into_response()
        }
        Err(e) => {
            warn!("Send failed: {}", e);
            error_response(transport_status(&e), e)
        }
    }
}

enum ReplyEvent {
    Partial(String),
    Complete(ChatMessage),
    Failed(TransportError),
}

/// POST /chat/stream
/// Send a text message; the reply arrives as server-sent events
pub async fn stream_message(
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> Response {
    // Reject before opening the event stream so the caller gets a plain error
    if !state.transport.is_connected() {
        return error_response(StatusCode::CONFLICT, TransportError::NotConnected);
    }

    let message = ChatMessage::text(req.content, true);
    let request = match message.to_request().await {
        Ok(request) => request,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("{e:#}")),
    };

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let partial_tx = tx.clone();
        let result = state
            .transport
            .send_streaming(request, move |text| {
                let _ = partial_tx.send(ReplyEvent::Partial(text.to_string()));
            })
            .await;

        let terminal = match result {
            Ok(response) => {
                let reply = ChatMessage::reply(&response);
                let mut chat = state.chat.write().await;
                chat.add_message(message);
                chat.add_message(reply.clone());
                ReplyEvent::Complete(reply)
            }
            Err(e) => ReplyEvent::Failed(e),
        };
        let _ = tx.send(terminal);
    });

    let events = stream::unfold(rx, |mut rx| async move {
        let event = match rx.recv().await? {
            ReplyEvent::Partial(text) => Event::default().event("partial").data(text),
            ReplyEvent::Complete(reply) => Event::default()
                .event("complete")
                .data(serde_json::to_string(&reply).unwrap_or_default()),
            ReplyEvent::Failed(e) => Event::default().event("error").data(e.to_string()),
        };
        Some((Ok::<_, Infallible>(event), rx))
    });

    Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response()
}

// ============================================================================
// Voice
// ============================================================================

/// POST /voice/permission
pub async fn request_permission(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.engine.request_permission().await;
    Json(PermissionResponse {
        granted: status.is_granted(),
    })
}

/// POST /voice/record
/// Start a single-shot capture; the voice message lands in the conversation
pub async fn start_recording(State(state): State<AppState>) -> impl IntoResponse {
    let handle = match state.engine.start_single_shot().await {
        Ok(handle) => handle,
        Err(e) => {
            warn!("Failed to start recording: {}", e);
            return error_response(capture_status(&e), e);
        }
    };

    let chat = state.chat.clone();
    tokio::spawn(async move {
        match handle.result().await {
            Ok(recording) => {
                info!("Voice message recognized: {}", recording.text);
                chat.write()
                    .await
                    .add_message(ChatMessage::voice(recording.text, recording.audio_asset));
            }
            Err(e) => warn!("Voice message failed: {}", e),
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(StatusResponse {
            status: "recording".to_string(),
        }),
    )
        .into_response()
}

/// POST /voice/stop
pub async fn stop_recording(State(state): State<AppState>) -> impl IntoResponse {
    state.engine.stop().await;
    status_response("stopping")
}

/// GET /voice/stream
/// Streaming capture as server-sent events
pub async fn stream_recognition(State(state): State<AppState>) -> Response {
    let handle = match state.engine.start_streaming().await {
        Ok(handle) => handle,
        Err(e) => {
            warn!("Failed to start streaming recognition: {}", e);
            return error_response(capture_status(&e), e);
        }
    };

    Sse::new(sse_events(handle.into_stream()))
        .keep_alive(KeepAlive::default())
        .into_response()
}

fn sse_events(
    events: impl Stream<Item = StreamingEvent> + Send + 'static,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    use futures::StreamExt;

    events.map(|event| {
        Ok(match event {
            StreamingEvent::Partial(text) => Event::default().event("partial").data(text),
            StreamingEvent::Final(text) => Event::default().event("final").data(text),
            StreamingEvent::Failed(e) => Event::default().event("error").data(e.to_string()),
        })
    })
}

/// GET /voice/status
pub async fn voice_status(State(state): State<AppState>) -> impl IntoResponse {
    let capture = state.engine.state();
    Json(VoiceStatusResponse {
        capture,
        description: capture.description(),
        playback: state.engine.playback_state(),
    })
}

// ============================================================================
// Playback
// ============================================================================

/// POST /playback
pub async fn play_audio(
    State(state): State<AppState>,
    Json(req): Json<PlayRequest>,
) -> impl IntoResponse {
    match state.engine.play_audio(&req.url).await {
        Ok(handle) => {
            tokio::spawn(async move {
                match handle.finished().await {
                    Ok(PlaybackOutcome::Finished) => info!("Playback finished"),
                    Ok(PlaybackOutcome::Stopped) => info!("Playback stopped"),
                    Err(e) => warn!("Playback failed: {}", e),
                }
            });
            status_response("playing")
        }
        Err(e) => error_response(capture_status(&e), e),
    }
}

/// DELETE /playback
pub async fn stop_playing(State(state): State<AppState>) -> impl IntoResponse {
    state.engine.stop_playing().await;
    status_response("stopped")
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
