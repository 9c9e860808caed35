//! HTTP control API for a UI shell
//!
//! This module exposes the transport and the capture engine:
//! - /connection - connect, disconnect, status
//! - /chat/messages, /chat/stream - send messages, read the conversation
//! - /voice/* - permission, single-shot and streaming capture
//! - /playback - voice asset playback
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
