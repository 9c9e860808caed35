use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Connection lifecycle
        .route(
            "/connection",
            get(handlers::connection_status)
                .post(handlers::connect)
                .delete(handlers::disconnect),
        )
        // Chat traffic
        .route(
            "/chat/messages",
            get(handlers::list_messages).post(handlers::send_message),
        )
        .route("/chat/stream", post(handlers::stream_message))
        // Voice capture
        .route("/voice/permission", post(handlers::request_permission))
        .route("/voice/record", post(handlers::start_recording))
        .route("/voice/stop", post(handlers::stop_recording))
        .route("/voice/stream", get(handlers::stream_recognition))
        .route("/voice/status", get(handlers::voice_status))
        // Playback
        .route(
            "/playback",
            post(handlers::play_audio).delete(handlers::stop_playing),
        )
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
