pub mod audio;
pub mod chat;
pub mod config;
pub mod error;
pub mod http;
pub mod nats;
pub mod speech;
pub mod transport;

pub use audio::{
    AudioBackendConfig, AudioFile, AudioFrame, AudioSource, CaptureBackend, CaptureBackendFactory,
    PermissionStatus, PlaybackOutcome, PlaybackSink, PlaybackState,
};
pub use chat::{ChatMessage, ChatSession, MessageKind};
pub use config::Config;
pub use error::{CaptureError, TransportError};
pub use http::{create_router, AppState};
pub use speech::{
    CaptureConfig, CaptureMode, CapturePhase, CaptureState, NatsRecognizer, Recognizer,
    SpeechCaptureEngine, StreamingEvent, VoiceRecording,
};
pub use transport::{
    ChatRequest, ChatResponse, ConnectionEndpoint, ConnectionPhase, Connector, Link,
    NatsConnector, SessionTransport,
};
