//! Speech capture and recognition
//!
//! `SpeechCaptureEngine` owns the microphone and the recognizer and runs at
//! most one capture at a time, either single-shot (record, then transcribe)
//! or streaming (partial transcripts while recording).

mod engine;
mod nats;
mod recognizer;
mod state;

pub use engine::{
    CaptureConfig, SingleShotHandle, SpeechCaptureEngine, StreamingEvent, StreamingHandle,
    VoiceRecording,
};
pub use nats::{NatsRecognizer, SpeechSubjects};
pub use recognizer::{RecognitionStream, Recognizer, RecognizerEvent, Utterance};
pub use state::{CaptureMode, CapturePhase, CaptureState};
