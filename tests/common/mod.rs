// Shared test doubles for the transport and capture engine
//
// Each integration test binary compiles this module separately and uses a
// different subset of it.
#![allow(dead_code)]

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use ziyue::audio::{AudioFile, AudioFrame, CaptureBackend, PermissionStatus, PlaybackSink};
use ziyue::speech::{RecognitionStream, Recognizer, RecognizerEvent};
use ziyue::transport::{ChatRequest, ChatResponse, Connector, Link, LinkError, LinkEvent};

// ============================================================================
// Chat server
// ============================================================================

/// Scripted chat server shared by a connector and every link it opens
#[derive(Default)]
pub struct MockServer {
    pub opens: AtomicUsize,
    pub requests: AtomicUsize,
    pub closes: AtomicUsize,
    pub fail_connect: AtomicBool,
    pub fail_requests: AtomicBool,
    /// Drop the stream after the partials instead of completing it
    pub drop_streams: AtomicBool,
    /// When set, the handshake waits for one notification
    pub gate: Mutex<Option<Arc<Notify>>>,
    pub partials: Mutex<Vec<String>>,
}

impl MockServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_partials(partials: &[&str]) -> Arc<Self> {
        let server = Self::new();
        *server.partials.lock().unwrap() = partials.iter().map(|p| p.to_string()).collect();
        server
    }

    /// Hold every handshake until the returned notify fires
    pub fn gate_handshake(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

pub struct MockConnector {
    pub server: Arc<MockServer>,
}

impl MockConnector {
    pub fn new(server: Arc<MockServer>) -> Arc<Self> {
        Arc::new(Self { server })
    }
}

#[async_trait::async_trait]
impl Connector for MockConnector {
    async fn open(&self, _connection_id: &str, address: &str) -> Result<Arc<dyn Link>> {
        self.server.opens.fetch_add(1, Ordering::SeqCst);

        let gate = self.server.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.server.fail_connect.load(Ordering::SeqCst) {
            anyhow::bail!("handshake with {} refused", address);
        }

        Ok(Arc::new(MockLink {
            server: self.server.clone(),
        }))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

pub struct MockLink {
    server: Arc<MockServer>,
}

#[async_trait::async_trait]
impl Link for MockLink {
    async fn request(&self, request: &ChatRequest) -> Result<ChatResponse, LinkError> {
        self.server.requests.fetch_add(1, Ordering::SeqCst);

        if self.server.fail_requests.load(Ordering::SeqCst) {
            return Err(LinkError::Failed("server error".into()));
        }
        Ok(ChatResponse::new(
            request.request_id.clone(),
            format!("echo: {}", request.content),
        ))
    }

    async fn request_stream(
        &self,
        request: &ChatRequest,
    ) -> Result<mpsc::Receiver<LinkEvent>, LinkError> {
        self.server.requests.fetch_add(1, Ordering::SeqCst);

        if self.server.fail_requests.load(Ordering::SeqCst) {
            return Err(LinkError::Failed("server error".into()));
        }

        let partials = self.server.partials.lock().unwrap().clone();
        let (tx, rx) = mpsc::channel(partials.len() + 1);
        for partial in &partials {
            let _ = tx.try_send(LinkEvent::Partial(partial.clone()));
        }

        if !self.server.drop_streams.load(Ordering::SeqCst) {
            let _ = tx.try_send(LinkEvent::Completed(ChatResponse::new(
                request.request_id.clone(),
                partials.concat(),
            )));
        }

        Ok(rx)
    }

    async fn close(&self) {
        self.server.closes.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Capture backend
// ============================================================================

/// Backend that delivers a fixed set of frames
///
/// With `hold_open` the input stays open after the frames until `stop`,
/// like a live microphone; otherwise it ends right after them.
pub struct ScriptedBackend {
    pub frames: Vec<AudioFrame>,
    pub permission: PermissionStatus,
    pub hold_open: bool,
    pub fail_start: bool,
    /// Never finish `start`, like a device that hangs while opening
    pub stall_start: bool,
    pub starts: Arc<AtomicUsize>,
    pub stops: Arc<AtomicUsize>,
    held: Option<mpsc::Sender<AudioFrame>>,
}

impl ScriptedBackend {
    pub fn new(frames: Vec<AudioFrame>) -> Self {
        Self {
            frames,
            permission: PermissionStatus::Granted,
            hold_open: false,
            fail_start: false,
            stall_start: false,
            starts: Arc::new(AtomicUsize::new(0)),
            stops: Arc::new(AtomicUsize::new(0)),
            held: None,
        }
    }

    pub fn live(frames: Vec<AudioFrame>) -> Self {
        Self {
            hold_open: true,
            ..Self::new(frames)
        }
    }

    pub fn denied() -> Self {
        Self {
            permission: PermissionStatus::Denied,
            ..Self::new(Vec::new())
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for ScriptedBackend {
    async fn request_permission(&self) -> PermissionStatus {
        self.permission
    }

    fn permission(&self) -> PermissionStatus {
        self.permission
    }

    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            anyhow::bail!("audio device unavailable");
        }
        if self.stall_start {
            std::future::pending::<()>().await;
        }

        let (tx, rx) = mpsc::channel(self.frames.len() + 1);
        for frame in &self.frames {
            let _ = tx.try_send(frame.clone());
        }
        if self.hold_open {
            self.held = Some(tx);
        }
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.held.take();
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.held.is_some()
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// ============================================================================
// Recognizer
// ============================================================================

/// Recognizer that emits its partials once audio arrives and its final
/// transcript when the audio ends
pub struct ScriptedRecognizer {
    pub partials: Vec<String>,
    pub final_text: String,
    /// Fail after the first frame instead of transcribing
    pub failure: Option<String>,
    /// Never finish opening a session
    pub stall_open: bool,
    pub sessions: Arc<AtomicUsize>,
}

impl ScriptedRecognizer {
    pub fn new(partials: &[&str], final_text: &str) -> Self {
        Self {
            partials: partials.iter().map(|p| p.to_string()).collect(),
            final_text: final_text.to_string(),
            failure: None,
            stall_open: false,
            sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            failure: Some(reason.to_string()),
            ..Self::new(&[], "")
        }
    }
}

#[async_trait::async_trait]
impl Recognizer for ScriptedRecognizer {
    async fn open_stream(&self, _sample_rate: u32, _channels: u16) -> Result<RecognitionStream> {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        if self.stall_open {
            std::future::pending::<()>().await;
        }

        let (frame_tx, mut frame_rx) = mpsc::channel::<AudioFrame>(100);
        let (event_tx, event_rx) = mpsc::channel(100);
        let partials = self.partials.clone();
        let final_text = self.final_text.clone();
        let failure = self.failure.clone();

        tokio::spawn(async move {
            let mut heard = false;
            while frame_rx.recv().await.is_some() {
                if heard {
                    continue;
                }
                heard = true;

                if let Some(reason) = &failure {
                    let _ = event_tx.send(RecognizerEvent::Failed(reason.clone())).await;
                    return;
                }
                for partial in &partials {
                    let _ = event_tx.send(RecognizerEvent::Partial(partial.clone())).await;
                }
            }

            let _ = event_tx.send(RecognizerEvent::Final(final_text)).await;
        });

        Ok(RecognitionStream {
            frames: frame_tx,
            events: event_rx,
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// ============================================================================
// Playback
// ============================================================================

/// Sink that holds each clip for a fixed time
pub struct HoldSink {
    pub hold: Duration,
    pub renders: Arc<AtomicUsize>,
}

impl HoldSink {
    pub fn new(hold: Duration) -> Arc<Self> {
        Arc::new(Self {
            hold,
            renders: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait::async_trait]
impl PlaybackSink for HoldSink {
    async fn render(&self, _clip: &AudioFile) -> Result<()> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.hold).await;
        Ok(())
    }

    fn name(&self) -> &str {
        "hold"
    }
}

// ============================================================================
// Audio helpers
// ============================================================================

/// 100 ms of 16 kHz mono audio at a constant level
pub fn frame(amplitude: i16, index: u64) -> AudioFrame {
    AudioFrame {
        samples: vec![amplitude; 1600],
        sample_rate: 16000,
        channels: 1,
        timestamp_ms: index * 100,
    }
}

/// `speech` loud frames followed by `silence` quiet ones
pub fn utterance(speech: u64, silence: u64) -> Vec<AudioFrame> {
    (0..speech)
        .map(|i| frame(5000, i))
        .chain((speech..speech + silence).map(|i| frame(0, i)))
        .collect()
}

/// Write a 16-bit square-wave WAV file
pub fn write_wav(dir: &Path, name: &str, sample_rate: u32, channels: u16, millis: u32) -> PathBuf {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    let total = sample_rate as u64 * millis as u64 / 1000 * channels as u64;
    for i in 0..total {
        let sample = if i % 2 == 0 { 3000 } else { -3000 };
        writer.write_sample(sample as i16).unwrap();
    }
    writer.finalize().unwrap();

    path
}
