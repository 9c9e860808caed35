use anyhow::Result;
use futures::stream::Stream;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tracing::{debug, error, info, warn};

use super::recognizer::{RecognitionStream, Recognizer, RecognizerEvent, Utterance};
use super::state::{CaptureMode, CapturePhase, CaptureState};
use crate::audio::{
    AudioFrame, CaptureBackend, PermissionStatus, Playback, PlaybackHandle, PlaybackSink,
    PlaybackState, SilenceConfig, SilenceDetector, VoiceAsset, VoiceAssetWriter,
};
use crate::error::CaptureError;

/// Configuration for the capture engine
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Where single-shot voice assets are written
    pub recordings_dir: PathBuf,
    /// End-of-utterance detection
    pub silence: SilenceConfig,
    /// Format the backend delivers, announced to streaming recognizers
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            recordings_dir: PathBuf::from("recordings"),
            silence: SilenceConfig::default(),
            sample_rate: 16000,
            channels: 1,
        }
    }
}

/// Result of a single-shot capture
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceRecording {
    /// Recognized text
    pub text: String,
    /// Recorded voice asset (opaque path)
    pub audio_asset: String,
}

/// Event of a streaming capture, delivered in recognition order
#[derive(Debug, Clone, PartialEq)]
pub enum StreamingEvent {
    /// Interim transcript
    Partial(String),
    /// Full transcript; always the last event
    Final(String),
    /// Recognition failed; always the last event
    Failed(CaptureError),
}

impl StreamingEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamingEvent::Partial(_))
    }
}

/// Completion of a single-shot capture
pub struct SingleShotHandle {
    rx: oneshot::Receiver<Result<VoiceRecording, CaptureError>>,
}

impl SingleShotHandle {
    pub async fn result(self) -> Result<VoiceRecording, CaptureError> {
        self.rx.await.unwrap_or_else(|_| {
            Err(CaptureError::RecognitionFailed(
                "capture task ended without a result".into(),
            ))
        })
    }
}

/// Ordered event feed of a streaming capture
///
/// Yields zero or more partials then exactly one terminal event, after which
/// the feed ends.
pub struct StreamingHandle {
    rx: mpsc::Receiver<StreamingEvent>,
}

impl StreamingHandle {
    pub async fn recv(&mut self) -> Option<StreamingEvent> {
        self.rx.recv().await
    }

    pub fn into_stream(self) -> impl Stream<Item = StreamingEvent> {
        futures::stream::unfold(self.rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
    }
}

struct ActiveCapture {
    mode: CaptureMode,
    stop: Option<oneshot::Sender<()>>,
}

/// State shared between the engine and its capture tasks
#[derive(Clone)]
struct Shared {
    backend: Arc<Mutex<Box<dyn CaptureBackend>>>,
    recognizer: Arc<dyn Recognizer>,
    config: Arc<CaptureConfig>,
    state: Arc<watch::Sender<CaptureState>>,
    active: Arc<Mutex<Option<ActiveCapture>>>,
}

/// Exclusive owner of the microphone and recognizer
///
/// At most one capture runs at a time; a start request while not Idle is
/// rejected with `EngineBusy`, never queued. Playback is owned by the same
/// engine but runs independently of capture.
pub struct SpeechCaptureEngine {
    shared: Shared,
    playback: Playback,
}

impl SpeechCaptureEngine {
    pub fn new(
        backend: Box<dyn CaptureBackend>,
        recognizer: Arc<dyn Recognizer>,
        sink: Arc<dyn PlaybackSink>,
        config: CaptureConfig,
    ) -> Self {
        let (state, _) = watch::channel(CaptureState::IDLE);

        Self {
            shared: Shared {
                backend: Arc::new(Mutex::new(backend)),
                recognizer,
                config: Arc::new(config),
                state: Arc::new(state),
                active: Arc::new(Mutex::new(None)),
            },
            playback: Playback::new(sink),
        }
    }

    pub fn state(&self) -> CaptureState {
        *self.shared.state.borrow()
    }

    /// Observe capture state transitions
    pub fn subscribe(&self) -> watch::Receiver<CaptureState> {
        self.shared.state.subscribe()
    }

    /// Ask for microphone/recognition permission; no state change
    pub async fn request_permission(&self) -> PermissionStatus {
        let backend = self.shared.backend.lock().await;
        let status = backend.request_permission().await;
        info!("Capture permission on {}: {:?}", backend.name(), status);
        status
    }

    /// Record until stopped or the utterance ends, then transcribe
    pub async fn start_single_shot(&self) -> Result<SingleShotHandle, CaptureError> {
        let stop_rx = self.shared.begin(CaptureMode::SingleShot).await?;
        let mut guard = StartGuard::new(&self.shared);
        let frames = match self.shared.start_backend().await {
            Ok(frames) => frames,
            Err(e) => {
                guard.disarm();
                return Err(e);
            }
        };

        let (done_tx, done_rx) = oneshot::channel();
        let shared = self.shared.clone();
        guard.disarm();
        tokio::spawn(async move {
            shared.run_single_shot(frames, stop_rx, done_tx).await;
        });

        Ok(SingleShotHandle { rx: done_rx })
    }

    /// Recognize continuously, emitting partial transcripts while recording
    pub async fn start_streaming(&self) -> Result<StreamingHandle, CaptureError> {
        let stop_rx = self.shared.begin(CaptureMode::Streaming).await?;
        let mut guard = StartGuard::new(&self.shared);
        let frames = match self.shared.start_backend().await {
            Ok(frames) => frames,
            Err(e) => {
                guard.disarm();
                return Err(e);
            }
        };

        let config = &self.shared.config;
        let stream = match self
            .shared
            .recognizer
            .open_stream(config.sample_rate, config.channels)
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                self.shared.stop_backend().await;
                self.shared.finish().await;
                guard.disarm();
                error!("Failed to open recognition stream: {:#}", e);
                return Err(CaptureError::RecognitionFailed(format!("{e:#}")));
            }
        };

        let (events_tx, events_rx) = mpsc::channel(100);
        let shared = self.shared.clone();
        guard.disarm();
        tokio::spawn(async move {
            shared.run_streaming(frames, stop_rx, stream, events_tx).await;
        });

        Ok(StreamingHandle { rx: events_rx })
    }

    /// End the current capture
    ///
    /// Single-shot: Recording moves on to Recognizing. Streaming: finalizes.
    /// No-op while Idle, and while Recognizing the result is already on its way.
    pub async fn stop(&self) {
        self.shared.request_stop(None).await;
    }

    /// End a streaming capture; no-op unless streaming
    pub async fn stop_streaming(&self) {
        self.shared.request_stop(Some(CaptureMode::Streaming)).await;
    }

    /// Play a voice asset; independent of capture
    pub async fn play_audio(&self, url: &str) -> Result<PlaybackHandle, CaptureError> {
        self.playback.play(url).await
    }

    pub async fn stop_playing(&self) {
        self.playback.stop().await;
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.playback.state()
    }
}

/// Releases a capture whose start future is dropped before its task owns it
///
/// Armed between `begin` and the spawn of the capture task. Dropping it armed
/// stops the backend and returns the engine to Idle.
struct StartGuard {
    shared: Option<Shared>,
}

impl StartGuard {
    fn new(shared: &Shared) -> Self {
        Self {
            shared: Some(shared.clone()),
        }
    }

    fn disarm(&mut self) {
        self.shared = None;
    }
}

impl Drop for StartGuard {
    fn drop(&mut self) {
        let Some(shared) = self.shared.take() else {
            return;
        };

        warn!("Capture start abandoned; releasing the engine");
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    shared.stop_backend().await;
                    shared.finish().await;
                });
            }
            Err(_) => {
                // No runtime left to stop the backend on
                if let Ok(mut active) = shared.active.try_lock() {
                    active.take();
                }
                shared.state.send_replace(CaptureState::IDLE);
            }
        }
    }
}

impl Shared {
    /// Atomic check-and-set of Idle -> Recording
    async fn begin(&self, mode: CaptureMode) -> Result<oneshot::Receiver<()>, CaptureError> {
        let mut active = self.active.lock().await;
        if active.is_some() || !self.state.borrow().is_idle() {
            warn!("Capture start ({:?}) rejected: engine busy", mode);
            return Err(CaptureError::EngineBusy);
        }

        if !self.backend.lock().await.permission().is_granted() {
            warn!("Capture start ({:?}) rejected: permission denied", mode);
            return Err(CaptureError::PermissionDenied);
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        *active = Some(ActiveCapture {
            mode,
            stop: Some(stop_tx),
        });
        self.state.send_replace(CaptureState::recording(mode));
        info!("Capture started ({:?})", mode);

        Ok(stop_rx)
    }

    async fn start_backend(&self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        let started = {
            let mut backend = self.backend.lock().await;
            backend.start().await
        };

        match started {
            Ok(frames) => Ok(frames),
            Err(e) => {
                error!("Failed to start capture backend: {:#}", e);
                self.finish().await;
                Err(CaptureError::RecognitionFailed(format!("{e:#}")))
            }
        }
    }

    async fn stop_backend(&self) {
        let mut backend = self.backend.lock().await;
        if let Err(e) = backend.stop().await {
            error!("Failed to stop capture backend {}: {:#}", backend.name(), e);
        }
    }

    /// Return to Idle; runs on every exit path before the terminal event
    async fn finish(&self) {
        self.active.lock().await.take();
        self.state.send_replace(CaptureState::IDLE);
        debug!("Capture engine idle");
    }

    async fn request_stop(&self, only: Option<CaptureMode>) {
        let mut active = self.active.lock().await;
        let Some(capture) = active.as_mut() else {
            debug!("Stop ignored: engine idle");
            return;
        };

        if only.is_some_and(|mode| mode != capture.mode) {
            debug!("Stop ignored: no {:?} capture active", only);
            return;
        }

        match capture.stop.take() {
            Some(stop) => {
                info!("Stop requested ({:?})", capture.mode);
                let _ = stop.send(());
            }
            None => debug!("Stop already requested"),
        }
    }

    async fn run_single_shot(
        self,
        mut frames: mpsc::Receiver<AudioFrame>,
        mut stop_rx: oneshot::Receiver<()>,
        done: oneshot::Sender<Result<VoiceRecording, CaptureError>>,
    ) {
        let result = self.record_and_recognize(&mut frames, &mut stop_rx).await;
        self.finish().await;

        match &result {
            Ok(recording) => info!("Single-shot recognized: {}", recording.text),
            Err(e) => warn!("Single-shot capture failed: {}", e),
        }
        let _ = done.send(result);
    }

    async fn record_and_recognize(
        &self,
        frames: &mut mpsc::Receiver<AudioFrame>,
        stop_rx: &mut oneshot::Receiver<()>,
    ) -> Result<VoiceRecording, CaptureError> {
        let recorded = self.record_utterance(frames, stop_rx).await;
        self.stop_backend().await;

        let (utterance, asset) =
            recorded.map_err(|e| CaptureError::RecognitionFailed(format!("{e:#}")))?;
        let asset = match asset {
            Some(asset) if !utterance.is_empty() => asset,
            _ => return Err(CaptureError::RecognitionFailed("no audio captured".into())),
        };

        self.state.send_replace(CaptureState {
            mode: CaptureMode::SingleShot,
            phase: CapturePhase::Recognizing,
        });
        info!(
            "Recognizing {} ms of audio with {}",
            asset.duration_ms(),
            self.recognizer.name()
        );

        let text = self
            .recognizer
            .transcribe(utterance)
            .await
            .map_err(|e| CaptureError::RecognitionFailed(format!("{e:#}")))?;
        let text = text.trim();
        if text.is_empty() {
            return Err(CaptureError::RecognitionFailed("no speech recognized".into()));
        }

        Ok(VoiceRecording {
            text: text.to_string(),
            audio_asset: asset.asset_ref(),
        })
    }

    async fn record_utterance(
        &self,
        frames: &mut mpsc::Receiver<AudioFrame>,
        stop_rx: &mut oneshot::Receiver<()>,
    ) -> Result<(Utterance, Option<VoiceAsset>)> {
        let mut writer = VoiceAssetWriter::new(&self.config.recordings_dir)?;
        let mut detector = SilenceDetector::new(self.config.silence.clone());
        let mut utterance = Utterance {
            samples: Vec::new(),
            sample_rate: 0,
            channels: 0,
        };

        loop {
            tokio::select! {
                biased;
                _ = &mut *stop_rx => {
                    info!("Recording stopped by request");
                    break;
                }
                frame = frames.recv() => {
                    let Some(frame) = frame else {
                        info!("Capture input ended");
                        break;
                    };

                    writer.write_frame(&frame)?;
                    utterance.sample_rate = frame.sample_rate;
                    utterance.channels = frame.channels;
                    utterance.samples.extend_from_slice(&frame.samples);

                    if let Some(end) = detector.observe(&frame) {
                        info!("End of utterance detected ({:?})", end);
                        break;
                    }
                }
            }
        }

        let asset = writer.finish()?;
        Ok((utterance, asset))
    }

    async fn run_streaming(
        self,
        mut frames: mpsc::Receiver<AudioFrame>,
        mut stop_rx: oneshot::Receiver<()>,
        stream: RecognitionStream,
        events: mpsc::Sender<StreamingEvent>,
    ) {
        let terminal = self
            .stream_utterance(&mut frames, &mut stop_rx, stream, &events)
            .await;
        self.finish().await;

        match &terminal {
            StreamingEvent::Final(text) => info!("Streaming recognized: {}", text),
            StreamingEvent::Failed(e) => warn!("Streaming capture failed: {}", e),
            StreamingEvent::Partial(_) => {}
        }
        let _ = events.send(terminal).await;
    }

    /// Drive one streaming session; returns its terminal event
    async fn stream_utterance(
        &self,
        frames: &mut mpsc::Receiver<AudioFrame>,
        stop_rx: &mut oneshot::Receiver<()>,
        stream: RecognitionStream,
        events: &mpsc::Sender<StreamingEvent>,
    ) -> StreamingEvent {
        let RecognitionStream {
            frames: recognizer_tx,
            events: mut recognizer_rx,
        } = stream;
        let mut recognizer_tx = Some(recognizer_tx);
        let mut detector = SilenceDetector::new(self.config.silence.clone());
        let mut terminal = None;

        loop {
            tokio::select! {
                biased;
                _ = &mut *stop_rx => {
                    info!("Streaming stopped by request");
                    break;
                }
                event = recognizer_rx.recv() => match event {
                    Some(RecognizerEvent::Partial(text)) => {
                        let _ = events.send(StreamingEvent::Partial(text)).await;
                    }
                    Some(RecognizerEvent::Final(text)) => {
                        terminal = Some(StreamingEvent::Final(text));
                        break;
                    }
                    Some(RecognizerEvent::Failed(reason)) => {
                        terminal = Some(StreamingEvent::Failed(CaptureError::RecognitionFailed(reason)));
                        break;
                    }
                    None => {
                        terminal = Some(StreamingEvent::Failed(CaptureError::RecognitionFailed(
                            "recognizer closed the session".into(),
                        )));
                        break;
                    }
                },
                frame = frames.recv() => {
                    let Some(frame) = frame else {
                        info!("Capture input ended");
                        break;
                    };

                    let end = detector.observe(&frame);
                    if let Some(tx) = &recognizer_tx {
                        if tx.send(frame).await.is_err() {
                            recognizer_tx = None;
                        }
                    }
                    if let Some(end) = end {
                        info!("Terminal silence detected ({:?})", end);
                        break;
                    }
                }
            }
        }

        self.stop_backend().await;

        if let Some(terminal) = terminal {
            return terminal;
        }

        // End of audio: let the recognizer finish and collect the remaining partials
        drop(recognizer_tx);
        while let Some(event) = recognizer_rx.recv().await {
            match event {
                RecognizerEvent::Partial(text) => {
                    let _ = events.send(StreamingEvent::Partial(text)).await;
                }
                RecognizerEvent::Final(text) => return StreamingEvent::Final(text),
                RecognizerEvent::Failed(reason) => {
                    return StreamingEvent::Failed(CaptureError::RecognitionFailed(reason))
                }
            }
        }

        StreamingEvent::Failed(CaptureError::RecognitionFailed(
            "recognizer closed without a final transcript".into(),
        ))
    }
}
