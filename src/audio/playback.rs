//! Voice playback
//!
//! Playback drives the speaker, not the microphone, so it runs independently
//! of any capture phase. It has its own two-state machine: Idle and Playing.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch, Mutex};
use tracing::{info, warn};

use super::file::AudioFile;
use crate::error::CaptureError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing,
}

/// How a clip left the Playing state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackOutcome {
    /// Clip played to the end
    Finished,
    /// `stop` or a newer clip interrupted it
    Stopped,
}

/// Output device for decoded clips
#[async_trait::async_trait]
pub trait PlaybackSink: Send + Sync {
    /// Render the clip; resolves when the last sample has been played
    async fn render(&self, clip: &AudioFile) -> Result<()>;

    fn name(&self) -> &str;
}

/// Headless sink that holds the Playing state for the clip's real duration
pub struct PacedSink;

#[async_trait::async_trait]
impl PlaybackSink for PacedSink {
    async fn render(&self, clip: &AudioFile) -> Result<()> {
        tokio::time::sleep(Duration::from_secs_f64(clip.duration_seconds.max(0.0))).await;
        Ok(())
    }

    fn name(&self) -> &str {
        "paced"
    }
}

/// Completion of one `play` request
pub struct PlaybackHandle {
    rx: oneshot::Receiver<Result<PlaybackOutcome, CaptureError>>,
}

impl PlaybackHandle {
    pub async fn finished(self) -> Result<PlaybackOutcome, CaptureError> {
        self.rx
            .await
            .unwrap_or_else(|_| Err(CaptureError::PlaybackFailed("playback task ended".into())))
    }
}

struct ActiveClip {
    id: u64,
    stop: oneshot::Sender<()>,
}

pub struct Playback {
    sink: Arc<dyn PlaybackSink>,
    state: Arc<watch::Sender<PlaybackState>>,
    current: Arc<Mutex<Option<ActiveClip>>>,
    next_id: AtomicU64,
}

impl Playback {
    pub fn new(sink: Arc<dyn PlaybackSink>) -> Self {
        let (state, _) = watch::channel(PlaybackState::Idle);
        Self {
            sink,
            state: Arc::new(state),
            current: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> PlaybackState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.state.subscribe()
    }

    /// Start playing an asset (path or `file://` URL)
    ///
    /// A clip that is already playing is stopped first and reports `Stopped`.
    pub async fn play(&self, url: &str) -> Result<PlaybackHandle, CaptureError> {
        let path = resolve_asset(url)?;

        let mut current = self.current.lock().await;
        if let Some(previous) = current.take() {
            info!("Interrupting clip {} for new playback", previous.id);
            let _ = previous.stop.send(());
            // Nothing plays until the new clip is decoded
            self.state.send_replace(PlaybackState::Idle);
        }

        let clip = match tokio::task::spawn_blocking(move || AudioFile::open(path)).await {
            Ok(Ok(clip)) => clip,
            Ok(Err(e)) => {
                self.state.send_replace(PlaybackState::Idle);
                return Err(CaptureError::PlaybackFailed(format!("{e:#}")));
            }
            Err(e) => {
                self.state.send_replace(PlaybackState::Idle);
                return Err(CaptureError::PlaybackFailed(e.to_string()));
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (stop_tx, stop_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();
        *current = Some(ActiveClip { id, stop: stop_tx });
        self.state.send_replace(PlaybackState::Playing);
        drop(current);

        info!(
            "Playing {} ({:.1}s) on {}",
            clip.path,
            clip.duration_seconds,
            self.sink.name()
        );

        let sink = Arc::clone(&self.sink);
        let state = Arc::clone(&self.state);
        let current = Arc::clone(&self.current);

        tokio::spawn(async move {
            let outcome = tokio::select! {
                _ = stop_rx => Ok(PlaybackOutcome::Stopped),
                rendered = sink.render(&clip) => rendered
                    .map(|_| PlaybackOutcome::Finished)
                    .map_err(|e| CaptureError::PlaybackFailed(format!("{e:#}"))),
            };

            {
                let mut current = current.lock().await;
                if current.as_ref().map(|c| c.id) == Some(id) {
                    current.take();
                    state.send_replace(PlaybackState::Idle);
                }
            }

            if let Err(e) = &outcome {
                warn!("Playback of clip {} failed: {}", id, e);
            }
            let _ = done_tx.send(outcome);
        });

        Ok(PlaybackHandle { rx: done_rx })
    }

    /// Stop the current clip; no-op when Idle
    pub async fn stop(&self) {
        let mut current = self.current.lock().await;
        if let Some(active) = current.take() {
            info!("Stopping clip {}", active.id);
            let _ = active.stop.send(());
            self.state.send_replace(PlaybackState::Idle);
        }
    }
}

fn resolve_asset(url: &str) -> Result<PathBuf, CaptureError> {
    if let Some(path) = url.strip_prefix("file://") {
        return Ok(PathBuf::from(path));
    }
    if url.contains("://") {
        return Err(CaptureError::PlaybackFailed(format!(
            "unsupported asset location: {url}"
        )));
    }
    if url.is_empty() {
        return Err(CaptureError::PlaybackFailed("empty asset location".into()));
    }
    Ok(PathBuf::from(url))
}
