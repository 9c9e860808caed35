use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::backend::{AudioBackendConfig, AudioFrame, CaptureBackend, PermissionStatus};
use super::file::AudioFile;

/// Replays an audio file as paced capture frames
///
/// Stands in for the device microphone in batch transcription and tests: the
/// file is decoded once per `start`, converted to the target format and sent
/// one buffer at a time at real-time pace.
pub struct FileReplayBackend {
    path: PathBuf,
    config: AudioBackendConfig,
    capturing: Arc<AtomicBool>,
    stop_signal: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl FileReplayBackend {
    pub fn new(path: impl Into<PathBuf>, config: AudioBackendConfig) -> Self {
        Self {
            path: path.into(),
            config,
            capturing: Arc::new(AtomicBool::new(false)),
            stop_signal: Arc::new(Notify::new()),
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for FileReplayBackend {
    async fn request_permission(&self) -> PermissionStatus {
        PermissionStatus::Granted
    }

    fn permission(&self) -> PermissionStatus {
        PermissionStatus::Granted
    }

    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        let path = self.path.clone();
        let audio = tokio::task::spawn_blocking(move || AudioFile::open(path))
            .await
            .context("Decoder task panicked")??;

        let frames = audio
            .convert(self.config.target_sample_rate, self.config.target_channels)
            .frames(self.config.buffer_duration_ms);

        info!(
            "Replaying {} as capture input ({} frames)",
            self.path.display(),
            frames.len()
        );

        let (tx, rx) = mpsc::channel(100);
        let pace = Duration::from_millis(self.config.buffer_duration_ms);
        // Fresh signal per run so a permit left by the previous stop cannot end this one
        self.stop_signal = Arc::new(Notify::new());
        let capturing = Arc::clone(&self.capturing);
        let stop_signal = Arc::clone(&self.stop_signal);
        capturing.store(true, Ordering::SeqCst);

        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(pace);
            for frame in frames {
                tokio::select! {
                    _ = stop_signal.notified() => break,
                    _ = ticker.tick() => {
                        if tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                }
            }
            capturing.store(false, Ordering::SeqCst);
            debug!("File replay finished");
        }));

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            self.stop_signal.notify_one();
            task.await.context("Replay task panicked")?;
        }
        self.capturing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "file-replay"
    }
}
