use anyhow::Result;
use tokio::sync::mpsc;

use crate::audio::AudioFrame;

/// Event emitted by a recognition session, in recognition order
#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerEvent {
    /// Interim transcript; later partials may revise it
    Partial(String),
    /// Final transcript; ends the session
    Final(String),
    /// Recognition failed; ends the session
    Failed(String),
}

/// A live recognition session
///
/// Push frames into `frames`; dropping it marks the end of the audio and
/// asks the recognizer for its final transcript.
pub struct RecognitionStream {
    pub frames: mpsc::Sender<AudioFrame>,
    pub events: mpsc::Receiver<RecognizerEvent>,
}

/// A complete captured utterance
#[derive(Debug, Clone)]
pub struct Utterance {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Utterance {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Re-split into frames for recognizers that only accept streams
    pub fn frames(&self, frame_duration_ms: u64) -> Vec<AudioFrame> {
        let per_frame =
            (self.sample_rate as u64 * frame_duration_ms / 1000) as usize * self.channels as usize;
        if per_frame == 0 {
            return Vec::new();
        }
        self.samples
            .chunks(per_frame)
            .enumerate()
            .map(|(i, chunk)| AudioFrame {
                samples: chunk.to_vec(),
                sample_rate: self.sample_rate,
                channels: self.channels,
                timestamp_ms: i as u64 * frame_duration_ms,
            })
            .collect()
    }
}

/// Speech-to-text service
#[async_trait::async_trait]
pub trait Recognizer: Send + Sync {
    /// Open a streaming session for audio in the given format
    async fn open_stream(&self, sample_rate: u32, channels: u16) -> Result<RecognitionStream>;

    /// Transcribe a whole utterance
    ///
    /// The default implementation replays it through a streaming session and
    /// waits for the final transcript.
    async fn transcribe(&self, utterance: Utterance) -> Result<String> {
        let RecognitionStream { frames, mut events } = self
            .open_stream(utterance.sample_rate, utterance.channels)
            .await?;

        for frame in utterance.frames(100) {
            if frames.send(frame).await.is_err() {
                break;
            }
        }
        drop(frames);

        while let Some(event) = events.recv().await {
            match event {
                RecognizerEvent::Partial(_) => {}
                RecognizerEvent::Final(text) => return Ok(text),
                RecognizerEvent::Failed(reason) => anyhow::bail!(reason),
            }
        }
        anyhow::bail!("Recognizer closed without a final transcript")
    }

    fn name(&self) -> &str;
}
