use anyhow::{Context, Result};
use base64::Engine;
use futures::stream::StreamExt;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::recognizer::{RecognitionStream, Recognizer, RecognizerEvent};
use crate::audio::AudioFrame;
use crate::nats::{AudioFrameMessage, NatsClient, TranscriptMessage};

/// Subjects shared with the speech-to-text service
#[derive(Debug, Clone)]
pub struct SpeechSubjects {
    /// Prefix for audio frames; the session id is appended
    pub frames: String,
    /// Transcript subscription (partial and final)
    pub transcripts: String,
}

impl Default for SpeechSubjects {
    fn default() -> Self {
        Self {
            frames: "audio.frame".to_string(),
            transcripts: "stt.text.>".to_string(),
        }
    }
}

/// Recognizer backed by an STT service on NATS
///
/// Audio goes out as base64 PCM frames; transcripts come back on a shared
/// subject and are filtered by session id.
pub struct NatsRecognizer {
    client: NatsClient,
    subjects: SpeechSubjects,
}

impl NatsRecognizer {
    pub async fn connect(url: &str, subjects: SpeechSubjects) -> Result<Self> {
        let client = NatsClient::connect(url)
            .await
            .context("Failed to connect speech recognizer")?;
        Ok(Self { client, subjects })
    }
}

#[async_trait::async_trait]
impl Recognizer for NatsRecognizer {
    async fn open_stream(&self, sample_rate: u32, channels: u16) -> Result<RecognitionStream> {
        let session_id = format!("voice-{}", uuid::Uuid::new_v4());
        info!("Opening recognition session {}", session_id);

        // Subscribe before the first frame goes out so no transcript is missed
        let mut transcript_sub = self
            .client
            .subscribe(self.subjects.transcripts.clone())
            .await?;

        let (frame_tx, mut frame_rx) = mpsc::channel::<AudioFrame>(100);
        let (event_tx, event_rx) = mpsc::channel(100);

        // Audio publishing task
        let client = self.client.clone();
        let subject = format!("{}.{}", self.subjects.frames, session_id);
        let publish_session = session_id.clone();
        tokio::spawn(async move {
            let mut sequence = 0u32;

            while let Some(frame) = frame_rx.recv().await {
                let message = AudioFrameMessage {
                    session_id: publish_session.clone(),
                    sequence,
                    pcm: base64::engine::general_purpose::STANDARD.encode(frame.to_pcm_bytes()),
                    sample_rate: frame.sample_rate,
                    channels: frame.channels,
                    timestamp: chrono::Utc::now().to_rfc3339(),
                    final_frame: false,
                };
                if let Err(e) = client.publish_json(subject.clone(), &message).await {
                    error!("Failed to publish audio frame: {:#}", e);
                }
                sequence += 1;
            }

            // Final marker asks the service for its final transcript
            let marker = AudioFrameMessage {
                session_id: publish_session.clone(),
                sequence,
                pcm: String::new(),
                sample_rate,
                channels,
                timestamp: chrono::Utc::now().to_rfc3339(),
                final_frame: true,
            };
            if let Err(e) = client.publish_json(subject, &marker).await {
                error!("Failed to publish final frame marker: {:#}", e);
            }
        });

        // Transcript receiving task
        tokio::spawn(async move {
            while let Some(msg) = transcript_sub.next().await {
                let transcript = match serde_json::from_slice::<TranscriptMessage>(&msg.payload) {
                    Ok(transcript) => transcript,
                    Err(e) => {
                        warn!("Failed to parse transcript message: {}", e);
                        continue;
                    }
                };

                if transcript.session_id != session_id {
                    continue;
                }

                let event = match (transcript.error, transcript.partial) {
                    (Some(reason), _) => RecognizerEvent::Failed(reason),
                    (None, true) => RecognizerEvent::Partial(transcript.text),
                    (None, false) => RecognizerEvent::Final(transcript.text),
                };
                let terminal = !matches!(event, RecognizerEvent::Partial(_));

                if event_tx.send(event).await.is_err() || terminal {
                    break;
                }
            }

            info!("Recognition session {} closed", session_id);
        });

        Ok(RecognitionStream {
            frames: frame_tx,
            events: event_rx,
        })
    }

    fn name(&self) -> &str {
        "nats-stt"
    }
}
