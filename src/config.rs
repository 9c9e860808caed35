use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;

use crate::audio::{AudioBackendConfig, AudioSource, SilenceConfig};
use crate::speech::{CaptureConfig, SpeechSubjects};
use crate::transport::ChatSubjects;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub server: ServerConfig,
    pub speech: SpeechConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "ziyue".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Default chat server address
    pub address: String,
    pub request_subject: String,
    pub stream_subject: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "nats://localhost:4222".to_string(),
            request_subject: "chat.request".to_string(),
            stream_subject: "chat.stream".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn subjects(&self) -> ChatSubjects {
        ChatSubjects {
            request: self.request_subject.clone(),
            stream: self.stream_subject.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSource {
    Microphone,
    File,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// NATS server of the speech-to-text service
    pub nats_url: String,
    pub frame_subject: String,
    pub transcript_subject: String,
    pub source: InputSource,
    /// Input file when `source = "file"`
    pub source_path: Option<String>,
    pub recordings_path: String,
    pub sample_rate: u32,
    pub channels: u16,
    /// RMS level that counts as speech
    pub silence_threshold: f32,
    pub silence_timeout_ms: u64,
    pub max_recording_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            nats_url: "nats://localhost:4222".to_string(),
            frame_subject: "audio.frame".to_string(),
            transcript_subject: "stt.text.>".to_string(),
            source: InputSource::Microphone,
            source_path: None,
            recordings_path: "recordings".to_string(),
            sample_rate: 16000,
            channels: 1,
            silence_threshold: 1000.0,
            silence_timeout_ms: 1500,
            max_recording_secs: 60,
        }
    }
}

impl SpeechConfig {
    pub fn subjects(&self) -> SpeechSubjects {
        SpeechSubjects {
            frames: self.frame_subject.clone(),
            transcripts: self.transcript_subject.clone(),
        }
    }

    pub fn audio_source(&self) -> Result<AudioSource> {
        match self.source {
            InputSource::Microphone => Ok(AudioSource::Microphone),
            InputSource::File => {
                let path = self
                    .source_path
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("speech.source_path is required for file input"))?;
                Ok(AudioSource::File(PathBuf::from(path)))
            }
        }
    }

    pub fn backend_config(&self) -> AudioBackendConfig {
        AudioBackendConfig {
            target_sample_rate: self.sample_rate,
            target_channels: self.channels,
            ..AudioBackendConfig::default()
        }
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            recordings_dir: PathBuf::from(&self.recordings_path),
            silence: SilenceConfig {
                threshold: self.silence_threshold,
                timeout_ms: self.silence_timeout_ms,
                max_recording_ms: self.max_recording_secs * 1000,
            },
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }
}

impl Config {
    /// Load from a config file (extension optional) overlaid with
    /// `ZIYUE__SECTION__KEY` environment variables
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("ZIYUE").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
