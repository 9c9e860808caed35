use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::backend::AudioFrame;

/// Metadata for a finished voice asset
#[derive(Debug, Clone)]
pub struct VoiceAsset {
    /// File path to the WAV asset
    pub file_path: PathBuf,
    /// Sample rate
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Number of samples written
    pub sample_count: usize,
}

impl VoiceAsset {
    /// Duration of the asset in milliseconds
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0;
        }
        self.sample_count as u64 * 1000 / (self.sample_rate as u64 * self.channels as u64)
    }

    /// Opaque asset reference handed across the core boundary
    pub fn asset_ref(&self) -> String {
        self.file_path.display().to_string()
    }
}

/// Writes one captured utterance to disk as a WAV file
///
/// The format is taken from the first frame; the file is created lazily so an
/// utterance with no frames leaves nothing behind.
pub struct VoiceAssetWriter {
    file_path: PathBuf,
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    asset: Option<VoiceAsset>,
}

impl VoiceAssetWriter {
    /// Prepare a writer for `voice-<uuid>.wav` under `output_dir`
    pub fn new(output_dir: &Path) -> Result<Self> {
        fs::create_dir_all(output_dir).context("Failed to create recordings directory")?;

        let file_path = output_dir.join(format!("voice-{}.wav", uuid::Uuid::new_v4()));

        Ok(Self {
            file_path,
            writer: None,
            asset: None,
        })
    }

    pub fn write_frame(&mut self, frame: &AudioFrame) -> Result<()> {
        if self.writer.is_none() {
            let spec = hound::WavSpec {
                channels: frame.channels,
                sample_rate: frame.sample_rate,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            };

            let writer = hound::WavWriter::create(&self.file_path, spec)
                .with_context(|| format!("Failed to create WAV file: {:?}", self.file_path))?;

            self.writer = Some(writer);
            self.asset = Some(VoiceAsset {
                file_path: self.file_path.clone(),
                sample_rate: frame.sample_rate,
                channels: frame.channels,
                sample_count: 0,
            });
        }

        if let (Some(writer), Some(asset)) = (&mut self.writer, &mut self.asset) {
            for &sample in &frame.samples {
                writer
                    .write_sample(sample)
                    .context("Failed to write sample to WAV")?;
            }
            asset.sample_count += frame.samples.len();
        }

        Ok(())
    }

    /// Finalize the file; `None` when no frame was ever written
    pub fn finish(mut self) -> Result<Option<VoiceAsset>> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().context("Failed to finalize WAV file")?;
        }

        if let Some(asset) = &self.asset {
            info!(
                "Voice asset saved: {} ({} ms)",
                asset.file_path.display(),
                asset.duration_ms()
            );
        }

        Ok(self.asset.take())
    }
}

impl Drop for VoiceAssetWriter {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV writer on drop: {}", e);
            }
        }
    }
}
