//! Energy-based end-of-utterance detection
//!
//! An utterance ends once speech has been heard and the input then stays
//! below the energy threshold for the configured timeout, or when the
//! recording reaches its maximum length.

use super::backend::AudioFrame;

#[derive(Debug, Clone)]
pub struct SilenceConfig {
    /// RMS level at or above which a frame counts as speech
    pub threshold: f32,
    /// Continuous silence after speech that ends the utterance
    pub timeout_ms: u64,
    /// Hard cap on recording length
    pub max_recording_ms: u64,
}

impl Default for SilenceConfig {
    fn default() -> Self {
        Self {
            threshold: 1000.0,
            timeout_ms: 1500,
            max_recording_ms: 60_000,
        }
    }
}

/// Why an utterance ended on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtteranceEnd {
    /// Silence followed speech for the configured timeout
    Silence,
    /// Recording hit the maximum length
    MaxDuration,
}

#[derive(Debug)]
pub struct SilenceDetector {
    config: SilenceConfig,
    heard_speech: bool,
    silence_ms: u64,
    elapsed_ms: u64,
}

impl SilenceDetector {
    pub fn new(config: SilenceConfig) -> Self {
        Self {
            config,
            heard_speech: false,
            silence_ms: 0,
            elapsed_ms: 0,
        }
    }

    /// Feed one frame; returns `Some` once the utterance is over
    pub fn observe(&mut self, frame: &AudioFrame) -> Option<UtteranceEnd> {
        let duration = frame.duration_ms();
        self.elapsed_ms += duration;

        if rms(&frame.samples) >= self.config.threshold {
            self.heard_speech = true;
            self.silence_ms = 0;
        } else if self.heard_speech {
            self.silence_ms += duration;
        }

        if self.heard_speech && self.silence_ms >= self.config.timeout_ms {
            return Some(UtteranceEnd::Silence);
        }
        if self.elapsed_ms >= self.config.max_recording_ms {
            return Some(UtteranceEnd::MaxDuration);
        }
        None
    }

    pub fn heard_speech(&self) -> bool {
        self.heard_speech
    }
}

/// Root-mean-square level of a block of samples
pub fn rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}
