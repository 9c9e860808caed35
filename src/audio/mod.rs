pub mod asset;
pub mod backend;
pub mod file;
pub mod playback;
pub mod replay;
pub mod silence;

pub use asset::{VoiceAsset, VoiceAssetWriter};
pub use backend::{
    AudioBackendConfig, AudioFrame, AudioSource, CaptureBackend, CaptureBackendFactory,
    PermissionStatus,
};
pub use file::AudioFile;
pub use playback::{PacedSink, Playback, PlaybackHandle, PlaybackOutcome, PlaybackSink, PlaybackState};
pub use replay::FileReplayBackend;
pub use silence::{SilenceConfig, SilenceDetector, UtteranceEnd};
