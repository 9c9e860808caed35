//! Capture state machine
//!
//! Single-shot: Idle -> Recording -> Recognizing -> Idle.
//! Streaming: Idle -> Recording(streaming) -> Idle, partials emitted while recording.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    #[default]
    None,
    SingleShot,
    Streaming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CapturePhase {
    #[default]
    Idle,
    Recording,
    Recognizing,
}

/// The engine's (mode, phase) pair; phase != Idle implies mode != None
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CaptureState {
    pub mode: CaptureMode,
    pub phase: CapturePhase,
}

impl CaptureState {
    pub const IDLE: CaptureState = CaptureState {
        mode: CaptureMode::None,
        phase: CapturePhase::Idle,
    };

    pub fn recording(mode: CaptureMode) -> Self {
        Self {
            mode,
            phase: CapturePhase::Recording,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.phase == CapturePhase::Idle
    }

    /// Returns a human-readable description of the state
    pub fn description(&self) -> &'static str {
        match (self.mode, self.phase) {
            (_, CapturePhase::Idle) => "Idle",
            (CaptureMode::Streaming, CapturePhase::Recording) => "Streaming recognition",
            (_, CapturePhase::Recording) => "Recording",
            (_, CapturePhase::Recognizing) => "Recognizing",
        }
    }
}
