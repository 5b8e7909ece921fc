//! Detector collaborator interfaces
//!
//! Wake-word and VAD model implementations live outside this crate; the
//! coordinator's workers drive them through these traits. Inference calls
//! are synchronous and expected to complete within one frame period; workers
//! never hold the session queue lock while calling into a detector.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A positive wake-word detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WakewordDetection {
    /// The keyword label the model fired on
    pub keyword: String,
    /// Detection confidence (0.0-1.0)
    pub confidence: f32,
}

/// Wake-word model seam. `frame` is normalized mono f32 PCM at 16 kHz,
/// 1280 samples (80 ms) per call.
pub trait WakewordDetector: Send + Sync {
    /// Run inference on one frame; empty vec when nothing fired.
    fn detect(&self, frame: &[f32]) -> Result<Vec<WakewordDetection>>;
}

/// VAD classification of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechState {
    /// The frame contains speech
    Speech,
    /// The frame is silence
    Silence,
}

/// VAD inference result for one frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VadResult {
    /// Speech / silence classification
    pub state: SpeechState,
    /// Speech probability (0.0-1.0)
    pub probability: f32,
}

/// VAD model seam. Stateful per session (recurrent hidden state), so calls
/// carry the session id. `frame` is normalized mono f32 PCM at 16 kHz,
/// 512-1024 samples per call.
pub trait VadDetector: Send + Sync {
    /// Run inference on one frame for a session.
    fn detect(&self, frame: &[f32], session_id: &str) -> Result<VadResult>;

    /// Drop any per-session model state.
    fn reset_session(&self, _session_id: &str) {}
}
