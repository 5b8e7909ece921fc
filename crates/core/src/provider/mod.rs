//! ASR provider interface and leased pool

pub mod pool;

pub use pool::{ProviderFactory, ProviderLease, ProviderPool};

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::audio::PIPELINE_SAMPLE_RATE;
use crate::error::{Error, Result};

/// A finished transcription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResult {
    /// The transcribed text
    pub full_text: String,
    /// Detected or configured language tag
    pub language: Option<String>,
    /// Audio duration in seconds
    pub duration: f64,
    /// Overall confidence when the engine reports one
    pub confidence: Option<f32>,
}

/// ASR engine seam. Concrete engines (Whisper and friends) live outside this
/// crate; the pool hands out leased instances of this trait.
#[async_trait]
pub trait AsrProvider: Send + Sync {
    /// Engine name, for logs and stats.
    fn name(&self) -> &str;

    /// Transcribe an audio file on disk.
    async fn transcribe_file(&self, path: &Path) -> Result<TranscriptionResult>;

    /// Transcribe in-memory 16 kHz mono s16 audio. The default spills to a
    /// temporary WAV for engines that only accept files.
    async fn transcribe_audio(&self, samples: &[i16]) -> Result<TranscriptionResult> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: PIPELINE_SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let file = tempfile::Builder::new()
            .prefix("asrhub-segment-")
            .suffix(".wav")
            .tempfile()
            .map_err(|e| Error::Provider(format!("temp file: {}", e)))?;

        {
            let mut writer = hound::WavWriter::create(file.path(), spec)?;
            for s in samples {
                writer.write_sample(*s)?;
            }
            writer.finalize()?;
        }

        let result = self.transcribe_file(file.path()).await;
        // NamedTempFile unlinks on drop
        result
    }
}
