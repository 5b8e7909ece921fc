//! Audio data types
//!
//! [`AudioChunk`] is the unit flowing through the timestamped queue: an
//! immutable PCM payload behind an `Arc` so readers share bytes without
//! copying. The pipeline's working format is 16 kHz mono signed 16-bit
//! little-endian; ingest may declare anything and the converter collaborator
//! normalizes it.

pub mod convert;

pub use convert::{AudioConverter, PcmConverter};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Sample rate every detector and provider in the pipeline expects.
pub const PIPELINE_SAMPLE_RATE: u32 = 16_000;

/// Audio sample formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    /// 16-bit signed integer samples, little-endian
    I16,
    /// 32-bit floating point samples (range: -1.0 to 1.0), little-endian
    F32,
}

impl SampleFormat {
    /// Bytes per single-channel sample
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::I16 => 2,
            SampleFormat::F32 => 4,
        }
    }
}

/// A session's declared audio input format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u16,
    /// Sample encoding
    pub format: SampleFormat,
}

impl AudioConfig {
    /// The pipeline's working format: 16 kHz mono s16le.
    pub fn pipeline() -> Self {
        Self {
            sample_rate: PIPELINE_SAMPLE_RATE,
            channels: 1,
            format: SampleFormat::I16,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self::pipeline()
    }
}

/// A contiguous PCM payload. Immutable once queued; cloning shares the bytes.
#[derive(Clone)]
pub struct AudioChunk {
    data: Arc<[u8]>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u16,
    /// Sample encoding
    pub format: SampleFormat,
}

impl AudioChunk {
    /// Create a chunk taking ownership of the payload bytes.
    pub fn new(data: Vec<u8>, sample_rate: u32, channels: u16, format: SampleFormat) -> Self {
        Self {
            data: data.into(),
            sample_rate,
            channels,
            format,
        }
    }

    /// Create a 16 kHz mono s16le chunk from samples.
    pub fn from_i16(samples: &[i16]) -> Self {
        let mut data = Vec::with_capacity(samples.len() * 2);
        for s in samples {
            data.extend_from_slice(&s.to_le_bytes());
        }
        Self::new(data, PIPELINE_SAMPLE_RATE, 1, SampleFormat::I16)
    }

    /// Raw payload bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The chunk's declared format as an [`AudioConfig`].
    pub fn config(&self) -> AudioConfig {
        AudioConfig {
            sample_rate: self.sample_rate,
            channels: self.channels,
            format: self.format,
        }
    }

    /// Number of per-channel sample frames in the payload.
    pub fn sample_frames(&self) -> usize {
        let denom = self.format.bytes_per_sample() * self.channels as usize;
        if denom == 0 {
            0
        } else {
            self.data.len() / denom
        }
    }

    /// Duration in seconds derived from the payload length.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.sample_frames() as f64 / self.sample_rate as f64
    }

    /// Decode the payload to interleaved i16 samples.
    pub fn to_i16(&self) -> Vec<i16> {
        match self.format {
            SampleFormat::I16 => pcm16_bytes_to_i16(&self.data),
            SampleFormat::F32 => self
                .to_f32()
                .into_iter()
                .map(|s| (s.clamp(-1.0, 1.0) * 32767.0) as i16)
                .collect(),
        }
    }

    /// Decode the payload to interleaved f32 samples in [-1, 1].
    pub fn to_f32(&self) -> Vec<f32> {
        match self.format {
            SampleFormat::I16 => pcm16_bytes_to_i16(&self.data)
                .into_iter()
                .map(|s| s as f32 / 32768.0)
                .collect(),
            SampleFormat::F32 => self
                .data
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
        }
    }
}

impl std::fmt::Debug for AudioChunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "AudioChunk({} bytes, {}Hz, {}ch, {:?})",
            self.data.len(),
            self.sample_rate,
            self.channels,
            self.format
        )
    }
}

/// Decode little-endian 16-bit PCM bytes to samples. A trailing odd byte is
/// dropped.
pub fn pcm16_bytes_to_i16(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

/// Decode little-endian 16-bit PCM bytes to normalized f32 samples.
pub fn pcm16_bytes_to_f32(bytes: &[u8]) -> Vec<f32> {
    pcm16_bytes_to_i16(bytes)
        .into_iter()
        .map(|s| s as f32 / 32768.0)
        .collect()
}

/// Encode i16 samples as little-endian bytes.
pub fn i16_to_pcm16_bytes(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}
