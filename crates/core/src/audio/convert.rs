//! Audio format conversion collaborator
//!
//! The ingest path normalizes every chunk to the pipeline format (16 kHz mono
//! s16le) before it enters the timestamped queue. Conversion is a pure
//! function over bytes: downmix interleaved channels by averaging, then
//! linear-interpolation resample. Good enough for speech; a higher-quality
//! resampler can be swapped in behind the same trait.

use super::{i16_to_pcm16_bytes, AudioChunk, AudioConfig, SampleFormat};
use crate::error::{Error, Result};

/// Format conversion seam between ingest and the queue.
pub trait AudioConverter: Send + Sync {
    /// Convert `chunk` to `target`. Implementations must not mutate the input.
    fn convert(&self, chunk: &AudioChunk, target: AudioConfig) -> Result<AudioChunk>;

    /// True when `chunk` already matches `target`.
    fn needs_conversion(&self, chunk: &AudioChunk, target: AudioConfig) -> bool {
        chunk.config() != target
    }
}

/// Default converter: average-downmix + linear-interpolation resample.
#[derive(Debug, Default, Clone, Copy)]
pub struct PcmConverter;

impl PcmConverter {
    /// Downmix interleaved frames to mono by averaging the channels.
    fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
        if channels <= 1 {
            return samples.to_vec();
        }
        let channels = channels as usize;
        samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    }

    /// Linear interpolation resampling.
    fn resample(samples: &[f32], from_sr: u32, to_sr: u32) -> Vec<f32> {
        if from_sr == to_sr || samples.is_empty() {
            return samples.to_vec();
        }

        let ratio = from_sr as f32 / to_sr as f32;
        let new_len = (samples.len() as f32 / ratio) as usize;

        (0..new_len)
            .map(|i| {
                let pos = i as f32 * ratio;
                let idx = pos as usize;
                let frac = pos - idx as f32;

                if idx + 1 < samples.len() {
                    samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
                } else {
                    samples[samples.len() - 1]
                }
            })
            .collect()
    }
}

impl AudioConverter for PcmConverter {
    fn convert(&self, chunk: &AudioChunk, target: AudioConfig) -> Result<AudioChunk> {
        if chunk.sample_rate == 0 || chunk.channels == 0 {
            return Err(Error::Audio(format!(
                "chunk has invalid format: {}Hz, {}ch",
                chunk.sample_rate, chunk.channels
            )));
        }
        if target.channels != 1 {
            return Err(Error::Audio(format!(
                "unsupported target channel count: {}",
                target.channels
            )));
        }
        if !self.needs_conversion(chunk, target) {
            return Ok(chunk.clone());
        }

        let samples = chunk.to_f32();
        let mono = Self::downmix(&samples, chunk.channels);
        let resampled = Self::resample(&mono, chunk.sample_rate, target.sample_rate);

        let data = match target.format {
            SampleFormat::I16 => {
                let ints: Vec<i16> = resampled
                    .iter()
                    .map(|s| (s.clamp(-1.0, 1.0) * 32767.0) as i16)
                    .collect();
                i16_to_pcm16_bytes(&ints)
            }
            SampleFormat::F32 => {
                let mut bytes = Vec::with_capacity(resampled.len() * 4);
                for s in &resampled {
                    bytes.extend_from_slice(&s.to_le_bytes());
                }
                bytes
            }
        };

        Ok(AudioChunk::new(
            data,
            target.sample_rate,
            target.channels,
            target.format,
        ))
    }
}
