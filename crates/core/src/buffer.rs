//! Frame slicing for detector workers
//!
//! Detector models want fixed-size frames; the queue hands out whatever chunk
//! sizes the transport delivered. [`BufferManager`] sits between them and
//! carves the pulled byte stream into model-appropriate frames in one of
//! three modes:
//!
//! | Mode | Behavior |
//! |---|---|
//! | fixed | consecutive non-overlapping frames of `frame_size` samples |
//! | sliding | frames of `frame_size` advancing by `step_size` (overlap kept) |
//! | dynamic | accumulate until min/max duration or an external `flush()` |

use crate::error::{Error, Result};

/// Framing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferMode {
    /// Non-overlapping `frame_size` windows
    Fixed,
    /// `frame_size` windows advancing by `step_size`
    Sliding,
    /// Accumulate until a duration threshold or flush
    Dynamic,
}

/// Buffer configuration. Sizes are in samples; durations in milliseconds.
#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// Framing mode
    pub mode: BufferMode,
    /// Window length in samples (fixed/sliding)
    pub frame_size: Option<usize>,
    /// Advance per window in samples (sliding)
    pub step_size: Option<usize>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u16,
    /// Bytes per single-channel sample
    pub sample_width: usize,
    /// Hard cap on buffered bytes; oldest bytes are dropped on overflow
    pub max_buffer_size: Option<usize>,
    /// Dynamic mode: emit once this much audio is buffered
    pub min_duration_ms: Option<u32>,
    /// Dynamic mode: never emit more than this much at once
    pub max_duration_ms: Option<u32>,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            mode: BufferMode::Fixed,
            frame_size: None,
            step_size: None,
            sample_rate: 16_000,
            channels: 1,
            sample_width: 2,
            max_buffer_size: Some(1 << 20),
            min_duration_ms: None,
            max_duration_ms: None,
        }
    }
}

impl BufferConfig {
    /// Fixed-frame config for the wake-word worker (1280 samples = 80 ms at
    /// 16 kHz; the model needs exactly this).
    pub fn for_wake_word(sample_rate: u32, frame_samples: usize) -> Self {
        Self {
            mode: BufferMode::Fixed,
            frame_size: Some(frame_samples),
            sample_rate,
            ..Self::default()
        }
    }

    /// Fixed-frame config for the VAD worker (512 samples = 32 ms at 16 kHz).
    pub fn for_vad(sample_rate: u32, frame_samples: usize) -> Self {
        Self {
            mode: BufferMode::Fixed,
            frame_size: Some(frame_samples),
            sample_rate,
            ..Self::default()
        }
    }

    /// Sliding-window config (window and step in samples).
    pub fn sliding(sample_rate: u32, frame_samples: usize, step_samples: usize) -> Self {
        Self {
            mode: BufferMode::Sliding,
            frame_size: Some(frame_samples),
            step_size: Some(step_samples),
            sample_rate,
            ..Self::default()
        }
    }
}

/// Byte-stream framer used inside detector workers.
pub struct BufferManager {
    config: BufferConfig,
    buf: Vec<u8>,
    frame_bytes: Option<usize>,
    step_bytes: Option<usize>,
    min_dynamic_bytes: Option<usize>,
    max_dynamic_bytes: Option<usize>,
}

impl BufferManager {
    /// Validate the configuration and build a framer.
    pub fn new(config: BufferConfig) -> Result<Self> {
        if config.sample_width == 0 || config.channels == 0 || config.sample_rate == 0 {
            return Err(Error::Config(
                "sample_width, channels, and sample_rate must be > 0".into(),
            ));
        }

        let bytes_per_frame_sample = config.sample_width * config.channels as usize;
        let samp2bytes = |samples: Option<usize>| samples.map(|s| s * bytes_per_frame_sample);

        let frame_bytes = samp2bytes(config.frame_size);
        let step_bytes = samp2bytes(config.step_size).or(frame_bytes);

        match config.mode {
            BufferMode::Fixed | BufferMode::Sliding => {
                let frame = frame_bytes
                    .filter(|&f| f > 0)
                    .ok_or_else(|| Error::Config("fixed/sliding mode requires positive frame_size".into()))?;
                if config.mode == BufferMode::Sliding {
                    let step = step_bytes.unwrap_or(0);
                    if step == 0 || step > frame {
                        return Err(Error::Config(
                            "sliding mode requires 0 < step_size <= frame_size".into(),
                        ));
                    }
                }
            }
            BufferMode::Dynamic => {
                if let (Some(min), Some(max)) = (config.min_duration_ms, config.max_duration_ms) {
                    if max < min {
                        return Err(Error::Config(
                            "dynamic mode requires max_duration_ms >= min_duration_ms".into(),
                        ));
                    }
                }
            }
        }

        let bytes_per_sec = config.sample_rate as usize * bytes_per_frame_sample;
        let ms_to_bytes = |ms: u32| ((bytes_per_sec * ms as usize) / 1000).max(1);

        Ok(Self {
            frame_bytes,
            step_bytes,
            min_dynamic_bytes: config.min_duration_ms.map(ms_to_bytes),
            max_dynamic_bytes: config.max_duration_ms.map(ms_to_bytes),
            buf: Vec::new(),
            config,
        })
    }

    /// Append bytes, dropping the oldest on overflow.
    pub fn push(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.buf.extend_from_slice(data);

        if let Some(max) = self.config.max_buffer_size {
            if self.buf.len() > max {
                let overflow = self.buf.len() - max;
                self.buf.drain(..overflow);
                tracing::warn!(
                    "Buffer overflow, dropped {} oldest bytes (max={})",
                    overflow,
                    max
                );
            }
        }
    }

    /// True when [`Self::pop`] would yield a frame.
    pub fn ready(&self) -> bool {
        match self.config.mode {
            BufferMode::Fixed | BufferMode::Sliding => {
                self.buf.len() >= self.frame_bytes.unwrap_or(usize::MAX)
            }
            BufferMode::Dynamic => match self.min_dynamic_bytes {
                // No threshold: emission is flush-driven
                None => false,
                Some(min) => self.buf.len() >= min,
            },
        }
    }

    /// Pop the next frame, or `None` when not ready.
    pub fn pop(&mut self) -> Option<Vec<u8>> {
        if !self.ready() {
            return None;
        }

        match self.config.mode {
            BufferMode::Fixed => {
                let frame_bytes = self.frame_bytes?;
                let frame = self.buf[..frame_bytes].to_vec();
                self.buf.drain(..frame_bytes);
                Some(frame)
            }
            BufferMode::Sliding => {
                let frame_bytes = self.frame_bytes?;
                let step_bytes = self.step_bytes?;
                let frame = self.buf[..frame_bytes].to_vec();
                self.buf.drain(..step_bytes);
                Some(frame)
            }
            BufferMode::Dynamic => {
                let mut size = self.buf.len();
                if let Some(max) = self.max_dynamic_bytes {
                    size = size.min(max);
                }
                let frame = self.buf[..size].to_vec();
                self.buf.drain(..size);
                Some(frame)
            }
        }
    }

    /// Pop every ready frame.
    pub fn pop_all(&mut self) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(frame) = self.pop() {
            out.push(frame);
        }
        out
    }

    /// Emit whatever is buffered (remainder for fixed/sliding, everything for
    /// dynamic) and clear. `None` when empty.
    pub fn flush(&mut self) -> Option<Vec<u8>> {
        if self.buf.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.buf))
    }

    /// Drop all buffered bytes.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Currently buffered byte count.
    pub fn buffered_bytes(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_mode_emits_whole_frames() {
        let mut buffer =
            BufferManager::new(BufferConfig::for_wake_word(16_000, 4)).unwrap();
        buffer.push(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]); // 8 bytes per 4-sample frame

        assert!(buffer.ready());
        let frame = buffer.pop().unwrap();
        assert_eq!(frame, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(!buffer.ready());
        assert_eq!(buffer.buffered_bytes(), 2);
    }

    #[test]
    fn test_fixed_mode_pop_all() {
        let mut buffer = BufferManager::new(BufferConfig::for_vad(16_000, 2)).unwrap();
        buffer.push(&[0u8; 13]); // 3 full 4-byte frames + 1 remainder byte
        let frames = buffer.pop_all();
        assert_eq!(frames.len(), 3);
        assert_eq!(buffer.buffered_bytes(), 1);
        assert_eq!(buffer.flush().unwrap().len(), 1);
        assert!(buffer.flush().is_none());
    }

    #[test]
    fn test_sliding_mode_overlaps() {
        let mut buffer = BufferManager::new(BufferConfig::sliding(16_000, 3, 1)).unwrap();
        buffer.push(&[1, 1, 2, 2, 3, 3, 4, 4]); // samples [1,2,3,4] as byte pairs

        let a = buffer.pop().unwrap();
        assert_eq!(a, vec![1, 1, 2, 2, 3, 3]);
        let b = buffer.pop().unwrap();
        assert_eq!(b, vec![2, 2, 3, 3, 4, 4]);
        assert!(buffer.pop().is_none());
    }

    #[test]
    fn test_dynamic_mode_threshold() {
        let config = BufferConfig {
            mode: BufferMode::Dynamic,
            min_duration_ms: Some(1), // 32 bytes at 16kHz s16le mono
            max_duration_ms: Some(2),
            ..BufferConfig::default()
        };
        let mut buffer = BufferManager::new(config).unwrap();

        buffer.push(&[0u8; 16]);
        assert!(!buffer.ready());
        buffer.push(&[0u8; 16]);
        assert!(buffer.ready());

        buffer.push(&[0u8; 100]);
        // Capped at max_duration_ms worth of bytes
        let frame = buffer.pop().unwrap();
        assert_eq!(frame.len(), 64);
    }

    #[test]
    fn test_dynamic_without_threshold_is_flush_driven() {
        let config = BufferConfig {
            mode: BufferMode::Dynamic,
            ..BufferConfig::default()
        };
        let mut buffer = BufferManager::new(config).unwrap();
        buffer.push(&[1, 2, 3]);
        assert!(!buffer.ready());
        assert!(buffer.pop().is_none());
        assert_eq!(buffer.flush().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let config = BufferConfig {
            max_buffer_size: Some(4),
            frame_size: Some(1),
            ..BufferConfig::default()
        };
        let mut buffer = BufferManager::new(config).unwrap();
        buffer.push(&[1, 2, 3, 4]);
        buffer.push(&[5, 6]);
        assert_eq!(buffer.buffered_bytes(), 4);
        assert_eq!(buffer.flush().unwrap(), vec![3, 4, 5, 6]);
    }

    #[test]
    fn test_invalid_configs_rejected() {
        // fixed without frame_size
        let config = BufferConfig {
            mode: BufferMode::Fixed,
            frame_size: None,
            ..BufferConfig::default()
        };
        assert!(BufferManager::new(config).is_err());

        // sliding with step > frame
        assert!(BufferManager::new(BufferConfig::sliding(16_000, 2, 3)).is_err());

        // dynamic with max < min
        let config = BufferConfig {
            mode: BufferMode::Dynamic,
            min_duration_ms: Some(10),
            max_duration_ms: Some(5),
            ..BufferConfig::default()
        };
        assert!(BufferManager::new(config).is_err());

        // zero sample_width
        let config = BufferConfig {
            sample_width: 0,
            frame_size: Some(1),
            ..BufferConfig::default()
        };
        assert!(BufferManager::new(config).is_err());
    }
}
