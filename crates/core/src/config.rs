//! Configuration for the coordination core
//!
//! Uses `#[serde(default)]` throughout so partial TOML configs work; every
//! knob has a sensible default. Configuration *loading* (file discovery,
//! layering, env overrides) is the embedding application's concern - this
//! module only defines the recognized option set.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Top-level configuration for an [`crate::app::App`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Timestamped audio queue parameters
    pub queue: QueueConfig,
    /// VAD thresholds and framing
    pub vad: VadConfig,
    /// Wake-word thresholds and framing
    pub wakeword: WakewordConfig,
    /// ASR provider pool parameters
    pub pool: PoolConfig,
    /// Recording service parameters
    pub recording: RecordingConfig,
    /// Session lifecycle parameters
    pub session: SessionConfig,
}

impl Config {
    /// Parse a TOML document into a config, then validate it.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(s).map_err(|e| Error::Config(format!("invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field invariants. Config errors are fatal at init.
    pub fn validate(&self) -> Result<()> {
        if self.queue.max_history_duration <= 0.0 {
            return Err(Error::Config("max_history_duration must be > 0".into()));
        }
        if self.queue.chunk_duration <= 0.0 {
            return Err(Error::Config("chunk_duration must be > 0".into()));
        }
        if self.queue.pre_roll_duration < 0.0 || self.queue.tail_padding_duration < 0.0 {
            return Err(Error::Config(
                "pre_roll_duration and tail_padding_duration must be >= 0".into(),
            ));
        }
        if self.vad.silence_threshold < 0.0 {
            return Err(Error::Config("silence_threshold must be >= 0".into()));
        }
        if self.pool.size == 0 {
            return Err(Error::Config("pool.size must be >= 1".into()));
        }
        if self.vad.frame_samples == 0 || self.wakeword.frame_samples == 0 {
            return Err(Error::Config("detector frame_samples must be > 0".into()));
        }
        Ok(())
    }
}

/// Timestamped audio queue parameters (all durations in seconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Seconds of audio prepended before the wake timestamp into the recording
    pub pre_roll_duration: f64,
    /// Seconds appended after detected silence
    pub tail_padding_duration: f64,
    /// Queue retention window in seconds
    pub max_history_duration: f64,
    /// Assumed per-chunk duration used for queue accounting
    pub chunk_duration: f64,
    /// Default timeout for blocking pulls in seconds
    pub blocking_timeout: f64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            pre_roll_duration: 1.0,
            tail_padding_duration: 0.3,
            max_history_duration: 30.0,
            chunk_duration: 0.1,
            blocking_timeout: 0.1,
        }
    }
}

impl QueueConfig {
    /// Blocking pull timeout as a [`Duration`].
    pub fn blocking_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.blocking_timeout.max(0.0))
    }
}

/// VAD thresholds and framing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    /// Speech probability threshold (0.0-1.0)
    pub threshold: f32,
    /// Silence duration in seconds that triggers `silence_timeout`
    pub silence_threshold: f64,
    /// Samples per inference frame (512 = 32 ms at 16 kHz)
    pub frame_samples: usize,
    /// Optional model path, passed through to the detector collaborator
    pub model_path: Option<PathBuf>,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            silence_threshold: 1.0,
            frame_samples: 512,
            model_path: None,
        }
    }
}

/// Wake-word thresholds and framing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WakewordConfig {
    /// Detection confidence threshold (0.0-1.0)
    pub threshold: f32,
    /// Samples per inference frame (1280 = 80 ms at 16 kHz)
    pub frame_samples: usize,
    /// Keywords the detector is loaded with; empty means detector default
    pub keywords: Vec<String>,
    /// Optional model path, passed through to the detector collaborator
    pub model_path: Option<PathBuf>,
}

impl Default for WakewordConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            frame_samples: 1280,
            keywords: Vec::new(),
            model_path: None,
        }
    }
}

/// ASR provider pool parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of pooled provider instances
    pub size: usize,
    /// Lease acquisition timeout in seconds
    pub lease_timeout: f64,
    /// Transition the session FSM to `error` on lease timeout instead of the
    /// default nil-result `transcribe_done` + cleanup path
    pub error_on_lease_timeout: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: 2,
            lease_timeout: 30.0,
            error_on_lease_timeout: false,
        }
    }
}

impl PoolConfig {
    /// Lease timeout as a [`Duration`].
    pub fn lease_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.lease_timeout.max(0.0))
    }
}

/// Recording service parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Write recorded segments to disk
    pub enabled: bool,
    /// Directory for finished recordings
    pub output_dir: PathBuf,
    /// Recordings older than this many days are eligible for cleanup
    pub retention_days: u32,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output_dir: PathBuf::from("recordings"),
            retention_days: 7,
        }
    }
}

/// Session lifecycle parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Session time-to-live in seconds; refreshed on every action for the session
    pub ttl: f64,
    /// Interval between expiry sweeps in seconds
    pub expiry_sweep_interval: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: 3600.0,
            expiry_sweep_interval: 60.0,
        }
    }
}
