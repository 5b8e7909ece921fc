//! Recording service
//!
//! Captures a session's utterance to a WAV file by registering itself as the
//! `recording` reader on the timestamped queue, optionally starting behind
//! "now" for pre-roll. The file is finalized atomically on stop: the writer
//! drains what is queued, closes the WAV, then renames it so the filename
//! carries the real end time:
//!
//! `<recordings_dir>/[<session_id>]<start>-<end>.wav`, timestamps formatted
//! `YYYYMMDD.HHmmssff`.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::audio::SampleFormat;
use crate::config::RecordingConfig;
use crate::error::{Error, Result};
use crate::queue::AudioQueue;

/// Reader id the recording service registers on the queue.
pub const READER_RECORDING: &str = "recording";

/// Parameters for one recording.
#[derive(Debug, Clone)]
pub struct RecordingRequest {
    /// Session to record
    pub session_id: String,
    /// Sample rate of the queued audio
    pub sample_rate: u32,
    /// Channel count of the queued audio
    pub channels: u16,
    /// Sample encoding of the queued audio
    pub format: SampleFormat,
    /// Filename stem override; autogenerated when `None`
    pub filename: Option<String>,
    /// Extra metadata carried into [`RecordingInfo`]
    pub metadata: Option<serde_json::Value>,
    /// Queue timestamp to start reading from (enables pre-roll)
    pub start_timestamp: Option<u64>,
}

/// Summary of a finished recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingInfo {
    /// Session the recording belongs to
    pub session_id: String,
    /// Final path of the WAV file
    pub filepath: PathBuf,
    /// Wall-clock start time
    pub start_time: DateTime<Utc>,
    /// Wall-clock end time
    pub end_time: DateTime<Utc>,
    /// Chunks written to the file
    pub chunks_written: u64,
    /// Payload bytes written to the file
    pub bytes_written: u64,
    /// Caller-supplied metadata
    pub metadata: Option<serde_json::Value>,
}

/// Recording collaborator seam.
#[async_trait]
pub trait RecordingService: Send + Sync {
    /// Begin recording. Returns `false` when the session is already being
    /// recorded.
    fn start_recording(&self, request: RecordingRequest) -> Result<bool>;

    /// Stop recording, finalize the file, and return its summary. `None`
    /// when the session was not recording.
    async fn stop_recording(&self, session_id: &str) -> Result<Option<RecordingInfo>>;

    /// Is a recording active for the session?
    fn is_recording(&self, session_id: &str) -> bool;
}

struct WriterStats {
    chunks_written: u64,
    bytes_written: u64,
}

struct ActiveRecording {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<Result<WriterStats>>,
    filepath: PathBuf,
    start_time: DateTime<Utc>,
    metadata: Option<serde_json::Value>,
}

/// Default recording service: drains the `recording` reader into a WAV file.
pub struct WavRecorder {
    queue: Arc<AudioQueue>,
    output_dir: PathBuf,
    retention_days: u32,
    active: DashMap<String, ActiveRecording>,
}

fn wall_stamp(t: &DateTime<Utc>) -> String {
    format!(
        "{}{:02}",
        t.format("%Y%m%d.%H%M%S"),
        t.timestamp_subsec_millis() / 10
    )
}

impl WavRecorder {
    /// Create a recorder writing under `config.output_dir`.
    pub fn new(queue: Arc<AudioQueue>, config: &RecordingConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.output_dir)?;
        tracing::info!("Recording service ready, output dir: {:?}", config.output_dir);
        Ok(Self {
            queue,
            output_dir: config.output_dir.clone(),
            retention_days: config.retention_days,
            active: DashMap::new(),
        })
    }

    /// Recordings on disk, optionally filtered to one session.
    pub fn list_recordings(&self, session_id: Option<&str>) -> Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.output_dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "wav").unwrap_or(false) {
                if let Some(sid) = session_id {
                    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
                    if !name.starts_with(&format!("[{}]", sid)) {
                        continue;
                    }
                }
                out.push(path);
            }
        }
        out.sort();
        Ok(out)
    }

    /// Delete recordings older than `days` (or the configured retention when
    /// `None`). Returns how many files were removed.
    pub fn cleanup_old_recordings(&self, days: Option<u32>) -> Result<usize> {
        let days = days.unwrap_or(self.retention_days);
        let cutoff = std::time::SystemTime::now()
            .checked_sub(Duration::from_secs(days as u64 * 24 * 3600))
            .unwrap_or(std::time::UNIX_EPOCH);

        let mut removed = 0;
        for path in self.list_recordings(None)? {
            let modified = std::fs::metadata(&path).and_then(|m| m.modified());
            if let Ok(modified) = modified {
                if modified < cutoff {
                    std::fs::remove_file(&path)?;
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            tracing::info!("Cleaned up {} recording(s) older than {} days", removed, days);
        }
        Ok(removed)
    }

    async fn writer_loop(
        queue: Arc<AudioQueue>,
        session_id: String,
        path: PathBuf,
        spec: hound::WavSpec,
        stop: Arc<AtomicBool>,
    ) -> Result<WriterStats> {
        fn write_chunk(
            writer: &mut hound::WavWriter<std::io::BufWriter<std::fs::File>>,
            stats: &mut WriterStats,
            item: &crate::queue::TimestampedChunk,
        ) -> Result<()> {
            for sample in item.chunk.to_i16() {
                writer.write_sample(sample)?;
            }
            stats.chunks_written += 1;
            stats.bytes_written += item.chunk.len() as u64;
            Ok(())
        }

        let mut writer = hound::WavWriter::create(&path, spec)?;
        let mut stats = WriterStats {
            chunks_written: 0,
            bytes_written: 0,
        };

        loop {
            if stop.load(Ordering::Relaxed) {
                // Drain whatever is already queued, then close.
                for item in queue.pull_from_timestamp(&session_id, READER_RECORDING, None, None) {
                    write_chunk(&mut writer, &mut stats, &item)?;
                }
                break;
            }
            if let Some(item) = queue
                .pull_blocking(&session_id, READER_RECORDING, Duration::from_millis(100))
                .await
            {
                write_chunk(&mut writer, &mut stats, &item)?;
            }
        }

        writer.finalize()?;
        tracing::debug!(
            "Recording writer for {} closed ({} chunks, {} bytes)",
            session_id,
            stats.chunks_written,
            stats.bytes_written
        );
        Ok(stats)
    }
}

#[async_trait]
impl RecordingService for WavRecorder {
    fn start_recording(&self, request: RecordingRequest) -> Result<bool> {
        let session_id = request.session_id.clone();
        if self.active.contains_key(&session_id) {
            tracing::warn!("Session {} is already being recorded", session_id);
            return Ok(false);
        }

        if request.format != SampleFormat::I16 {
            return Err(Error::Recording(format!(
                "unsupported recording format: {:?}",
                request.format
            )));
        }

        self.queue
            .register_reader(&session_id, READER_RECORDING, request.start_timestamp);

        let start_time = Utc::now();
        let stamp = wall_stamp(&start_time);
        let stem = request
            .filename
            .unwrap_or_else(|| format!("[{}]{}-{}", session_id, stamp, stamp));
        let filename = if stem.ends_with(".wav") {
            stem
        } else {
            format!("{}.wav", stem)
        };
        let filepath = self.output_dir.join(filename);

        let spec = hound::WavSpec {
            channels: request.channels,
            sample_rate: request.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let stop = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(Self::writer_loop(
            self.queue.clone(),
            session_id.clone(),
            filepath.clone(),
            spec,
            stop.clone(),
        ));

        self.active.insert(
            session_id.clone(),
            ActiveRecording {
                stop,
                handle,
                filepath: filepath.clone(),
                start_time,
                metadata: request.metadata,
            },
        );

        tracing::info!(
            "Recording started for session {} -> {:?} (start_timestamp={:?})",
            session_id,
            filepath,
            request.start_timestamp
        );
        Ok(true)
    }

    async fn stop_recording(&self, session_id: &str) -> Result<Option<RecordingInfo>> {
        let Some((_, recording)) = self.active.remove(session_id) else {
            tracing::debug!("Session {} is not being recorded", session_id);
            return Ok(None);
        };

        recording.stop.store(true, Ordering::Relaxed);
        let stats = recording
            .handle
            .await
            .map_err(|e| Error::Recording(format!("writer task failed: {}", e)))??;

        let end_time = Utc::now();
        let final_name = format!(
            "[{}]{}-{}.wav",
            session_id,
            wall_stamp(&recording.start_time),
            wall_stamp(&end_time)
        );
        let final_path = recording.filepath.with_file_name(final_name);
        let filepath = match std::fs::rename(&recording.filepath, &final_path) {
            Ok(()) => final_path,
            Err(e) => {
                tracing::warn!("Failed to rename finished recording: {}", e);
                recording.filepath.clone()
            }
        };

        tracing::info!(
            "Recording stopped for session {} -> {:?} ({} bytes)",
            session_id,
            filepath,
            stats.bytes_written
        );

        Ok(Some(RecordingInfo {
            session_id: session_id.to_string(),
            filepath,
            start_time: recording.start_time,
            end_time,
            chunks_written: stats.chunks_written,
            bytes_written: stats.bytes_written,
            metadata: recording.metadata,
        }))
    }

    fn is_recording(&self, session_id: &str) -> bool {
        self.active.contains_key(session_id)
    }
}

impl WavRecorder {
    /// Stop every active recording, e.g. on shutdown.
    pub async fn stop_all(&self) {
        let sessions: Vec<String> = self.active.iter().map(|e| e.key().clone()).collect();
        for sid in sessions {
            if let Err(e) = self.stop_recording(&sid).await {
                tracing::warn!("Failed to stop recording for {}: {}", sid, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioChunk;
    use crate::clock::Clock;
    use crate::config::QueueConfig;

    fn recorder_fixture() -> (tempfile::TempDir, Arc<AudioQueue>, WavRecorder) {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(AudioQueue::new(Clock::manual(1_000_000), &QueueConfig::default()));
        let config = RecordingConfig {
            enabled: true,
            output_dir: dir.path().to_path_buf(),
            retention_days: 7,
        };
        let recorder = WavRecorder::new(queue.clone(), &config).unwrap();
        (dir, queue, recorder)
    }

    fn request(session_id: &str, start_timestamp: Option<u64>) -> RecordingRequest {
        RecordingRequest {
            session_id: session_id.to_string(),
            sample_rate: 16_000,
            channels: 1,
            format: SampleFormat::I16,
            filename: None,
            metadata: None,
            start_timestamp,
        }
    }

    #[tokio::test]
    async fn test_records_queued_audio_to_wav() {
        let (_dir, queue, recorder) = recorder_fixture();

        // Audio already in the queue before start is captured via the
        // start_timestamp cursor (pre-roll).
        queue.push("s1", AudioChunk::from_i16(&[100i16; 160]));
        assert!(recorder.start_recording(request("s1", Some(0))).unwrap());
        assert!(recorder.is_recording("s1"));

        queue.push("s1", AudioChunk::from_i16(&[200i16; 160]));
        tokio::time::sleep(Duration::from_millis(100)).await;

        let info = recorder.stop_recording("s1").await.unwrap().unwrap();
        assert!(!recorder.is_recording("s1"));
        assert_eq!(info.chunks_written, 2);
        assert_eq!(info.bytes_written, 2 * 160 * 2);

        let reader = hound::WavReader::open(&info.filepath).unwrap();
        assert_eq!(reader.spec().sample_rate, 16_000);
        let samples: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 320);
        assert_eq!(samples[0], 100);
        assert_eq!(samples[160], 200);
    }

    #[tokio::test]
    async fn test_final_name_carries_session_and_times() {
        let (_dir, queue, recorder) = recorder_fixture();
        queue.push("abc", AudioChunk::from_i16(&[1i16; 16]));
        recorder.start_recording(request("abc", Some(0))).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let info = recorder.stop_recording("abc").await.unwrap().unwrap();

        let name = info.filepath.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("[abc]"));
        assert!(name.ends_with(".wav"));
        // [sid]YYYYMMDD.HHmmssff-YYYYMMDD.HHmmssff.wav
        let stamps: Vec<&str> = name
            .trim_start_matches("[abc]")
            .trim_end_matches(".wav")
            .split('-')
            .collect();
        assert_eq!(stamps.len(), 2);
        assert_eq!(stamps[0].len(), "YYYYMMDD.HHmmssff".len());
    }

    #[tokio::test]
    async fn test_double_start_rejected_and_stop_without_start() {
        let (_dir, _queue, recorder) = recorder_fixture();
        assert!(recorder.start_recording(request("s1", None)).unwrap());
        assert!(!recorder.start_recording(request("s1", None)).unwrap());
        assert!(recorder.stop_recording("ghost").await.unwrap().is_none());
        recorder.stop_all().await;
    }

    #[tokio::test]
    async fn test_list_and_cleanup() {
        let (_dir, queue, recorder) = recorder_fixture();
        queue.push("s1", AudioChunk::from_i16(&[1i16; 16]));
        recorder.start_recording(request("s1", Some(0))).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        recorder.stop_recording("s1").await.unwrap();

        assert_eq!(recorder.list_recordings(None).unwrap().len(), 1);
        assert_eq!(recorder.list_recordings(Some("s1")).unwrap().len(), 1);
        assert!(recorder.list_recordings(Some("other")).unwrap().is_empty());

        // Nothing old enough to clean
        assert_eq!(recorder.cleanup_old_recordings(Some(1)).unwrap(), 0);
        // Everything qualifies at 0 days
        assert_eq!(recorder.cleanup_old_recordings(Some(0)).unwrap(), 1);
        assert!(recorder.list_recordings(None).unwrap().is_empty());
    }
}
