//! Detector worker loops
//!
//! One wake-word worker and (while a wake cycle is active) one VAD worker
//! per session. Each registers as a named reader on the timestamped queue,
//! pulls non-destructively, frames the byte stream through a
//! [`BufferManager`], and feeds frames to its detector. Detection results
//! become dispatched actions; the workers themselves never touch session
//! state.
//!
//! Workers poll their stop flag between iterations and at every pull
//! timeout. Detector errors increment a consecutive-error counter; after
//! [`MAX_CONSECUTIVE_ERRORS`] the worker stops itself and raises an error
//! action.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::audio::{pcm16_bytes_to_f32, PIPELINE_SAMPLE_RATE};
use crate::buffer::{BufferConfig, BufferManager};
use crate::detect::{SpeechState, VadDetector, WakewordDetector};
use crate::queue::AudioQueue;
use crate::store::{Action, Store, WakeSource};

/// Reader id of the wake-word worker.
pub const READER_WAKE_WORD: &str = "wake_word";
/// Reader id of the VAD worker.
pub const READER_VAD: &str = "vad";

/// Consecutive detector failures before a worker gives up.
pub const MAX_CONSECUTIVE_ERRORS: u32 = 10;

/// Pull timeout per loop iteration; also bounds stop-flag latency.
const PULL_TIMEOUT: Duration = Duration::from_millis(100);

/// Handle to a running worker task.
pub(crate) struct WorkerHandle {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl WorkerHandle {
    /// True while the worker task is still running.
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop the worker and wait for it to exit.
    pub async fn shutdown(self) {
        self.stop.store(true, Ordering::Relaxed);
        self.handle.abort();
        let _ = self.handle.await;
    }
}

/// Spawn the wake-word worker for a session.
pub(crate) fn spawn_wake_worker(
    queue: Arc<AudioQueue>,
    store: Arc<Store>,
    detector: Arc<dyn WakewordDetector>,
    session_id: String,
    frame_samples: usize,
    threshold: f32,
) -> WorkerHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();
    let handle = tokio::spawn(async move {
        wake_worker_loop(queue, store, detector, session_id, frame_samples, threshold, stop_flag)
            .await;
    });
    WorkerHandle { stop, handle }
}

async fn wake_worker_loop(
    queue: Arc<AudioQueue>,
    store: Arc<Store>,
    detector: Arc<dyn WakewordDetector>,
    session_id: String,
    frame_samples: usize,
    threshold: f32,
    stop: Arc<AtomicBool>,
) {
    queue.register_reader(&session_id, READER_WAKE_WORD, None);

    let mut framer =
        match BufferManager::new(BufferConfig::for_wake_word(PIPELINE_SAMPLE_RATE, frame_samples)) {
            Ok(framer) => framer,
            Err(e) => {
                tracing::error!("Wake worker for {} failed to start: {}", session_id, e);
                let _ = store.dispatch(Action::ErrorRaised {
                    session_id,
                    error: e.to_string(),
                });
                return;
            }
        };

    tracing::info!("Wake-word worker started for session {}", session_id);
    let mut consecutive_errors = 0u32;

    while !stop.load(Ordering::Relaxed) {
        let Some(item) = queue
            .pull_blocking(&session_id, READER_WAKE_WORD, PULL_TIMEOUT)
            .await
        else {
            continue;
        };
        let frame_timestamp = item.timestamp;
        framer.push(item.chunk.data());

        for frame in framer.pop_all() {
            let samples = pcm16_bytes_to_f32(&frame);
            match detector.detect(&samples) {
                Ok(detections) => {
                    consecutive_errors = 0;
                    let best = detections
                        .into_iter()
                        .filter(|d| d.confidence >= threshold)
                        .max_by(|a, b| a.confidence.total_cmp(&b.confidence));
                    if let Some(detection) = best {
                        tracing::info!(
                            "Wake word '{}' detected for {} (confidence {:.3}) at {}us",
                            detection.keyword,
                            session_id,
                            detection.confidence,
                            frame_timestamp
                        );
                        let _ = store.dispatch(Action::WakeActivated {
                            session_id: session_id.clone(),
                            source: WakeSource::Keyword(detection.keyword),
                            timestamp: Some(frame_timestamp),
                            confidence: Some(detection.confidence),
                        });
                    }
                }
                Err(e) => {
                    consecutive_errors += 1;
                    tracing::warn!(
                        "Wake detector error for {} ({}/{}): {}",
                        session_id,
                        consecutive_errors,
                        MAX_CONSECUTIVE_ERRORS,
                        e
                    );
                    if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        let _ = store.dispatch(Action::ErrorRaised {
                            session_id: session_id.clone(),
                            error: format!(
                                "wake-word worker stopped after {} consecutive detector errors",
                                consecutive_errors
                            ),
                        });
                        return;
                    }
                }
            }
        }
    }

    tracing::debug!("Wake-word worker for {} stopped", session_id);
}

/// Spawn the VAD worker for a session, reading from the wake timestamp.
pub(crate) fn spawn_vad_worker(
    queue: Arc<AudioQueue>,
    store: Arc<Store>,
    detector: Arc<dyn VadDetector>,
    session_id: String,
    frame_samples: usize,
    start_timestamp: u64,
) -> WorkerHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();
    let handle = tokio::spawn(async move {
        vad_worker_loop(
            queue,
            store,
            detector,
            session_id,
            frame_samples,
            start_timestamp,
            stop_flag,
        )
        .await;
    });
    WorkerHandle { stop, handle }
}

async fn vad_worker_loop(
    queue: Arc<AudioQueue>,
    store: Arc<Store>,
    detector: Arc<dyn VadDetector>,
    session_id: String,
    frame_samples: usize,
    start_timestamp: u64,
    stop: Arc<AtomicBool>,
) {
    queue.register_reader(&session_id, READER_VAD, Some(start_timestamp));

    let mut framer =
        match BufferManager::new(BufferConfig::for_vad(PIPELINE_SAMPLE_RATE, frame_samples)) {
            Ok(framer) => framer,
            Err(e) => {
                tracing::error!("VAD worker for {} failed to start: {}", session_id, e);
                let _ = store.dispatch(Action::ErrorRaised {
                    session_id,
                    error: e.to_string(),
                });
                return;
            }
        };

    tracing::info!(
        "VAD worker started for session {} from {}us",
        session_id,
        start_timestamp
    );
    let mut last_state: Option<SpeechState> = None;
    let mut consecutive_errors = 0u32;

    while !stop.load(Ordering::Relaxed) {
        let Some(item) = queue
            .pull_blocking(&session_id, READER_VAD, PULL_TIMEOUT)
            .await
        else {
            continue;
        };
        let frame_timestamp = item.timestamp;
        framer.push(item.chunk.data());

        for frame in framer.pop_all() {
            let samples = pcm16_bytes_to_f32(&frame);
            match detector.detect(&samples, &session_id) {
                Ok(result) => {
                    consecutive_errors = 0;
                    // Edge-triggered: only state changes become actions
                    if last_state != Some(result.state) {
                        last_state = Some(result.state);
                        let action = match result.state {
                            SpeechState::Speech => Action::VadSpeechDetected {
                                session_id: session_id.clone(),
                                probability: result.probability,
                            },
                            SpeechState::Silence => Action::VadSilenceDetected {
                                session_id: session_id.clone(),
                                timestamp: frame_timestamp,
                                probability: result.probability,
                            },
                        };
                        tracing::debug!(
                            "VAD {} for {} (p={:.3}) at {}us",
                            if result.state == SpeechState::Speech {
                                "speech"
                            } else {
                                "silence"
                            },
                            session_id,
                            result.probability,
                            frame_timestamp
                        );
                        let _ = store.dispatch(action);
                    }
                }
                Err(e) => {
                    consecutive_errors += 1;
                    tracing::warn!(
                        "VAD detector error for {} ({}/{}): {}",
                        session_id,
                        consecutive_errors,
                        MAX_CONSECUTIVE_ERRORS,
                        e
                    );
                    if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        let _ = store.dispatch(Action::ErrorRaised {
                            session_id: session_id.clone(),
                            error: format!(
                                "VAD worker stopped after {} consecutive detector errors",
                                consecutive_errors
                            ),
                        });
                        return;
                    }
                }
            }
        }
    }

    tracing::debug!("VAD worker for {} stopped", session_id);
}
