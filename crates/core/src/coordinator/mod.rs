//! Session coordinator: the effect that owns all cross-component policy
//!
//! Subscribes to the action stream and wires wake-word detection, VAD,
//! recording, pre-roll/tail-padding, and ASR dispatch into one pipeline per
//! session. The coordinator exclusively owns each session's FSM instance,
//! worker handles, and wake/recording/silence timestamps; everything it
//! learns arrives as an action, and everything it decides leaves as an
//! action.
//!
//! Failure policy: every handler is wrapped - an error escaping a handler
//! dispatches `error_occurred` for the session, which parks its FSM in
//! `error` until an explicit `reset_session`.

pub mod workers;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::audio::{AudioConfig, AudioConverter};
use crate::clock::{secs_to_micros, Clock};
use crate::config::Config;
use crate::detect::{VadDetector, WakewordDetector};
use crate::error::{Error, Result};
use crate::fsm::{SessionFsm, Strategy};
use crate::provider::ProviderPool;
use crate::queue::{AudioQueue, TimestampedChunk};
use crate::recording::{RecordingRequest, RecordingService};
use crate::store::{
    session_audio_config, Action, ActionKind, StateChange, Store, StoreState, WakeSource,
};
use crate::timer::TimerService;
use workers::{spawn_vad_worker, spawn_wake_worker, WorkerHandle};

/// Per-session runtime owned exclusively by the coordinator.
struct SessionRuntime {
    fsm: SessionFsm,
    /// Queue timestamp of the current wake activation
    wake_timestamp: Option<u64>,
    /// Queue timestamp recording started from (wake - pre_roll)
    recording_start: Option<u64>,
    /// Queue timestamp of the silence that armed the countdown
    silence_start: Option<u64>,
    wake_worker: Option<WorkerHandle>,
    vad_worker: Option<WorkerHandle>,
}

impl SessionRuntime {
    fn new(strategy: Strategy) -> Self {
        Self {
            fsm: SessionFsm::new(strategy),
            wake_timestamp: None,
            recording_start: None,
            silence_start: None,
            wake_worker: None,
            vad_worker: None,
        }
    }

    fn clear_cycle_timestamps(&mut self) {
        self.wake_timestamp = None;
        self.recording_start = None;
        self.silence_start = None;
    }
}

/// The coordinator effect. Constructed once per [`crate::app::App`] and run
/// as its own task via [`SessionCoordinator::run`].
pub struct SessionCoordinator {
    store: Arc<Store>,
    queue: Arc<AudioQueue>,
    pool: Arc<ProviderPool>,
    timers: TimerService,
    recorder: Arc<dyn RecordingService>,
    converter: Arc<dyn AudioConverter>,
    wakeword: Arc<dyn WakewordDetector>,
    vad: Arc<dyn VadDetector>,
    config: Arc<Config>,
    clock: Clock,
    sessions: HashMap<String, SessionRuntime>,
    /// request_id -> session_id, maintained from `create_session`
    request_ids: HashMap<String, String>,
}

impl SessionCoordinator {
    /// Wire up the coordinator. Call [`Self::run`] with a subscription taken
    /// before the first dispatch.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<Store>,
        queue: Arc<AudioQueue>,
        pool: Arc<ProviderPool>,
        timers: TimerService,
        recorder: Arc<dyn RecordingService>,
        converter: Arc<dyn AudioConverter>,
        wakeword: Arc<dyn WakewordDetector>,
        vad: Arc<dyn VadDetector>,
        config: Arc<Config>,
        clock: Clock,
    ) -> Self {
        Self {
            store,
            queue,
            pool,
            timers,
            recorder,
            converter,
            wakeword,
            vad,
            config,
            clock,
            sessions: HashMap::new(),
            request_ids: HashMap::new(),
        }
    }

    /// Consume the action stream until the store shuts down.
    pub async fn run(mut self, mut changes: broadcast::Receiver<StateChange>) {
        tracing::info!(
            "Session coordinator started (pre_roll={}s, tail_padding={}s, silence_threshold={}s)",
            self.config.queue.pre_roll_duration,
            self.config.queue.tail_padding_duration,
            self.config.vad.silence_threshold
        );
        loop {
            match changes.recv().await {
                Ok(change) => self.handle(change).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Coordinator lagged behind the action stream by {}", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        tracing::info!("Session coordinator stopped");
    }

    async fn handle(&mut self, change: StateChange) {
        let kind = change.action.kind();
        let session_id = change.action.session_id().map(String::from);
        if let Err(e) = self.handle_inner(change).await {
            tracing::error!(
                "Handler for '{}' failed (session {:?}): {}",
                kind,
                session_id,
                e
            );
            if let Some(session_id) = session_id {
                let _ = self.store.dispatch(Action::ErrorOccurred { session_id });
            }
        }
    }

    async fn handle_inner(&mut self, change: StateChange) -> Result<()> {
        match change.action.clone() {
            Action::CreateSession {
                strategy,
                request_id,
                ..
            } => self.on_create_session(&change, strategy, request_id),
            Action::StartListening { session_id, .. } => self.on_start_listening(&session_id),
            Action::ReceiveAudioChunk { session_id, chunk } => {
                self.on_receive_audio_chunk(&change.next, &session_id, chunk)
            }
            Action::WakeActivated {
                session_id,
                source,
                timestamp,
                ..
            } => self.on_wake_activated(&session_id, source, timestamp),
            Action::WakeDeactivated { session_id, source } => {
                self.on_wake_deactivated(&session_id, source).await
            }
            Action::VadSpeechDetected { session_id, .. } => self.on_vad_speech(&session_id),
            Action::VadSilenceDetected {
                session_id,
                timestamp,
                ..
            } => self.on_vad_silence(&session_id, timestamp),
            Action::SilenceTimeout {
                session_id,
                timestamp,
            } => self.on_silence_timeout(&session_id, timestamp).await,
            Action::TranscribeStarted { session_id, .. } => {
                self.trigger_fsm(&session_id, ActionKind::TranscribeStarted);
                Ok(())
            }
            Action::TranscribeDone { session_id, .. } => self.on_transcribe_done(&session_id),
            Action::UploadStarted { session_id, .. } => {
                self.ensure_runtime(&change.next, &session_id);
                self.trigger_fsm(&session_id, ActionKind::UploadStarted);
                Ok(())
            }
            Action::UploadCompleted { session_id, .. } => self.on_upload_completed(&session_id),
            Action::AsrStreamStarted { session_id } => {
                self.trigger_fsm(&session_id, ActionKind::AsrStreamStarted);
                Ok(())
            }
            Action::AsrStreamStopped { session_id } => {
                self.trigger_fsm(&session_id, ActionKind::AsrStreamStopped);
                Ok(())
            }
            Action::ClearAudioBuffer { session_id } => {
                self.queue.clear(&session_id);
                Ok(())
            }
            Action::ResetSession { session_id } => self.on_reset_session(&session_id).await,
            Action::DeleteSession { session_id } | Action::SessionExpired { session_id } => {
                self.cleanup_session(&session_id).await
            }
            Action::ErrorOccurred { session_id } => self.on_error_occurred(&session_id).await,
            Action::ErrorRaised { session_id, error } => {
                self.store.dispatch(Action::ErrorReported {
                    session_id,
                    code: "internal_error".into(),
                    message: error,
                })?;
                Ok(())
            }
            // Output / bookkeeping actions need no coordinator policy
            Action::RecordStarted { .. }
            | Action::RecordStopped { .. }
            | Action::PlayAsrFeedback { .. }
            | Action::ErrorReported { .. } => Ok(()),
        }
    }

    // === Session lifecycle ===

    fn on_create_session(
        &mut self,
        change: &StateChange,
        strategy: Strategy,
        request_id: Option<String>,
    ) -> Result<()> {
        // The reducer generated the id; it is the one session present in
        // `next` but not in `previous`.
        let session_id = change
            .next
            .sessions
            .keys()
            .find(|id| !change.previous.sessions.contains_key(*id))
            .cloned()
            .ok_or_else(|| Error::Session("reducer did not create a session".into()))?;

        tracing::info!(
            "Session {} created (strategy={}, request_id={:?})",
            session_id,
            strategy,
            request_id
        );
        self.sessions
            .insert(session_id.clone(), SessionRuntime::new(strategy));
        if let Some(request_id) = request_id {
            self.request_ids.insert(request_id, session_id);
        }
        Ok(())
    }

    /// The session created for a given `request_id`, if any.
    pub fn session_id_for_request(&self, request_id: &str) -> Option<&str> {
        self.request_ids.get(request_id).map(String::as_str)
    }

    fn on_start_listening(&mut self, session_id: &str) -> Result<()> {
        let state = self.store.state();
        let runtime = self.ensure_runtime(&state, session_id);
        runtime.fsm.trigger(ActionKind::StartListening);
        self.start_wake_worker(session_id);
        Ok(())
    }

    async fn on_reset_session(&mut self, session_id: &str) -> Result<()> {
        tracing::info!("Resetting session {}", session_id);

        self.stop_workers(session_id).await;
        self.timers.stop_timer(session_id);
        if self.recorder.is_recording(session_id) {
            let _ = self.recorder.stop_recording(session_id).await;
        }
        self.queue.clear(session_id);
        self.vad.reset_session(session_id);

        let state = self.store.state();
        let strategy = state
            .session(session_id)
            .map(|s| s.strategy)
            .or_else(|| self.sessions.get(session_id).map(|r| r.fsm.strategy()))
            .unwrap_or_default();
        // A fresh FSM guarantees stale recording-cycle events are rejected
        self.sessions
            .insert(session_id.to_string(), SessionRuntime::new(strategy));

        let audio_config = session_audio_config(&state, session_id).unwrap_or_default();
        self.store.dispatch(Action::StartListening {
            session_id: session_id.to_string(),
            audio_config,
        })?;
        Ok(())
    }

    async fn cleanup_session(&mut self, session_id: &str) -> Result<()> {
        tracing::info!("Cleaning up session {}", session_id);

        if self.recorder.is_recording(session_id) {
            let _ = self.recorder.stop_recording(session_id).await;
        }
        self.stop_workers(session_id).await;
        self.timers.stop_timer(session_id);
        self.vad.reset_session(session_id);
        self.sessions.remove(session_id);
        self.request_ids.retain(|_, sid| sid != session_id);
        self.queue.remove(session_id);
        Ok(())
    }

    async fn on_error_occurred(&mut self, session_id: &str) -> Result<()> {
        self.trigger_fsm(session_id, ActionKind::ErrorOccurred);
        self.stop_workers(session_id).await;
        self.timers.stop_timer(session_id);
        if self.recorder.is_recording(session_id) {
            let _ = self.recorder.stop_recording(session_id).await;
        }
        Ok(())
    }

    // === Ingest ===

    fn on_receive_audio_chunk(
        &mut self,
        state: &StoreState,
        session_id: &str,
        chunk: crate::audio::AudioChunk,
    ) -> Result<()> {
        let Some(declared) = session_audio_config(state, session_id) else {
            tracing::warn!(
                "Dropping chunk for session {}: no declared audio configuration",
                session_id
            );
            return Ok(());
        };

        // Transports may omit per-chunk metadata; trust the declaration.
        let chunk = if chunk.config() == declared {
            chunk
        } else {
            crate::audio::AudioChunk::new(
                chunk.data().to_vec(),
                declared.sample_rate,
                declared.channels,
                declared.format,
            )
        };

        let target = AudioConfig::pipeline();
        let normalized = if self.converter.needs_conversion(&chunk, target) {
            match self.converter.convert(&chunk, target) {
                Ok(converted) => converted,
                Err(e) => {
                    // Malformed audio: drop the chunk, keep the session alive
                    tracing::warn!("Audio conversion failed for {}: {}", session_id, e);
                    return Ok(());
                }
            }
        } else {
            chunk
        };

        self.queue.push(session_id, normalized);

        // First audio for an idle session implicitly starts listening
        let runtime = self.ensure_runtime(state, session_id);
        if !runtime.fsm.state().is_processing() && runtime.fsm.may(ActionKind::StartListening) {
            runtime.fsm.trigger(ActionKind::StartListening);
            self.start_wake_worker(session_id);
        }
        Ok(())
    }

    // === Wake cycle ===

    fn on_wake_activated(
        &mut self,
        session_id: &str,
        source: WakeSource,
        timestamp: Option<u64>,
    ) -> Result<()> {
        let state = self.store.state();
        self.ensure_runtime(&state, session_id);
        let Some(runtime) = self.sessions.get_mut(session_id) else {
            return Ok(());
        };
        let strategy = runtime.fsm.strategy();
        if !runtime.fsm.may(ActionKind::WakeActivated) {
            tracing::info!(
                "Ignoring wake_activated from {} for {} in state '{}'",
                source,
                session_id,
                runtime.fsm.state().path()
            );
            return Ok(());
        }
        runtime.fsm.trigger(ActionKind::WakeActivated);

        let t_wake = timestamp.unwrap_or_else(|| self.clock.now_micros());
        let pre_roll = secs_to_micros(self.config.queue.pre_roll_duration);
        let recording_start = t_wake.saturating_sub(pre_roll);
        runtime.wake_timestamp = Some(t_wake);
        runtime.recording_start = Some(recording_start);

        tracing::info!(
            "Wake activated for {} from {} at {}us (recording from {}us)",
            session_id,
            source,
            t_wake,
            recording_start
        );

        if strategy == Strategy::NonStreaming {
            if self.config.recording.enabled {
                let started = self.recorder.start_recording(RecordingRequest {
                    session_id: session_id.to_string(),
                    sample_rate: crate::audio::PIPELINE_SAMPLE_RATE,
                    channels: 1,
                    format: crate::audio::SampleFormat::I16,
                    filename: None,
                    metadata: Some(serde_json::json!({
                        "wake_time_us": t_wake,
                        "pre_roll_secs": self.config.queue.pre_roll_duration,
                        "recording_start_us": recording_start,
                        "source": source.to_string(),
                    })),
                    start_timestamp: Some(recording_start),
                })?;
                if !started {
                    tracing::warn!("Recorder already active for session {}", session_id);
                }
            }

            self.start_vad_worker(session_id, t_wake);
            self.trigger_fsm(session_id, ActionKind::RecordStarted);
            self.store.dispatch(Action::RecordStarted {
                session_id: session_id.to_string(),
                timestamp: recording_start,
            })?;
        }

        self.store.dispatch(Action::PlayAsrFeedback {
            session_id: session_id.to_string(),
            command: "wake_acknowledged".into(),
        })?;
        Ok(())
    }

    async fn on_wake_deactivated(&mut self, session_id: &str, source: WakeSource) -> Result<()> {
        let Some(runtime) = self.sessions.get_mut(session_id) else {
            return Ok(());
        };
        if !runtime.fsm.may(ActionKind::WakeDeactivated) {
            tracing::info!(
                "Ignoring wake_deactivated from {} for {} in state '{}'",
                source,
                session_id,
                runtime.fsm.state().path()
            );
            return Ok(());
        }
        runtime.fsm.trigger(ActionKind::WakeDeactivated);
        runtime.clear_cycle_timestamps();
        tracing::info!("Wake deactivated for {} from {}", session_id, source);

        self.stop_workers(session_id).await;
        self.timers.stop_timer(session_id);
        if self.recorder.is_recording(session_id) {
            let _ = self.recorder.stop_recording(session_id).await;
        }
        self.queue.clear(session_id);
        self.vad.reset_session(session_id);
        Ok(())
    }

    // === VAD & silence ===

    fn on_vad_speech(&mut self, session_id: &str) -> Result<()> {
        if self.timers.is_active(session_id) {
            tracing::debug!("Speech resumed for {}; silence countdown reset", session_id);
            self.timers.stop_timer(session_id);
        }
        if let Some(runtime) = self.sessions.get_mut(session_id) {
            runtime.silence_start = None;
        }
        Ok(())
    }

    fn on_vad_silence(&mut self, session_id: &str, timestamp: u64) -> Result<()> {
        let Some(runtime) = self.sessions.get_mut(session_id) else {
            return Ok(());
        };
        // The countdown is armed only while actually recording (P6), and
        // only one at a time.
        if !runtime.fsm.state().is_recording() || self.timers.is_active(session_id) {
            return Ok(());
        }
        runtime.silence_start = Some(timestamp);

        let store = self.store.clone();
        let clock = self.clock.clone();
        let threshold = self.config.vad.silence_threshold;
        tracing::debug!(
            "Silence started for {} at {}us; arming {}s countdown",
            session_id,
            timestamp,
            threshold
        );
        self.timers.start_countdown(
            session_id,
            std::time::Duration::from_secs_f64(threshold.max(0.0)),
            move |sid| {
                let _ = store.dispatch(Action::SilenceTimeout {
                    session_id: sid,
                    timestamp: clock.now_micros(),
                });
            },
        );
        Ok(())
    }

    async fn on_silence_timeout(&mut self, session_id: &str, timestamp: u64) -> Result<()> {
        let Some(runtime) = self.sessions.get_mut(session_id) else {
            return Ok(());
        };
        // A timeout that raced a reset or deactivation is ignored
        if !runtime.fsm.state().is_recording() {
            tracing::info!(
                "Ignoring silence_timeout for {} in state '{}'",
                session_id,
                runtime.fsm.state().path()
            );
            return Ok(());
        }
        let Some(recording_start) = runtime.recording_start else {
            tracing::warn!(
                "Ignoring silence_timeout for {}: no recording window",
                session_id
            );
            return Ok(());
        };

        let tail_padding = secs_to_micros(self.config.queue.tail_padding_duration);
        let recording_end = timestamp + tail_padding;
        tracing::info!(
            "Silence timeout for {} at {}us (wake={:?}us, silence from {:?}us); recording window [{}us, {}us]",
            session_id,
            timestamp,
            runtime.wake_timestamp,
            runtime.silence_start,
            recording_start,
            recording_end
        );

        let info = match self.recorder.stop_recording(session_id).await {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!("Failed to stop recorder for {}: {}", session_id, e);
                None
            }
        };

        let segment = self
            .queue
            .get_between(session_id, recording_start, Some(recording_end));

        self.trigger_fsm(session_id, ActionKind::RecordStopped);
        self.store.dispatch(Action::RecordStopped {
            session_id: session_id.to_string(),
            timestamp: recording_end,
            info: info.clone(),
        })?;

        let filepath = info.map(|i| i.filepath);
        self.dispatch_transcription(session_id, &segment, filepath)?;
        Ok(())
    }

    // === ASR dispatch ===

    fn dispatch_transcription(
        &mut self,
        session_id: &str,
        segment: &[TimestampedChunk],
        filepath: Option<PathBuf>,
    ) -> Result<()> {
        if segment.is_empty() && filepath.is_none() {
            tracing::warn!("No audio collected for session {}", session_id);
        }

        self.store.dispatch(Action::TranscribeStarted {
            session_id: session_id.to_string(),
            filepath: filepath.clone(),
        })?;

        // Int16-interleave the collected chunks for the in-memory path
        let samples: Vec<i16> = segment
            .iter()
            .flat_map(|item| item.chunk.to_i16())
            .collect();

        let store = self.store.clone();
        let pool = self.pool.clone();
        let session_id = session_id.to_string();
        let lease_timeout = self.config.pool.lease_timeout();
        let error_on_timeout = self.config.pool.error_on_lease_timeout;

        // Transcription runs on its own task so one session's ASR never
        // stalls another session's actions.
        tokio::spawn(async move {
            let result = match pool.lease(&session_id, lease_timeout).await {
                Ok(lease) => {
                    let use_file = filepath.as_deref().filter(|p| p.exists());
                    let outcome = match use_file {
                        Some(path) => lease.provider().transcribe_file(path).await,
                        None => lease.provider().transcribe_audio(&samples).await,
                    };
                    let result = match outcome {
                        Ok(result) => {
                            tracing::info!(
                                "Transcription for {}: \"{}\"",
                                session_id,
                                result.full_text
                            );
                            Some(result)
                        }
                        Err(e) => {
                            tracing::error!("Transcription failed for {}: {}", session_id, e);
                            lease.mark_unhealthy();
                            let _ = store.dispatch(Action::ErrorRaised {
                                session_id: session_id.clone(),
                                error: e.to_string(),
                            });
                            None
                        }
                    };
                    // Release the provider before announcing completion
                    drop(lease);
                    result
                }
                Err(e) => {
                    tracing::error!("Provider lease failed for {}: {}", session_id, e);
                    let is_timeout = matches!(e, Error::Timeout { .. });
                    let _ = store.dispatch(Action::ErrorRaised {
                        session_id: session_id.clone(),
                        error: e.to_string(),
                    });
                    if is_timeout && error_on_timeout {
                        let _ = store.dispatch(Action::ErrorOccurred { session_id });
                        return;
                    }
                    None
                }
            };

            let _ = store.dispatch(Action::TranscribeDone { session_id, result });
        });
        Ok(())
    }

    fn on_transcribe_done(&mut self, session_id: &str) -> Result<()> {
        self.trigger_fsm(session_id, ActionKind::TranscribeDone);
        let strategy = self
            .sessions
            .get(session_id)
            .map(|r| r.fsm.strategy())
            .unwrap_or_default();
        if strategy == Strategy::NonStreaming {
            self.cleanup_for_next_round(session_id);
        }
        Ok(())
    }

    /// Post-transcription housekeeping: keep the FSM in
    /// `processing_activated` so the session is immediately ready for the
    /// next utterance, but drop everything tied to the finished cycle.
    fn cleanup_for_next_round(&mut self, session_id: &str) {
        tracing::debug!("Cleaning up for next round: session {}", session_id);
        self.timers.stop_timer(session_id);

        if let Some(runtime) = self.sessions.get_mut(session_id) {
            runtime.clear_cycle_timestamps();
            // Next cycle gets a fresh VAD worker anchored at its own wake
            if let Some(worker) = runtime.vad_worker.take() {
                tokio::spawn(worker.shutdown());
            }
        }
        self.vad.reset_session(session_id);
        self.queue.clear(session_id);
        self.start_wake_worker(session_id);
    }

    // === Batch strategy ===

    fn on_upload_completed(&mut self, session_id: &str) -> Result<()> {
        self.trigger_fsm(session_id, ActionKind::UploadCompleted);

        let queued = self.queue.size(session_id);
        if queued == 0 {
            tracing::warn!("No uploaded audio queued for session {}", session_id);
            return Ok(());
        }
        // Batch drains destructively in insertion order
        let chunks = self.queue.pull(session_id, queued);
        tracing::info!(
            "Collected {} uploaded chunks for batch session {}",
            chunks.len(),
            session_id
        );

        let segment: Vec<TimestampedChunk> = chunks
            .into_iter()
            .map(|chunk| TimestampedChunk {
                timestamp: 0,
                duration: chunk.duration_secs(),
                chunk,
            })
            .collect();
        self.dispatch_transcription(session_id, &segment, None)?;
        Ok(())
    }

    // === Shared helpers ===

    fn ensure_runtime(&mut self, state: &StoreState, session_id: &str) -> &mut SessionRuntime {
        let strategy = state
            .session(session_id)
            .map(|s| s.strategy)
            .unwrap_or_default();
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionRuntime::new(strategy))
    }

    fn trigger_fsm(&mut self, session_id: &str, action: ActionKind) -> bool {
        match self.sessions.get_mut(session_id) {
            Some(runtime) => runtime.fsm.trigger(action),
            None => false,
        }
    }

    fn start_wake_worker(&mut self, session_id: &str) {
        let Some(runtime) = self.sessions.get_mut(session_id) else {
            return;
        };
        if runtime
            .wake_worker
            .as_ref()
            .map(WorkerHandle::is_running)
            .unwrap_or(false)
        {
            return;
        }
        runtime.wake_worker = Some(spawn_wake_worker(
            self.queue.clone(),
            self.store.clone(),
            self.wakeword.clone(),
            session_id.to_string(),
            self.config.wakeword.frame_samples,
            self.config.wakeword.threshold,
        ));
    }

    fn start_vad_worker(&mut self, session_id: &str, start_timestamp: u64) {
        let Some(runtime) = self.sessions.get_mut(session_id) else {
            return;
        };
        if runtime
            .vad_worker
            .as_ref()
            .map(WorkerHandle::is_running)
            .unwrap_or(false)
        {
            return;
        }
        runtime.vad_worker = Some(spawn_vad_worker(
            self.queue.clone(),
            self.store.clone(),
            self.vad.clone(),
            session_id.to_string(),
            self.config.vad.frame_samples,
            start_timestamp,
        ));
    }

    async fn stop_workers(&mut self, session_id: &str) {
        if let Some(runtime) = self.sessions.get_mut(session_id) {
            if let Some(worker) = runtime.wake_worker.take() {
                worker.shutdown().await;
            }
            if let Some(worker) = runtime.vad_worker.take() {
                worker.shutdown().await;
            }
        }
    }
}
