//! Shared harness for end-to-end pipeline tests: one app per test with
//! scripted detectors and a deterministic ASR provider stub.
//!
//! Synthetic audio is amplitude-coded: silence is 0, speech is 8000, the
//! wake "keyword" is a 30000-amplitude burst. The scripted wake detector
//! fires on near-full-scale frames; the energy VAD classifies anything
//! audible as speech.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use asrhub_core::app::{App, Collaborators};
use asrhub_core::audio::AudioChunk;
use asrhub_core::config::Config;
use asrhub_core::detect::{
    SpeechState, VadDetector, VadResult, WakewordDetection, WakewordDetector,
};
use asrhub_core::error::Result;
use asrhub_core::provider::{AsrProvider, ProviderFactory, TranscriptionResult};
use asrhub_core::store::{find_session_by_request_id, Action, ActionKind};
use asrhub_core::Strategy;

/// 20 ms of audio per fed chunk.
pub const CHUNK_SAMPLES: usize = 320;
pub const CHUNK_SECS: f64 = 0.02;

pub const SILENCE_AMP: i16 = 0;
pub const SPEECH_AMP: i16 = 8_000;
pub const WAKE_AMP: i16 = 30_000;

/// Wake detector stub: fires "hey_hub" on frames averaging near full scale.
pub struct ScriptedWake;

impl WakewordDetector for ScriptedWake {
    fn detect(&self, frame: &[f32]) -> Result<Vec<WakewordDetection>> {
        let mean_abs = frame.iter().map(|s| s.abs()).sum::<f32>() / frame.len().max(1) as f32;
        if mean_abs > 0.7 {
            Ok(vec![WakewordDetection {
                keyword: "hey_hub".to_string(),
                confidence: 0.93,
            }])
        } else {
            Ok(Vec::new())
        }
    }
}

/// VAD stub: anything audible is speech.
pub struct EnergyVad;

impl VadDetector for EnergyVad {
    fn detect(&self, frame: &[f32], _session_id: &str) -> Result<VadResult> {
        let mean_abs = frame.iter().map(|s| s.abs()).sum::<f32>() / frame.len().max(1) as f32;
        if mean_abs > 0.03 {
            Ok(VadResult {
                state: SpeechState::Speech,
                probability: mean_abs.min(1.0),
            })
        } else {
            Ok(VadResult {
                state: SpeechState::Silence,
                probability: mean_abs.min(1.0),
            })
        }
    }
}

/// Deterministic ASR stub returning a fixed text after an optional delay.
pub struct FixedTextProvider {
    pub text: String,
    pub delay: Duration,
    pub calls: Arc<AtomicUsize>,
}

#[async_trait]
impl AsrProvider for FixedTextProvider {
    fn name(&self) -> &str {
        "fixed-text"
    }

    async fn transcribe_file(&self, path: &Path) -> Result<TranscriptionResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let duration = hound::WavReader::open(path)
            .map(|r| r.len() as f64 / r.spec().sample_rate as f64)
            .unwrap_or(0.0);
        Ok(TranscriptionResult {
            full_text: self.text.clone(),
            language: Some("en".to_string()),
            duration,
            confidence: Some(0.95),
        })
    }
}

/// Factory producing [`FixedTextProvider`]s sharing one call counter.
pub fn fixed_provider_factory(
    text: &str,
    delay: Duration,
) -> (ProviderFactory, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let text = text.to_string();
    let calls_for_factory = calls.clone();
    let factory: ProviderFactory = Arc::new(move || {
        Ok(Arc::new(FixedTextProvider {
            text: text.clone(),
            delay,
            calls: calls_for_factory.clone(),
        }) as Arc<dyn AsrProvider>)
    });
    (factory, calls)
}

/// Everything observed on the action stream, for assertions.
#[derive(Clone)]
pub struct ActionLog {
    actions: Arc<Mutex<Vec<Action>>>,
}

impl ActionLog {
    pub fn attach(app: &App) -> Self {
        let actions = Arc::new(Mutex::new(Vec::new()));
        let sink = actions.clone();
        let mut changes = app.subscribe();
        tokio::spawn(async move {
            while let Ok(change) = changes.recv().await {
                sink.lock().push(change.action);
            }
        });
        Self { actions }
    }

    pub fn count(&self, kind: ActionKind) -> usize {
        self.actions
            .lock()
            .iter()
            .filter(|a| a.kind() == kind)
            .count()
    }

    pub fn count_for(&self, kind: ActionKind, session_id: &str) -> usize {
        self.actions
            .lock()
            .iter()
            .filter(|a| a.kind() == kind && a.session_id() == Some(session_id))
            .count()
    }

    /// Transcription texts observed, in order (`None` for failures).
    pub fn transcripts(&self) -> Vec<Option<String>> {
        self.actions
            .lock()
            .iter()
            .filter_map(|a| match a {
                Action::TranscribeDone { result, .. } => {
                    Some(result.as_ref().map(|r| r.full_text.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// Wait until `kind` has been seen at least `count` times.
    pub async fn wait_for(&self, kind: ActionKind, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.count(kind) >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.count(kind) >= count
    }
}

/// Test configuration: scaled-down windows so scenarios run in a couple of
/// seconds of wall time.
pub fn test_config(recordings_dir: &Path) -> Config {
    let mut config = Config::default();
    config.queue.pre_roll_duration = 0.2;
    config.queue.tail_padding_duration = 0.05;
    config.queue.chunk_duration = CHUNK_SECS;
    config.vad.silence_threshold = 0.2;
    config.pool.size = 2;
    config.pool.lease_timeout = 5.0;
    config.recording.output_dir = recordings_dir.to_path_buf();
    config
}

/// Build an app with the default stubs and attach an action log.
pub fn build_app(config: Config, factory: ProviderFactory) -> (Arc<App>, ActionLog) {
    let app = App::new(
        config,
        Collaborators {
            wakeword: Arc::new(ScriptedWake),
            vad: Arc::new(EnergyVad),
            provider_factory: factory,
            converter: None,
            recorder: None,
            clock: None,
        },
    )
    .expect("app construction");
    let log = ActionLog::attach(&app);
    (app, log)
}

/// Create a session and wait for its id to appear in the store.
pub async fn create_session(app: &App, strategy: Strategy, request_id: &str) -> String {
    app.dispatch(Action::CreateSession {
        strategy,
        request_id: Some(request_id.to_string()),
        audio_config: None,
    })
    .unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if let Some(session) = find_session_by_request_id(&app.state(), request_id) {
            return session.id.clone();
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "session for {} not created",
            request_id
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Declare the audio format and enter listening.
pub fn start_listening(app: &App, session_id: &str) {
    app.dispatch(Action::StartListening {
        session_id: session_id.to_string(),
        audio_config: asrhub_core::audio::AudioConfig::pipeline(),
    })
    .unwrap();
}

/// Feed `secs` of constant-amplitude audio in 20 ms chunks at real-time
/// pace.
pub async fn feed(app: &App, session_id: &str, secs: f64, amplitude: i16) {
    let chunks = (secs / CHUNK_SECS).round() as usize;
    for _ in 0..chunks {
        app.dispatch(Action::ReceiveAudioChunk {
            session_id: session_id.to_string(),
            chunk: AudioChunk::from_i16(&vec![amplitude; CHUNK_SAMPLES]),
        })
        .unwrap();
        tokio::time::sleep(Duration::from_secs_f64(CHUNK_SECS)).await;
    }
}

/// The store's view of a session's FSM path.
pub fn session_state_path(app: &App, session_id: &str) -> String {
    app.state()
        .session(session_id)
        .map(|s| s.state.path())
        .unwrap_or_else(|| "<gone>".to_string())
}
