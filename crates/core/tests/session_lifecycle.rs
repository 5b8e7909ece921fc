//! Session lifecycle: batch uploads, expiry sweep, detector failure policy

mod common;

use std::sync::Arc;
use std::time::Duration;

use asrhub_core::app::{App, Collaborators};
use asrhub_core::audio::{AudioChunk, AudioConfig};
use asrhub_core::detect::{VadDetector, VadResult, WakewordDetection, WakewordDetector};
use asrhub_core::error::{Error, Result};
use asrhub_core::store::{Action, ActionKind};
use asrhub_core::Strategy;
use common::*;

/// Batch strategy: upload -> drain -> transcribe -> idle. The batch path
/// collects the queued chunks destructively in insertion order.
#[tokio::test(flavor = "multi_thread")]
async fn batch_upload_transcribes_and_returns_to_idle() {
    let dir = tempfile::tempdir().unwrap();
    let (factory, _) = fixed_provider_factory("BATCH TEXT", Duration::ZERO);
    let (app, log) = build_app(test_config(dir.path()), factory);

    let sid = create_session(&app, Strategy::Batch, "req-batch").await;
    app.dispatch(Action::UploadStarted {
        session_id: sid.clone(),
        file_name: "meeting.wav".into(),
        audio_config: AudioConfig::pipeline(),
    })
    .unwrap();

    for _ in 0..10 {
        app.dispatch(Action::ReceiveAudioChunk {
            session_id: sid.clone(),
            chunk: AudioChunk::from_i16(&vec![500i16; CHUNK_SAMPLES]),
        })
        .unwrap();
    }
    app.dispatch(Action::UploadCompleted {
        session_id: sid.clone(),
        file_name: "meeting.wav".into(),
    })
    .unwrap();

    assert!(
        log.wait_for(ActionKind::TranscribeDone, 1, Duration::from_secs(3)).await,
        "batch upload should transcribe"
    );
    assert_eq!(log.transcripts(), vec![Some("BATCH TEXT".to_string())]);

    // The drain is destructive and the FSM falls back to idle
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(app.queue().size(&sid), 0);
    assert_eq!(session_state_path(&app, &sid), "idle");

    app.shutdown();
}

/// The expiry sweep reclaims stale sessions: record removed from the store,
/// per-session queue destroyed.
#[tokio::test(flavor = "multi_thread")]
async fn expiry_sweep_reclaims_stale_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.session.ttl = 0.3;
    config.session.expiry_sweep_interval = 0.1;
    let (factory, _) = fixed_provider_factory("HELLO", Duration::ZERO);
    let (app, log) = build_app(config, factory);

    let sid = create_session(&app, Strategy::NonStreaming, "req-1").await;
    start_listening(&app, &sid);
    feed(&app, &sid, 0.1, SILENCE_AMP).await;
    assert!(app.queue().exists(&sid));

    assert!(
        log.wait_for(ActionKind::SessionExpired, 1, Duration::from_secs(3)).await,
        "sweep should expire the idle session"
    );
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(app.state().session(&sid).is_none());
    assert!(!app.queue().exists(&sid));

    app.shutdown();
}

struct FailingWake;

impl WakewordDetector for FailingWake {
    fn detect(&self, _frame: &[f32]) -> Result<Vec<WakewordDetection>> {
        Err(Error::Detection("model exploded".into()))
    }
}

struct SilentVad;

impl VadDetector for SilentVad {
    fn detect(&self, _frame: &[f32], _session_id: &str) -> Result<VadResult> {
        Ok(VadResult {
            state: asrhub_core::detect::SpeechState::Silence,
            probability: 0.0,
        })
    }
}

/// A detector failing on every frame stops its worker after the
/// consecutive-error limit and raises exactly one error action for it.
#[tokio::test(flavor = "multi_thread")]
async fn failing_detector_stops_worker_after_error_limit() {
    let dir = tempfile::tempdir().unwrap();
    let (factory, _) = fixed_provider_factory("HELLO", Duration::ZERO);
    let app = App::new(
        test_config(dir.path()),
        Collaborators {
            wakeword: Arc::new(FailingWake),
            vad: Arc::new(SilentVad),
            provider_factory: factory,
            converter: None,
            recorder: None,
            clock: None,
        },
    )
    .unwrap();
    let log = ActionLog::attach(&app);

    let sid = create_session(&app, Strategy::NonStreaming, "req-1").await;
    start_listening(&app, &sid);

    // 10 consecutive failing frames = 0.8s of audio through 80ms frames
    feed(&app, &sid, 1.2, SPEECH_AMP).await;

    assert!(
        log.wait_for(ActionKind::ErrorRaised, 1, Duration::from_secs(2)).await,
        "worker should raise after the error limit"
    );
    assert!(
        log.wait_for(ActionKind::ErrorReported, 1, Duration::from_secs(2)).await,
        "raised errors surface to clients"
    );

    // The worker stopped; more audio produces no further error actions
    let raised = log.count(ActionKind::ErrorRaised);
    feed(&app, &sid, 0.5, SPEECH_AMP).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(log.count(ActionKind::ErrorRaised), raised);

    app.shutdown();
}
