//! ASRHub coordination core - per-session audio orchestration
//!
//! This crate is the transport-agnostic heart of ASRHub: clients stream PCM
//! audio into per-session pipelines that decide when a user has begun
//! speaking (wake word), when they are actively speaking (VAD), when to
//! start and stop recording, and when to hand the captured segment to an
//! ASR engine.
//!
//! # Architecture
//!
//! - [`queue::AudioQueue`] - timestamped multi-reader queue; detectors
//!   consume the same stream non-destructively from arbitrary time points
//! - [`fsm::SessionFsm`] - hierarchical per-session state machine guarding
//!   every transition
//! - [`store::Store`] - action bus: dispatch -> reduce -> notify effects,
//!   over an immutable state map
//! - [`coordinator::SessionCoordinator`] - the effect wiring wake, VAD,
//!   recording, pre-roll/tail-padding, and ASR dispatch together
//! - [`provider::ProviderPool`] - bounded, leased pool of ASR backends
//!
//! Transports (HTTP+SSE, WebSocket, Redis pub/sub, WebRTC), model
//! implementations, and concrete ASR engines are swappable leaves behind
//! the traits in [`detect`], [`audio::convert`], [`recording`], and
//! [`provider`].
//!
//! # Example
//!
//! ```no_run
//! use asrhub_core::app::{App, Collaborators};
//! use asrhub_core::config::Config;
//! use asrhub_core::fsm::Strategy;
//! use asrhub_core::store::Action;
//! # use std::sync::Arc;
//! # use asrhub_core::detect::{VadDetector, VadResult, WakewordDetector, WakewordDetection};
//! # struct NoWake;
//! # impl WakewordDetector for NoWake {
//! #     fn detect(&self, _: &[f32]) -> asrhub_core::error::Result<Vec<WakewordDetection>> { Ok(vec![]) }
//! # }
//! # struct NoVad;
//! # impl VadDetector for NoVad {
//! #     fn detect(&self, _: &[f32], _: &str) -> asrhub_core::error::Result<VadResult> {
//! #         Ok(VadResult { state: asrhub_core::detect::SpeechState::Silence, probability: 0.0 })
//! #     }
//! # }
//!
//! # async fn demo(provider_factory: asrhub_core::provider::ProviderFactory) -> anyhow::Result<()> {
//! let app = App::new(
//!     Config::default(),
//!     Collaborators {
//!         wakeword: Arc::new(NoWake),
//!         vad: Arc::new(NoVad),
//!         provider_factory,
//!         converter: None,
//!         recorder: None,
//!         clock: None,
//!     },
//! )?;
//!
//! app.dispatch(Action::CreateSession {
//!     strategy: Strategy::NonStreaming,
//!     request_id: Some("req-1".into()),
//!     audio_config: None,
//! })?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod app;
pub mod audio;
pub mod buffer;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod detect;
pub mod error;
pub mod fsm;
pub mod provider;
pub mod queue;
pub mod recording;
pub mod store;
pub mod timer;

pub use app::{App, Collaborators};
pub use config::Config;
pub use error::{Error, Result};
pub use fsm::{FsmState, SessionFsm, Strategy};
pub use queue::{AudioQueue, TimestampedChunk};
pub use store::{Action, ActionKind, ActionRole, Store, WakeSource};

/// Install a `tracing` subscriber honoring `RUST_LOG`. Safe to call more
/// than once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
