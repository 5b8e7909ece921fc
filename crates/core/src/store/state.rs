//! Store state: the immutable session map and aggregate counters
//!
//! State is only ever replaced, never mutated in place: reducers build a new
//! [`StoreState`] sharing unchanged `Arc<Session>` entries with the previous
//! snapshot, and the store swaps the top-level pointer. Consumers hold cheap
//! immutable snapshots.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audio::AudioConfig;
use crate::fsm::{FsmState, Strategy};
use crate::provider::TranscriptionResult;

/// One session's record in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Opaque, collision-resistant, time-ordered id (UUIDv7)
    pub id: String,
    /// Pipeline shape chosen at creation
    pub strategy: Strategy,
    /// Client correlation id from `create_session`
    pub request_id: Option<String>,
    /// Declared input audio format; set by `start_listening`/`upload_started`
    pub audio_config: Option<AudioConfig>,
    /// Mirror of the session FSM state, maintained by the reducer through
    /// the same pure transition table the coordinator uses
    pub state: FsmState,
    /// Creation wall-clock time
    pub created_at: DateTime<Utc>,
    /// Last action wall-clock time
    pub updated_at: DateTime<Utc>,
    /// When the expiry sweep may reclaim this session
    pub expires_at: DateTime<Utc>,
    /// Audio chunks accepted for this session
    pub chunks_received: u64,
    /// Audio chunks written into finished recordings
    pub chunks_processed: u64,
    /// Errors raised against this session
    pub error_count: u64,
    /// Most recent transcription, if any
    pub last_transcription: Option<TranscriptionResult>,
}

impl Session {
    /// Build a fresh idle session.
    pub fn new(
        id: String,
        strategy: Strategy,
        request_id: Option<String>,
        audio_config: Option<AudioConfig>,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            id,
            strategy,
            request_id,
            audio_config,
            state: FsmState::Idle,
            created_at: now,
            updated_at: now,
            expires_at: now + ttl,
            chunks_received: 0,
            chunks_processed: 0,
            error_count: 0,
            last_transcription: None,
        }
    }
}

/// Aggregate counters across the store's lifetime.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StoreStats {
    /// Sessions ever created
    pub sessions_created: u64,
    /// Actions the dispatcher has processed
    pub actions_dispatched: u64,
    /// `transcribe_done` actions with a result
    pub transcriptions_completed: u64,
    /// `error_raised` / `error_occurred` actions
    pub errors: u64,
}

/// The whole store state. Cheap to clone; session records are shared.
#[derive(Debug, Clone, Default)]
pub struct StoreState {
    /// Live sessions by id
    pub sessions: HashMap<String, Arc<Session>>,
    /// Aggregate counters
    pub stats: StoreStats,
}

impl StoreState {
    /// Look up a session by id.
    pub fn session(&self, session_id: &str) -> Option<&Arc<Session>> {
        self.sessions.get(session_id)
    }
}

// Pure selectors over a state snapshot.

/// The session created for `request_id`, if any.
pub fn find_session_by_request_id<'a>(
    state: &'a StoreState,
    request_id: &str,
) -> Option<&'a Arc<Session>> {
    state
        .sessions
        .values()
        .find(|s| s.request_id.as_deref() == Some(request_id))
}

/// A session's declared audio configuration.
pub fn session_audio_config(state: &StoreState, session_id: &str) -> Option<AudioConfig> {
    state.session(session_id).and_then(|s| s.audio_config)
}

/// Ids of sessions whose expiry time has passed.
pub fn expired_session_ids(state: &StoreState, now: DateTime<Utc>) -> Vec<String> {
    state
        .sessions
        .values()
        .filter(|s| s.expires_at <= now)
        .map(|s| s.id.clone())
        .collect()
}
