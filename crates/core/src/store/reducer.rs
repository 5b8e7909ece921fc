//! Pure reducers: `(previous_state, action) -> next_state`
//!
//! Reducers never perform I/O, never dispatch, and never raise: an action
//! that doesn't apply is a no-op. Session FSM paths in the store are
//! maintained through the same pure transition table the coordinator's FSM
//! instances use, so the two views cannot drift.
//!
//! The one impurity, sanctioned by the data model: `create_session`
//! generates the new session's id (UUIDv7, time-ordered) and records
//! wall-clock timestamps. Effects read the id back by `request_id`.

use std::sync::Arc;

use chrono::Utc;

use super::action::Action;
use super::state::{Session, StoreState};
use crate::fsm;

/// Reducer context fixed at store construction.
#[derive(Debug, Clone, Copy)]
pub struct ReducerContext {
    /// Session time-to-live applied to `expires_at`
    pub session_ttl: chrono::Duration,
}

/// Apply `action` to `state`, producing the next state. Unchanged sessions
/// are shared between the two snapshots.
pub fn reduce(state: &StoreState, action: &Action, ctx: ReducerContext) -> StoreState {
    let mut next = state.clone();
    next.stats.actions_dispatched += 1;

    match action {
        Action::CreateSession {
            strategy,
            request_id,
            audio_config,
        } => {
            let id = uuid::Uuid::now_v7().to_string();
            let session = Session::new(
                id.clone(),
                *strategy,
                request_id.clone(),
                *audio_config,
                Utc::now(),
                ctx.session_ttl,
            );
            next.sessions.insert(id, Arc::new(session));
            next.stats.sessions_created += 1;
        }

        Action::DeleteSession { session_id } | Action::SessionExpired { session_id } => {
            next.sessions.remove(session_id);
        }

        _ => {
            let Some(session_id) = action.session_id() else {
                return next;
            };
            let Some(existing) = next.sessions.get(session_id) else {
                // Invalid session references are no-ops
                return next;
            };

            let mut session = (**existing).clone();
            let now = Utc::now();
            session.updated_at = now;
            session.expires_at = now + ctx.session_ttl;

            // Keep the stored FSM path in lockstep with the coordinator's
            // FSM; illegal transitions leave the path untouched.
            if let Some(state) = fsm::transition(session.strategy, session.state, action.kind()) {
                session.state = state;
            }

            match action {
                Action::ReceiveAudioChunk { .. } => {
                    session.chunks_received += 1;
                }
                Action::StartListening { audio_config, .. } => {
                    session.audio_config = Some(*audio_config);
                }
                Action::UploadStarted { audio_config, .. } => {
                    session.audio_config = Some(*audio_config);
                }
                Action::RecordStopped { info, .. } => {
                    if let Some(info) = info {
                        session.chunks_processed += info.chunks_written;
                    }
                }
                Action::TranscribeDone { result, .. } => {
                    if let Some(result) = result {
                        session.last_transcription = Some(result.clone());
                        next.stats.transcriptions_completed += 1;
                    }
                }
                Action::ErrorRaised { .. } | Action::ErrorOccurred { .. } => {
                    session.error_count += 1;
                    next.stats.errors += 1;
                }
                _ => {}
            }

            next.sessions
                .insert(session_id.to_string(), Arc::new(session));
        }
    }

    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioConfig;
    use crate::fsm::{FsmState, Strategy};
    use crate::provider::TranscriptionResult;

    fn ctx() -> ReducerContext {
        ReducerContext {
            session_ttl: chrono::Duration::seconds(3600),
        }
    }

    fn created(state: &StoreState) -> (StoreState, String) {
        let next = reduce(
            state,
            &Action::CreateSession {
                strategy: Strategy::NonStreaming,
                request_id: Some("req-1".into()),
                audio_config: None,
            },
            ctx(),
        );
        let id = next.sessions.keys().next().unwrap().clone();
        (next, id)
    }

    #[test]
    fn test_create_session_generates_id() {
        let (state, id) = created(&StoreState::default());
        let session = state.session(&id).unwrap();
        assert_eq!(session.request_id.as_deref(), Some("req-1"));
        assert_eq!(session.state, FsmState::Idle);
        assert_eq!(state.stats.sessions_created, 1);
        // UUIDv7 string form
        assert_eq!(id.len(), 36);
    }

    #[test]
    fn test_ids_are_time_ordered() {
        let state = StoreState::default();
        let a = reduce(
            &state,
            &Action::CreateSession {
                strategy: Strategy::Batch,
                request_id: Some("a".into()),
                audio_config: None,
            },
            ctx(),
        );
        // UUIDv7 embeds a millisecond timestamp; step past it
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = reduce(
            &a,
            &Action::CreateSession {
                strategy: Strategy::Batch,
                request_id: Some("b".into()),
                audio_config: None,
            },
            ctx(),
        );
        let id_a = super::super::state::find_session_by_request_id(&b, "a")
            .unwrap()
            .id
            .clone();
        let id_b = super::super::state::find_session_by_request_id(&b, "b")
            .unwrap()
            .id
            .clone();
        assert!(id_a < id_b);
    }

    #[test]
    fn test_unknown_session_is_noop() {
        let state = StoreState::default();
        let next = reduce(
            &state,
            &Action::VadSpeechDetected {
                session_id: "ghost".into(),
                probability: 0.9,
            },
            ctx(),
        );
        assert!(next.sessions.is_empty());
    }

    #[test]
    fn test_state_mirror_follows_fsm_table() {
        let (state, id) = created(&StoreState::default());

        let state = reduce(
            &state,
            &Action::StartListening {
                session_id: id.clone(),
                audio_config: AudioConfig::pipeline(),
            },
            ctx(),
        );
        assert_eq!(state.session(&id).unwrap().state.path(), "processing");

        // Illegal action leaves the stored path untouched (P4)
        let state = reduce(
            &state,
            &Action::RecordStarted {
                session_id: id.clone(),
                timestamp: 0,
            },
            ctx(),
        );
        assert_eq!(state.session(&id).unwrap().state.path(), "processing");
    }

    #[test]
    fn test_counters_and_sharing() {
        let (state, id) = created(&StoreState::default());
        let (other_state, other_id) = created(&state);

        let next = reduce(
            &other_state,
            &Action::ReceiveAudioChunk {
                session_id: id.clone(),
                chunk: crate::audio::AudioChunk::from_i16(&[0i16; 16]),
            },
            ctx(),
        );
        assert_eq!(next.session(&id).unwrap().chunks_received, 1);

        // The untouched session record is shared, not copied
        assert!(Arc::ptr_eq(
            other_state.session(&other_id).unwrap(),
            next.session(&other_id).unwrap()
        ));
    }

    #[test]
    fn test_transcribe_done_stores_result() {
        let (state, id) = created(&StoreState::default());
        let result = TranscriptionResult {
            full_text: "HELLO".into(),
            language: Some("en".into()),
            duration: 1.5,
            confidence: Some(0.97),
        };
        let next = reduce(
            &state,
            &Action::TranscribeDone {
                session_id: id.clone(),
                result: Some(result),
            },
            ctx(),
        );
        assert_eq!(
            next.session(&id).unwrap().last_transcription.as_ref().unwrap().full_text,
            "HELLO"
        );
        assert_eq!(next.stats.transcriptions_completed, 1);

        // Nil result records nothing
        let next = reduce(
            &next,
            &Action::TranscribeDone {
                session_id: id,
                result: None,
            },
            ctx(),
        );
        assert_eq!(next.stats.transcriptions_completed, 1);
    }
}
