//! Per-session hierarchical state machine
//!
//! Each session owns one FSM selected by its strategy. States form a
//! two-level hierarchy: `idle`, `processing` (with strategy-specific
//! substates), and `error`. Transition tables are fixed per strategy and
//! derived from a universal set (expiry, reset, errors) plus a
//! strategy-specific set.
//!
//! The store never consults the FSM; the coordinator uses it to guard its
//! own actions. An illegal trigger is a no-op returning `false`, never an
//! error.

use serde::{Deserialize, Serialize};

use crate::store::action::ActionKind;

/// Per-session pipeline shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Upload a whole file, then transcribe
    Batch,
    /// Wake -> record -> transcribe segments
    NonStreaming,
    /// Wake -> streaming ASR
    Streaming,
}

impl Strategy {
    /// Stable snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Batch => "batch",
            Strategy::NonStreaming => "non_streaming",
            Strategy::Streaming => "streaming",
        }
    }
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::NonStreaming
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Substate under `processing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Batch: receiving an uploaded file
    Uploading,
    /// Awake and ready for an utterance
    Activated,
    /// Capturing an utterance
    Recording,
    /// Running ASR on a captured segment or stream
    Transcribing,
    /// Occupied by a downstream reply (reserved)
    Busy,
}

impl Phase {
    fn as_str(&self) -> &'static str {
        match self {
            Phase::Uploading => "uploading",
            Phase::Activated => "activated",
            Phase::Recording => "recording",
            Phase::Transcribing => "transcribing",
            Phase::Busy => "busy",
        }
    }
}

/// Hierarchical session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FsmState {
    /// Not listening
    Idle,
    /// Listening; `Some(phase)` is the substate path
    Processing(Option<Phase>),
    /// Absorbing error state until an explicit reset
    Error,
}

impl FsmState {
    /// Hierarchical path of the form `parent_child`, e.g.
    /// `processing_recording`.
    pub fn path(&self) -> String {
        match self {
            FsmState::Idle => "idle".to_string(),
            FsmState::Processing(None) => "processing".to_string(),
            FsmState::Processing(Some(phase)) => format!("processing_{}", phase.as_str()),
            FsmState::Error => "error".to_string(),
        }
    }

    /// True for `processing` and every `processing_*` substate.
    pub fn is_processing(&self) -> bool {
        matches!(self, FsmState::Processing(_))
    }

    /// True only for `processing_activated`.
    pub fn is_activated(&self) -> bool {
        matches!(self, FsmState::Processing(Some(Phase::Activated)))
    }

    /// True only for `processing_recording`.
    pub fn is_recording(&self) -> bool {
        matches!(self, FsmState::Processing(Some(Phase::Recording)))
    }

    /// True only for `processing_transcribing`.
    pub fn is_transcribing(&self) -> bool {
        matches!(self, FsmState::Processing(Some(Phase::Transcribing)))
    }
}

impl Default for FsmState {
    fn default() -> Self {
        FsmState::Idle
    }
}

/// Pure transition function: the next state for `(strategy, state, action)`,
/// or `None` when the action is not legal from this state.
///
/// Shared by [`SessionFsm`] and the session reducer so the store's mirror of
/// the session state can never disagree with the coordinator's FSM.
pub fn transition(strategy: Strategy, state: FsmState, action: ActionKind) -> Option<FsmState> {
    use ActionKind::*;
    use FsmState::*;
    use Phase::*;

    // Universal transitions apply to every strategy and every state.
    match action {
        SessionExpired | ResetSession => return Some(Idle),
        ErrorOccurred => return Some(Error),
        _ => {}
    }

    match strategy {
        Strategy::Batch => match (state, action) {
            (Idle, UploadStarted) => Some(Processing(Some(Uploading))),
            (Processing(Some(Uploading)), UploadCompleted) => Some(Processing(None)),
            (Processing(None), TranscribeStarted) => Some(Processing(Some(Transcribing))),
            (Processing(Some(Transcribing)), TranscribeDone) => Some(Idle),
            _ => None,
        },
        Strategy::NonStreaming => match (state, action) {
            (Idle, StartListening) => Some(Processing(None)),
            (Processing(None), WakeActivated) => Some(Processing(Some(Activated))),
            // Re-wake from activated starts the next utterance cycle
            (Processing(Some(Activated)), WakeActivated) => Some(Processing(Some(Activated))),
            (Processing(Some(Activated)), RecordStarted) => Some(Processing(Some(Recording))),
            (Processing(Some(Recording)), RecordStopped) => Some(Processing(Some(Transcribing))),
            (Processing(Some(Transcribing)), TranscribeDone) => Some(Processing(Some(Activated))),
            (Processing(Some(Activated)), WakeDeactivated) => Some(Idle),
            _ => None,
        },
        Strategy::Streaming => match (state, action) {
            (Idle, StartListening) => Some(Processing(None)),
            (Processing(None), WakeActivated) => Some(Processing(Some(Activated))),
            (Processing(Some(Activated)), WakeActivated) => Some(Processing(Some(Activated))),
            (Processing(Some(Activated)), AsrStreamStarted) => {
                Some(Processing(Some(Transcribing)))
            }
            (Processing(Some(Transcribing)), AsrStreamStopped) => {
                Some(Processing(Some(Activated)))
            }
            (Processing(Some(Activated)), WakeDeactivated) => Some(Idle),
            _ => None,
        },
    }
}

/// One state machine instance, owned by the coordinator per session.
#[derive(Debug, Clone)]
pub struct SessionFsm {
    strategy: Strategy,
    state: FsmState,
}

impl SessionFsm {
    /// New FSM in the initial `idle` state.
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            state: FsmState::Idle,
        }
    }

    /// The strategy this FSM was built for.
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Current state.
    pub fn state(&self) -> FsmState {
        self.state
    }

    /// Is `action` a legal transition from the current state?
    pub fn may(&self, action: ActionKind) -> bool {
        transition(self.strategy, self.state, action).is_some()
    }

    /// Attempt a transition. Illegal actions are a no-op returning `false`.
    pub fn trigger(&mut self, action: ActionKind) -> bool {
        match transition(self.strategy, self.state, action) {
            Some(next) => {
                if next != self.state {
                    tracing::debug!(
                        "FSM transition: '{}' --{}-> '{}'",
                        self.state.path(),
                        action.as_str(),
                        next.path()
                    );
                }
                self.state = next;
                true
            }
            None => {
                tracing::debug!(
                    "FSM rejected '{}' from state '{}'",
                    action.as_str(),
                    self.state.path()
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ActionKind::*;

    #[test]
    fn test_non_streaming_happy_path() {
        let mut fsm = SessionFsm::new(Strategy::NonStreaming);
        assert_eq!(fsm.state().path(), "idle");

        assert!(fsm.trigger(StartListening));
        assert_eq!(fsm.state().path(), "processing");

        assert!(fsm.trigger(WakeActivated));
        assert_eq!(fsm.state().path(), "processing_activated");

        assert!(fsm.trigger(RecordStarted));
        assert_eq!(fsm.state().path(), "processing_recording");

        assert!(fsm.trigger(RecordStopped));
        assert_eq!(fsm.state().path(), "processing_transcribing");

        assert!(fsm.trigger(TranscribeDone));
        assert_eq!(fsm.state().path(), "processing_activated");

        assert!(fsm.trigger(WakeDeactivated));
        assert_eq!(fsm.state().path(), "idle");
    }

    #[test]
    fn test_illegal_trigger_is_noop() {
        let mut fsm = SessionFsm::new(Strategy::NonStreaming);
        fsm.trigger(StartListening);
        fsm.trigger(WakeActivated);
        fsm.trigger(RecordStarted);

        // Second wake while recording is ignored, state unchanged
        assert!(!fsm.may(WakeActivated));
        assert!(!fsm.trigger(WakeActivated));
        assert_eq!(fsm.state().path(), "processing_recording");

        // record_started again would be a second overlapping cycle
        assert!(!fsm.trigger(RecordStarted));
    }

    #[test]
    fn test_rewake_from_activated_starts_next_cycle() {
        let mut fsm = SessionFsm::new(Strategy::NonStreaming);
        fsm.trigger(StartListening);
        fsm.trigger(WakeActivated);
        fsm.trigger(RecordStarted);
        fsm.trigger(RecordStopped);
        fsm.trigger(TranscribeDone);
        assert_eq!(fsm.state().path(), "processing_activated");

        // The session is immediately ready for the next utterance
        assert!(fsm.trigger(WakeActivated));
        assert!(fsm.trigger(RecordStarted));
        assert_eq!(fsm.state().path(), "processing_recording");
    }

    #[test]
    fn test_hierarchy_predicate() {
        let mut fsm = SessionFsm::new(Strategy::NonStreaming);
        assert!(!fsm.state().is_processing());
        fsm.trigger(StartListening);
        assert!(fsm.state().is_processing());
        fsm.trigger(WakeActivated);
        assert!(fsm.state().is_processing());
        assert!(fsm.state().is_activated());
        assert!(!fsm.state().is_recording());
    }

    #[test]
    fn test_universal_transitions() {
        let mut fsm = SessionFsm::new(Strategy::NonStreaming);
        fsm.trigger(StartListening);
        fsm.trigger(WakeActivated);

        assert!(fsm.trigger(ErrorOccurred));
        assert_eq!(fsm.state().path(), "error");

        // Error is absorbing until an explicit reset
        assert!(!fsm.trigger(StartListening));
        assert!(!fsm.trigger(WakeActivated));
        assert_eq!(fsm.state().path(), "error");

        assert!(fsm.trigger(ResetSession));
        assert_eq!(fsm.state().path(), "idle");
    }

    #[test]
    fn test_expiry_from_any_state() {
        for strategy in [Strategy::Batch, Strategy::NonStreaming, Strategy::Streaming] {
            let mut fsm = SessionFsm::new(strategy);
            assert!(fsm.trigger(SessionExpired));
            assert_eq!(fsm.state().path(), "idle");
        }
    }

    #[test]
    fn test_batch_flow() {
        let mut fsm = SessionFsm::new(Strategy::Batch);
        assert!(fsm.trigger(UploadStarted));
        assert_eq!(fsm.state().path(), "processing_uploading");
        assert!(fsm.trigger(UploadCompleted));
        assert_eq!(fsm.state().path(), "processing");
        assert!(fsm.trigger(TranscribeStarted));
        assert_eq!(fsm.state().path(), "processing_transcribing");
        assert!(fsm.trigger(TranscribeDone));
        assert_eq!(fsm.state().path(), "idle");

        // Wake events mean nothing to a batch session
        assert!(!fsm.trigger(WakeActivated));
    }

    #[test]
    fn test_streaming_flow() {
        let mut fsm = SessionFsm::new(Strategy::Streaming);
        fsm.trigger(StartListening);
        fsm.trigger(WakeActivated);
        assert!(fsm.trigger(AsrStreamStarted));
        assert_eq!(fsm.state().path(), "processing_transcribing");
        assert!(fsm.trigger(AsrStreamStopped));
        assert_eq!(fsm.state().path(), "processing_activated");

        // record_started belongs to non_streaming only
        assert!(!fsm.trigger(RecordStarted));
    }

    #[test]
    fn test_recreated_fsm_rejects_stale_recording_events() {
        // A silence timeout that raced a reset must be rejected by the fresh
        // FSM (it is in `processing`, not `processing_recording`).
        let mut fsm = SessionFsm::new(Strategy::NonStreaming);
        fsm.trigger(StartListening);
        assert!(!fsm.may(RecordStopped));
        assert!(!fsm.trigger(RecordStopped));
        assert_eq!(fsm.state().path(), "processing");
    }
}
