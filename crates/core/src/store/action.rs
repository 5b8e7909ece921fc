//! Actions: the closed set of messages moving through the store
//!
//! An action is an immutable tagged message and the sole means of state
//! change. Kinds partition into three roles: Input (from transports),
//! Internal (from detectors and timers), Output (published to transports).

use serde::{Deserialize, Serialize};

use crate::audio::{AudioChunk, AudioConfig};
use crate::fsm::Strategy;
use crate::provider::TranscriptionResult;
use crate::recording::RecordingInfo;

/// Where an action kind originates / is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionRole {
    /// From external transports
    Input,
    /// From detectors, timers, and the coordinator itself
    Internal,
    /// Published to transports
    Output,
}

/// Closed enumeration of action kinds. Also the FSM trigger alphabet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    CreateSession,
    DeleteSession,
    SessionExpired,
    ResetSession,
    ReceiveAudioChunk,
    ClearAudioBuffer,
    UploadStarted,
    UploadCompleted,
    StartListening,
    WakeActivated,
    WakeDeactivated,
    VadSpeechDetected,
    VadSilenceDetected,
    SilenceTimeout,
    RecordStarted,
    RecordStopped,
    PlayAsrFeedback,
    TranscribeStarted,
    TranscribeDone,
    AsrStreamStarted,
    AsrStreamStopped,
    ErrorOccurred,
    ErrorRaised,
    ErrorReported,
}

impl ActionKind {
    /// Stable snake_case name, matching wire-level event names.
    pub fn as_str(&self) -> &'static str {
        use ActionKind::*;
        match self {
            CreateSession => "create_session",
            DeleteSession => "delete_session",
            SessionExpired => "session_expired",
            ResetSession => "reset_session",
            ReceiveAudioChunk => "receive_audio_chunk",
            ClearAudioBuffer => "clear_audio_buffer",
            UploadStarted => "upload_started",
            UploadCompleted => "upload_completed",
            StartListening => "start_listening",
            WakeActivated => "wake_activated",
            WakeDeactivated => "wake_deactivated",
            VadSpeechDetected => "vad_speech_detected",
            VadSilenceDetected => "vad_silence_detected",
            SilenceTimeout => "silence_timeout",
            RecordStarted => "record_started",
            RecordStopped => "record_stopped",
            PlayAsrFeedback => "play_asr_feedback",
            TranscribeStarted => "transcribe_started",
            TranscribeDone => "transcribe_done",
            AsrStreamStarted => "asr_stream_started",
            AsrStreamStopped => "asr_stream_stopped",
            ErrorOccurred => "error_occurred",
            ErrorRaised => "error_raised",
            ErrorReported => "error_reported",
        }
    }

    /// Role partition. `transcribe_done` counts as Output: it is the event
    /// transports forward to clients.
    pub fn role(&self) -> ActionRole {
        use ActionKind::*;
        match self {
            CreateSession | DeleteSession | StartListening | ReceiveAudioChunk
            | UploadStarted | UploadCompleted => ActionRole::Input,
            PlayAsrFeedback | TranscribeDone | ErrorReported => ActionRole::Output,
            _ => ActionRole::Internal,
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Origin of a wake activation or deactivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WakeSource {
    /// UI button or equivalent external control
    Ui,
    /// Visual trigger (gaze, gesture)
    Visual,
    /// Keyword spotted by the wake-word detector
    Keyword(String),
    /// VAD-driven deactivation
    Vad,
}

impl std::fmt::Display for WakeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WakeSource::Ui => f.write_str("ui"),
            WakeSource::Visual => f.write_str("visual"),
            WakeSource::Vad => f.write_str("vad"),
            WakeSource::Keyword(k) => write!(f, "keyword:{}", k),
        }
    }
}

/// A message through the store. Payload variants per kind.
#[derive(Debug, Clone)]
pub enum Action {
    /// Create a session; the reducer generates the id
    CreateSession {
        strategy: Strategy,
        request_id: Option<String>,
        audio_config: Option<AudioConfig>,
    },
    /// Destroy a session and all per-session state
    DeleteSession { session_id: String },
    /// Expiry sweep found a stale session
    SessionExpired { session_id: String },
    /// Tear down workers and return the session to listening
    ResetSession { session_id: String },
    /// An audio chunk arrived from a transport
    ReceiveAudioChunk {
        session_id: String,
        chunk: AudioChunk,
    },
    /// Drop all queued audio for the session
    ClearAudioBuffer { session_id: String },
    /// Batch upload began; carries the declared audio metadata
    UploadStarted {
        session_id: String,
        file_name: String,
        audio_config: AudioConfig,
    },
    /// Batch upload finished
    UploadCompleted {
        session_id: String,
        file_name: String,
    },
    /// Begin listening with the declared audio configuration
    StartListening {
        session_id: String,
        audio_config: AudioConfig,
    },
    /// Wake trigger from any source
    WakeActivated {
        session_id: String,
        source: WakeSource,
        /// Queue timestamp of the wake moment; `None` means "now"
        timestamp: Option<u64>,
        confidence: Option<f32>,
    },
    /// Wake cancelled from any source
    WakeDeactivated {
        session_id: String,
        source: WakeSource,
    },
    /// VAD observed a transition into speech
    VadSpeechDetected {
        session_id: String,
        probability: f32,
    },
    /// VAD observed a transition into silence
    VadSilenceDetected {
        session_id: String,
        timestamp: u64,
        probability: f32,
    },
    /// The silence countdown elapsed
    SilenceTimeout { session_id: String, timestamp: u64 },
    /// Recording began at the given queue timestamp
    RecordStarted { session_id: String, timestamp: u64 },
    /// Recording ended at the given queue timestamp
    RecordStopped {
        session_id: String,
        timestamp: u64,
        info: Option<RecordingInfo>,
    },
    /// Ask transports to play an earcon
    PlayAsrFeedback { session_id: String, command: String },
    /// ASR started on a captured segment
    TranscribeStarted {
        session_id: String,
        filepath: Option<std::path::PathBuf>,
    },
    /// ASR finished; `result` is `None` on failure
    TranscribeDone {
        session_id: String,
        result: Option<TranscriptionResult>,
    },
    /// Streaming ASR started
    AsrStreamStarted { session_id: String },
    /// Streaming ASR stopped
    AsrStreamStopped { session_id: String },
    /// Unrecoverable error; FSM transitions to `error`
    ErrorOccurred { session_id: String },
    /// Internal error worth surfacing; session keeps running
    ErrorRaised { session_id: String, error: String },
    /// Error event published to clients
    ErrorReported {
        session_id: String,
        code: String,
        message: String,
    },
}

impl Action {
    /// The action's kind tag.
    pub fn kind(&self) -> ActionKind {
        use Action::*;
        match self {
            CreateSession { .. } => ActionKind::CreateSession,
            DeleteSession { .. } => ActionKind::DeleteSession,
            SessionExpired { .. } => ActionKind::SessionExpired,
            ResetSession { .. } => ActionKind::ResetSession,
            ReceiveAudioChunk { .. } => ActionKind::ReceiveAudioChunk,
            ClearAudioBuffer { .. } => ActionKind::ClearAudioBuffer,
            UploadStarted { .. } => ActionKind::UploadStarted,
            UploadCompleted { .. } => ActionKind::UploadCompleted,
            StartListening { .. } => ActionKind::StartListening,
            WakeActivated { .. } => ActionKind::WakeActivated,
            WakeDeactivated { .. } => ActionKind::WakeDeactivated,
            VadSpeechDetected { .. } => ActionKind::VadSpeechDetected,
            VadSilenceDetected { .. } => ActionKind::VadSilenceDetected,
            SilenceTimeout { .. } => ActionKind::SilenceTimeout,
            RecordStarted { .. } => ActionKind::RecordStarted,
            RecordStopped { .. } => ActionKind::RecordStopped,
            PlayAsrFeedback { .. } => ActionKind::PlayAsrFeedback,
            TranscribeStarted { .. } => ActionKind::TranscribeStarted,
            TranscribeDone { .. } => ActionKind::TranscribeDone,
            AsrStreamStarted { .. } => ActionKind::AsrStreamStarted,
            AsrStreamStopped { .. } => ActionKind::AsrStreamStopped,
            ErrorOccurred { .. } => ActionKind::ErrorOccurred,
            ErrorRaised { .. } => ActionKind::ErrorRaised,
            ErrorReported { .. } => ActionKind::ErrorReported,
        }
    }

    /// The session the action addresses. `None` only for `create_session`,
    /// where the id does not exist yet.
    pub fn session_id(&self) -> Option<&str> {
        use Action::*;
        match self {
            CreateSession { .. } => None,
            DeleteSession { session_id }
            | SessionExpired { session_id }
            | ResetSession { session_id }
            | ReceiveAudioChunk { session_id, .. }
            | ClearAudioBuffer { session_id }
            | UploadStarted { session_id, .. }
            | UploadCompleted { session_id, .. }
            | StartListening { session_id, .. }
            | WakeActivated { session_id, .. }
            | WakeDeactivated { session_id, .. }
            | VadSpeechDetected { session_id, .. }
            | VadSilenceDetected { session_id, .. }
            | SilenceTimeout { session_id, .. }
            | RecordStarted { session_id, .. }
            | RecordStopped { session_id, .. }
            | PlayAsrFeedback { session_id, .. }
            | TranscribeStarted { session_id, .. }
            | TranscribeDone { session_id, .. }
            | AsrStreamStarted { session_id }
            | AsrStreamStopped { session_id }
            | ErrorOccurred { session_id }
            | ErrorRaised { session_id, .. }
            | ErrorReported { session_id, .. } => Some(session_id),
        }
    }
}
