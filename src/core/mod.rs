pub mod capture;
pub mod finalize;
pub mod orchestrator;
pub mod speech_link;
pub mod transcribe;
pub mod turn;

// Re-export commonly used types for convenience
pub use capture::{CaptureError, MicrophoneCapture};
pub use finalize::{Admission, FinalizationSerializer};
pub use orchestrator::{
    Collaborators, ConversationStore, EXPECTED_REPLY_COUNT, FinalizationError, NewMessage,
    OrchestratorConfig, ReplySuggester, ReplySuggestion, SpeechSynthesizer, StoredMessage,
    Translator, TurnOrchestrator, UiEvent,
};
pub use speech_link::{
    ConnectionState, LinkEvent, SpeechLink, SpeechLinkConfig, SpeechLinkError, SpeechLinkResult,
};
pub use transcribe::{
    Credential, CredentialProvider, DeepgramTranscriber, HttpCredentialProvider, LiveTranscriber,
    TranscriberConfig, TranscriberError, TranscriberEvent, TranscriberEventCallback,
    TranscriptEvent, TranscriptKind,
};
pub use turn::{RecordingIndicator, TurnEvent, TurnState, next_state, recording_indicator};
