use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;

use super::credentials::Credential;

/// Whether a transcript is still changing or stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptKind {
    /// Still-changing hypothesis; overwritten by the next one.
    Interim,
    /// Marked complete by the backend.
    Final,
}

/// A single transcript emission from the backend.
///
/// Not owned by any entity beyond the emission instant: interim events are
/// overwritten by the next one, final events are handed to the finalization
/// queue.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEvent {
    pub kind: TranscriptKind,
    pub text: String,
    /// Backend-side endpointing decided this closes a speech segment.
    pub is_speech_end: bool,
}

impl TranscriptEvent {
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            kind: TranscriptKind::Interim,
            text: text.into(),
            is_speech_end: false,
        }
    }

    pub fn final_text(text: impl Into<String>, is_speech_end: bool) -> Self {
        Self {
            kind: TranscriptKind::Final,
            text: text.into(),
            is_speech_end,
        }
    }
}

/// Events surfaced by a live transcription session.
#[derive(Debug, Clone)]
pub enum TranscriberEvent {
    /// Interim or final transcript text.
    Transcript(TranscriptEvent),
    /// The backend detected the end of an utterance without further text.
    UtteranceEnd,
    /// The session closed (server side or network).
    Closed(String),
    /// The session failed while streaming.
    Error(TranscriberError),
}

/// Error types for transcription sessions.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TranscriberError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("provider error: {0}")]
    ProviderError(String),
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}

/// Type alias for the transcriber event callback.
pub type TranscriberEventCallback =
    Arc<dyn Fn(TranscriberEvent) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Recognition parameters for a streaming session.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TranscriberConfig {
    /// Source-language hint (short code, e.g. "ja").
    pub language: String,
    /// Backend model identifier.
    pub model: String,
    /// Emit interim results.
    pub interim_results: bool,
    /// Enable punctuation.
    pub punctuate: bool,
    /// Enable smart formatting.
    pub smart_format: bool,
    /// Encoding of the forwarded audio frames.
    pub encoding: String,
    /// Endpointing threshold in milliseconds.
    pub endpointing_ms: u32,
    /// Max utterance silence threshold in milliseconds.
    pub utterance_end_ms: u32,
    /// Ask the backend not to batch finals for accuracy at the cost of delay.
    pub no_delay: bool,
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        Self {
            language: "ja".to_string(),
            model: "nova-2".to_string(),
            interim_results: true,
            punctuate: true,
            smart_format: true,
            encoding: "opus".to_string(),
            endpointing_ms: 2500,
            utterance_end_ms: 1500,
            no_delay: true,
        }
    }
}

impl TranscriberConfig {
    /// Normalize the language hint to a bare short code ("ja-JP" -> "ja").
    pub fn normalized_language(&self) -> String {
        let code = self
            .language
            .split('-')
            .next()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or("ja");
        code.to_ascii_lowercase()
    }
}

/// Base trait for streaming transcription backends.
///
/// Implementations hold the network session only; they carry no
/// conversational semantics and do not reconnect on their own. Connection
/// loss is reported through the event callback and handled by the owner.
#[async_trait::async_trait]
pub trait LiveTranscriber: Send + Sync {
    /// Open a streaming session authorized by a short-lived credential.
    ///
    /// The credential must be freshly minted for this session; callers never
    /// cache one across sessions.
    async fn connect(&mut self, credential: Credential) -> Result<(), TranscriberError>;

    /// Tear down the streaming session. Safe to call when not connected.
    async fn disconnect(&mut self) -> Result<(), TranscriberError>;

    /// Whether the session is established and accepting audio.
    fn is_ready(&self) -> bool;

    /// Forward one encoded audio frame to the backend.
    async fn send_audio(&mut self, frame: Bytes) -> Result<(), TranscriberError>;

    /// Register the callback receiving transcripts, close and error events.
    ///
    /// Must be registered before `connect` so no event is lost.
    async fn on_event(&mut self, callback: TranscriberEventCallback)
    -> Result<(), TranscriberError>;

    /// Provider-specific identification.
    fn provider_info(&self) -> &'static str;
}
