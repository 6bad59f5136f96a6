//! Streaming transcription capability.
//!
//! [`LiveTranscriber`] is the seam between the connection lifecycle
//! ([`crate::core::speech_link`]) and a concrete speech-to-text backend.
//! The bundled [`DeepgramTranscriber`] talks to Deepgram's live WebSocket
//! API; tests use stub implementations of the same trait.

pub mod base;
pub mod credentials;
pub mod deepgram;

pub use base::{
    LiveTranscriber, TranscriberConfig, TranscriberError, TranscriberEvent,
    TranscriberEventCallback, TranscriptEvent, TranscriptKind,
};
pub use credentials::{Credential, CredentialError, CredentialProvider, HttpCredentialProvider};
pub use deepgram::DeepgramTranscriber;
