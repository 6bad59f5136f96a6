//! Error types for the speech link.

use crate::core::capture::CaptureError;
use crate::core::transcribe::{CredentialError, TranscriberError};

/// Connection-level failures of the speech link.
///
/// Every variant transitions the turn machine to its error state when it
/// escapes `start()`; failures of an already-established session are
/// recovered locally through the reconnect policy instead.
#[derive(Debug, thiserror::Error)]
pub enum SpeechLinkError {
    #[error("credential exchange failed: {0}")]
    Credential(#[from] CredentialError),
    #[error("session open failed: {0}")]
    Session(#[from] TranscriberError),
    #[error("microphone permission denied: {0}")]
    MicrophoneDenied(String),
    #[error("capture failed: {0}")]
    Capture(CaptureError),
    #[error("gave up reconnecting after {attempts} attempts")]
    ReconnectsExhausted { attempts: u32 },
}

impl From<CaptureError> for SpeechLinkError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::PermissionDenied(msg) => SpeechLinkError::MicrophoneDenied(msg),
            other => SpeechLinkError::Capture(other),
        }
    }
}

/// Result type for speech link operations.
pub type SpeechLinkResult<T> = Result<T, SpeechLinkError>;
