//! Configuration for the speech link.

use crate::core::transcribe::TranscriberConfig;

/// Configuration for [`super::SpeechLink`].
#[derive(Debug, Clone)]
pub struct SpeechLinkConfig {
    /// Recognition parameters for the streaming session.
    pub transcriber: TranscriberConfig,
    /// Fixed backoff before a reconnect attempt, in milliseconds.
    pub reconnect_backoff_ms: u64,
    /// Cap on consecutive reconnect attempts.
    ///
    /// `None` retries for as long as the caller wants to listen. When the
    /// cap is exceeded the link gives up and emits
    /// [`super::LinkEvent::Failed`].
    pub max_reconnect_attempts: Option<u32>,
}

impl Default for SpeechLinkConfig {
    fn default() -> Self {
        Self {
            transcriber: TranscriberConfig::default(),
            reconnect_backoff_ms: 500,
            max_reconnect_attempts: None,
        }
    }
}

impl SpeechLinkConfig {
    /// Configuration for a given source language, defaults otherwise.
    pub fn for_language(language: impl Into<String>) -> Self {
        Self {
            transcriber: TranscriberConfig {
                language: language.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
