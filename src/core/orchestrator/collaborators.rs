//! Capability traits the orchestrator drives.
//!
//! The orchestrator sequences turns; everything with an outside effect lives
//! behind one of these traits so the sequencing logic can be exercised
//! against stubs.

use uuid::Uuid;

/// A message to be appended to a conversation.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: String,
    pub text: String,
    /// `true` for the app user's own phrase, `false` for the partner's.
    pub is_user: bool,
    /// Language the text is in (short code).
    pub language: String,
    pub translation: Option<String>,
}

/// A persisted conversation message.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: Uuid,
    pub conversation_id: String,
    pub text: String,
    pub is_user: bool,
    pub language: String,
    pub translation: Option<String>,
}

/// One suggested reply the user can speak next.
#[derive(Debug, Clone)]
pub struct ReplySuggestion {
    pub id: Uuid,
    /// Short label for the reply button.
    pub label: String,
    /// The reply in the user's own language.
    pub local_answer: String,
    /// The reply in the conversation partner's language.
    pub target_answer: String,
}

#[derive(Debug, thiserror::Error)]
#[error("speech synthesis failed: {0}")]
pub struct SynthesisError(pub String);

#[derive(Debug, thiserror::Error)]
#[error("store operation failed: {0}")]
pub struct StoreError(pub String);

#[derive(Debug, thiserror::Error)]
#[error("reply suggestion failed: {0}")]
pub struct SuggestError(pub String);

#[derive(Debug, thiserror::Error)]
#[error("translation failed: {0}")]
pub struct TranslateError(pub String);

/// Plays a phrase out loud.
///
/// A new `speak` call supersedes any playback still in progress; a playback
/// failure is reported but treated by callers as finished speech, never as a
/// turn failure.
#[async_trait::async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn speak(&self, text: &str, language_tag: &str) -> Result<(), SynthesisError>;
}

/// Persists conversation messages.
#[async_trait::async_trait]
pub trait ConversationStore: Send + Sync {
    async fn append_message(&self, message: NewMessage) -> Result<StoredMessage, StoreError>;
}

/// Produces the reply suggestions for the latest state of a conversation.
#[async_trait::async_trait]
pub trait ReplySuggester: Send + Sync {
    async fn generate_replies(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<ReplySuggestion>, SuggestError>;
}

/// Translates partner utterances for display.
#[async_trait::async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, target_language: &str)
    -> Result<String, TranslateError>;
}

/// The full set of capabilities one orchestrator drives.
#[derive(Clone)]
pub struct Collaborators {
    pub synthesizer: std::sync::Arc<dyn SpeechSynthesizer>,
    pub store: std::sync::Arc<dyn ConversationStore>,
    pub suggester: std::sync::Arc<dyn ReplySuggester>,
    pub translator: std::sync::Arc<dyn Translator>,
}
