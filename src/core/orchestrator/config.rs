//! Configuration for the turn orchestrator.

/// Number of reply suggestions a finalized utterance must produce.
///
/// The downstream UI renders a fixed grid; anything other than exactly this
/// many replies is a contract violation, not a partial success.
pub const EXPECTED_REPLY_COUNT: usize = 6;

/// Placeholder shown when translation of an utterance fails.
pub const TRANSLATION_UNAVAILABLE: &str = "Translation unavailable";

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Conversation the orchestrated messages belong to.
    pub conversation_id: String,
    /// Language spoken with the conversation partner (short code).
    pub target_language: String,
    /// Language utterances are translated into for display (short code).
    pub translation_language: String,
    /// Silence window per listening turn, in milliseconds.
    pub silence_timeout_ms: u64,
}

impl OrchestratorConfig {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            target_language: "ja".to_string(),
            translation_language: "en".to_string(),
            silence_timeout_ms: 1200,
        }
    }
}

/// Map a short language code to the BCP 47 tag speech synthesis expects.
///
/// Unknown codes fall back to `{code}-{CODE}`.
pub fn resolve_speech_lang(code: &str) -> String {
    let code = code.trim().to_ascii_lowercase();
    match code.as_str() {
        "ja" => "ja-JP".to_string(),
        "en" => "en-US".to_string(),
        "ko" => "ko-KR".to_string(),
        "zh" => "zh-CN".to_string(),
        "es" => "es-ES".to_string(),
        "fr" => "fr-FR".to_string(),
        "de" => "de-DE".to_string(),
        "it" => "it-IT".to_string(),
        "pt" => "pt-BR".to_string(),
        other => format!("{other}-{}", other.to_ascii_uppercase()),
    }
}
