//! Conversational policy layer.
//!
//! [`TurnOrchestrator`] owns the turn machine, the speech link, the silence
//! timers and the finalization gate, and sequences the backend calls one
//! partner utterance triggers. All mutation happens inside a single event
//! loop; the public handle only posts commands and reads snapshots.

mod collaborators;
mod config;
mod driver;
mod errors;

#[cfg(test)]
mod tests;

pub use collaborators::{
    Collaborators, ConversationStore, NewMessage, ReplySuggester, ReplySuggestion, SpeechSynthesizer,
    StoreError, StoredMessage, SuggestError, SynthesisError, TranslateError, Translator,
};
pub use config::{
    EXPECTED_REPLY_COUNT, OrchestratorConfig, TRANSLATION_UNAVAILABLE, resolve_speech_lang,
};
pub use driver::{TurnOrchestrator, UiEvent};
pub use errors::FinalizationError;
