//! kaiwa: a spoken-dialogue turn orchestration library.
//!
//! Turns a noisy, asynchronous speech stream into a disciplined sequence of
//! conversational turns: live transcription with reconnect, a pure turn state
//! machine, serialized finalization of utterances, and the handoff to
//! persistence, translation, reply generation and speech playback.
//!
//! The entry point is [`core::TurnOrchestrator`], built over a
//! [`core::SpeechLink`] and a set of collaborator capabilities
//! ([`core::Collaborators`]). This crate is a library for a UI shell to
//! consume; it renders nothing and persists nothing itself.

pub mod core;

// Re-export commonly used items for convenience
pub use core::{
    Collaborators, LinkEvent, OrchestratorConfig, SpeechLink, SpeechLinkConfig, SpeechLinkError,
    TurnOrchestrator, TurnState, UiEvent,
};
