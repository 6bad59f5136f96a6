//! Live transcription connection lifecycle.
//!
//! [`SpeechLink`] owns the streaming session and the microphone pipeline:
//! it mints a fresh credential per session, forwards encoded frames while
//! unmuted, surfaces interim/final text, and reconnects with a fixed backoff
//! for as long as the caller still wants to listen. It holds no
//! conversational semantics; it does not know about turns.

mod config;
mod errors;
mod link;

#[cfg(test)]
mod tests;

pub use config::SpeechLinkConfig;
pub use errors::{SpeechLinkError, SpeechLinkResult};
pub use link::{ConnectionState, LinkEvent, SpeechLink};
