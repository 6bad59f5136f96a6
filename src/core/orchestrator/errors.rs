//! Error types for turn finalization.

/// Failure of one utterance finalization chain.
///
/// Any of these puts the turn machine into its error state; translation
/// failures are deliberately absent because translation degrades to a
/// placeholder instead of failing the turn.
#[derive(Debug, thiserror::Error)]
pub enum FinalizationError {
    #[error("failed to persist message: {0}")]
    Persistence(String),
    #[error("reply generation failed: {0}")]
    ReplyGeneration(String),
    #[error("expected {expected} reply suggestions, got {actual}")]
    ReplyCount { expected: usize, actual: usize },
}
