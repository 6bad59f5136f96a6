//! Serialization of final-transcript processing.
//!
//! Finals can arrive faster than they are processed: persistence, translation
//! and reply generation for one utterance take longer than the recognizer
//! needs to emit the next final. [`FinalizationSerializer`] admits at most one
//! finalization at a time and keeps a single pending slot that later arrivals
//! overwrite, so a burst of n finals results in the first being processed,
//! the intermediate ones dropped, and the latest processed after the first
//! completes. It also drops exact re-deliveries of the last processed text
//! within the same turn.

use parking_lot::Mutex;
use tracing::debug;

/// Decision taken for one offered final transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Empty or whitespace-only; treat as silence, not speech.
    Silence,
    /// Identical to the last processed final of the same turn; dropped.
    Duplicate,
    /// A finalization is in flight; parked in the pending slot
    /// (overwriting whatever was parked before).
    Coalesced,
    /// Admitted for processing now. Carries the trimmed text.
    Accepted(String),
}

#[derive(Default)]
struct SerializerState {
    in_flight: bool,
    /// Latest final that arrived while one was in flight, with its turn.
    pending: Option<(String, u64)>,
    /// Last text admitted for processing and the turn it belonged to.
    last_processed: Option<(String, u64)>,
}

/// Admission gate for final-transcript processing.
///
/// Purely a bookkeeping structure; it runs nothing itself. The owner offers
/// incoming finals, spawns work for `Accepted` ones, and calls [`complete`]
/// when that work finishes to drain the pending slot.
///
/// [`complete`]: FinalizationSerializer::complete
#[derive(Default)]
pub struct FinalizationSerializer {
    inner: Mutex<SerializerState>,
}

impl FinalizationSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a final transcript for processing.
    pub fn offer(&self, text: &str, turn: u64) -> Admission {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Admission::Silence;
        }

        let mut state = self.inner.lock();

        if state
            .last_processed
            .as_ref()
            .is_some_and(|(last, last_turn)| last == trimmed && *last_turn == turn)
        {
            debug!(turn, "dropping re-delivered final");
            return Admission::Duplicate;
        }

        if state.in_flight {
            debug!(turn, "parking final behind in-flight finalization");
            state.pending = Some((trimmed.to_string(), turn));
            return Admission::Coalesced;
        }

        state.in_flight = true;
        state.last_processed = Some((trimmed.to_string(), turn));
        Admission::Accepted(trimmed.to_string())
    }

    /// Mark the in-flight finalization finished and drain the pending slot.
    ///
    /// Returns the next admitted final, if one was parked and survives the
    /// duplicate check; the caller must process it and call `complete` again.
    /// Called on success and failure alike, so a failed finalization never
    /// wedges the queue.
    pub fn complete(&self) -> Option<(String, u64)> {
        let mut state = self.inner.lock();
        state.in_flight = false;

        let (text, turn) = state.pending.take()?;
        if state
            .last_processed
            .as_ref()
            .is_some_and(|(last, last_turn)| *last == text && *last_turn == turn)
        {
            return None;
        }

        state.in_flight = true;
        state.last_processed = Some((text.clone(), turn));
        Some((text, turn))
    }

    /// Whether a finalization is currently in flight.
    pub fn is_busy(&self) -> bool {
        self.inner.lock().in_flight
    }

    /// Drop any parked final. Processing already in flight is unaffected.
    pub fn clear_pending(&self) {
        self.inner.lock().pending = None;
    }

    /// Start a fresh listening episode: forget the parked final and the
    /// duplicate-detection history. A chain already in flight keeps running.
    pub fn rearm(&self) {
        let mut state = self.inner.lock();
        state.pending = None;
        state.last_processed = None;
    }
}
