//! Conversational turn state machine.
//!
//! The machine is the single source of truth for "what phase is the
//! conversation in". Everything else (recording indicators, mic re-arming,
//! timer scheduling) is derived from [`TurnState`], never tracked separately.

mod machine;

pub use machine::{RecordingIndicator, TurnEvent, TurnState, next_state, recording_indicator};
