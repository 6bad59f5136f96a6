//! Pure transition table for the conversational turn machine.

/// Phase of one conversational exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnState {
    /// Nothing in progress; waiting for the user or the UI to act.
    Idle,
    /// The system is speaking the user's phrase out loud.
    SpeakingUser,
    /// The microphone is live and we are waiting for the local speaker.
    ListeningLocal,
    /// A finalized utterance is being persisted/translated/answered.
    ProcessingLlm,
    /// A conversational step failed; an explicit reset is required.
    Error,
}

/// Event consumed exactly once by the turn machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnEvent {
    /// Speech playback is starting.
    TtsStart,
    /// Speech playback finished; listening may begin.
    TtsEnd,
    /// A final transcript was accepted for processing.
    Final,
    /// The silence timer elapsed without a final transcript.
    SilenceTimeout,
    /// The transcription backend signalled an utterance boundary.
    MaxUtterance,
    /// Return to idle after processing or after an error.
    Reset,
    /// A conversational step failed.
    Error,
}

/// Deterministic transition function.
///
/// Any (state, event) pair not listed in the table leaves the state
/// unchanged. Callers may emit events eagerly and rely on out-of-phase
/// events being absorbed here rather than guarded at every call site.
pub fn next_state(state: TurnState, event: TurnEvent) -> TurnState {
    use TurnEvent::*;
    use TurnState::*;

    match (state, event) {
        (Idle, TtsStart) => SpeakingUser,
        (Idle, TurnEvent::Error) => TurnState::Error,

        (SpeakingUser, TtsEnd) => ListeningLocal,
        (SpeakingUser, TurnEvent::Error) => TurnState::Error,

        (ListeningLocal, Final | SilenceTimeout | MaxUtterance) => ProcessingLlm,
        (ListeningLocal, TurnEvent::Error) => TurnState::Error,

        (ProcessingLlm, TtsStart) => SpeakingUser,
        (ProcessingLlm, Reset) => Idle,
        (ProcessingLlm, TurnEvent::Error) => TurnState::Error,

        (TurnState::Error, Reset) => Idle,

        (unchanged, _) => unchanged,
    }
}

/// Display-facing recording state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingIndicator {
    Idle,
    Recording,
    Processing,
}

/// Pure projection of the recording indicator from owned state.
///
/// `listening` is the connection-level fact (the link is capturing);
/// the turn state decides what that means for the display. This is a
/// projection, not a second source of truth.
pub fn recording_indicator(listening: bool, state: TurnState) -> RecordingIndicator {
    match state {
        TurnState::SpeakingUser => RecordingIndicator::Processing,
        TurnState::ListeningLocal if listening => RecordingIndicator::Recording,
        _ => RecordingIndicator::Idle,
    }
}
