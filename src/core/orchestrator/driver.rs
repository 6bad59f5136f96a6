//! The turn orchestrator event loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock as SyncRwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::finalize::{Admission, FinalizationSerializer};
use crate::core::speech_link::{LinkEvent, SpeechLink};
use crate::core::turn::{
    RecordingIndicator, TurnEvent, TurnState, next_state, recording_indicator,
};

use super::collaborators::{Collaborators, NewMessage, ReplySuggestion, StoredMessage};
use super::config::{
    EXPECTED_REPLY_COUNT, OrchestratorConfig, TRANSLATION_UNAVAILABLE, resolve_speech_lang,
};
use super::errors::FinalizationError;
use uuid::Uuid;

/// Events published toward the UI layer.
#[derive(Debug)]
pub enum UiEvent {
    StateChanged(TurnState),
    Recording(RecordingIndicator),
    /// Latest interim transcript (overwrite semantics).
    Interim(String),
    /// A message was persisted (the user's phrase or the partner's utterance).
    MessageAdded(StoredMessage),
    /// Translation for a previously added partner message.
    Translation { message_id: Uuid, text: String },
    /// The reply suggestions for the latest partner utterance.
    Replies(Vec<ReplySuggestion>),
    /// The turn failed; an explicit reset is required.
    TurnFailed(String),
}

/// Everything the event loop reduces, in arrival order.
enum LoopInput {
    Link(LinkEvent),
    Command(Command),
    /// A silence timer fired. Stamped with the turn it was armed for so a
    /// timer that outlives its turn is provably stale.
    SilenceTimeout { turn: u64 },
    /// A spawned finalization chain finished.
    FinalizationDone {
        turn: u64,
        result: Result<(), FinalizationError>,
    },
}

enum Command {
    BeginListening,
    SpeakUtterance(String),
    StopListening,
    Resume,
    Reset,
    Shutdown,
}

/// Read-only view of loop state for handle accessors.
struct Snapshot {
    state: SyncRwLock<TurnState>,
    turn: AtomicU64,
}

/// Drives one conversation: turn phases, the speech link, silence timers and
/// utterance finalization.
///
/// All state lives in a single event-loop task; the handle only posts inputs.
/// Dropping the handle shuts the loop down.
pub struct TurnOrchestrator {
    inputs: mpsc::UnboundedSender<LoopInput>,
    snapshot: Arc<Snapshot>,
    loop_handle: Option<JoinHandle<()>>,
    forward_handle: JoinHandle<()>,
}

impl TurnOrchestrator {
    /// Spawn the event loop over a speech link and its event stream.
    ///
    /// Returns the handle and the UI event stream.
    pub fn new(
        link: SpeechLink,
        link_events: mpsc::UnboundedReceiver<LinkEvent>,
        collaborators: Collaborators,
        config: OrchestratorConfig,
    ) -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
        let (ui_tx, ui_rx) = mpsc::unbounded_channel();
        let snapshot = Arc::new(Snapshot {
            state: SyncRwLock::new(TurnState::Idle),
            turn: AtomicU64::new(0),
        });

        let forward_tx = inputs_tx.clone();
        let forward_handle = tokio::spawn(async move {
            let mut link_events = link_events;
            while let Some(event) = link_events.recv().await {
                if forward_tx.send(LoopInput::Link(event)).is_err() {
                    break;
                }
            }
        });

        let driver = Driver {
            link,
            collaborators,
            config,
            serializer: Arc::new(FinalizationSerializer::new()),
            state: TurnState::Idle,
            turn: 0,
            manual_pause: false,
            silence_timer: None,
            inputs_tx: inputs_tx.clone(),
            ui: ui_tx,
            snapshot: snapshot.clone(),
        };
        let loop_handle = tokio::spawn(driver.run(inputs_rx));

        (
            Self {
                inputs: inputs_tx,
                snapshot,
                loop_handle: Some(loop_handle),
                forward_handle,
            },
            ui_rx,
        )
    }

    /// Stop the loop and wait for its teardown (link stopped, timers gone).
    pub async fn shutdown(mut self) {
        let _ = self.inputs.send(LoopInput::Command(Command::Shutdown));
        if let Some(handle) = self.loop_handle.take() {
            let _ = handle.await;
        }
    }

    /// Arm listening for the partner without speaking first.
    pub fn begin_listening(&self) {
        self.post(Command::BeginListening);
    }

    /// Speak a phrase to the partner, then listen for their answer.
    pub fn speak_utterance(&self, text: impl Into<String>) {
        self.post(Command::SpeakUtterance(text.into()));
    }

    /// Stop listening until [`resume`](Self::resume) is called.
    pub fn stop_listening(&self) {
        self.post(Command::StopListening);
    }

    /// Resume listening after a manual stop.
    pub fn resume(&self) {
        self.post(Command::Resume);
    }

    /// Acknowledge an error (or finished processing) and return to idle.
    pub fn reset(&self) {
        self.post(Command::Reset);
    }

    pub fn turn_state(&self) -> TurnState {
        *self.snapshot.state.read()
    }

    /// Monotonic turn counter; bumps on every new listening window.
    pub fn current_turn(&self) -> u64 {
        self.snapshot.turn.load(Ordering::Acquire)
    }

    fn post(&self, command: Command) {
        if self.inputs.send(LoopInput::Command(command)).is_err() {
            warn!("orchestrator loop is gone; command dropped");
        }
    }
}

impl Drop for TurnOrchestrator {
    fn drop(&mut self) {
        // The loop tears itself down after processing the shutdown input.
        let _ = self.inputs.send(LoopInput::Command(Command::Shutdown));
        self.forward_handle.abort();
    }
}

struct Driver {
    link: SpeechLink,
    collaborators: Collaborators,
    config: OrchestratorConfig,
    serializer: Arc<FinalizationSerializer>,
    state: TurnState,
    turn: u64,
    /// The user asked to stop listening; suppresses auto re-arming.
    manual_pause: bool,
    silence_timer: Option<JoinHandle<()>>,
    inputs_tx: mpsc::UnboundedSender<LoopInput>,
    ui: mpsc::UnboundedSender<UiEvent>,
    snapshot: Arc<Snapshot>,
}

impl Driver {
    async fn run(mut self, mut inputs: mpsc::UnboundedReceiver<LoopInput>) {
        info!(conversation = %self.config.conversation_id, "orchestrator started");
        while let Some(input) = inputs.recv().await {
            match input {
                LoopInput::Command(Command::Shutdown) => break,
                other => self.handle(other).await,
            }
        }
        self.cancel_silence_timer();
        self.link.stop().await;
        info!("orchestrator stopped");
    }

    async fn handle(&mut self, input: LoopInput) {
        match input {
            LoopInput::Command(command) => self.handle_command(command).await,
            LoopInput::Link(event) => self.handle_link_event(event).await,
            LoopInput::SilenceTimeout { turn } => self.handle_silence_timeout(turn).await,
            LoopInput::FinalizationDone { turn, result } => {
                self.handle_finalization_done(turn, result).await;
            }
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::BeginListening | Command::Resume => self.begin_listening().await,
            Command::SpeakUtterance(text) => self.speak_utterance(text).await,
            Command::StopListening => self.stop_listening().await,
            Command::Reset => self.apply(TurnEvent::Reset),
            Command::Shutdown => {}
        }
    }

    async fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Connected => {
                self.publish_recording();
            }
            LinkEvent::Interim(text) => {
                // Continued speech pushes the silence window out.
                if self.state == TurnState::ListeningLocal {
                    self.arm_silence_timer();
                }
                let _ = self.ui.send(UiEvent::Interim(text));
            }
            LinkEvent::Final { text, .. } => {
                self.handle_final(text, TurnEvent::Final).await;
            }
            LinkEvent::UtteranceBoundary => {
                if self.state == TurnState::ListeningLocal {
                    let pending = self.link.interim_text();
                    self.handle_final(pending, TurnEvent::MaxUtterance).await;
                }
            }
            LinkEvent::Closed(reason) => {
                debug!(%reason, "speech session closed; link handles recovery");
                self.publish_recording();
            }
            LinkEvent::Failed(error) => {
                self.link.stop().await;
                self.fail_turn(format!("speech link gave up: {error}"));
            }
        }
    }

    /// A final (or boundary-flushed interim) arrived from the link.
    async fn handle_final(&mut self, text: String, event: TurnEvent) {
        if self.manual_pause {
            debug!("dropping final while listening is stopped");
            return;
        }
        if self.state != TurnState::ListeningLocal && self.state != TurnState::ProcessingLlm {
            debug!(state = ?self.state, "dropping out-of-phase final");
            return;
        }

        match self.serializer.offer(&text, self.turn) {
            Admission::Silence => {
                if self.state == TurnState::ListeningLocal {
                    self.end_turn_without_speech(event).await;
                }
            }
            Admission::Duplicate | Admission::Coalesced => {}
            Admission::Accepted(text) => {
                self.cancel_silence_timer();
                self.link.stop().await;
                self.apply(event);
                self.spawn_finalization(text, self.turn);
            }
        }
    }

    async fn handle_silence_timeout(&mut self, turn: u64) {
        if turn != self.turn {
            debug!(fired_for = turn, current = self.turn, "ignoring stale silence timer");
            return;
        }
        if self.state != TurnState::ListeningLocal {
            return;
        }
        debug!(turn, "silence window elapsed");
        self.end_turn_without_speech(TurnEvent::SilenceTimeout).await;
    }

    async fn handle_finalization_done(
        &mut self,
        turn: u64,
        result: Result<(), FinalizationError>,
    ) {
        match result {
            Ok(()) => {
                debug!(turn, "finalization chain finished");
                if let Some((text, next_turn)) = self.serializer.complete() {
                    self.spawn_finalization(text, next_turn);
                    return;
                }
                self.apply(TurnEvent::Reset);
                if !self.manual_pause && self.state == TurnState::Idle {
                    self.begin_listening().await;
                }
            }
            Err(error) => {
                // A failed chain must not wedge the queue, but nothing parked
                // behind it gets processed in the error state either.
                self.serializer.clear_pending();
                let _ = self.serializer.complete();
                self.fail_turn(format!("finalization of turn {turn} failed: {error}"));
            }
        }
    }

    /// Open a fresh listening window: new turn, mic live, silence timer armed.
    async fn begin_listening(&mut self) {
        self.manual_pause = false;
        if self.state == TurnState::ListeningLocal && self.link.is_capturing() {
            debug!("already listening");
            return;
        }
        self.apply(TurnEvent::TtsStart);
        self.apply(TurnEvent::TtsEnd);
        if self.state != TurnState::ListeningLocal {
            // The machine refused the window (it is in Error until an
            // explicit reset); the mic must not come up without it.
            debug!(state = ?self.state, "listening window refused");
            return;
        }

        self.link.mute(false);
        if let Err(error) = self.link.start().await {
            self.link.stop().await;
            self.fail_turn(format!("could not start listening: {error}"));
            return;
        }

        self.advance_turn();
        self.serializer.rearm();
        self.arm_silence_timer();
    }

    /// Speak the user's phrase, then hand the floor to the partner.
    async fn speak_utterance(&mut self, text: String) {
        if self.state == TurnState::Error {
            debug!("ignoring speak request until the error is reset");
            return;
        }
        self.manual_pause = false;
        self.cancel_silence_timer();
        self.apply(TurnEvent::TtsStart);

        // Mute before anything else so playback is never transcribed as
        // partner speech. An already-live session stays up, just muted.
        self.link.mute(true);
        if !self.link.is_capturing() {
            if let Err(error) = self.link.start().await {
                self.link.mute(false);
                self.link.stop().await;
                self.fail_turn(format!("could not start listening: {error}"));
                return;
            }
            self.advance_turn();
            self.serializer.rearm();
        }

        let language_tag = resolve_speech_lang(&self.config.target_language);
        if let Err(error) = self
            .collaborators
            .synthesizer
            .speak(&text, &language_tag)
            .await
        {
            // Playback problems degrade to "finished speaking".
            warn!("speech playback failed: {error}");
        }

        self.link.mute(false);
        self.apply(TurnEvent::TtsEnd);
        self.arm_silence_timer();

        let message = NewMessage {
            conversation_id: self.config.conversation_id.clone(),
            text,
            is_user: true,
            language: self.config.target_language.clone(),
            translation: None,
        };
        match self.collaborators.store.append_message(message).await {
            Ok(stored) => {
                let _ = self.ui.send(UiEvent::MessageAdded(stored));
            }
            Err(error) => {
                self.cancel_silence_timer();
                self.link.stop().await;
                self.fail_turn(format!("could not save spoken phrase: {error}"));
            }
        }
    }

    async fn stop_listening(&mut self) {
        self.manual_pause = true;
        self.cancel_silence_timer();
        self.serializer.clear_pending();
        self.link.stop().await;
        // Close out whatever phase the turn was in.
        self.apply(TurnEvent::SilenceTimeout);
        self.apply(TurnEvent::Reset);
    }

    /// The listening window ended without usable speech. Ends the turn like
    /// a timeout and, unless manually paused, opens the next window.
    async fn end_turn_without_speech(&mut self, event: TurnEvent) {
        self.cancel_silence_timer();
        self.link.stop().await;
        self.apply(event);
        self.apply(TurnEvent::Reset);
        if !self.manual_pause {
            self.begin_listening().await;
        }
    }

    fn spawn_finalization(&self, text: String, turn: u64) {
        let collaborators = self.collaborators.clone();
        let config = self.config.clone();
        let ui = self.ui.clone();
        let inputs = self.inputs_tx.clone();

        tokio::spawn(async move {
            let result = finalize_utterance(&collaborators, &config, &ui, text).await;
            let _ = inputs.send(LoopInput::FinalizationDone { turn, result });
        });
    }

    fn fail_turn(&mut self, reason: String) {
        warn!("{reason}");
        self.cancel_silence_timer();
        self.apply(TurnEvent::Error);
        let _ = self.ui.send(UiEvent::TurnFailed(reason));
    }

    fn apply(&mut self, event: TurnEvent) {
        let next = next_state(self.state, event);
        if next == self.state {
            return;
        }
        debug!(from = ?self.state, event = ?event, to = ?next, "turn transition");
        self.state = next;
        *self.snapshot.state.write() = next;
        let _ = self.ui.send(UiEvent::StateChanged(next));
        self.publish_recording();
    }

    fn publish_recording(&self) {
        let indicator = recording_indicator(self.link.is_capturing(), self.state);
        let _ = self.ui.send(UiEvent::Recording(indicator));
    }

    fn advance_turn(&mut self) {
        self.turn += 1;
        self.snapshot.turn.store(self.turn, Ordering::Release);
    }

    fn arm_silence_timer(&mut self) {
        self.cancel_silence_timer();
        let turn = self.turn;
        let window = Duration::from_millis(self.config.silence_timeout_ms);
        let inputs = self.inputs_tx.clone();
        self.silence_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let _ = inputs.send(LoopInput::SilenceTimeout { turn });
        }));
    }

    fn cancel_silence_timer(&mut self) {
        if let Some(handle) = self.silence_timer.take() {
            handle.abort();
        }
    }
}

/// Persist, translate and answer one partner utterance.
///
/// Runs outside the event loop so further finals can coalesce while it is
/// in flight. Translation degrades to a placeholder; persistence and reply
/// generation failures fail the turn.
async fn finalize_utterance(
    collaborators: &Collaborators,
    config: &OrchestratorConfig,
    ui: &mpsc::UnboundedSender<UiEvent>,
    text: String,
) -> Result<(), FinalizationError> {
    let stored = collaborators
        .store
        .append_message(NewMessage {
            conversation_id: config.conversation_id.clone(),
            text: text.clone(),
            is_user: false,
            language: config.target_language.clone(),
            translation: None,
        })
        .await
        .map_err(|e| FinalizationError::Persistence(e.to_string()))?;
    let message_id = stored.id;
    let _ = ui.send(UiEvent::MessageAdded(stored));

    let translated = match collaborators
        .translator
        .translate(&text, &config.translation_language)
        .await
    {
        Ok(translated) => translated,
        Err(error) => {
            warn!("translation failed: {error}");
            TRANSLATION_UNAVAILABLE.to_string()
        }
    };
    let _ = ui.send(UiEvent::Translation {
        message_id,
        text: translated,
    });

    let replies = collaborators
        .suggester
        .generate_replies(&config.conversation_id)
        .await
        .map_err(|e| FinalizationError::ReplyGeneration(e.to_string()))?;
    if replies.len() != EXPECTED_REPLY_COUNT {
        return Err(FinalizationError::ReplyCount {
            expected: EXPECTED_REPLY_COUNT,
            actual: replies.len(),
        });
    }
    let _ = ui.send(UiEvent::Replies(replies));

    Ok(())
}
