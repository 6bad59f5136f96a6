//! SpeechLink implementation.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock as SyncRwLock;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::capture::MicrophoneCapture;
use crate::core::transcribe::{
    CredentialProvider, LiveTranscriber, TranscriberEvent, TranscriberEventCallback,
    TranscriptKind,
};

use super::config::SpeechLinkConfig;
use super::errors::{SpeechLinkError, SpeechLinkResult};

/// Connection phase of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Events emitted by the link toward its owner.
#[derive(Debug)]
pub enum LinkEvent {
    /// Session established, capture running.
    Connected,
    /// Latest interim transcript (overwrite semantics).
    Interim(String),
    /// A final transcript from the backend.
    Final { text: String, is_speech_end: bool },
    /// The backend detected an utterance boundary without further text.
    UtteranceBoundary,
    /// The session dropped; a reconnect may follow if still listening.
    Closed(String),
    /// The link gave up (reconnect cap exceeded).
    Failed(SpeechLinkError),
}

/// Owner of the live transcription session and the microphone pipeline.
///
/// All session and device handles are exclusively owned here; no other
/// component touches them directly.
pub struct SpeechLink {
    shared: Arc<LinkShared>,
}

struct LinkShared {
    transcriber: RwLock<Box<dyn LiveTranscriber>>,
    capture: Arc<dyn MicrophoneCapture>,
    credentials: Arc<dyn CredentialProvider>,
    config: SpeechLinkConfig,
    events: mpsc::UnboundedSender<LinkEvent>,

    /// The caller still wants to listen; flipped off only by `stop()`.
    should_listen: AtomicBool,
    /// Suppress outgoing frames without tearing down the session.
    muted: AtomicBool,
    /// Re-entrancy guard for `connect`.
    connecting: AtomicBool,
    state: SyncRwLock<ConnectionState>,
    interim: SyncRwLock<String>,
    reconnect_attempts: AtomicU32,

    pump_handle: SyncRwLock<Option<JoinHandle<()>>>,
    reconnect_handle: SyncRwLock<Option<JoinHandle<()>>>,
}

impl SpeechLink {
    /// Create a link over the given capability implementations.
    ///
    /// `events` receives every [`LinkEvent`]; the receiver side belongs to
    /// the orchestrator's input loop.
    pub fn new(
        transcriber: Box<dyn LiveTranscriber>,
        capture: Arc<dyn MicrophoneCapture>,
        credentials: Arc<dyn CredentialProvider>,
        config: SpeechLinkConfig,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Self {
        Self {
            shared: Arc::new(LinkShared {
                transcriber: RwLock::new(transcriber),
                capture,
                credentials,
                config,
                events,
                should_listen: AtomicBool::new(false),
                muted: AtomicBool::new(false),
                connecting: AtomicBool::new(false),
                state: SyncRwLock::new(ConnectionState::Disconnected),
                interim: SyncRwLock::new(String::new()),
                reconnect_attempts: AtomicU32::new(0),
                pump_handle: SyncRwLock::new(None),
                reconnect_handle: SyncRwLock::new(None),
            }),
        }
    }

    /// Begin (or resume) listening.
    ///
    /// Mints a fresh credential, opens the streaming session and acquires
    /// the microphone. A failure leaves the link disconnected; callers must
    /// treat it as a turn-level error.
    pub async fn start(&self) -> SpeechLinkResult<()> {
        self.shared.should_listen.store(true, Ordering::Release);
        self.shared.reconnect_attempts.store(0, Ordering::Release);
        LinkShared::connect(self.shared.clone()).await
    }

    /// Tear down capture and the streaming session.
    ///
    /// Flips the should-listen flag so any pending reconnect becomes a
    /// no-op. Safe to call multiple times.
    pub async fn stop(&self) {
        LinkShared::stop(self.shared.clone()).await;
    }

    /// Suppress or resume outgoing audio frames. The session stays up.
    pub fn mute(&self, muted: bool) {
        self.shared.muted.store(muted, Ordering::Release);
    }

    pub fn is_muted(&self) -> bool {
        self.shared.muted.load(Ordering::Acquire)
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.shared.state.read()
    }

    /// Whether the session is up and capture is running.
    pub fn is_capturing(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// Latest interim transcript; empty when nothing is pending.
    pub fn interim_text(&self) -> String {
        self.shared.interim.read().clone()
    }
}

impl LinkShared {
    fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    async fn connect(shared: Arc<Self>) -> SpeechLinkResult<()> {
        if shared.connecting.swap(true, Ordering::AcqRel) {
            debug!("connect already in progress");
            return Ok(());
        }
        if !shared.should_listen.load(Ordering::Acquire) {
            shared.connecting.store(false, Ordering::Release);
            return Ok(());
        }

        shared.set_state(ConnectionState::Connecting);
        let result = Self::establish(&shared).await;
        shared.connecting.store(false, Ordering::Release);

        match result {
            Ok(()) => {
                shared.reconnect_attempts.store(0, Ordering::Release);
                shared.set_state(ConnectionState::Connected);
                let _ = shared.events.send(LinkEvent::Connected);
                info!("speech link connected");
                Ok(())
            }
            Err(e) => {
                Self::reset_media(&shared).await;
                shared.set_state(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    async fn establish(shared: &Arc<Self>) -> SpeechLinkResult<()> {
        // Fresh, short-lived credential on every session; never cached.
        let credential = shared.credentials.fetch().await?;

        let weak = Arc::downgrade(shared);
        let callback: TranscriberEventCallback = Arc::new(move |event| {
            let weak: Weak<LinkShared> = weak.clone();
            Box::pin(async move {
                if let Some(shared) = weak.upgrade() {
                    LinkShared::handle_transcriber_event(shared, event).await;
                }
            })
        });

        {
            let mut transcriber = shared.transcriber.write().await;
            transcriber.on_event(callback).await?;
            transcriber.connect(credential).await?;
        }

        let frames = match shared.capture.start().await {
            Ok(frames) => frames,
            Err(e) => {
                let mut transcriber = shared.transcriber.write().await;
                if let Err(teardown) = transcriber.disconnect().await {
                    warn!("session teardown after capture failure: {teardown}");
                }
                return Err(e.into());
            }
        };

        let pump_shared = shared.clone();
        let pump = tokio::spawn(async move {
            let mut frames = frames;
            while let Some(frame) = frames.recv().await {
                if pump_shared.muted.load(Ordering::Acquire) {
                    continue;
                }
                let mut transcriber = pump_shared.transcriber.write().await;
                if let Err(e) = transcriber.send_audio(frame).await {
                    warn!("failed to forward audio frame: {e}");
                }
            }
            debug!("frame pump ended");
        });
        if let Some(old) = shared.pump_handle.write().replace(pump) {
            old.abort();
        }

        Ok(())
    }

    async fn handle_transcriber_event(shared: Arc<Self>, event: TranscriberEvent) {
        match event {
            TranscriberEvent::Transcript(transcript) => match transcript.kind {
                TranscriptKind::Interim => {
                    *shared.interim.write() = transcript.text.clone();
                    let _ = shared.events.send(LinkEvent::Interim(transcript.text));
                }
                TranscriptKind::Final => {
                    shared.interim.write().clear();
                    let _ = shared.events.send(LinkEvent::Final {
                        text: transcript.text,
                        is_speech_end: transcript.is_speech_end,
                    });
                }
            },
            TranscriberEvent::UtteranceEnd => {
                let _ = shared.events.send(LinkEvent::UtteranceBoundary);
            }
            TranscriberEvent::Closed(reason) => {
                Self::handle_connection_lost(shared, reason).await;
            }
            TranscriberEvent::Error(e) => {
                Self::handle_connection_lost(shared, format!("session error: {e}")).await;
            }
        }
    }

    /// The session dropped out from under us.
    async fn handle_connection_lost(shared: Arc<Self>, reason: String) {
        warn!("live session lost: {reason}");
        Self::reset_media(&shared).await;
        shared.interim.write().clear();
        shared.set_state(ConnectionState::Disconnected);
        let _ = shared.events.send(LinkEvent::Closed(reason));

        if shared.should_listen.load(Ordering::Acquire) {
            Self::schedule_reconnect(shared);
        }
    }

    fn schedule_reconnect(shared: Arc<Self>) {
        let attempt = shared.reconnect_attempts.fetch_add(1, Ordering::AcqRel) + 1;

        if let Some(max) = shared.config.max_reconnect_attempts
            && attempt > max
        {
            warn!("reconnect cap reached after {max} attempts; giving up");
            shared.should_listen.store(false, Ordering::Release);
            let _ = shared.events.send(LinkEvent::Failed(
                SpeechLinkError::ReconnectsExhausted { attempts: max },
            ));
            return;
        }

        shared.set_state(ConnectionState::Reconnecting);
        let backoff = Duration::from_millis(shared.config.reconnect_backoff_ms);
        let task_shared = shared.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(backoff).await;

            // An explicit stop() must win over a pending reconnect.
            if !task_shared.should_listen.load(Ordering::Acquire) {
                debug!("reconnect skipped: listening stopped");
                return;
            }

            debug!("reconnect attempt {attempt}");
            if let Err(e) = LinkShared::connect(task_shared.clone()).await {
                warn!("reconnect attempt {attempt} failed: {e}");
                Self::schedule_reconnect(task_shared);
            }
        });

        if let Some(old) = shared.reconnect_handle.write().replace(handle) {
            old.abort();
        }
    }

    async fn stop(shared: Arc<Self>) {
        shared.should_listen.store(false, Ordering::Release);

        if let Some(handle) = shared.reconnect_handle.write().take() {
            handle.abort();
        }

        Self::reset_media(&shared).await;

        {
            let mut transcriber = shared.transcriber.write().await;
            if let Err(e) = transcriber.disconnect().await {
                warn!("session teardown failed: {e}");
            }
        }

        shared.interim.write().clear();
        shared.set_state(ConnectionState::Disconnected);
        debug!("speech link stopped");
    }

    /// Stop the frame pump and release the microphone.
    async fn reset_media(shared: &Arc<Self>) {
        if let Some(handle) = shared.pump_handle.write().take() {
            handle.abort();
        }
        shared.capture.stop().await;
    }
}

impl Drop for SpeechLink {
    fn drop(&mut self) {
        if let Some(handle) = self.shared.pump_handle.write().take() {
            handle.abort();
        }
        if let Some(handle) = self.shared.reconnect_handle.write().take() {
            handle.abort();
        }
    }
}
