//! SpeechLink lifecycle tests with stub capability implementations.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::RwLock as SyncRwLock;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use crate::core::capture::{CaptureError, MicrophoneCapture};
use crate::core::transcribe::{
    Credential, CredentialError, CredentialProvider, LiveTranscriber, TranscriberConfig,
    TranscriberError, TranscriberEvent, TranscriberEventCallback, TranscriptEvent,
};

use super::{ConnectionState, LinkEvent, SpeechLink, SpeechLinkConfig, SpeechLinkError};

/// Shared handle tests use to drive a stub transcriber session.
#[derive(Default)]
struct SessionProbe {
    connect_count: AtomicUsize,
    disconnect_count: AtomicUsize,
    frames_forwarded: AtomicUsize,
    fail_connect: AtomicBool,
    callback: SyncRwLock<Option<TranscriberEventCallback>>,
}

impl SessionProbe {
    async fn fire(&self, event: TranscriberEvent) {
        let callback = self
            .callback
            .read()
            .clone()
            .expect("no callback registered");
        callback(event).await;
    }
}

struct StubTranscriber {
    probe: Arc<SessionProbe>,
    ready: AtomicBool,
}

impl StubTranscriber {
    fn new(probe: Arc<SessionProbe>) -> Box<dyn LiveTranscriber> {
        Box::new(Self {
            probe,
            ready: AtomicBool::new(false),
        })
    }
}

#[async_trait::async_trait]
impl LiveTranscriber for StubTranscriber {
    async fn connect(&mut self, _credential: Credential) -> Result<(), TranscriberError> {
        self.probe.connect_count.fetch_add(1, Ordering::SeqCst);
        if self.probe.fail_connect.load(Ordering::SeqCst) {
            return Err(TranscriberError::ConnectionFailed("stub refusal".into()));
        }
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TranscriberError> {
        self.probe.disconnect_count.fetch_add(1, Ordering::SeqCst);
        self.ready.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn send_audio(&mut self, _frame: Bytes) -> Result<(), TranscriberError> {
        self.probe.frames_forwarded.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn on_event(
        &mut self,
        callback: TranscriberEventCallback,
    ) -> Result<(), TranscriberError> {
        *self.probe.callback.write() = Some(callback);
        Ok(())
    }

    fn provider_info(&self) -> &'static str {
        "StubTranscriber (test-only)"
    }
}

#[derive(Default)]
struct StubCapture {
    deny: AtomicBool,
    start_count: AtomicUsize,
    stop_count: AtomicUsize,
    frame_tx: SyncRwLock<Option<mpsc::Sender<Bytes>>>,
}

impl StubCapture {
    async fn push_frame(&self) {
        let tx = self.frame_tx.read().clone().expect("capture not running");
        tx.send(Bytes::from_static(&[0u8; 64])).await.unwrap();
    }

    fn is_running(&self) -> bool {
        self.frame_tx.read().is_some()
    }
}

#[async_trait::async_trait]
impl MicrophoneCapture for StubCapture {
    async fn start(&self) -> Result<mpsc::Receiver<Bytes>, CaptureError> {
        self.start_count.fetch_add(1, Ordering::SeqCst);
        if self.deny.load(Ordering::SeqCst) {
            return Err(CaptureError::PermissionDenied("stub denial".into()));
        }
        let (tx, rx) = mpsc::channel(16);
        *self.frame_tx.write() = Some(tx);
        Ok(rx)
    }

    async fn stop(&self) {
        self.stop_count.fetch_add(1, Ordering::SeqCst);
        self.frame_tx.write().take();
    }
}

#[derive(Default)]
struct StubCredentials {
    fetch_count: AtomicUsize,
    fail: AtomicBool,
}

#[async_trait::async_trait]
impl CredentialProvider for StubCredentials {
    async fn fetch(&self) -> Result<Credential, CredentialError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(CredentialError::Fetch("stub outage".into()));
        }
        Ok(Credential {
            token: format!("tok-{}", self.fetch_count.load(Ordering::SeqCst)),
            expires_in: 30,
        })
    }
}

struct Harness {
    link: SpeechLink,
    probe: Arc<SessionProbe>,
    capture: Arc<StubCapture>,
    credentials: Arc<StubCredentials>,
    events: mpsc::UnboundedReceiver<LinkEvent>,
}

fn harness(config: SpeechLinkConfig) -> Harness {
    let probe = Arc::new(SessionProbe::default());
    let capture = Arc::new(StubCapture::default());
    let credentials = Arc::new(StubCredentials::default());
    let (tx, rx) = mpsc::unbounded_channel();

    let link = SpeechLink::new(
        StubTranscriber::new(probe.clone()),
        capture.clone(),
        credentials.clone(),
        config,
        tx,
    );

    Harness {
        link,
        probe,
        capture,
        credentials,
        events: rx,
    }
}

fn fast_config() -> SpeechLinkConfig {
    SpeechLinkConfig {
        transcriber: TranscriberConfig::default(),
        reconnect_backoff_ms: 50,
        max_reconnect_attempts: None,
    }
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<LinkEvent>) -> LinkEvent {
    timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("timed out waiting for link event")
        .expect("event channel closed")
}

#[tokio::test]
async fn start_opens_session_and_capture() {
    let mut h = harness(fast_config());

    h.link.start().await.unwrap();

    assert!(matches!(next_event(&mut h.events).await, LinkEvent::Connected));
    assert_eq!(h.link.connection_state(), ConnectionState::Connected);
    assert_eq!(h.probe.connect_count.load(Ordering::SeqCst), 1);
    assert_eq!(h.credentials.fetch_count.load(Ordering::SeqCst), 1);
    assert!(h.capture.is_running());
}

#[tokio::test]
async fn credential_failure_fails_start() {
    let h = harness(fast_config());
    h.credentials.fail.store(true, Ordering::SeqCst);

    let result = h.link.start().await;

    assert!(matches!(result, Err(SpeechLinkError::Credential(_))));
    assert_eq!(h.link.connection_state(), ConnectionState::Disconnected);
    assert_eq!(h.probe.connect_count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn microphone_denial_fails_start_and_tears_down_session() {
    let h = harness(fast_config());
    h.capture.deny.store(true, Ordering::SeqCst);

    let result = h.link.start().await;

    assert!(matches!(result, Err(SpeechLinkError::MicrophoneDenied(_))));
    // The opened session must not be left dangling.
    assert_eq!(h.probe.disconnect_count.load(Ordering::SeqCst), 1);
    assert_eq!(h.link.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn frames_are_forwarded_until_muted() {
    let mut h = harness(fast_config());
    h.link.start().await.unwrap();
    let _ = next_event(&mut h.events).await;

    h.capture.push_frame().await;
    h.capture.push_frame().await;
    sleep(Duration::from_millis(50)).await;
    assert_eq!(h.probe.frames_forwarded.load(Ordering::SeqCst), 2);

    h.link.mute(true);
    h.capture.push_frame().await;
    sleep(Duration::from_millis(50)).await;
    assert_eq!(h.probe.frames_forwarded.load(Ordering::SeqCst), 2);

    h.link.mute(false);
    h.capture.push_frame().await;
    sleep(Duration::from_millis(50)).await;
    assert_eq!(h.probe.frames_forwarded.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn interim_overwrites_and_final_clears() {
    let mut h = harness(fast_config());
    h.link.start().await.unwrap();
    let _ = next_event(&mut h.events).await;

    h.probe
        .fire(TranscriberEvent::Transcript(TranscriptEvent::interim("こん")))
        .await;
    h.probe
        .fire(TranscriberEvent::Transcript(TranscriptEvent::interim(
            "こんにちは",
        )))
        .await;
    assert_eq!(h.link.interim_text(), "こんにちは");

    h.probe
        .fire(TranscriberEvent::Transcript(TranscriptEvent::final_text(
            "こんにちは",
            true,
        )))
        .await;
    assert_eq!(h.link.interim_text(), "");

    // Two interims then the final, in order.
    assert!(matches!(next_event(&mut h.events).await, LinkEvent::Interim(t) if t == "こん"));
    assert!(matches!(next_event(&mut h.events).await, LinkEvent::Interim(t) if t == "こんにちは"));
    match next_event(&mut h.events).await {
        LinkEvent::Final {
            text,
            is_speech_end,
        } => {
            assert_eq!(text, "こんにちは");
            assert!(is_speech_end);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn session_loss_reconnects_with_fresh_credential() {
    let mut h = harness(fast_config());
    h.link.start().await.unwrap();
    let _ = next_event(&mut h.events).await;

    h.probe
        .fire(TranscriberEvent::Closed("server hiccup".into()))
        .await;
    assert!(matches!(next_event(&mut h.events).await, LinkEvent::Closed(_)));
    assert_eq!(h.link.connection_state(), ConnectionState::Reconnecting);

    // After the backoff the link reconnects and re-mints a credential.
    assert!(matches!(next_event(&mut h.events).await, LinkEvent::Connected));
    assert_eq!(h.probe.connect_count.load(Ordering::SeqCst), 2);
    assert_eq!(h.credentials.fetch_count.load(Ordering::SeqCst), 2);
    assert_eq!(h.link.connection_state(), ConnectionState::Connected);
}

#[tokio::test]
async fn pending_reconnect_is_a_no_op_after_stop() {
    let mut h = harness(SpeechLinkConfig {
        reconnect_backoff_ms: 100,
        ..fast_config()
    });
    h.link.start().await.unwrap();
    let _ = next_event(&mut h.events).await;

    // Session drops, a reconnect gets scheduled...
    h.probe
        .fire(TranscriberEvent::Closed("network blip".into()))
        .await;
    // ...and the caller stops listening before the backoff elapses.
    h.link.stop().await;

    sleep(Duration::from_millis(300)).await;

    // The pending reconnect fired as a no-op: no new session, no capture.
    assert_eq!(h.probe.connect_count.load(Ordering::SeqCst), 1);
    assert_eq!(h.link.connection_state(), ConnectionState::Disconnected);
    assert!(!h.capture.is_running());
}

#[tokio::test]
async fn stop_is_idempotent_and_clears_interim() {
    let mut h = harness(fast_config());
    h.link.start().await.unwrap();
    let _ = next_event(&mut h.events).await;

    h.probe
        .fire(TranscriberEvent::Transcript(TranscriptEvent::interim("途中")))
        .await;
    assert_eq!(h.link.interim_text(), "途中");

    h.link.stop().await;
    h.link.stop().await;

    assert_eq!(h.link.interim_text(), "");
    assert_eq!(h.link.connection_state(), ConnectionState::Disconnected);
    assert!(!h.capture.is_running());
}

#[tokio::test]
async fn reconnect_cap_gives_up_with_failure_event() {
    let mut h = harness(SpeechLinkConfig {
        reconnect_backoff_ms: 20,
        max_reconnect_attempts: Some(2),
        ..fast_config()
    });
    h.link.start().await.unwrap();
    let _ = next_event(&mut h.events).await;

    // Every further connect attempt fails.
    h.probe.fail_connect.store(true, Ordering::SeqCst);
    h.probe
        .fire(TranscriberEvent::Closed("persistent outage".into()))
        .await;
    assert!(matches!(next_event(&mut h.events).await, LinkEvent::Closed(_)));

    let mut failed = false;
    for _ in 0..10 {
        match timeout(Duration::from_millis(500), h.events.recv()).await {
            Ok(Some(LinkEvent::Failed(SpeechLinkError::ReconnectsExhausted { attempts }))) => {
                assert_eq!(attempts, 2);
                failed = true;
                break;
            }
            Ok(Some(_)) => continue,
            _ => break,
        }
    }
    assert!(failed, "link never gave up");

    // 1 initial + 2 capped retries.
    assert_eq!(h.probe.connect_count.load(Ordering::SeqCst), 3);
}
