//! Orchestrator behavior tests.


use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use crate::core::speech_link::{SpeechLink, SpeechLinkConfig};
use crate::core::transcribe::{TranscriberEvent, TranscriptEvent};
use crate::core::turn::TurnState;

use super::collaborators::Collaborators;
use super::config::OrchestratorConfig;
use super::driver::{TurnOrchestrator, UiEvent};
use self::stubs::{
    SessionProbe, StubCapture, StubCredentials, StubStore, StubSuggester, StubSynthesizer,
    StubTranscriber, StubTranslator,
};

pub(crate) struct Harness {
    pub orchestrator: TurnOrchestrator,
    pub ui: mpsc::UnboundedReceiver<UiEvent>,
    pub probe: Arc<SessionProbe>,
    pub capture: Arc<StubCapture>,
    pub credentials: Arc<StubCredentials>,
    pub synthesizer: Arc<StubSynthesizer>,
    pub store: Arc<StubStore>,
    pub suggester: Arc<StubSuggester>,
    pub translator: Arc<StubTranslator>,
}

impl Harness {
    /// Deliver a final transcript as if the partner finished speaking.
    pub async fn partner_says(&self, text: &str) {
        self.probe
            .fire(TranscriberEvent::Transcript(TranscriptEvent::final_text(
                text, true,
            )))
            .await;
    }

    pub async fn partner_interim(&self, text: &str) {
        self.probe
            .fire(TranscriberEvent::Transcript(TranscriptEvent::interim(text)))
            .await;
    }
}

pub(crate) fn harness(silence_timeout_ms: u64) -> Harness {
    let probe = Arc::new(SessionProbe::default());
    let capture = Arc::new(StubCapture::default());
    let credentials = Arc::new(StubCredentials::default());
    let (link_tx, link_rx) = mpsc::unbounded_channel();

    let link = SpeechLink::new(
        StubTranscriber::new(probe.clone()),
        capture.clone(),
        credentials.clone(),
        SpeechLinkConfig {
            reconnect_backoff_ms: 50,
            ..Default::default()
        },
        link_tx,
    );

    let synthesizer = Arc::new(StubSynthesizer::default());
    let store = Arc::new(StubStore::default());
    let suggester = Arc::new(StubSuggester::default());
    let translator = Arc::new(StubTranslator::default());

    let collaborators = Collaborators {
        synthesizer: synthesizer.clone(),
        store: store.clone(),
        suggester: suggester.clone(),
        translator: translator.clone(),
    };

    let mut config = OrchestratorConfig::new("conv-test");
    config.silence_timeout_ms = silence_timeout_ms;

    let (orchestrator, ui) = TurnOrchestrator::new(link, link_rx, collaborators, config);

    Harness {
        orchestrator,
        ui,
        probe,
        capture,
        credentials,
        synthesizer,
        store,
        suggester,
        translator,
    }
}

/// Read UI events until the turn machine reaches `target`.
pub(crate) async fn wait_for_state(ui: &mut mpsc::UnboundedReceiver<UiEvent>, target: TurnState) {
    let deadline = Duration::from_secs(2);
    let result = timeout(deadline, async {
        while let Some(event) = ui.recv().await {
            if let UiEvent::StateChanged(state) = event
                && state == target
            {
                return;
            }
        }
        panic!("ui channel closed");
    })
    .await;
    assert!(result.is_ok(), "never reached {target:?}");
}

/// Read UI events until reply suggestions are published.
pub(crate) async fn wait_for_replies(
    ui: &mut mpsc::UnboundedReceiver<UiEvent>,
) -> Vec<super::collaborators::ReplySuggestion> {
    let result = timeout(Duration::from_secs(2), async {
        while let Some(event) = ui.recv().await {
            if let UiEvent::Replies(replies) = event {
                return replies;
            }
        }
        panic!("ui channel closed");
    })
    .await;
    result.expect("no replies published")
}

/// Read UI events until a turn failure is published.
pub(crate) async fn wait_for_failure(ui: &mut mpsc::UnboundedReceiver<UiEvent>) -> String {
    let result = timeout(Duration::from_secs(2), async {
        while let Some(event) = ui.recv().await {
            if let UiEvent::TurnFailed(reason) = event {
                return reason;
            }
        }
        panic!("ui channel closed");
    })
    .await;
    result.expect("no turn failure published")
}

/// Read UI events until a translation is published.
pub(crate) async fn wait_for_translation(ui: &mut mpsc::UnboundedReceiver<UiEvent>) -> String {
    let result = timeout(Duration::from_secs(2), async {
        while let Some(event) = ui.recv().await {
            if let UiEvent::Translation { text, .. } = event {
                return text;
            }
        }
        panic!("ui channel closed");
    })
    .await;
    result.expect("no translation published")
}

/// Poll until `condition` holds, failing after two seconds.
pub(crate) async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!("condition never held");
}
