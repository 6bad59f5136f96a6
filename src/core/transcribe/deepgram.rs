//! Deepgram live transcription WebSocket client.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{RwLock, broadcast, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};
use url::Url;

use super::base::{
    LiveTranscriber, TranscriberConfig, TranscriberError, TranscriberEvent,
    TranscriberEventCallback, TranscriptEvent,
};
use super::credentials::Credential;

const LIVE_ENDPOINT: &str = "wss://api.deepgram.com/v1/listen";

/// Live transcription response frame.
#[derive(Debug, Deserialize)]
struct LiveResponse {
    #[serde(rename = "type")]
    response_type: String,
    channel: Option<LiveChannel>,
    is_final: Option<bool>,
    speech_final: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct LiveChannel {
    alternatives: Vec<LiveAlternative>,
}

#[derive(Debug, Deserialize)]
struct LiveAlternative {
    transcript: String,
}

#[derive(Debug, Deserialize)]
struct LiveErrorFrame {
    #[serde(rename = "type")]
    error_type: Option<String>,
    description: Option<String>,
    message: Option<String>,
}

/// Connection phase, shared with the session task.
#[derive(Debug, Clone, PartialEq)]
enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Failed(String),
}

/// Deepgram live-transcription WebSocket client.
///
/// Holds a single streaming session: audio frames go out over an internal
/// channel, transcript/close/error events come back through the registered
/// callback. The client does not reconnect; the owner decides what a closed
/// session means.
pub struct DeepgramTranscriber {
    config: TranscriberConfig,
    state: Arc<RwLock<SessionState>>,
    ws_sender: Option<mpsc::UnboundedSender<Message>>,
    shutdown_tx: Option<broadcast::Sender<()>>,
    event_callback: Option<TranscriberEventCallback>,
    session_handle: Option<tokio::task::JoinHandle<()>>,
}

impl DeepgramTranscriber {
    pub fn new(config: TranscriberConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(SessionState::Disconnected)),
            ws_sender: None,
            shutdown_tx: None,
            event_callback: None,
            session_handle: None,
        }
    }

    /// Build the session URL with recognition parameters.
    fn build_session_url(config: &TranscriberConfig) -> Result<String, TranscriberError> {
        let mut url = Url::parse(LIVE_ENDPOINT)
            .map_err(|e| TranscriberError::ConfigurationError(format!("invalid endpoint: {e}")))?;

        {
            let mut query_pairs = url.query_pairs_mut();
            query_pairs.append_pair("model", &config.model);
            query_pairs.append_pair("language", &config.normalized_language());
            query_pairs.append_pair("interim_results", &config.interim_results.to_string());
            query_pairs.append_pair("punctuate", &config.punctuate.to_string());
            query_pairs.append_pair("smart_format", &config.smart_format.to_string());
            query_pairs.append_pair("encoding", &config.encoding);
            query_pairs.append_pair("endpointing", &config.endpointing_ms.to_string());
            query_pairs.append_pair("utterance_end_ms", &config.utterance_end_ms.to_string());
            query_pairs.append_pair("no_delay", &config.no_delay.to_string());
        }

        Ok(url.to_string())
    }

    /// Translate one WebSocket message into transcriber events.
    ///
    /// Returns `Err` only for provider-reported failures; the session task
    /// ends the stream on those.
    async fn handle_session_message(
        message: Message,
        callback: &Option<TranscriberEventCallback>,
    ) -> Result<(), TranscriberError> {
        match message {
            Message::Text(text) => {
                let response: LiveResponse = serde_json::from_str(&text).map_err(|e| {
                    TranscriberError::ProviderError(format!("unparseable response: {e}"))
                })?;

                match response.response_type.as_str() {
                    "Results" => {
                        let Some(channel) = response.channel else {
                            return Ok(());
                        };
                        let Some(alternative) = channel.alternatives.first() else {
                            return Ok(());
                        };
                        if alternative.transcript.is_empty() {
                            return Ok(());
                        }

                        let is_final = response.is_final.unwrap_or(false)
                            || response.speech_final.unwrap_or(false);
                        let event = if is_final {
                            TranscriptEvent::final_text(
                                alternative.transcript.clone(),
                                response.speech_final.unwrap_or(false),
                            )
                        } else {
                            TranscriptEvent::interim(alternative.transcript.clone())
                        };

                        if let Some(callback) = callback {
                            callback(TranscriberEvent::Transcript(event)).await;
                        }
                    }
                    "UtteranceEnd" => {
                        debug!("utterance boundary from backend");
                        if let Some(callback) = callback {
                            callback(TranscriberEvent::UtteranceEnd).await;
                        }
                    }
                    "Metadata" => {
                        debug!("session metadata frame");
                    }
                    "Error" => {
                        let description =
                            if let Ok(frame) = serde_json::from_str::<LiveErrorFrame>(&text) {
                                format!(
                                    "{}: {}",
                                    frame.error_type.unwrap_or_else(|| "error".to_string()),
                                    frame
                                        .description
                                        .or(frame.message)
                                        .unwrap_or_else(|| "unknown".to_string())
                                )
                            } else {
                                "unknown provider error".to_string()
                            };
                        return Err(TranscriberError::ProviderError(description));
                    }
                    other => {
                        warn!("unknown response type: {other}");
                    }
                }
            }
            Message::Binary(data) => {
                warn!("unexpected binary message ({} bytes)", data.len());
            }
            Message::Close(frame) => {
                info!("session close frame: {frame:?}");
            }
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
        }

        Ok(())
    }

    async fn start_session(&mut self, credential: Credential) -> Result<(), TranscriberError> {
        let ws_url = Self::build_session_url(&self.config)?;

        let (ws_tx, mut ws_rx) = mpsc::unbounded_channel::<Message>();
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
        self.ws_sender = Some(ws_tx);
        self.shutdown_tx = Some(shutdown_tx);

        let state = self.state.clone();
        let callback = self.event_callback.clone();

        let session_handle = tokio::spawn(async move {
            {
                let mut state_guard = state.write().await;
                *state_guard = SessionState::Connecting;
            }

            let request = match tokio_tungstenite::tungstenite::http::Request::builder()
                .uri(&ws_url)
                .header("Authorization", format!("Bearer {}", credential.token))
                .header("Host", "api.deepgram.com")
                .header("Upgrade", "websocket")
                .header("Connection", "Upgrade")
                .header(
                    "Sec-WebSocket-Key",
                    tokio_tungstenite::tungstenite::handshake::client::generate_key(),
                )
                .header("Sec-WebSocket-Version", "13")
                .body(())
            {
                Ok(request) => request,
                Err(e) => {
                    let mut state_guard = state.write().await;
                    *state_guard = SessionState::Failed(format!("bad request: {e}"));
                    return;
                }
            };

            let (ws_stream, _) = match connect_async(request).await {
                Ok(result) => result,
                Err(e) => {
                    error!("failed to open live session: {e}");
                    let mut state_guard = state.write().await;
                    *state_guard = SessionState::Failed(format!("connect: {e}"));
                    return;
                }
            };

            info!("live transcription session established");
            {
                let mut state_guard = state.write().await;
                *state_guard = SessionState::Connected;
            }

            let (mut ws_sink, mut ws_stream) = ws_stream.split();
            let mut close_reason = "stream ended".to_string();
            let mut surfaced_error: Option<TranscriberError> = None;

            loop {
                tokio::select! {
                    Some(message) = ws_rx.recv() => {
                        if let Err(e) = ws_sink.send(message).await {
                            error!("failed to send session message: {e}");
                            surfaced_error =
                                Some(TranscriberError::NetworkError(e.to_string()));
                            break;
                        }
                    }

                    message = ws_stream.next() => {
                        match message {
                            Some(Ok(msg)) => {
                                let closing = matches!(msg, Message::Close(_));
                                if let Err(e) =
                                    Self::handle_session_message(msg, &callback).await
                                {
                                    error!("session message error: {e}");
                                    surfaced_error = Some(e);
                                    break;
                                }
                                if closing {
                                    close_reason = "server close".to_string();
                                    break;
                                }
                            }
                            Some(Err(e)) => {
                                error!("session stream error: {e}");
                                surfaced_error =
                                    Some(TranscriberError::NetworkError(e.to_string()));
                                break;
                            }
                            None => break,
                        }
                    }

                    _ = shutdown_rx.recv() => {
                        debug!("session shutdown requested");
                        // Deliberate teardown is not reported as a close event.
                        {
                            let mut state_guard = state.write().await;
                            *state_guard = SessionState::Disconnected;
                        }
                        return;
                    }
                }
            }

            {
                let mut state_guard = state.write().await;
                *state_guard = SessionState::Disconnected;
            }

            if let Some(callback) = callback {
                match surfaced_error {
                    Some(e) => callback(TranscriberEvent::Error(e)).await,
                    None => callback(TranscriberEvent::Closed(close_reason)).await,
                }
            }
        });

        self.session_handle = Some(session_handle);

        // Wait for the session task to reach an established or failed state.
        let mut attempts = 0;
        while attempts < 50 {
            let state = self.state.read().await;
            match &*state {
                SessionState::Connected => return Ok(()),
                SessionState::Failed(reason) => {
                    return Err(TranscriberError::ConnectionFailed(reason.clone()));
                }
                _ => {
                    drop(state);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    attempts += 1;
                }
            }
        }

        Err(TranscriberError::ConnectionFailed(
            "session open timed out".to_string(),
        ))
    }
}

#[async_trait::async_trait]
impl LiveTranscriber for DeepgramTranscriber {
    async fn connect(&mut self, credential: Credential) -> Result<(), TranscriberError> {
        if credential.token.is_empty() {
            return Err(TranscriberError::AuthenticationFailed(
                "empty session token".to_string(),
            ));
        }
        self.start_session(credential).await
    }

    async fn disconnect(&mut self) -> Result<(), TranscriberError> {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(());
        }

        if let Some(handle) = self.session_handle.take() {
            let _ = timeout(Duration::from_secs(5), handle).await;
        }

        self.ws_sender = None;
        self.shutdown_tx = None;

        {
            let mut state = self.state.write().await;
            *state = SessionState::Disconnected;
        }

        debug!("live transcription session torn down");
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ws_sender.is_some()
    }

    async fn send_audio(&mut self, frame: Bytes) -> Result<(), TranscriberError> {
        let Some(ws_sender) = &self.ws_sender else {
            return Err(TranscriberError::ConnectionFailed(
                "no live session".to_string(),
            ));
        };

        ws_sender
            .send(Message::Binary(frame))
            .map_err(|e| TranscriberError::NetworkError(format!("failed to queue audio: {e}")))?;
        Ok(())
    }

    async fn on_event(
        &mut self,
        callback: TranscriberEventCallback,
    ) -> Result<(), TranscriberError> {
        self.event_callback = Some(callback);
        Ok(())
    }

    fn provider_info(&self) -> &'static str {
        "Deepgram live WebSocket"
    }
}

impl Drop for DeepgramTranscriber {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(());
        }
    }
}
