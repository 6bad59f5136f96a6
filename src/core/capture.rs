//! Microphone capture capability.
//!
//! The crate does not own a concrete audio device; the UI shell supplies an
//! implementation (browser recorder, OS capture, test stub). The contract is
//! a stream of encoded frames at a fixed cadence (≈250 ms) that the speech
//! link forwards to the transcription session while unmuted.

use bytes::Bytes;
use tokio::sync::mpsc;

/// Error types for microphone capture.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CaptureError {
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("capture failed: {0}")]
    Failed(String),
}

/// A microphone producing periodic encoded audio frames.
#[async_trait::async_trait]
pub trait MicrophoneCapture: Send + Sync {
    /// Acquire the device and begin emitting frames.
    ///
    /// The receiver yields one encoded frame roughly every 250 ms until
    /// [`stop`](Self::stop) is called or the device fails, at which point
    /// the channel closes.
    async fn start(&self) -> Result<mpsc::Receiver<Bytes>, CaptureError>;

    /// Release the device and close the frame channel. Safe to call when
    /// not capturing.
    async fn stop(&self);
}
