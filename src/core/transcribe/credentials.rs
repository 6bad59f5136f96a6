//! Short-lived credential exchange for transcription sessions.
//!
//! The transcription backend is never handed a long-lived API key by this
//! crate. Each session is authorized by a server-minted, short-lived token
//! fetched immediately before connecting; tokens are never cached across
//! sessions.

use serde::Deserialize;
use tracing::debug;

/// A short-lived authorization credential for one streaming session.
#[derive(Debug, Clone)]
pub struct Credential {
    pub token: String,
    /// Remaining validity in seconds, as reported by the minting service.
    pub expires_in: u64,
}

/// Error types for credential exchange.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("token fetch failed ({0})")]
    Fetch(String),
    #[error("token service rejected the request: {0}")]
    Rejected(String),
    #[error("token service returned no token")]
    Missing,
}

/// Provider of short-lived transcription credentials.
#[async_trait::async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Mint a fresh credential. Called on every session start.
    async fn fetch(&self) -> Result<Credential, CredentialError>;
}

/// Token-mint endpoint response shape.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(rename = "accessToken")]
    access_token: Option<String>,
    #[serde(rename = "expiresIn")]
    expires_in: Option<u64>,
    error: Option<String>,
}

/// Credential provider backed by an HTTP token-mint endpoint.
///
/// Sends an uncached GET to the configured URL and expects
/// `{ accessToken, expiresIn }` or `{ error }` in response.
pub struct HttpCredentialProvider {
    client: reqwest::Client,
    token_url: String,
}

impl HttpCredentialProvider {
    pub fn new(token_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token_url: token_url.into(),
        }
    }
}

#[async_trait::async_trait]
impl CredentialProvider for HttpCredentialProvider {
    async fn fetch(&self) -> Result<Credential, CredentialError> {
        let response = self
            .client
            .get(&self.token_url)
            .header(reqwest::header::CACHE_CONTROL, "no-store")
            .send()
            .await
            .map_err(|e| CredentialError::Fetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CredentialError::Fetch(format!(
                "status {}",
                response.status()
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| CredentialError::Fetch(e.to_string()))?;

        if let Some(error) = body.error {
            return Err(CredentialError::Rejected(error));
        }

        let token = body.access_token.ok_or(CredentialError::Missing)?;
        let expires_in = body.expires_in.unwrap_or(0);
        debug!(expires_in, "minted transcription credential");

        Ok(Credential { token, expires_in })
    }
}
