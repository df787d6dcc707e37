//! Speech synthesis — engine-agnostic trait and the HTTP endpoint client.

use std::time::Duration;

use crate::config::VoiceConfig;
use crate::error::SpeechError;

/// Backend-agnostic speech synthesizer.
///
/// Implementations must be `Send + Sync` so dispatcher tasks can share them
/// behind an `Arc` across await points. The contract is deliberately
/// narrow: text in, encoded audio bytes out. Timeouts, retries, and
/// concurrency limits live in the dispatcher, not here.
#[async_trait::async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` with the given voice into encoded audio bytes.
    async fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<Vec<u8>, SpeechError>;
}

/// Synthesizer backed by an HTTP endpoint.
///
/// Sends `{ model, input, voice, speed }` as JSON with an optional bearer
/// credential and expects raw audio bytes back. Any non-success status is
/// a retryable failure; the request itself carries the per-call timeout.
pub struct HttpSynthesizer {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpSynthesizer {
    /// Create a client for `endpoint` with the given per-request timeout.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            timeout,
        }
    }
}

#[async_trait::async_trait]
impl SpeechSynthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<Vec<u8>, SpeechError> {
        let body = serde_json::json!({
            "model": voice.model,
            "input": text,
            "voice": voice.voice,
            "speed": voice.speed,
        });

        let mut request = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&body);
        if let Some(ref key) = voice.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SpeechError::Timeout(self.timeout)
            } else {
                SpeechError::Transport { source: e.into() }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SpeechError::Endpoint {
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SpeechError::Transport { source: e.into() })?;
        if bytes.is_empty() {
            return Err(SpeechError::Synthesis(
                "endpoint returned an empty audio body".to_string(),
            ));
        }

        tracing::debug!(
            bytes = bytes.len(),
            chars = text.chars().count(),
            "Synthesis call complete"
        );
        Ok(bytes.to_vec())
    }
}
