//! Speech engine error types.

use std::time::Duration;

/// Errors that can occur in the speech playback engine.
///
/// Per-segment synthesis failures are absorbed by the playback queue and
/// never escalate past the coordinator; the variants here surface only for
/// configuration problems, the one-shot path, and sink construction.
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    /// No voice is configured for the current context.
    #[error("No voice configured for this context")]
    NoVoiceConfigured,

    /// The synthesis endpoint answered with a non-success status.
    #[error("Synthesis endpoint returned HTTP {status}")]
    Endpoint {
        /// HTTP status code from the endpoint.
        status: u16,
    },

    /// The synthesis request never produced a response.
    #[error("Synthesis transport failed: {source}")]
    Transport {
        /// Underlying transport error.
        source: anyhow::Error,
    },

    /// A synthesis call exceeded its per-call budget.
    #[error("Synthesis timed out after {0:?}")]
    Timeout(Duration),

    /// Synthesis completed but produced no usable audio.
    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),

    /// The audio output sink failed.
    #[error("Audio sink error: {0}")]
    Sink(String),

    /// The operation was cancelled.
    #[error("Speech operation cancelled")]
    Cancelled,
}
