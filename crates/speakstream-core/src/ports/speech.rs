//! Speech playback port — trait abstraction for segmented TTS playback.
//!
//! # Design Rules
//!
//! - DTOs here are transport-agnostic wire shapes (no `speakstream-tts`
//!   types).
//! - Conversion from engine-native types happens inside `speakstream-tts`,
//!   never here. This keeps `speakstream-core` free of any dependency on
//!   the engine crate.
//! - `SpeechPlaybackPort` is the only surface a chat UI layer needs in
//!   order to speak a streaming assistant reply.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── DTOs ─────────────────────────────────────────────────────────────────────

/// Observable playback state, as exposed to the UI layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechStatusDto {
    /// True while the head segment of the targeted session is not yet ready.
    pub audio_loading: bool,
    /// True while any session is rendering audio through the sink.
    pub audio_playing: bool,
    /// True iff a voice is configured for the current context.
    pub has_audio: bool,
    /// Session id currently holding the system-wide playback slot, if any.
    pub active_session_id: Option<String>,
}

/// Request body for the one-shot (non-streaming) playback path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayTextRequestDto {
    /// Text to speak.
    pub text: String,
    /// Pre-synthesized audio bytes; when present, synthesis is skipped and
    /// the buffer is played directly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer: Option<Vec<u8>>,
}

/// Response of the one-shot playback path.
///
/// `buffer` is populated when the text was freshly synthesized so the
/// caller can cache it and replay without a second synthesis round trip.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayTextResponseDto {
    /// Synthesized audio bytes, when a synthesis call was made and succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer: Option<Vec<u8>>,
}

// ── Error ─────────────────────────────────────────────────────────────────────

/// Errors returned by `SpeechPlaybackPort` operations.
///
/// Per-segment synthesis failures never surface here — they are absorbed by
/// the engine and reported through the event stream. Only configuration
/// problems and internal faults reach the caller.
#[derive(Debug, Error)]
pub enum SpeechPortError {
    /// No voice is configured for the current context.
    #[error("No voice configured — select a TTS voice first")]
    NoVoiceConfigured,

    /// Unexpected internal error.
    #[error("Internal speech error: {0}")]
    Internal(String),
}

// ── Port trait ────────────────────────────────────────────────────────────────

/// Port trait for segmented speech playback.
///
/// Implemented by `SpeechService` in `speakstream-tts`.
/// Consumed by the chat UI layer (and any HTTP adapter in front of it).
///
/// # Scope
///
/// One session exists per chat message being spoken. Feeding text into a
/// session while it plays is the normal mode of operation: the engine
/// segments, synthesizes ahead, and plays strictly in order.
#[async_trait]
pub trait SpeechPlaybackPort: Send + Sync {
    /// Begin a segmented playback session for the given chat message id.
    ///
    /// Any session currently holding the playback slot is stopped first.
    /// Rejected with [`SpeechPortError::NoVoiceConfigured`] when no voice
    /// is configured.
    async fn start_segmented(&self, session_id: &str) -> Result<(), SpeechPortError>;

    /// Feed a chunk of streamed reply text into the session.
    ///
    /// `done = true` closes the text stream, flushing any trailing
    /// fragment. Feeding a cancelled or finished session is a silent
    /// no-op.
    async fn feed_text(
        &self,
        session_id: &str,
        chunk: &str,
        done: bool,
    ) -> Result<(), SpeechPortError>;

    /// Close the session's text stream if not already closed. Idempotent.
    async fn finish_segmented(&self, session_id: &str) -> Result<(), SpeechPortError>;

    /// Cancel whatever is playing or loading right now.
    ///
    /// Aborts in-flight synthesis, interrupts the sink mid-segment, and
    /// releases the playback slot. No-op when nothing is active.
    async fn cancel_audio(&self) -> Result<(), SpeechPortError>;

    /// One-shot playback of a complete text (or a pre-synthesized buffer).
    async fn play_text(
        &self,
        request: PlayTextRequestDto,
    ) -> Result<PlayTextResponseDto, SpeechPortError>;

    /// Return the current observable playback state.
    async fn status(&self) -> Result<SpeechStatusDto, SpeechPortError>;
}
