//! Canonical event union for all cross-adapter events.
//!
//! This module is the single source of truth for events used by UI
//! listeners, SSE handlers, and backend emitters.
//!
//! # Wire Format
//!
//! Events are serialized with a `type` tag for TypeScript compatibility:
//!
//! ```json
//! { "type": "speech_segment_started", "sessionId": "chat-42", "sequence": 3 }
//! ```

use serde::{Deserialize, Serialize};

/// Canonical event types for all adapters.
///
/// Each variant includes all necessary context for the event to be
/// self-describing; frontends switch on the `type` tag alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppEvent {
    /// A playback session changed state (`"loading"`, `"playing"`,
    /// `"finished"`, `"cancelled"`).
    SpeechStateChanged {
        /// Id of the chat message being spoken.
        #[serde(rename = "sessionId")]
        session_id: String,
        /// State machine label.
        state: String,
    },

    /// The sink started rendering one segment.
    SpeechSegmentStarted {
        /// Id of the chat message being spoken.
        #[serde(rename = "sessionId")]
        session_id: String,
        /// Playback-order position of the segment.
        sequence: u64,
    },

    /// A segment was skipped because its synthesis failed after a retry.
    SpeechSegmentSkipped {
        /// Id of the chat message being spoken.
        #[serde(rename = "sessionId")]
        session_id: String,
        /// Playback-order position of the skipped segment.
        sequence: u64,
        /// Reason the segment was dropped.
        error: String,
    },

    /// Every accepted segment of the session has been played or skipped.
    SpeechSessionFinished {
        /// Id of the chat message that finished speaking.
        #[serde(rename = "sessionId")]
        session_id: String,
    },

    /// The session was cancelled (explicitly, or superseded by a new one).
    SpeechSessionCancelled {
        /// Id of the chat message whose playback was cancelled.
        #[serde(rename = "sessionId")]
        session_id: String,
    },

    /// A non-fatal speech error that was absorbed by the coordinator.
    SpeechError {
        /// Session the error belongs to, if any.
        #[serde(rename = "sessionId")]
        session_id: Option<String>,
        /// Error description.
        message: String,
    },
}
