//! Core contracts for speakstream — the segmented text-to-speech playback
//! coordinator.
//!
//! This crate holds everything a UI or HTTP adapter needs in order to drive
//! spoken playback of a streaming chat reply, and nothing else: the
//! [`SpeechPlaybackPort`] trait, its wire-shape DTOs, the [`AppEvent`]
//! union forwarded to frontends, and the [`AppEventEmitter`] port.
//!
//! The engine crate (`speakstream-tts`) depends on this crate; the arrow
//! never points the other way.

pub mod events;
pub mod ports;

// Re-export commonly used types for convenience
pub use events::AppEvent;
pub use ports::{
    AppEventEmitter, NoopEmitter, PlayTextRequestDto, PlayTextResponseDto, SpeechPlaybackPort,
    SpeechPortError, SpeechStatusDto,
};
