//! Segmented text-to-speech streaming playback for chat replies.
//!
//! Reconciles three independent timelines — incremental arrival of
//! generated text, asynchronous per-segment synthesis over HTTP, and
//! strictly sequential audio playback — so that speech starts before the
//! full reply exists, audio is never played out of order or overlapped,
//! and cancellation leaves nothing behind.
//!
//! The [`SpeechCoordinator`] is the public contract; [`SpeechService`]
//! adapts it to the `SpeechPlaybackPort` defined in `speakstream-core`.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod segment;
pub mod segmenter;
pub mod service;
pub mod session;
pub mod sink;
pub mod synth;
pub mod text;

mod dispatcher;
mod queue;

// Re-export key types for convenience
pub use config::{SpeechConfig, VoiceConfig};
pub use coordinator::{SpeechCoordinator, SpeechEvent, SpeechStatus};
pub use error::SpeechError;
pub use segment::{AudioAsset, Segment, SegmentStatus};
pub use segmenter::TextSegmenter;
pub use service::{SpeechService, spawn_event_bridge};
pub use session::SessionState;
pub use sink::{AudioSink, RodioSink};
pub use synth::{HttpSynthesizer, SpeechSynthesizer};
