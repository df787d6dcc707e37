//! Port definitions — trait abstractions implemented by the engine crate
//! and consumed by UI/HTTP adapters.

mod event_emitter;
mod speech;

pub use event_emitter::{AppEventEmitter, NoopEmitter};
pub use speech::{
    PlayTextRequestDto, PlayTextResponseDto, SpeechPlaybackPort, SpeechPortError, SpeechStatusDto,
};
