//! `SpeechService` — the adapter that implements `SpeechPlaybackPort`.
//!
//! This module is the single place where engine-native types are converted
//! to the transport-agnostic DTOs defined in `speakstream-core`. Nothing
//! outside this file should import `SpeechStatus`, `SpeechEvent`, etc. from
//! an adapter.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use speakstream_core::events::AppEvent;
use speakstream_core::ports::{
    AppEventEmitter, PlayTextRequestDto, PlayTextResponseDto, SpeechPlaybackPort, SpeechPortError,
    SpeechStatusDto,
};

use crate::config::SpeechConfig;
use crate::coordinator::{SpeechCoordinator, SpeechEvent};
use crate::error::SpeechError;
use crate::session::SessionState;
use crate::sink::RodioSink;
use crate::synth::HttpSynthesizer;

/// Implements [`SpeechPlaybackPort`] on top of a [`SpeechCoordinator`].
pub struct SpeechService {
    coordinator: Arc<SpeechCoordinator>,
}

impl SpeechService {
    /// Wrap an existing coordinator, bridging its events onto `emitter`.
    #[must_use]
    pub fn new(
        coordinator: SpeechCoordinator,
        events: mpsc::UnboundedReceiver<SpeechEvent>,
        emitter: Arc<dyn AppEventEmitter>,
    ) -> Self {
        spawn_event_bridge(events, emitter);
        Self {
            coordinator: Arc::new(coordinator),
        }
    }

    /// Build a service wired to the local audio device and the configured
    /// HTTP synthesis endpoint.
    pub fn local(
        config: SpeechConfig,
        emitter: Arc<dyn AppEventEmitter>,
    ) -> Result<Self, SpeechError> {
        let synthesizer = Arc::new(HttpSynthesizer::new(
            config.endpoint.clone(),
            config.synthesis_timeout,
        ));
        let sink = Arc::new(RodioSink::new()?);
        let (coordinator, events) = SpeechCoordinator::new(config, synthesizer, sink);
        Ok(Self::new(coordinator, events, emitter))
    }

    /// Access the underlying coordinator (e.g. for direct engine calls).
    #[must_use]
    pub fn coordinator(&self) -> &Arc<SpeechCoordinator> {
        &self.coordinator
    }
}

// ── Event bridge ─────────────────────────────────────────────────────────────

/// Bridge `SpeechEvent` → `AppEvent`, forwarding each event to `emitter`.
///
/// The spawned task self-terminates when the coordinator's sender is
/// dropped: `recv()` returns `None` and the `while let` loop exits.
pub fn spawn_event_bridge(
    mut events: mpsc::UnboundedReceiver<SpeechEvent>,
    emitter: Arc<dyn AppEventEmitter>,
) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            emitter.emit(to_app_event(event));
        }
        // events returned None: coordinator sender dropped — task exits.
    });
}

fn to_app_event(event: SpeechEvent) -> AppEvent {
    match event {
        SpeechEvent::StateChanged { session_id, state } => AppEvent::SpeechStateChanged {
            session_id,
            state: state_label(state).to_owned(),
        },
        SpeechEvent::SegmentStarted {
            session_id,
            sequence,
        } => AppEvent::SpeechSegmentStarted {
            session_id,
            sequence,
        },
        SpeechEvent::SegmentSkipped {
            session_id,
            sequence,
            error,
        } => AppEvent::SpeechSegmentSkipped {
            session_id,
            sequence,
            error,
        },
        SpeechEvent::SessionFinished { session_id } => {
            AppEvent::SpeechSessionFinished { session_id }
        }
        SpeechEvent::SessionCancelled { session_id } => {
            AppEvent::SpeechSessionCancelled { session_id }
        }
        SpeechEvent::Error {
            session_id,
            message,
        } => AppEvent::SpeechError {
            session_id,
            message,
        },
    }
}

fn state_label(state: SessionState) -> &'static str {
    match state {
        SessionState::Idle => "idle",
        SessionState::Loading => "loading",
        SessionState::Playing => "playing",
        SessionState::Finished => "finished",
        SessionState::Cancelled => "cancelled",
    }
}

// ── Error conversion ─────────────────────────────────────────────────────────

/// Convert a `SpeechError` into its closest `SpeechPortError` equivalent.
///
/// This conversion lives here, in `speakstream-tts`, so that
/// `speakstream-core` never needs to import the engine crate. The
/// dependency arrow stays one-way.
fn to_port_err(e: SpeechError) -> SpeechPortError {
    match e {
        SpeechError::NoVoiceConfigured => SpeechPortError::NoVoiceConfigured,
        other => SpeechPortError::Internal(other.to_string()),
    }
}

// ── SpeechPlaybackPort implementation ────────────────────────────────────────

#[async_trait]
impl SpeechPlaybackPort for SpeechService {
    async fn start_segmented(&self, session_id: &str) -> Result<(), SpeechPortError> {
        self.coordinator.start(session_id).await.map_err(to_port_err)
    }

    async fn feed_text(
        &self,
        session_id: &str,
        chunk: &str,
        done: bool,
    ) -> Result<(), SpeechPortError> {
        self.coordinator.feed(session_id, chunk, done).await;
        Ok(())
    }

    async fn finish_segmented(&self, session_id: &str) -> Result<(), SpeechPortError> {
        self.coordinator.finish(session_id).await;
        Ok(())
    }

    async fn cancel_audio(&self) -> Result<(), SpeechPortError> {
        self.coordinator.cancel_active().await;
        Ok(())
    }

    async fn play_text(
        &self,
        request: PlayTextRequestDto,
    ) -> Result<PlayTextResponseDto, SpeechPortError> {
        let buffer = self
            .coordinator
            .play_text(&request.text, request.buffer)
            .await
            .map_err(to_port_err)?;
        Ok(PlayTextResponseDto { buffer })
    }

    async fn status(&self) -> Result<SpeechStatusDto, SpeechPortError> {
        let status = self.coordinator.status().await;
        Ok(SpeechStatusDto {
            audio_loading: status.audio_loading,
            audio_playing: status.audio_playing,
            has_audio: status.has_audio,
            active_session_id: status.active_session_id,
        })
    }
}
