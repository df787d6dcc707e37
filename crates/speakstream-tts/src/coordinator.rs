//! Session coordinator — the public contract of the engine.
//!
//! One [`PlaybackSession`]-worth of machinery exists per chat message being
//! spoken: a text segmenter, a synthesis dispatcher, and a playback queue
//! driver task, all wired to a shared cancellation token. The coordinator
//! creates and destroys these, enforces the system-wide "only one session
//! plays at a time" rule (the audio sink is a single exclusive resource),
//! and exposes the observable playback state.
//!
//! ```text
//!   feed ──▶ TextSegmenter ──▶ SynthesisDispatcher ──▶ PlaybackQueue ──▶ AudioSink
//!               (order)           (bounded, async)        (strict order)
//! ```
//!
//! Cancellation is cooperative and immediate: the token is observed at
//! every suspension point, outstanding synthesis calls are aborted, and any
//! in-progress audio is interrupted mid-segment. After `cancel` returns, no
//! further side effects occur for that session.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{SpeechConfig, VoiceConfig};
use crate::dispatcher::{SynthesisDispatcher, synthesize_with_retry};
use crate::error::SpeechError;
use crate::queue::{PlaybackQueue, QueueCommand};
use crate::segment::AudioAsset;
use crate::segmenter::TextSegmenter;
use crate::session::{SessionShared, SessionState};
use crate::sink::AudioSink;
use crate::synth::SpeechSynthesizer;
use crate::text;

// ── Events emitted by the engine ───────────────────────────────────

/// Events emitted by the coordinator to the application layer.
#[derive(Debug, Clone)]
pub enum SpeechEvent {
    /// A session moved to a new state.
    StateChanged {
        /// Session the transition belongs to.
        session_id: String,
        /// The new state.
        state: SessionState,
    },

    /// The sink started rendering a segment.
    SegmentStarted {
        /// Session the segment belongs to.
        session_id: String,
        /// Playback-order position of the segment.
        sequence: u64,
    },

    /// A segment was skipped because synthesis failed terminally.
    SegmentSkipped {
        /// Session the segment belongs to.
        session_id: String,
        /// Playback-order position of the skipped segment.
        sequence: u64,
        /// Why the segment was dropped.
        error: String,
    },

    /// Every accepted segment has been played or skipped.
    SessionFinished {
        /// The finished session.
        session_id: String,
    },

    /// The session was cancelled (explicitly or by supersession).
    SessionCancelled {
        /// The cancelled session.
        session_id: String,
    },

    /// A non-fatal error absorbed by the engine.
    Error {
        /// Session the error belongs to, if any.
        session_id: Option<String>,
        /// Error description.
        message: String,
    },
}

/// Event channel wrapper — emission is best-effort; a dropped receiver is
/// logged once per event rather than treated as a fault.
#[derive(Clone)]
pub(crate) struct EventSender(mpsc::UnboundedSender<SpeechEvent>);

impl EventSender {
    pub(crate) fn emit(&self, event: SpeechEvent) {
        if self.0.send(event).is_err() {
            tracing::warn!("Speech event receiver dropped");
        }
    }
}

// ── Observable state ───────────────────────────────────────────────

/// Snapshot of the observable playback state.
#[derive(Debug, Clone)]
pub struct SpeechStatus {
    /// True while the active session's head segment is not yet ready.
    pub audio_loading: bool,
    /// True while any session is rendering audio through the sink.
    pub audio_playing: bool,
    /// True iff a voice is configured for the current context.
    pub has_audio: bool,
    /// Session currently holding the playback slot, if any.
    pub active_session_id: Option<String>,
}

// ── Active session bookkeeping ─────────────────────────────────────

/// Everything owned on behalf of the one session holding the playback slot.
struct ActiveSession {
    shared: Arc<SessionShared>,
    segmenter: TextSegmenter,
    dispatcher: Option<SynthesisDispatcher>,
    queue_tx: mpsc::UnboundedSender<QueueCommand>,
    cancel: CancellationToken,
    driver: tokio::task::JoinHandle<()>,
    close_notified: bool,
}

// ── Coordinator ────────────────────────────────────────────────────

/// Creates, feeds, and destroys playback sessions; sole owner of the audio
/// sink.
pub struct SpeechCoordinator {
    config: SpeechConfig,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    sink: Arc<dyn AudioSink>,
    active: Mutex<Option<ActiveSession>>,
    events: EventSender,
    oneshot_counter: AtomicU64,
}

impl SpeechCoordinator {
    /// Create a coordinator.
    ///
    /// Returns the coordinator and a receiver for [`SpeechEvent`]s.
    #[must_use]
    pub fn new(
        config: SpeechConfig,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        sink: Arc<dyn AudioSink>,
    ) -> (Self, mpsc::UnboundedReceiver<SpeechEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let coordinator = Self {
            config,
            synthesizer,
            sink,
            active: Mutex::new(None),
            events: EventSender(event_tx),
            oneshot_counter: AtomicU64::new(0),
        };
        (coordinator, event_rx)
    }

    /// Whether a voice is configured for the current context.
    #[must_use]
    pub const fn has_audio(&self) -> bool {
        self.config.has_audio()
    }

    // ── Session lifecycle ──────────────────────────────────────────

    /// Begin a segmented playback session for a chat message id.
    ///
    /// Stops (cancels) any session currently holding the playback slot —
    /// its synthesis too, so no orphaned network work survives. Rejected
    /// when no voice is configured; no session is created in that case.
    pub async fn start(&self, session_id: &str) -> Result<(), SpeechError> {
        let voice = self
            .config
            .voice
            .clone()
            .ok_or(SpeechError::NoVoiceConfigured)?;

        let mut active = self.active.lock().await;
        self.stop_locked(&mut active).await;
        *active = Some(self.spawn_session(session_id.to_string(), Some(voice)));
        info!(session_id, "Speech session started");
        Ok(())
    }

    /// Feed a chunk of streamed reply text into the session.
    ///
    /// Silently ignored when the session is unknown, cancelled, or already
    /// finished. `done = true` closes the text stream, flushing any
    /// trailing fragment as a final segment.
    pub async fn feed(&self, session_id: &str, chunk: &str, done: bool) {
        let mut active = self.active.lock().await;
        let Some(session) = active.as_mut() else {
            return;
        };
        if session.shared.id != session_id || session.shared.state().is_terminal() {
            return;
        }

        for segment in session.segmenter.feed(chunk, done) {
            if let Some(ref dispatcher) = session.dispatcher {
                dispatcher.submit(segment);
            }
        }

        if session.segmenter.is_closed() && !session.close_notified {
            session.close_notified = true;
            let expected = session.segmenter.emitted();
            let _ = session.queue_tx.send(QueueCommand::Closed { expected });
            tracing::debug!(session_id, segments = expected, "Text stream closed");
        }
    }

    /// Close the session's text stream if not already closed. Idempotent —
    /// the trailing segment is never re-emitted.
    pub async fn finish(&self, session_id: &str) {
        self.feed(session_id, "", true).await;
    }

    /// Cancel the given session: abort in-flight synthesis, interrupt the
    /// sink mid-segment, and release the playback slot. Terminal. No-op
    /// when the session is not the active one.
    pub async fn cancel(&self, session_id: &str) {
        let mut active = self.active.lock().await;
        if active.as_ref().is_some_and(|s| s.shared.id == session_id) {
            self.stop_locked(&mut active).await;
        }
    }

    /// Cancel whatever session currently holds the playback slot.
    pub async fn cancel_active(&self) {
        let mut active = self.active.lock().await;
        self.stop_locked(&mut active).await;
    }

    // ── One-shot path ──────────────────────────────────────────────

    /// Speak a complete text (or a pre-synthesized buffer) outside of any
    /// chat stream.
    ///
    /// With `buffer` supplied, the bytes play directly — no synthesis call
    /// is made and `Ok(None)` is returned. Otherwise the whole text is
    /// synthesized as a single segment and the resulting buffer handed
    /// back for the caller to cache. A synthesis failure (after the single
    /// retry) is absorbed: it returns `Ok(None)` and surfaces as an
    /// [`SpeechEvent::Error`], matching the rule that only configuration
    /// failures reject.
    pub async fn play_text(
        &self,
        text: &str,
        buffer: Option<Vec<u8>>,
    ) -> Result<Option<Vec<u8>>, SpeechError> {
        if let Some(bytes) = buffer {
            self.play_prepared(bytes).await;
            return Ok(None);
        }

        let voice = self
            .config
            .voice
            .clone()
            .ok_or(SpeechError::NoVoiceConfigured)?;
        let spoken = text::strip_markdown(text);
        if spoken.is_empty() {
            return Ok(None);
        }

        // Not yet bound to a session — the token exists so the shared
        // retry helper has a (never-fired) cancellation point.
        let cancel = CancellationToken::new();
        match synthesize_with_retry(
            self.synthesizer.as_ref(),
            &voice,
            &spoken,
            self.config.synthesis_timeout,
            self.config.retry_backoff,
            &cancel,
        )
        .await
        {
            Ok(bytes) => {
                self.play_prepared(bytes.clone()).await;
                Ok(Some(bytes))
            }
            Err(e) => {
                warn!(error = %e, "One-shot synthesis failed");
                self.events.emit(SpeechEvent::Error {
                    session_id: None,
                    message: e.to_string(),
                });
                Ok(None)
            }
        }
    }

    /// Play already-synthesized bytes as a single-segment session, going
    /// through the normal queue so exclusivity and cancellation hold.
    async fn play_prepared(&self, bytes: Vec<u8>) {
        let n = self.oneshot_counter.fetch_add(1, Ordering::Relaxed);
        let session_id = format!("oneshot-{n}");

        let mut active = self.active.lock().await;
        self.stop_locked(&mut active).await;

        let mut session = self.spawn_session(session_id, None);
        // No streamed text on this path: close the buffer immediately and
        // hand the queue its one pre-resolved segment.
        let _ = session.segmenter.feed("", true);
        session.close_notified = true;
        let asset = AudioAsset::from_encoded(0, bytes, self.config.approx_bytes_per_sec);
        let _ = session.queue_tx.send(QueueCommand::Accepted { sequence: 0 });
        let _ = session.queue_tx.send(QueueCommand::Resolved {
            sequence: 0,
            outcome: Ok(asset),
        });
        let _ = session.queue_tx.send(QueueCommand::Closed { expected: 1 });
        *active = Some(session);
    }

    // ── Observable state ───────────────────────────────────────────

    /// Snapshot the observable playback state.
    pub async fn status(&self) -> SpeechStatus {
        let active = self.active.lock().await;
        let has_audio = self.config.has_audio();
        active.as_ref().map_or(
            SpeechStatus {
                audio_loading: false,
                audio_playing: false,
                has_audio,
                active_session_id: None,
            },
            |s| SpeechStatus {
                audio_loading: s.shared.loading.load(Ordering::SeqCst),
                audio_playing: s.shared.playing.load(Ordering::SeqCst),
                has_audio,
                active_session_id: Some(s.shared.id.clone()),
            },
        )
    }

    /// State of the given session, if it currently holds the slot.
    pub async fn session_state(&self, session_id: &str) -> Option<SessionState> {
        let active = self.active.lock().await;
        active
            .as_ref()
            .filter(|s| s.shared.id == session_id)
            .map(|s| s.shared.state())
    }

    // ── Internal helpers ───────────────────────────────────────────

    /// Wire up the machinery for a fresh session in `Loading` state.
    fn spawn_session(&self, session_id: String, voice: Option<VoiceConfig>) -> ActiveSession {
        let shared = Arc::new(SessionShared::new(session_id.clone()));
        shared.transition(SessionState::Loading);
        shared.loading.store(true, Ordering::SeqCst);
        self.events.emit(SpeechEvent::StateChanged {
            session_id: session_id.clone(),
            state: SessionState::Loading,
        });

        let cancel = CancellationToken::new();
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        let dispatcher = voice.map(|voice| {
            SynthesisDispatcher::new(
                Arc::clone(&self.synthesizer),
                voice,
                &self.config,
                cancel.clone(),
                queue_tx.clone(),
            )
        });

        let queue = PlaybackQueue::new(
            Arc::clone(&shared),
            Arc::clone(&self.sink),
            cancel.clone(),
            self.events.clone(),
            queue_rx,
        );
        let driver = tokio::spawn(queue.run());

        ActiveSession {
            segmenter: TextSegmenter::new(shared.id.clone(), self.config.min_segment_chars),
            shared,
            dispatcher,
            queue_tx,
            cancel,
            driver,
            close_notified: false,
        }
    }

    /// Tear down the session in `active`, if any: flip the token, cut the
    /// sink, and wait for the driver to unwind so no side effect can
    /// follow. The slot is released on every exit path.
    async fn stop_locked(&self, active: &mut Option<ActiveSession>) {
        let Some(session) = active.take() else {
            return;
        };

        session.cancel.cancel();
        self.sink.interrupt();

        // A session that already finished naturally is not "cancelled";
        // terminal states are sticky, so the transition tells us which
        // ending this was.
        if session.shared.transition(SessionState::Cancelled) {
            self.events.emit(SpeechEvent::StateChanged {
                session_id: session.shared.id.clone(),
                state: SessionState::Cancelled,
            });
            self.events.emit(SpeechEvent::SessionCancelled {
                session_id: session.shared.id.clone(),
            });
        }

        if let Err(e) = session.driver.await {
            warn!(session_id = %session.shared.id, error = %e, "Playback driver ended abnormally");
        }

        session.shared.loading.store(false, Ordering::SeqCst);
        session.shared.playing.store(false, Ordering::SeqCst);
        info!(session_id = %session.shared.id, "Speech session released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullSynth;

    #[async_trait::async_trait]
    impl SpeechSynthesizer for NullSynth {
        async fn synthesize(
            &self,
            _text: &str,
            _voice: &VoiceConfig,
        ) -> Result<Vec<u8>, SpeechError> {
            Ok(vec![0u8])
        }
    }

    struct NullSink;

    #[async_trait::async_trait]
    impl AudioSink for NullSink {
        async fn play(&self, _asset: &AudioAsset) -> Result<(), SpeechError> {
            Ok(())
        }
        fn interrupt(&self) {}
        fn is_playing(&self) -> bool {
            false
        }
    }

    fn coordinator(config: SpeechConfig) -> (SpeechCoordinator, mpsc::UnboundedReceiver<SpeechEvent>) {
        SpeechCoordinator::new(config, Arc::new(NullSynth), Arc::new(NullSink))
    }

    #[tokio::test]
    async fn fresh_coordinator_has_no_session() {
        let (coordinator, _rx) = coordinator(SpeechConfig::default());
        let status = coordinator.status().await;
        assert!(!status.audio_loading);
        assert!(!status.audio_playing);
        assert!(status.active_session_id.is_none());
    }

    #[tokio::test]
    async fn start_without_voice_is_rejected() {
        let (coordinator, _rx) = coordinator(SpeechConfig::default());
        assert!(!coordinator.has_audio());
        let err = coordinator.start("m1").await.unwrap_err();
        assert!(matches!(err, SpeechError::NoVoiceConfigured));
        assert!(coordinator.status().await.active_session_id.is_none());
    }

    #[tokio::test]
    async fn play_text_without_voice_is_rejected() {
        let (coordinator, _rx) = coordinator(SpeechConfig::default());
        let err = coordinator.play_text("Hi", None).await.unwrap_err();
        assert!(matches!(err, SpeechError::NoVoiceConfigured));
    }

    #[tokio::test]
    async fn feed_without_session_is_a_silent_noop() {
        let (coordinator, _rx) = coordinator(SpeechConfig::default());
        coordinator.feed("ghost", "Hello there.", false).await;
        coordinator.finish("ghost").await;
        assert!(coordinator.status().await.active_session_id.is_none());
    }
}
