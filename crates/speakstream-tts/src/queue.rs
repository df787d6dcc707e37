//! Sequential playback driver for one session.
//!
//! Synthesis resolves in arbitrary order; this queue restores total order.
//! It owns the playback cursor and a slot map keyed by sequence number,
//! plays the head segment the moment it is ready, skips heads that failed,
//! and suspends (publishing a loading state) whenever the head is still
//! being synthesized — it never jumps ahead to a later, already-ready
//! segment.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::coordinator::{EventSender, SpeechEvent};
use crate::segment::{AudioAsset, SegmentStatus};
use crate::session::{SessionShared, SessionState};
use crate::sink::AudioSink;

/// A message from the coordinator or a dispatcher task to the queue.
pub(crate) enum QueueCommand {
    /// The segmenter emitted this sequence; synthesis will follow.
    Accepted { sequence: u64 },

    /// A synthesis call for the sequence is now in flight.
    Synthesizing { sequence: u64 },

    /// Synthesis for the sequence finished — audio, or a terminal failure.
    Resolved {
        sequence: u64,
        outcome: Result<AudioAsset, String>,
    },

    /// The text stream closed; `expected` segments were emitted in total.
    Closed { expected: u64 },
}

/// Per-sequence synthesis state, as the queue sees it.
enum Slot {
    Pending,
    Synthesizing,
    Ready(AudioAsset),
    Failed(String),
}

impl Slot {
    const fn status(&self) -> SegmentStatus {
        match self {
            Self::Pending => SegmentStatus::Pending,
            Self::Synthesizing => SegmentStatus::Synthesizing,
            Self::Ready(_) => SegmentStatus::Ready,
            Self::Failed(_) => SegmentStatus::Failed,
        }
    }
}

/// Drives sequential playback for one session until it finishes, is
/// cancelled, or the coordinator drops the command channel.
pub(crate) struct PlaybackQueue {
    shared: Arc<SessionShared>,
    sink: Arc<dyn AudioSink>,
    cancel: CancellationToken,
    events: EventSender,
    rx: mpsc::UnboundedReceiver<QueueCommand>,
}

impl PlaybackQueue {
    pub(crate) fn new(
        shared: Arc<SessionShared>,
        sink: Arc<dyn AudioSink>,
        cancel: CancellationToken,
        events: EventSender,
        rx: mpsc::UnboundedReceiver<QueueCommand>,
    ) -> Self {
        Self {
            shared,
            sink,
            cancel,
            events,
            rx,
        }
    }

    pub(crate) async fn run(mut self) {
        let cancel = self.cancel.clone();
        let mut slots: BTreeMap<u64, Slot> = BTreeMap::new();
        let mut cursor: u64 = 0;
        let mut expected: Option<u64> = None;

        loop {
            // Absorb whatever has already arrived before deciding on the head.
            while let Ok(cmd) = self.rx.try_recv() {
                Self::apply(&mut slots, &mut expected, cmd);
            }

            if cancel.is_cancelled() {
                break;
            }

            // Closed stream fully drained → the session is finished.
            if expected.is_some_and(|total| cursor >= total) {
                self.mark_loading(false);
                if self.shared.transition(SessionState::Finished) {
                    self.events.emit(SpeechEvent::StateChanged {
                        session_id: self.shared.id.clone(),
                        state: SessionState::Finished,
                    });
                }
                self.events.emit(SpeechEvent::SessionFinished {
                    session_id: self.shared.id.clone(),
                });
                tracing::info!(session_id = %self.shared.id, segments = cursor, "Speech session finished");
                return;
            }

            match slots.remove(&cursor) {
                Some(Slot::Ready(asset)) => {
                    self.play_segment(asset).await;
                    if cancel.is_cancelled() {
                        break;
                    }
                    cursor += 1;
                }
                Some(Slot::Failed(error)) => {
                    // Failure isolation: a dead segment is a beat of
                    // silence, never a stalled session.
                    warn!(
                        session_id = %self.shared.id,
                        sequence = cursor,
                        error = %error,
                        "Skipping failed segment"
                    );
                    self.events.emit(SpeechEvent::SegmentSkipped {
                        session_id: self.shared.id.clone(),
                        sequence: cursor,
                        error,
                    });
                    cursor += 1;
                }
                other => {
                    // Head not resolved yet — put it back and wait. Playing
                    // a later ready segment here would break ordering.
                    if let Some(slot) = other {
                        debug!(
                            session_id = %self.shared.id,
                            sequence = cursor,
                            status = ?slot.status(),
                            "Waiting for head segment"
                        );
                        slots.insert(cursor, slot);
                    }
                    self.mark_loading(true);
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        cmd = self.rx.recv() => match cmd {
                            Some(cmd) => Self::apply(&mut slots, &mut expected, cmd),
                            None => break, // coordinator gone — tear down
                        },
                    }
                }
            }
        }

        // Cancelled or torn down. The coordinator owns the Cancelled state
        // transition and event; here we only clear the observable flags.
        self.shared.playing.store(false, Ordering::SeqCst);
        self.shared.loading.store(false, Ordering::SeqCst);
        debug!(
            session_id = %self.shared.id,
            unplayed = slots.len(),
            "Playback queue stopped"
        );
    }

    /// Render one segment through the sink, racing cancellation.
    async fn play_segment(&self, asset: AudioAsset) {
        self.mark_loading(false);
        if self.shared.transition(SessionState::Playing) {
            self.events.emit(SpeechEvent::StateChanged {
                session_id: self.shared.id.clone(),
                state: SessionState::Playing,
            });
        }
        self.shared.playing.store(true, Ordering::SeqCst);
        self.events.emit(SpeechEvent::SegmentStarted {
            session_id: self.shared.id.clone(),
            sequence: asset.sequence,
        });
        debug!(
            session_id = %self.shared.id,
            sequence = asset.sequence,
            bytes = asset.bytes.len(),
            approx_ms = asset.approx_duration.as_millis() as u64,
            "Rendering segment"
        );

        let result = tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                // Cut the sink loose mid-segment; the dropped play future
                // must not leave audio draining on its own.
                self.sink.interrupt();
                Ok(())
            }
            result = self.sink.play(&asset) => result,
        };

        match result {
            Ok(()) => debug!(
                sequence = asset.sequence,
                status = ?SegmentStatus::Played,
                "Segment complete"
            ),
            Err(e) => {
                warn!(sequence = asset.sequence, error = %e, "Sink failed to render segment");
                self.events.emit(SpeechEvent::Error {
                    session_id: Some(self.shared.id.clone()),
                    message: e.to_string(),
                });
            }
        }
        self.shared.playing.store(false, Ordering::SeqCst);
    }

    /// Publish the loading flag, surfacing a `Loading` state transition the
    /// first time a gap opens.
    fn mark_loading(&self, loading: bool) {
        self.shared.loading.store(loading, Ordering::SeqCst);
        if loading && self.shared.transition(SessionState::Loading) {
            self.events.emit(SpeechEvent::StateChanged {
                session_id: self.shared.id.clone(),
                state: SessionState::Loading,
            });
        }
    }

    fn apply(slots: &mut BTreeMap<u64, Slot>, expected: &mut Option<u64>, cmd: QueueCommand) {
        match cmd {
            QueueCommand::Accepted { sequence } => {
                slots.insert(sequence, Slot::Pending);
            }
            QueueCommand::Synthesizing { sequence } => {
                if matches!(slots.get(&sequence), Some(Slot::Pending)) {
                    slots.insert(sequence, Slot::Synthesizing);
                }
            }
            QueueCommand::Resolved { sequence, outcome } => {
                let slot = match outcome {
                    Ok(asset) => Slot::Ready(asset),
                    Err(error) => Slot::Failed(error),
                };
                slots.insert(sequence, slot);
            }
            QueueCommand::Closed { expected: total } => {
                *expected = Some(total);
            }
        }
    }
}
