//! Synthesis dispatch — bounded fan-out of per-segment synthesis calls.
//!
//! Each submitted segment becomes a spawned task that acquires a semaphore
//! permit (bounding in-flight calls per session), runs the synthesis call
//! under a timeout, retries once on failure, and reports the outcome to the
//! session's playback queue. Results may resolve in any order; the queue
//! restores playback order.
//!
//! Every await point races the session's cancellation token. A cancelled
//! session's in-flight calls are dropped immediately and any result that
//! still manages to resolve is discarded — nothing can resurrect playback
//! after cancellation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::{SpeechConfig, VoiceConfig};
use crate::error::SpeechError;
use crate::queue::QueueCommand;
use crate::segment::{AudioAsset, Segment};
use crate::synth::SpeechSynthesizer;

/// Dispatches synthesis calls for one session.
pub(crate) struct SynthesisDispatcher {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    voice: VoiceConfig,
    semaphore: Arc<Semaphore>,
    synthesis_timeout: Duration,
    retry_backoff: Duration,
    approx_bytes_per_sec: u32,
    cancel: CancellationToken,
    queue_tx: mpsc::UnboundedSender<QueueCommand>,
}

impl SynthesisDispatcher {
    pub(crate) fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        voice: VoiceConfig,
        config: &SpeechConfig,
        cancel: CancellationToken,
        queue_tx: mpsc::UnboundedSender<QueueCommand>,
    ) -> Self {
        Self {
            synthesizer,
            voice,
            semaphore: Arc::new(Semaphore::new(config.max_inflight.max(1))),
            synthesis_timeout: config.synthesis_timeout,
            retry_backoff: config.retry_backoff,
            approx_bytes_per_sec: config.approx_bytes_per_sec,
            cancel,
            queue_tx,
        }
    }

    /// Accept a segment and start (or queue) its synthesis.
    ///
    /// The queue learns about the segment before the synthesis task exists,
    /// so a slot is always registered ahead of its resolution.
    pub(crate) fn submit(&self, segment: Segment) {
        let _ = self.queue_tx.send(QueueCommand::Accepted {
            sequence: segment.sequence,
        });

        let synthesizer = Arc::clone(&self.synthesizer);
        let voice = self.voice.clone();
        let semaphore = Arc::clone(&self.semaphore);
        let cancel = self.cancel.clone();
        let queue_tx = self.queue_tx.clone();
        let timeout = self.synthesis_timeout;
        let backoff = self.retry_backoff;
        let bytes_per_sec = self.approx_bytes_per_sec;

        tokio::spawn(async move {
            let _permit = tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return, // semaphore closed — session torn down
                },
            };

            let _ = queue_tx.send(QueueCommand::Synthesizing {
                sequence: segment.sequence,
            });

            let outcome = match synthesize_with_retry(
                synthesizer.as_ref(),
                &voice,
                &segment.text,
                timeout,
                backoff,
                &cancel,
            )
            .await
            {
                Ok(bytes) => Ok(AudioAsset::from_encoded(
                    segment.sequence,
                    bytes,
                    bytes_per_sec,
                )),
                Err(SpeechError::Cancelled) => return,
                Err(e) => {
                    warn!(
                        sequence = segment.sequence,
                        error = %e,
                        "Synthesis failed after retry — segment will be skipped"
                    );
                    Err(e.to_string())
                }
            };

            // A result that resolves after cancellation is discarded; the
            // queue for a cancelled session is gone anyway.
            if cancel.is_cancelled() {
                return;
            }
            let _ = queue_tx.send(QueueCommand::Resolved {
                sequence: segment.sequence,
                outcome,
            });
        });
    }
}

/// Run one synthesis call with a per-call timeout, retrying exactly once
/// after a short backoff. Returns [`SpeechError::Cancelled`] the moment the
/// token fires, dropping any in-flight call.
pub(crate) async fn synthesize_with_retry(
    synthesizer: &dyn SpeechSynthesizer,
    voice: &VoiceConfig,
    text: &str,
    timeout: Duration,
    backoff: Duration,
    cancel: &CancellationToken,
) -> Result<Vec<u8>, SpeechError> {
    let mut last_error = SpeechError::Synthesis("no synthesis attempt made".to_string());

    for attempt in 1..=2u32 {
        if attempt > 1 {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(SpeechError::Cancelled),
                () = tokio::time::sleep(backoff) => {}
            }
        }

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(SpeechError::Cancelled),
            result = tokio::time::timeout(timeout, synthesizer.synthesize(text, voice)) => result,
        };

        match result {
            Ok(Ok(bytes)) => return Ok(bytes),
            Ok(Err(e)) => {
                warn!(attempt, error = %e, "Synthesis attempt failed");
                last_error = e;
            }
            Err(_elapsed) => {
                warn!(attempt, timeout_ms = timeout.as_millis() as u64, "Synthesis attempt timed out");
                last_error = SpeechError::Timeout(timeout);
            }
        }
    }

    Err(last_error)
}
