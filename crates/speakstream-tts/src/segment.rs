//! Segment value types — the units of synthesis and playback.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A contiguous, independently synthesizable unit of text with a fixed
/// position in playback order.
///
/// Sequence numbers are assigned monotonically at segmentation time and
/// never reused; they define the total playback order of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Playback-order position within the session.
    pub sequence: u64,

    /// The spoken text (markdown already stripped).
    pub text: String,
}

/// Lifecycle of a single segment.
///
/// A segment may reach `Ready` out of order relative to its siblings, but
/// the playback queue only ever moves the *head* segment into `Playing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentStatus {
    /// Emitted by the segmenter, waiting for a synthesis slot.
    Pending,

    /// A synthesis call is in flight.
    Synthesizing,

    /// Audio is available and the segment is waiting for its turn.
    Ready,

    /// The sink is rendering this segment.
    Playing,

    /// The sink finished rendering this segment.
    Played,

    /// Synthesis failed after its retry; skipped at playback time.
    Failed,

    /// The session was cancelled before this segment resolved.
    Cancelled,
}

/// Synthesized audio for one segment. Immutable after creation.
#[derive(Debug, Clone)]
pub struct AudioAsset {
    /// Sequence of the segment this audio belongs to.
    pub sequence: u64,

    /// Encoded audio bytes as returned by the synthesis endpoint.
    pub bytes: Vec<u8>,

    /// Rough duration estimate, for logging only (the bytes are opaque).
    pub approx_duration: Duration,
}

impl AudioAsset {
    /// Wrap encoded bytes, estimating duration from a byte-rate hint.
    #[must_use]
    pub fn from_encoded(sequence: u64, bytes: Vec<u8>, approx_bytes_per_sec: u32) -> Self {
        let rate = u64::from(approx_bytes_per_sec.max(1));
        let approx_duration = Duration::from_millis(bytes.len() as u64 * 1000 / rate);
        Self {
            sequence,
            bytes,
            approx_duration,
        }
    }
}
