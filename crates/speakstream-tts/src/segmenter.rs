//! Incremental sentence segmentation of a streaming chat reply.
//!
//! Text arrives in arbitrary chunks; the segmenter buffers it and cuts
//! complete, playable segments at sentence boundaries so that synthesis can
//! start long before the full reply exists. Emission order always equals
//! arrival order — the segmenter never reorders.

use crate::segment::Segment;
use crate::text;

/// Sentence terminators that need a following whitespace character to count
/// as a boundary (protects decimals like `2.5` and mid-token dots).
const ASCII_TERMINATORS: &[char] = &['.', '!', '?', ';'];

/// Fullwidth terminators that are boundaries on their own — CJK text does
/// not put spaces after sentence punctuation.
const CJK_TERMINATORS: &[char] = &['。', '！', '？', '；'];

/// Per-session text buffer that turns an incremental chunk stream into an
/// ordered sequence of complete segments.
///
/// One instance exists per playback session and is mutated only through
/// [`feed`](Self::feed). Once closed (a feed with `done = true`), every
/// further feed is a no-op.
pub struct TextSegmenter {
    session_id: String,
    pending: String,
    closed: bool,
    next_sequence: u64,
    min_chars: usize,
}

impl TextSegmenter {
    /// Create an open buffer for `session_id`.
    #[must_use]
    pub fn new(session_id: impl Into<String>, min_chars: usize) -> Self {
        Self {
            session_id: session_id.into(),
            pending: String::new(),
            closed: false,
            next_sequence: 0,
            min_chars,
        }
    }

    /// Append a chunk and return any newly completed segments.
    ///
    /// Without `done`, at most one segment is emitted per call: everything
    /// up to and including the *last* boundary in the buffer, provided that
    /// prefix is at least `min_chars` characters long. With `done`, the
    /// whole remaining buffer is flushed as one final segment regardless of
    /// length and the buffer closes for good.
    pub fn feed(&mut self, chunk: &str, done: bool) -> Vec<Segment> {
        if self.closed {
            return Vec::new();
        }
        self.pending.push_str(chunk);

        let mut emitted = Vec::new();
        if done {
            self.closed = true;
            let rest = std::mem::take(&mut self.pending);
            self.emit(&rest, &mut emitted);
        } else if let Some(cut) = self.last_boundary() {
            let head: String = self.pending.drain(..cut).collect();
            self.emit(&head, &mut emitted);
        }
        emitted
    }

    /// Close the buffer, flushing any trailing fragment. Idempotent.
    pub fn close(&mut self) -> Vec<Segment> {
        self.feed("", true)
    }

    /// Whether the buffer has been closed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of segments emitted so far (== the next sequence number).
    #[must_use]
    pub const fn emitted(&self) -> u64 {
        self.next_sequence
    }

    /// Byte offset just past the last usable boundary, or `None` when the
    /// buffer holds no boundary at least `min_chars` characters in.
    fn last_boundary(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        let mut chars_seen = 0usize;
        let mut iter = self.pending.char_indices().peekable();

        while let Some((idx, c)) = iter.next() {
            chars_seen += 1;
            let boundary = if c == '\n' || CJK_TERMINATORS.contains(&c) {
                true
            } else if ASCII_TERMINATORS.contains(&c) {
                // Needs a confirmed following whitespace; a terminator at
                // the very end of the buffer may still be mid-number or
                // mid-token, so it waits for the next chunk.
                iter.peek().is_some_and(|&(_, next)| next.is_whitespace())
            } else {
                false
            };
            if boundary && chars_seen >= self.min_chars {
                best = Some(idx + c.len_utf8());
            }
        }
        best
    }

    /// Strip the raw slice to spoken text and emit it, consuming the next
    /// sequence number. All-formatting slices vanish without using one.
    fn emit(&mut self, raw: &str, out: &mut Vec<Segment>) {
        let spoken = text::strip_markdown(raw);
        if spoken.is_empty() {
            return;
        }
        let segment = Segment {
            sequence: self.next_sequence,
            text: spoken,
        };
        tracing::debug!(
            session_id = %self.session_id,
            sequence = segment.sequence,
            chars = segment.text.chars().count(),
            "Segment emitted"
        );
        self.next_sequence += 1;
        out.push(segment);
    }
}
