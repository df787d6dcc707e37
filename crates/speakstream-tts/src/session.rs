//! Session state machine and the shared handle observed by status queries.

use std::sync::Mutex;
use std::sync::atomic::AtomicBool;

use serde::{Deserialize, Serialize};

/// Current state of one playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Constructed but not yet driving playback.
    Idle,

    /// Waiting for the head segment's audio.
    Loading,

    /// The sink is rendering a segment.
    Playing,

    /// Text stream closed and every accepted segment played or skipped.
    Finished,

    /// Cancelled (explicitly, or superseded by a newer session). Terminal.
    Cancelled,
}

impl SessionState {
    /// Whether the session can never leave this state again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled)
    }
}

/// State shared between the coordinator and the session's playback driver.
///
/// The mutex guards only the state enum and is never held across an await
/// point; the booleans back the `audio_loading` / `audio_playing` status
/// flags and are read lock-free.
pub(crate) struct SessionShared {
    /// Session id (= id of the chat message being spoken).
    pub(crate) id: String,

    /// Current state machine position.
    state: Mutex<SessionState>,

    /// True while the head segment is not yet ready to play.
    pub(crate) loading: AtomicBool,

    /// True while the sink is rendering a segment of this session.
    pub(crate) playing: AtomicBool,
}

impl SessionShared {
    pub(crate) fn new(id: String) -> Self {
        Self {
            id,
            state: Mutex::new(SessionState::Idle),
            loading: AtomicBool::new(false),
            playing: AtomicBool::new(false),
        }
    }

    /// Read the current state.
    pub(crate) fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }

    /// Move to `new` unless already there or in a terminal state.
    ///
    /// Returns true when the state actually changed, so callers emit a
    /// state-change event exactly once per transition. Terminal states win
    /// every race: a driver that is still unwinding cannot drag a
    /// cancelled session back to `Loading`.
    pub(crate) fn transition(&self, new: SessionState) -> bool {
        let mut state = self.state.lock().unwrap();
        if *state == new || state.is_terminal() {
            return false;
        }
        tracing::debug!(session_id = %self.id, old = ?*state, new = ?new, "Session state transition");
        *state = new;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_report_change() {
        let shared = SessionShared::new("s1".to_string());
        assert_eq!(shared.state(), SessionState::Idle);
        assert!(shared.transition(SessionState::Loading));
        assert!(!shared.transition(SessionState::Loading));
        assert!(shared.transition(SessionState::Playing));
    }

    #[test]
    fn terminal_states_are_sticky() {
        let shared = SessionShared::new("s1".to_string());
        assert!(shared.transition(SessionState::Cancelled));
        assert!(!shared.transition(SessionState::Loading));
        assert!(!shared.transition(SessionState::Playing));
        assert_eq!(shared.state(), SessionState::Cancelled);
    }

    #[test]
    fn finished_is_terminal() {
        assert!(SessionState::Finished.is_terminal());
        assert!(SessionState::Cancelled.is_terminal());
        assert!(!SessionState::Playing.is_terminal());
    }
}
