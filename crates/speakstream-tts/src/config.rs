//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The voice used for synthesis, resolved from the active chat context.
///
/// Absence of a `VoiceConfig` means spoken playback is disabled for the
/// context (`has_audio == false`) and any attempt to start a session is
/// rejected up front.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// Synthesis model identifier sent to the endpoint.
    pub model: String,

    /// Voice identifier (endpoint-specific meaning, e.g. `"alloy"`).
    pub voice: String,

    /// Speaking speed multiplier (0.5–2.0, default 1.0).
    pub speed: f32,

    /// Bearer credential for the synthesis endpoint, if it requires one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            model: "tts-1".to_string(),
            voice: "alloy".to_string(),
            speed: 1.0,
            api_key: None,
        }
    }
}

/// Configuration for the speech playback engine.
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    /// Synthesis endpoint URL (`text in, audio bytes out`).
    pub endpoint: String,

    /// Voice for the current context; `None` disables spoken playback.
    pub voice: Option<VoiceConfig>,

    /// Minimum segment length, in characters. Boundaries closer to the
    /// start of the pending text than this are ignored so that tiny
    /// fragments don't each pay a synthesis round trip.
    pub min_segment_chars: usize,

    /// Maximum synthesis calls in flight per session.
    pub max_inflight: usize,

    /// Per-call synthesis budget.
    pub synthesis_timeout: Duration,

    /// Pause before the single retry of a failed synthesis call.
    pub retry_backoff: Duration,

    /// Rough encoded-audio byte rate used to estimate segment durations
    /// for logging. The endpoint returns opaque bytes, so this is only a
    /// hint.
    pub approx_bytes_per_sec: u32,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8080/v1/audio/speech".to_string(),
            voice: None,
            min_segment_chars: 10,
            max_inflight: 2,
            synthesis_timeout: Duration::from_secs(30),
            retry_backoff: Duration::from_millis(500),
            approx_bytes_per_sec: 12_000,
        }
    }
}

impl SpeechConfig {
    /// Whether a voice is configured for the current context.
    #[must_use]
    pub const fn has_audio(&self) -> bool {
        self.voice.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_voice() {
        let config = SpeechConfig::default();
        assert!(!config.has_audio());
        assert_eq!(config.max_inflight, 2);
        assert_eq!(config.min_segment_chars, 10);
    }

    #[test]
    fn voice_presence_drives_has_audio() {
        let config = SpeechConfig {
            voice: Some(VoiceConfig::default()),
            ..SpeechConfig::default()
        };
        assert!(config.has_audio());
    }
}
