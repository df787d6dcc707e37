//! Integration tests for the session coordinator.
//!
//! These drive the full engine — segmenter, dispatcher, queue, coordinator —
//! with a scriptable mock synthesizer and a recording mock sink. No real
//! audio hardware or network access is required.
//!
//! # What is tested
//!
//! - Playback order equals sequence order regardless of synthesis order
//! - At most one session renders audio at any instant
//! - Cancellation is terminal and immediate; late results change nothing
//! - The sentence-boundary segmentation of a streamed reply
//! - A failed segment is skipped without stalling its session
//! - `finish` is idempotent and never re-emits the trailing segment
//! - The one-shot path makes exactly one synthesis call and one playback

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;

use speakstream_tts::{
    AudioAsset, AudioSink, SpeechConfig, SpeechCoordinator, SpeechError, SpeechEvent,
    SpeechSynthesizer, VoiceConfig,
};

// ── Mock synthesizer ───────────────────────────────────────────────

/// Synthesizer that returns `AUDIO:<text>` bytes, with per-text scripted
/// delays and failures.
#[derive(Default)]
struct MockSynthesizer {
    calls: AtomicUsize,
    fail_containing: Vec<&'static str>,
    delay_containing: Vec<(&'static str, Duration)>,
}

impl MockSynthesizer {
    fn new() -> Self {
        Self::default()
    }

    fn fail_on(mut self, needle: &'static str) -> Self {
        self.fail_containing.push(needle);
        self
    }

    fn delay_on(mut self, needle: &'static str, delay: Duration) -> Self {
        self.delay_containing.push((needle, delay));
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SpeechSynthesizer for MockSynthesizer {
    async fn synthesize(&self, text: &str, _voice: &VoiceConfig) -> Result<Vec<u8>, SpeechError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some((_, delay)) = self
            .delay_containing
            .iter()
            .find(|(needle, _)| text.contains(needle))
        {
            tokio::time::sleep(*delay).await;
        }
        if self.fail_containing.iter().any(|needle| text.contains(needle)) {
            return Err(SpeechError::Synthesis("scripted failure".to_string()));
        }
        Ok(format!("AUDIO:{text}").into_bytes())
    }
}

// ── Mock sink ──────────────────────────────────────────────────────

/// Sink that records what it rendered and how many renders overlapped.
struct MockSink {
    played: Mutex<Vec<String>>,
    sequences: Mutex<Vec<u64>>,
    concurrent: AtomicUsize,
    max_concurrent: AtomicUsize,
    stop: tokio::sync::Notify,
    play_duration: Duration,
}

impl MockSink {
    fn new(play_duration: Duration) -> Self {
        Self {
            played: Mutex::new(Vec::new()),
            sequences: Mutex::new(Vec::new()),
            concurrent: AtomicUsize::new(0),
            max_concurrent: AtomicUsize::new(0),
            stop: tokio::sync::Notify::new(),
            play_duration,
        }
    }

    fn played(&self) -> Vec<String> {
        self.played.lock().unwrap().clone()
    }

    fn sequences(&self) -> Vec<u64> {
        self.sequences.lock().unwrap().clone()
    }

    fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AudioSink for MockSink {
    async fn play(&self, asset: &AudioAsset) -> Result<(), SpeechError> {
        // Decremented on drop so an interrupted (dropped) play still
        // releases its concurrency slot.
        struct Guard<'a>(&'a AtomicUsize);
        impl Drop for Guard<'_> {
            fn drop(&mut self) {
                self.0.fetch_sub(1, Ordering::SeqCst);
            }
        }

        let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(now, Ordering::SeqCst);
        let _guard = Guard(&self.concurrent);

        self.played
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(&asset.bytes).into_owned());
        self.sequences.lock().unwrap().push(asset.sequence);

        tokio::select! {
            () = self.stop.notified() => {}
            () = tokio::time::sleep(self.play_duration) => {}
        }
        Ok(())
    }

    fn interrupt(&self) {
        self.stop.notify_waiters();
    }

    fn is_playing(&self) -> bool {
        self.concurrent.load(Ordering::SeqCst) > 0
    }
}

// ── Helpers ────────────────────────────────────────────────────────

fn voiced_config() -> SpeechConfig {
    SpeechConfig {
        voice: Some(VoiceConfig::default()),
        max_inflight: 3,
        retry_backoff: Duration::from_millis(5),
        synthesis_timeout: Duration::from_secs(2),
        ..SpeechConfig::default()
    }
}

fn engine(
    config: SpeechConfig,
    synthesizer: &Arc<MockSynthesizer>,
    sink: &Arc<MockSink>,
) -> (SpeechCoordinator, mpsc::UnboundedReceiver<SpeechEvent>) {
    SpeechCoordinator::new(
        config,
        Arc::clone(synthesizer) as Arc<dyn SpeechSynthesizer>,
        Arc::clone(sink) as Arc<dyn AudioSink>,
    )
}

/// Wait (bounded) for the first event matching `pred`, discarding others.
async fn await_event(
    rx: &mut mpsc::UnboundedReceiver<SpeechEvent>,
    pred: impl Fn(&SpeechEvent) -> bool,
) -> SpeechEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

fn is_finished(event: &SpeechEvent, id: &str) -> bool {
    matches!(event, SpeechEvent::SessionFinished { session_id } if session_id == id)
}

// ── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn playback_order_matches_sequence_order() {
    let synth = Arc::new(
        MockSynthesizer::new().delay_on("sluggish", Duration::from_millis(80)),
    );
    let sink = Arc::new(MockSink::new(Duration::from_millis(5)));
    let (coordinator, mut rx) = engine(voiced_config(), &synth, &sink);

    coordinator.start("chat-1").await.unwrap();
    // Segment 0 resolves last; 1 and 2 are ready long before it.
    coordinator.feed("chat-1", "This opening sentence is sluggish. ", false).await;
    coordinator.feed("chat-1", "A second sentence follows along. ", false).await;
    coordinator.feed("chat-1", "The third one wraps it up.", true).await;

    await_event(&mut rx, |e| is_finished(e, "chat-1")).await;

    assert_eq!(sink.sequences(), vec![0, 1, 2]);
    assert_eq!(
        sink.played(),
        vec![
            "AUDIO:This opening sentence is sluggish.",
            "AUDIO:A second sentence follows along.",
            "AUDIO:The third one wraps it up.",
        ]
    );
}

#[tokio::test]
async fn at_most_one_session_renders_audio() {
    let synth = Arc::new(MockSynthesizer::new());
    // Long enough that the first session is still mid-segment when the
    // second one starts.
    let sink = Arc::new(MockSink::new(Duration::from_millis(300)));
    let (coordinator, mut rx) = engine(voiced_config(), &synth, &sink);

    coordinator.start("chat-a").await.unwrap();
    coordinator.feed("chat-a", "The first message speaks now.", true).await;
    await_event(&mut rx, |e| {
        matches!(e, SpeechEvent::SegmentStarted { session_id, .. } if session_id == "chat-a")
    })
    .await;

    // Starting a second session mid-playback must stop the first.
    coordinator.start("chat-b").await.unwrap();
    await_event(&mut rx, |e| {
        matches!(e, SpeechEvent::SessionCancelled { session_id } if session_id == "chat-a")
    })
    .await;

    coordinator.feed("chat-b", "The second message takes over.", true).await;
    await_event(&mut rx, |e| is_finished(e, "chat-b")).await;

    assert_eq!(sink.max_concurrent(), 1);
    assert_eq!(
        coordinator.status().await.active_session_id.as_deref(),
        Some("chat-b")
    );
}

#[tokio::test]
async fn cancellation_is_terminal_and_immediate() {
    let synth = Arc::new(
        MockSynthesizer::new().delay_on("never", Duration::from_millis(150)),
    );
    let sink = Arc::new(MockSink::new(Duration::from_millis(5)));
    let (coordinator, _rx) = engine(voiced_config(), &synth, &sink);

    coordinator.start("chat-1").await.unwrap();
    coordinator.feed("chat-1", "This reply will never be heard.", true).await;
    coordinator.cancel("chat-1").await;

    assert!(coordinator.status().await.active_session_id.is_none());
    let calls_at_cancel = synth.calls();

    // Give the aborted synthesis ample time to have resolved late; a late
    // result must not resurrect playback, and dead sessions ignore feeds.
    coordinator.feed("chat-1", "More text after cancellation.", false).await;
    tokio::time::sleep(Duration::from_millis(250)).await;

    assert!(sink.played().is_empty());
    assert_eq!(synth.calls(), calls_at_cancel);
    assert!(!sink.is_playing());
}

#[tokio::test]
async fn streamed_reply_segments_at_sentence_boundaries() {
    let synth = Arc::new(MockSynthesizer::new());
    let sink = Arc::new(MockSink::new(Duration::from_millis(2)));
    let (coordinator, mut rx) = engine(voiced_config(), &synth, &sink);

    coordinator.start("chat-1").await.unwrap();
    coordinator.feed("chat-1", "Hello world. How are", false).await;
    coordinator.feed("chat-1", " you? Fine.", true).await;

    await_event(&mut rx, |e| is_finished(e, "chat-1")).await;

    assert_eq!(synth.calls(), 2);
    assert_eq!(
        sink.played(),
        vec!["AUDIO:Hello world.", "AUDIO:How are you? Fine."]
    );
}

#[tokio::test]
async fn failed_segment_is_skipped_in_order() {
    let synth = Arc::new(MockSynthesizer::new().fail_on("doomed"));
    let sink = Arc::new(MockSink::new(Duration::from_millis(2)));
    let (coordinator, mut rx) = engine(voiced_config(), &synth, &sink);

    coordinator.start("chat-1").await.unwrap();
    coordinator.feed("chat-1", "The first segment plays fine. ", false).await;
    coordinator.feed("chat-1", "This doomed segment never will. ", false).await;
    coordinator.feed("chat-1", "The third still gets spoken.", true).await;

    let skipped = await_event(&mut rx, |e| {
        matches!(e, SpeechEvent::SegmentSkipped { .. })
    })
    .await;
    assert!(
        matches!(skipped, SpeechEvent::SegmentSkipped { sequence: 1, .. }),
        "expected sequence 1 to be skipped, got {skipped:?}"
    );

    await_event(&mut rx, |e| is_finished(e, "chat-1")).await;

    assert_eq!(sink.sequences(), vec![0, 2]);
    assert_eq!(
        sink.played(),
        vec![
            "AUDIO:The first segment plays fine.",
            "AUDIO:The third still gets spoken.",
        ]
    );
    // One failure, one retry, two successes.
    assert_eq!(synth.calls(), 4);
}

#[tokio::test]
async fn finish_is_idempotent() {
    let synth = Arc::new(MockSynthesizer::new());
    let sink = Arc::new(MockSink::new(Duration::from_millis(2)));
    let (coordinator, mut rx) = engine(voiced_config(), &synth, &sink);

    coordinator.start("chat-1").await.unwrap();
    coordinator.feed("chat-1", "A trailing fragment with no boundary", false).await;
    coordinator.finish("chat-1").await;
    coordinator.finish("chat-1").await;

    await_event(&mut rx, |e| is_finished(e, "chat-1")).await;
    coordinator.finish("chat-1").await;

    // Exactly one segment, synthesized exactly once.
    assert_eq!(synth.calls(), 1);
    assert_eq!(
        sink.played(),
        vec!["AUDIO:A trailing fragment with no boundary"]
    );

    // And no second SessionFinished from the extra finish calls.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut extra_finished = 0;
    while let Ok(event) = rx.try_recv() {
        if is_finished(&event, "chat-1") {
            extra_finished += 1;
        }
    }
    assert_eq!(extra_finished, 0);
}

#[tokio::test]
async fn one_shot_play_text_synthesizes_once() {
    let synth = Arc::new(MockSynthesizer::new());
    let sink = Arc::new(MockSink::new(Duration::from_millis(2)));
    let (coordinator, mut rx) = engine(voiced_config(), &synth, &sink);

    let buffer = coordinator.play_text("Hi", None).await.unwrap();
    assert_eq!(buffer.as_deref(), Some(b"AUDIO:Hi".as_slice()));

    await_event(&mut rx, |e| matches!(e, SpeechEvent::SessionFinished { .. })).await;

    assert_eq!(synth.calls(), 1);
    assert_eq!(sink.played(), vec!["AUDIO:Hi"]);
}

#[tokio::test]
async fn one_shot_with_buffer_skips_synthesis() {
    let synth = Arc::new(MockSynthesizer::new());
    let sink = Arc::new(MockSink::new(Duration::from_millis(2)));
    let (coordinator, mut rx) = engine(voiced_config(), &synth, &sink);

    let returned = coordinator
        .play_text("ignored", Some(b"PREMADE".to_vec()))
        .await
        .unwrap();
    assert!(returned.is_none());

    await_event(&mut rx, |e| matches!(e, SpeechEvent::SessionFinished { .. })).await;

    assert_eq!(synth.calls(), 0);
    assert_eq!(sink.played(), vec!["PREMADE"]);
}

#[tokio::test]
async fn head_gap_reports_loading_until_ready() {
    let synth = Arc::new(
        MockSynthesizer::new().delay_on("sluggish", Duration::from_millis(120)),
    );
    let sink = Arc::new(MockSink::new(Duration::from_millis(2)));
    let (coordinator, mut rx) = engine(voiced_config(), &synth, &sink);

    coordinator.start("chat-1").await.unwrap();
    coordinator.feed("chat-1", "A sluggish head segment here.", true).await;

    // While the head synthesizes, the session is observably loading.
    tokio::time::sleep(Duration::from_millis(30)).await;
    let status = coordinator.status().await;
    assert!(status.audio_loading);
    assert!(!status.audio_playing);

    await_event(&mut rx, |e| is_finished(e, "chat-1")).await;
    let status = coordinator.status().await;
    assert!(!status.audio_loading);
    assert!(!status.audio_playing);
    assert_eq!(sink.sequences(), vec![0]);
}
