//! Audio output sink — the exclusive resource that actually renders sound.
//!
//! The [`AudioSink`] trait decouples the playback queue from any specific
//! audio backend. The bundled [`RodioSink`] confines `rodio`'s
//! `OutputStream` (which is `!Send` on some platforms) to a dedicated OS
//! thread and proxies every operation through a command channel, so the
//! handle itself is naturally `Send + Sync` without any `unsafe` impls.

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;

use rodio::{Decoder, OutputStream, Sink};
use tokio::sync::oneshot;

use crate::error::SpeechError;
use crate::segment::AudioAsset;

/// Abstraction over the audio output device.
///
/// Object-safe (`Arc<dyn AudioSink>`); all methods take `&self`, with
/// interior mutability handling state inside each implementation. Playback
/// is strictly serial: the coordinator never issues a second `play` before
/// the previous one resolved.
#[async_trait::async_trait]
pub trait AudioSink: Send + Sync {
    /// Render one asset, resolving when the audio finished playing or was
    /// interrupted via [`interrupt`](Self::interrupt).
    async fn play(&self, asset: &AudioAsset) -> Result<(), SpeechError>;

    /// Abort any in-progress playback immediately. The pending
    /// [`play`](Self::play) future resolves promptly.
    fn interrupt(&self);

    /// Whether audio is currently being rendered.
    fn is_playing(&self) -> bool;
}

// ── Rodio-backed local sink ────────────────────────────────────────

/// A command sent from the handle to the audio thread.
enum SinkCommand {
    /// Decode and render the given bytes, signalling `done` on completion
    /// or interruption.
    Play {
        bytes: Vec<u8>,
        done: oneshot::Sender<Result<(), SpeechError>>,
    },

    /// Stop the active playback (fire-and-forget).
    Interrupt,

    /// Shut down the audio thread, releasing the output device.
    Shutdown,
}

/// Local audio sink backed by `rodio` on a dedicated OS thread.
pub struct RodioSink {
    cmd_tx: mpsc::Sender<SinkCommand>,
    playing: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl RodioSink {
    /// Spawn the audio thread and open the default output device.
    ///
    /// Device errors are propagated back through a one-shot init channel.
    pub fn new() -> Result<Self, SpeechError> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<SinkCommand>();
        let (init_tx, init_rx) = mpsc::channel::<Result<(), SpeechError>>();
        let playing = Arc::new(AtomicBool::new(false));
        let playing_for_thread = Arc::clone(&playing);

        let thread = thread::Builder::new()
            .name("speakstream-audio".into())
            .spawn(move || run_audio_thread(&cmd_rx, &init_tx, &playing_for_thread))
            .map_err(|e| SpeechError::Sink(format!("failed to spawn audio thread: {e}")))?;

        init_rx
            .recv()
            .map_err(|_| SpeechError::Sink("audio thread died during init".to_string()))??;

        Ok(Self {
            cmd_tx,
            playing,
            thread: Some(thread),
        })
    }
}

#[async_trait::async_trait]
impl AudioSink for RodioSink {
    async fn play(&self, asset: &AudioAsset) -> Result<(), SpeechError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.cmd_tx
            .send(SinkCommand::Play {
                bytes: asset.bytes.clone(),
                done: done_tx,
            })
            .map_err(|_| SpeechError::Sink("audio thread died".to_string()))?;
        done_rx
            .await
            .map_err(|_| SpeechError::Sink("audio thread died mid-playback".to_string()))?
    }

    fn interrupt(&self) {
        let _ = self.cmd_tx.send(SinkCommand::Interrupt);
        self.playing.store(false, Ordering::SeqCst);
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
}

impl Drop for RodioSink {
    fn drop(&mut self) {
        // Best-effort shutdown — the thread may already be dead.
        let _ = self.cmd_tx.send(SinkCommand::Shutdown);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// The body of the dedicated audio thread. Owns the `OutputStream` for its
/// entire lifetime — it never crosses a thread boundary.
fn run_audio_thread(
    cmd_rx: &mpsc::Receiver<SinkCommand>,
    init_tx: &mpsc::Sender<Result<(), SpeechError>>,
    playing: &Arc<AtomicBool>,
) {
    let (stream, stream_handle) = match OutputStream::try_default() {
        Ok(pair) => pair,
        Err(e) => {
            let _ = init_tx.send(Err(SpeechError::Sink(e.to_string())));
            return;
        }
    };
    // Must stay alive for the device to keep producing sound.
    let _stream = stream;

    if init_tx.send(Ok(())).is_err() {
        return; // caller dropped
    }

    let mut current: Option<Arc<Sink>> = None;

    while let Ok(cmd) = cmd_rx.recv() {
        match cmd {
            SinkCommand::Play { bytes, done } => {
                // A new play always preempts whatever is still draining.
                if let Some(old) = current.take() {
                    old.stop();
                }

                let sink = match Sink::try_new(&stream_handle) {
                    Ok(sink) => sink,
                    Err(e) => {
                        let _ = done.send(Err(SpeechError::Sink(e.to_string())));
                        continue;
                    }
                };
                let source = match Decoder::new(Cursor::new(bytes)) {
                    Ok(source) => source,
                    Err(e) => {
                        let _ = done.send(Err(SpeechError::Sink(format!(
                            "undecodable audio: {e}"
                        ))));
                        continue;
                    }
                };
                sink.append(source);

                let sink = Arc::new(sink);
                current = Some(Arc::clone(&sink));
                playing.store(true, Ordering::SeqCst);

                // Watcher thread: `sleep_until_end` returns when the queue
                // drains naturally or `stop()` drops the sources, so the
                // completion signal fires on both paths.
                let playing = Arc::clone(playing);
                thread::spawn(move || {
                    sink.sleep_until_end();
                    playing.store(false, Ordering::SeqCst);
                    let _ = done.send(Ok(()));
                });
            }

            SinkCommand::Interrupt => {
                if let Some(sink) = current.take() {
                    sink.stop();
                }
                playing.store(false, Ordering::SeqCst);
            }

            SinkCommand::Shutdown => break,
        }
    }

    if let Some(sink) = current.take() {
        sink.stop();
    }
    tracing::debug!("Audio thread shutting down");
}
