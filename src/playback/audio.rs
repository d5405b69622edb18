//! Audio playback primitive: plays one narration clip to completion and
//! absorbs every failure, plus short synthesized cues (tick loop, correct
//! chime, finalization chime) on detached sinks.
//!
//! Backed by rodio. The output stream is not `Send`, so a keeper thread owns
//! it for the player's lifetime and the rest of the code only touches the
//! cloneable stream handle and `Sink`s.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use rodio::{buffer::SamplesBuffer, Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use tracing::{debug, warn};

use crate::media::AudioHandle;

const SAMPLE_RATE: u32 = 44_100;

/// How often an in-flight play checks for completion or interruption.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Fire-and-forget sound cues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    /// Played exactly once when the correct answer is revealed.
    Correct,
    /// Played when the finalization screen appears.
    Finalize,
}

/// Plays narration clips and cues. All methods absorb failure: a clip that
/// cannot be decoded or a missing audio device is logged and treated as
/// "playback finished" so the show always advances.
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    /// Play a clip to completion. Resolves on natural end, on playback error
    /// (logged), immediately for an empty handle, or promptly after
    /// [`AudioPlayer::stop_all`]. Never returns an error.
    async fn play(&self, handle: &AudioHandle);

    /// Interrupt the clip currently playing, if any. Idempotent.
    fn stop_all(&self);

    /// Start the looping countdown tick. Re-arms if already running.
    fn start_tick(&self);

    /// Stop the countdown tick. Idempotent.
    fn stop_tick(&self);

    /// Fire a short cue without blocking.
    fn cue(&self, cue: Cue);
}

/// rodio-backed [`AudioPlayer`]. When no output device exists the player
/// degrades to timed silence of each clip's estimated duration.
pub struct RodioPlayer {
    handle: Option<OutputStreamHandle>,
    current: Mutex<Option<Arc<Sink>>>,
    tick: Mutex<Option<Sink>>,
    interrupted: AtomicBool,
    // Dropping this ends the keeper thread holding the output stream.
    _shutdown_tx: Option<mpsc::Sender<()>>,
}

impl RodioPlayer {
    /// Create a player, degrading to silent mode if audio is unavailable.
    pub fn new() -> Self {
        let (handle_tx, handle_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || match OutputStream::try_default() {
                Ok((stream, handle)) => {
                    let _ = handle_tx.send(Some(handle));
                    // Keep the stream alive until the player is dropped.
                    let _stream = stream;
                    let _ = shutdown_rx.recv();
                }
                Err(e) => {
                    warn!("No audio output device, show runs silent: {}", e);
                    let _ = handle_tx.send(None);
                }
            })
            .ok();

        let handle = handle_rx.recv().ok().flatten();
        if handle.is_some() {
            debug!("Audio output stream initialized");
        }

        Self {
            handle,
            current: Mutex::new(None),
            tick: Mutex::new(None),
            interrupted: AtomicBool::new(false),
            _shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Whether a real output device was acquired.
    pub fn has_output(&self) -> bool {
        self.handle.is_some()
    }

    /// Rough clip length from the encoded size (128 kbps MP3), used to pace
    /// the show when running silent.
    fn estimated_duration(len: usize) -> Duration {
        Duration::from_secs_f64((len as f64 / 16_000.0).clamp(0.4, 30.0))
    }

    async fn play_silent(&self, len: usize) {
        let total = Self::estimated_duration(len);
        debug!("Silent playback for {:.1}s", total.as_secs_f64());
        let mut elapsed = Duration::ZERO;
        while elapsed < total {
            if self.interrupted.load(Ordering::Relaxed) {
                return;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
            elapsed += POLL_INTERVAL;
        }
    }

    fn fire_samples(&self, samples: Vec<f32>) {
        let Some(handle) = &self.handle else {
            return;
        };
        match Sink::try_new(handle) {
            Ok(sink) => {
                sink.append(SamplesBuffer::new(1, SAMPLE_RATE, samples));
                sink.detach();
            }
            Err(e) => debug!("Cue sink init failed: {}", e),
        }
    }
}

impl Default for RodioPlayer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioPlayer for RodioPlayer {
    async fn play(&self, handle: &AudioHandle) {
        if handle.is_empty() {
            debug!("Empty audio handle, skipping playback");
            return;
        }

        self.interrupted.store(false, Ordering::Relaxed);

        let Some(out) = &self.handle else {
            self.play_silent(handle.len()).await;
            return;
        };

        let sink = match Sink::try_new(out) {
            Ok(sink) => Arc::new(sink),
            Err(e) => {
                warn!("Could not open playback sink: {}", e);
                self.play_silent(handle.len()).await;
                return;
            }
        };

        let decoder = match Decoder::new(Cursor::new(handle.bytes())) {
            Ok(decoder) => decoder,
            Err(e) => {
                warn!("Could not decode narration clip: {}", e);
                return;
            }
        };

        sink.append(decoder);
        *self.current.lock().unwrap() = Some(Arc::clone(&sink));

        // Also poll the interrupt flag: a stop_all landing before the sink
        // was published above would otherwise miss this clip entirely.
        while !sink.empty() {
            if self.interrupted.load(Ordering::Relaxed) {
                sink.stop();
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        let mut current = self.current.lock().unwrap();
        if current
            .as_ref()
            .is_some_and(|active| Arc::ptr_eq(active, &sink))
        {
            *current = None;
        }
    }

    fn stop_all(&self) {
        self.interrupted.store(true, Ordering::Relaxed);
        if let Some(sink) = self.current.lock().unwrap().take() {
            sink.stop();
        }
    }

    fn start_tick(&self) {
        let Some(handle) = &self.handle else {
            return;
        };
        let mut tick = self.tick.lock().unwrap();
        if let Some(old) = tick.take() {
            old.stop();
        }
        match Sink::try_new(handle) {
            Ok(sink) => {
                let source = SamplesBuffer::new(1, SAMPLE_RATE, tick_samples()).repeat_infinite();
                sink.append(source);
                *tick = Some(sink);
            }
            Err(e) => debug!("Tick sink init failed: {}", e),
        }
    }

    fn stop_tick(&self) {
        if let Some(sink) = self.tick.lock().unwrap().take() {
            sink.stop();
        }
    }

    fn cue(&self, cue: Cue) {
        let samples = match cue {
            Cue::Correct => correct_samples(),
            Cue::Finalize => finalize_samples(),
        };
        self.fire_samples(samples);
    }
}

/// One sine tone with a short fade at both ends to avoid clicks.
fn tone(freq: f32, duration: Duration, amplitude: f32) -> Vec<f32> {
    let total = (SAMPLE_RATE as f32 * duration.as_secs_f32()) as usize;
    let fade = (SAMPLE_RATE as usize / 200).min(total / 4).max(1); // ~5 ms
    (0..total)
        .map(|i| {
            let envelope = if i < fade {
                i as f32 / fade as f32
            } else if i + fade > total {
                (total - i) as f32 / fade as f32
            } else {
                1.0
            };
            let t = i as f32 / SAMPLE_RATE as f32;
            (t * freq * 2.0 * std::f32::consts::PI).sin() * amplitude * envelope
        })
        .collect()
}

fn silence(duration: Duration) -> Vec<f32> {
    vec![0.0; (SAMPLE_RATE as f32 * duration.as_secs_f32()) as usize]
}

/// One second of tick: a short blip then silence, looped by the tick sink.
fn tick_samples() -> Vec<f32> {
    let mut samples = tone(1000.0, Duration::from_millis(60), 0.25);
    samples.extend(silence(Duration::from_millis(940)));
    samples
}

/// Rising two-note chime.
fn correct_samples() -> Vec<f32> {
    let mut samples = tone(880.0, Duration::from_millis(120), 0.35);
    samples.extend(tone(1318.5, Duration::from_millis(220), 0.35));
    samples
}

/// Closing three-note arpeggio.
fn finalize_samples() -> Vec<f32> {
    let mut samples = tone(523.25, Duration::from_millis(150), 0.3);
    samples.extend(tone(659.25, Duration::from_millis(150), 0.3));
    samples.extend(tone(783.99, Duration::from_millis(300), 0.3));
    samples
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests tolerate environments without audio hardware (CI
    // containers): the player degrades to silent mode there.

    #[test]
    fn test_estimated_duration_bounds() {
        assert_eq!(RodioPlayer::estimated_duration(0), Duration::from_secs_f64(0.4));
        assert_eq!(
            RodioPlayer::estimated_duration(32_000),
            Duration::from_secs(2)
        );
        assert_eq!(
            RodioPlayer::estimated_duration(10_000_000),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_synthesized_cues_are_nonempty() {
        assert!(!tick_samples().is_empty());
        assert!(!correct_samples().is_empty());
        assert!(!finalize_samples().is_empty());
        // Tick loops at a one-second period.
        assert_eq!(tick_samples().len(), SAMPLE_RATE as usize);
    }

    #[test]
    fn test_tone_envelope_starts_and_ends_at_zero() {
        let samples = tone(440.0, Duration::from_millis(100), 0.5);
        assert_eq!(samples[0], 0.0);
        assert!(samples.iter().all(|s| s.abs() <= 0.5));
    }

    #[tokio::test]
    async fn test_play_empty_handle_resolves_immediately() {
        let player = RodioPlayer::new();
        player.play(&AudioHandle::from_bytes(Vec::new())).await;
    }

    #[tokio::test]
    async fn test_play_undecodable_bytes_resolves() {
        let player = RodioPlayer::new();
        // Garbage bytes: decode fails (or silent mode paces briefly); either
        // way play() must resolve without an error.
        player.play(&AudioHandle::from_bytes(vec![0xde; 64])).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_all_interrupts_an_inflight_play() {
        let player = Arc::new(RodioPlayer::new());
        // Long enough that an uninterrupted clip would blow the deadline
        // below (~12s estimated in silent mode).
        let handle = AudioHandle::from_bytes(vec![0u8; 200_000]);

        let runner = Arc::clone(&player);
        let play = tokio::spawn(async move { runner.play(&handle).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        player.stop_all();

        tokio::time::timeout(Duration::from_secs(2), play)
            .await
            .expect("play did not resolve after stop_all")
            .unwrap();
    }

    #[tokio::test]
    async fn test_stop_all_and_tick_are_idempotent() {
        let player = RodioPlayer::new();
        player.stop_all();
        player.stop_all();
        player.start_tick();
        player.start_tick(); // re-arm
        player.stop_tick();
        player.stop_tick();
        player.cue(Cue::Correct);
        player.cue(Cue::Finalize);
    }
}
