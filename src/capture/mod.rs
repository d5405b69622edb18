//! Screen capture pipeline: cropped display frames plus one audio track,
//! encoded by an ffmpeg child into a single WebM artifact.

pub mod audio_feed;
pub mod encoder;
pub mod frame;
pub mod region;

use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

pub use audio_feed::{AudioFeed, FeedKind};
pub use encoder::{find_ffmpeg, FfmpegEncoder, CAPTURE_FPS};
pub use frame::{Frame, FrameSource, MonitorSource, Surface};
pub use region::CaptureRegion;

use crate::error::{QuizcastError, Result};
use crate::playback::RecordingHook;

struct ActiveCapture {
    stop: Arc<AtomicBool>,
    worker: JoinHandle<Result<Vec<u8>>>,
    audio: JoinHandle<()>,
}

/// Owns at most one capture session at a time. `start_capture` degrades to
/// "no recording" on any acquisition failure; runtime failures tear the
/// session down without touching show playback.
pub struct CaptureController {
    region: CaptureRegion,
    recording: AtomicBool,
    active: Mutex<Option<ActiveCapture>>,
}

impl CaptureController {
    pub fn new(region: CaptureRegion) -> Self {
        Self {
            region,
            recording: AtomicBool::new(false),
            active: Mutex::new(None),
        }
    }

    /// Acquire everything and start recording. Returns false (never errors)
    /// when the display, devices, or encoder are unavailable; the reason is
    /// logged classified.
    pub fn start_capture(&self) -> bool {
        if self.recording.load(Ordering::SeqCst) {
            warn!("Capture already running, ignoring start");
            return false;
        }

        match self.acquire() {
            Ok(active) => {
                *self.active.lock().unwrap() = Some(active);
                self.recording.store(true, Ordering::SeqCst);
                info!("Screen capture started ({})", self.region);
                true
            }
            Err(QuizcastError::CaptureAcquisition { reason, message }) => {
                warn!("Recording unavailable ({}): {}", reason, message);
                false
            }
            Err(other) => {
                warn!("Recording unavailable: {}", other);
                false
            }
        }
    }

    fn acquire(&self) -> Result<ActiveCapture> {
        let source = MonitorSource::primary()?;
        let scale = source.scale_factor();
        let (logical_width, logical_height) = source.dimensions();
        let display_width = (logical_width as f32 * scale).round() as u32;
        let display_height = (logical_height as f32 * scale).round() as u32;

        let crop = self
            .region
            .scaled(scale)
            .clamped(display_width, display_height)
            .map(|r| r.even_aligned())
            .filter(|r| !r.is_degenerate())
            .ok_or_else(|| {
                QuizcastError::capture_denied(
                    crate::error::CaptureDeniedReason::Unknown,
                    format!(
                        "capture region {} lies outside the {}x{} display",
                        self.region, display_width, display_height
                    ),
                )
            })?;

        let feed = AudioFeed::select();
        let listener = TcpListener::bind("127.0.0.1:0").map_err(|e| {
            QuizcastError::capture_denied(
                crate::error::CaptureDeniedReason::Unknown,
                format!("audio socket: {e}"),
            )
        })?;
        let encoder = FfmpegEncoder::spawn(crop.width, crop.height, &feed, &listener)?;

        let stop = Arc::new(AtomicBool::new(false));
        let audio = feed.run(listener, Arc::clone(&stop));

        let worker_stop = Arc::clone(&stop);
        let region = self.region;
        let surface = Surface::new(crop.width, crop.height);
        let worker = thread::Builder::new()
            .name("capture-render".to_string())
            .spawn(move || render_loop(source, encoder, region, scale, surface, worker_stop))
            .map_err(|e| QuizcastError::CaptureRuntime(format!("render thread: {e}")))?;

        Ok(ActiveCapture {
            stop,
            worker,
            audio,
        })
    }

    /// Stop recording and flush the buffered artifact. Zero captured bytes
    /// is reported as [`QuizcastError::EmptyCapture`].
    pub fn stop_capture(&self) -> Result<Vec<u8>> {
        let active = self.active.lock().unwrap().take();
        self.recording.store(false, Ordering::SeqCst);
        let Some(active) = active else {
            return Err(QuizcastError::CaptureRuntime(
                "no capture session to stop".to_string(),
            ));
        };

        active.stop.store(true, Ordering::SeqCst);
        let bytes = active
            .worker
            .join()
            .map_err(|_| QuizcastError::CaptureRuntime("render loop panicked".to_string()))??;
        let _ = active.audio.join();
        finalize_bytes(bytes)
    }

    /// Tear down every acquired resource, discarding any output. Safe to
    /// call repeatedly and when nothing is running.
    pub fn force_stop_capture(&self) {
        let active = self.active.lock().unwrap().take();
        self.recording.store(false, Ordering::SeqCst);
        if let Some(active) = active {
            active.stop.store(true, Ordering::SeqCst);
            let _ = active.worker.join();
            let _ = active.audio.join();
            debug!("Capture force-stopped");
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }
}

impl RecordingHook for CaptureController {
    fn is_recording(&self) -> bool {
        self.is_capturing()
    }

    fn force_stop(&self) {
        self.force_stop_capture();
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        self.force_stop_capture();
    }
}

fn finalize_bytes(bytes: Vec<u8>) -> Result<Vec<u8>> {
    if bytes.is_empty() {
        return Err(QuizcastError::EmptyCapture);
    }
    Ok(bytes)
}

/// The 30 fps draw loop: grab, crop onto the fixed surface, hand to the
/// encoder. Any failure force-stops the session (the stop flag also ends the
/// audio feed) and surfaces as a capture error, never as a show error.
fn render_loop(
    mut source: impl FrameSource,
    mut encoder: FfmpegEncoder,
    region: CaptureRegion,
    scale: f32,
    mut surface: Surface,
    stop: Arc<AtomicBool>,
) -> Result<Vec<u8>> {
    let scaled_region = region.scaled(scale);
    let frame_interval = Duration::from_secs_f64(1.0 / CAPTURE_FPS as f64);
    let mut next_frame = Instant::now();

    while !stop.load(Ordering::Relaxed) {
        let result = draw_one(&mut source, &mut encoder, scaled_region, &mut surface);
        if let Err(e) = result {
            warn!("Capture failed, stopping the session: {}", e);
            stop.store(true, Ordering::SeqCst);
            encoder.abort();
            return Err(e);
        }

        next_frame += frame_interval;
        let now = Instant::now();
        if next_frame > now {
            thread::sleep(next_frame - now);
        } else {
            // Fell behind; resynchronize instead of bursting.
            next_frame = now;
        }
    }

    encoder.finish()
}

fn draw_one(
    source: &mut impl FrameSource,
    encoder: &mut FfmpegEncoder,
    scaled_region: CaptureRegion,
    surface: &mut Surface,
) -> Result<()> {
    let frame = source.next_frame()?;
    // Clamp against the real frame geometry; it can differ from the probed
    // display size on mixed-DPI setups. The surface (and so the encoder's
    // frame geometry) stays fixed; the crop is scaled onto it.
    let crop = scaled_region
        .clamped(frame.width, frame.height)
        .ok_or_else(|| {
            QuizcastError::CaptureRuntime(format!(
                "capture region {scaled_region} left the {}x{} frame",
                frame.width, frame.height
            ))
        })?;

    surface.blit_crop(&frame, crop)?;
    encoder.write_frame(surface.pixels())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finalize_bytes_flags_empty_capture() {
        assert!(matches!(
            finalize_bytes(Vec::new()),
            Err(QuizcastError::EmptyCapture)
        ));
        assert_eq!(finalize_bytes(vec![1, 2, 3]).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_controller_is_idle_by_default() {
        let controller = CaptureController::new(CaptureRegion::new(0, 0, 640, 480));
        assert!(!controller.is_capturing());
        assert!(controller.stop_capture().is_err());
        // Idempotent and safe with nothing running.
        controller.force_stop_capture();
        controller.force_stop_capture();
        assert!(!controller.is_capturing());
    }

    #[test]
    fn test_recording_hook_reports_controller_state() {
        let controller = CaptureController::new(CaptureRegion::new(0, 0, 640, 480));
        let hook: &dyn RecordingHook = &controller;
        assert!(!hook.is_recording());
        hook.force_stop();
    }
}
