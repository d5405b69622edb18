//! ffmpeg child process wrapper: raw RGBA frames on stdin, s16le audio over
//! a local TCP socket, encoded WebM chunks buffered from stdout.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::capture::audio_feed::AudioFeed;
use crate::error::{CaptureDeniedReason, QuizcastError, Result};

/// How long a graceful shutdown may take before the child is killed.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);
const STDOUT_READ_CHUNK: usize = 64 * 1024;

pub const CAPTURE_FPS: u32 = 30;

/// Locate ffmpeg on PATH (or via `QUIZCAST_FFMPEG`).
pub fn find_ffmpeg() -> Option<PathBuf> {
    let candidate = std::env::var("QUIZCAST_FFMPEG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("ffmpeg"));
    let works = Command::new(&candidate)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false);
    works.then_some(candidate)
}

/// Pick the WebM codec pair, preferring VP9/Opus when the build carries them.
fn select_codecs(ffmpeg: &PathBuf) -> (&'static str, &'static str) {
    let output = Command::new(ffmpeg)
        .args(["-hide_banner", "-encoders"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output();
    let encoders = match output {
        Ok(result) => String::from_utf8_lossy(&result.stdout).to_lowercase(),
        Err(_) => String::new(),
    };

    let video = if encoders.contains(" libvpx-vp9") {
        "libvpx-vp9"
    } else {
        "libvpx"
    };
    let audio = if encoders.contains(" libopus") {
        "libopus"
    } else {
        "libvorbis"
    };
    (video, audio)
}

/// One running encode session. Frames go in via [`FfmpegEncoder::write_frame`];
/// the finished WebM comes out of [`FfmpegEncoder::finish`].
pub struct FfmpegEncoder {
    child: Child,
    chunks: Arc<Mutex<Vec<u8>>>,
    reader: Option<JoinHandle<()>>,
    logger: Option<JoinHandle<()>>,
}

impl FfmpegEncoder {
    /// Spawn ffmpeg for a `width`x`height` RGBA stream at [`CAPTURE_FPS`],
    /// muxed with the s16le track `feed` will deliver to `audio_listener`'s
    /// port.
    pub fn spawn(
        width: u32,
        height: u32,
        feed: &AudioFeed,
        audio_listener: &TcpListener,
    ) -> Result<Self> {
        let ffmpeg = find_ffmpeg().ok_or_else(|| {
            QuizcastError::capture_denied(
                CaptureDeniedReason::Unknown,
                "ffmpeg not found on PATH",
            )
        })?;
        let (video_codec, audio_codec) = select_codecs(&ffmpeg);
        let audio_port = audio_listener
            .local_addr()
            .map_err(|e| QuizcastError::CaptureRuntime(format!("audio listener: {e}")))?
            .port();

        info!(
            "Spawning ffmpeg: {}x{} @ {} fps, {}/{}",
            width, height, CAPTURE_FPS, video_codec, audio_codec
        );

        let mut child = Command::new(&ffmpeg)
            .args(["-hide_banner", "-loglevel", "warning"])
            // Audio input first (stream 0): the feed connects to our socket.
            .args(["-thread_queue_size", "1024", "-f", "s16le"])
            .args(["-ar", &feed.sample_rate().to_string()])
            .args(["-ac", &feed.channels().to_string()])
            .args(["-i", &format!("tcp://127.0.0.1:{audio_port}")])
            // Video input (stream 1): raw frames on stdin.
            .args(["-f", "rawvideo", "-pixel_format", "rgba"])
            .args(["-video_size", &format!("{width}x{height}")])
            .args(["-framerate", &CAPTURE_FPS.to_string()])
            .args(["-i", "pipe:0"])
            .args(["-map", "1:v:0", "-map", "0:a:0"])
            .args(["-c:v", video_codec, "-deadline", "realtime", "-cpu-used", "8"])
            .args(["-b:v", "2M"])
            .args(["-c:a", audio_codec, "-b:a", "128k"])
            // Audio stops when the feed disconnects, video when stdin closes.
            .args(["-shortest"])
            .args(["-f", "webm", "pipe:1"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| QuizcastError::CaptureRuntime(format!("could not start ffmpeg: {e}")))?;

        let chunks = Arc::new(Mutex::new(Vec::new()));
        let reader = child.stdout.take().map(|mut stdout| {
            let chunks = Arc::clone(&chunks);
            thread::spawn(move || {
                let mut buf = [0u8; STDOUT_READ_CHUNK];
                loop {
                    match stdout.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => chunks.lock().unwrap().extend_from_slice(&buf[..n]),
                        Err(e) => {
                            warn!("Reading encoded chunks failed: {}", e);
                            break;
                        }
                    }
                }
            })
        });
        let logger = child.stderr.take().map(|stderr| {
            thread::spawn(move || {
                for line in BufReader::new(stderr).lines() {
                    match line {
                        Ok(content) if !content.trim().is_empty() => {
                            debug!("ffmpeg: {}", content)
                        }
                        Ok(_) => {}
                        Err(_) => break,
                    }
                }
            })
        });

        Ok(Self {
            child,
            chunks,
            reader,
            logger,
        })
    }

    /// Feed one RGBA surface. A write failure means the encoder died and the
    /// session is unrecoverable.
    pub fn write_frame(&mut self, pixels: &[u8]) -> Result<()> {
        let stdin = self
            .child
            .stdin
            .as_mut()
            .ok_or_else(|| QuizcastError::CaptureRuntime("encoder stdin closed".to_string()))?;
        stdin
            .write_all(pixels)
            .map_err(|e| QuizcastError::CaptureRuntime(format!("frame write failed: {e}")))
    }

    /// Bytes buffered so far.
    pub fn buffered_len(&self) -> usize {
        self.chunks.lock().unwrap().len()
    }

    /// Close the video input, wait for ffmpeg to flush (killing it after
    /// [`STOP_TIMEOUT`]), and return the buffered WebM.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        // EOF on stdin ends the video stream; with -shortest the mux drains.
        drop(self.child.stdin.take());

        let deadline = Instant::now() + STOP_TIMEOUT;
        let status = loop {
            match self.child.try_wait() {
                Ok(Some(status)) => break Some(status),
                Ok(None) => {
                    if Instant::now() >= deadline {
                        warn!("ffmpeg did not exit in {:?}, killing it", STOP_TIMEOUT);
                        let _ = self.child.kill();
                        let _ = self.child.wait();
                        break None;
                    }
                    thread::sleep(Duration::from_millis(50));
                }
                Err(e) => {
                    warn!("Waiting for ffmpeg failed: {}", e);
                    let _ = self.child.kill();
                    break None;
                }
            }
        };

        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.logger.take() {
            let _ = handle.join();
        }

        if let Some(status) = status {
            if !status.success() {
                debug!("ffmpeg exited with {}", status);
            }
        }

        let bytes = std::mem::take(&mut *self.chunks.lock().unwrap());
        info!("Encoder produced {} bytes", bytes.len());
        Ok(bytes)
    }

    /// Unconditional teardown, discarding the output.
    pub fn abort(mut self) {
        drop(self.child.stdin.take());
        let _ = self.child.kill();
        let _ = self.child.wait();
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.logger.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Spawning ffmpeg needs the binary; these cover the probe helpers.

    #[test]
    fn test_find_ffmpeg_reports_missing_binary() {
        std::env::set_var("QUIZCAST_FFMPEG", "/nonexistent/ffmpeg-binary");
        assert!(find_ffmpeg().is_none());
        std::env::remove_var("QUIZCAST_FFMPEG");
    }

    #[test]
    fn test_capture_fps() {
        assert_eq!(CAPTURE_FPS, 30);
    }
}
