//! The capture audio track: system loopback preferred, microphone fallback,
//! synthesized silence when neither exists. Samples are converted to s16le
//! and pushed to the encoder over a local TCP socket.
//!
//! cpal streams are not `Send`, so the feed resolves its device by name on
//! its own thread and keeps the stream there for the session's lifetime.

use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use tracing::{debug, info, warn};

const ACCEPT_POLL: Duration = Duration::from_millis(25);
const CHUNK_QUEUE_CAPACITY: usize = 256;
/// Silence is paced in 100 ms blocks so a stop lands quickly.
const SILENCE_BLOCK: Duration = Duration::from_millis(100);

const SILENCE_SAMPLE_RATE: u32 = 48_000;
const SILENCE_CHANNELS: u16 = 2;

/// Where the audio track comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    Loopback,
    Microphone,
    Silence,
}

impl std::fmt::Display for FeedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FeedKind::Loopback => "system loopback",
            FeedKind::Microphone => "microphone",
            FeedKind::Silence => "silence",
        };
        write!(f, "{s}")
    }
}

/// A selected audio source plus the PCM geometry the encoder must be told.
pub struct AudioFeed {
    kind: FeedKind,
    device_name: Option<String>,
    sample_rate: u32,
    channels: u16,
}

impl AudioFeed {
    /// Probe the host's input devices. Never fails: no usable device means
    /// the silence feed.
    pub fn select() -> Self {
        let host = cpal::default_host();

        if let Ok(devices) = host.input_devices() {
            for device in devices {
                let Ok(name) = device.name() else { continue };
                if !is_loopback_name(&name) {
                    continue;
                }
                if let Ok(config) = device.default_input_config() {
                    info!("Capture audio source: system loopback '{}'", name);
                    return Self {
                        kind: FeedKind::Loopback,
                        device_name: Some(name),
                        sample_rate: config.sample_rate().0,
                        channels: config.channels(),
                    };
                }
            }
        }

        if let Some(device) = host.default_input_device() {
            if let (Ok(name), Ok(config)) = (device.name(), device.default_input_config()) {
                info!("Capture audio source: microphone '{}'", name);
                return Self {
                    kind: FeedKind::Microphone,
                    device_name: Some(name),
                    sample_rate: config.sample_rate().0,
                    channels: config.channels(),
                };
            }
        }

        warn!("No capture audio device, recording with a silent track");
        Self::silence()
    }

    pub fn silence() -> Self {
        Self {
            kind: FeedKind::Silence,
            device_name: None,
            sample_rate: SILENCE_SAMPLE_RATE,
            channels: SILENCE_CHANNELS,
        }
    }

    pub fn kind(&self) -> FeedKind {
        self.kind
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Run the feed until `stop` is set: accept the encoder's TCP connection,
    /// then stream s16le audio into it.
    pub fn run(self, listener: TcpListener, stop: Arc<AtomicBool>) -> JoinHandle<()> {
        thread::Builder::new()
            .name("audio-feed".to_string())
            .spawn(move || self.feed_loop(listener, stop))
            .expect("spawn audio-feed thread")
    }

    fn feed_loop(self, listener: TcpListener, stop: Arc<AtomicBool>) {
        if listener.set_nonblocking(true).is_err() {
            warn!("Audio listener could not be made non-blocking, feed disabled");
            return;
        }

        let socket = loop {
            match listener.accept() {
                Ok((stream, _)) => break stream,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if stop.load(Ordering::Relaxed) {
                        return;
                    }
                    thread::sleep(ACCEPT_POLL);
                }
                Err(e) => {
                    warn!("Audio socket accept failed: {}", e);
                    return;
                }
            }
        };
        let _ = socket.set_nodelay(true);
        debug!("Encoder audio socket connected ({})", self.kind);

        match self.kind {
            FeedKind::Silence => self.silence_loop(socket, &stop),
            FeedKind::Loopback | FeedKind::Microphone => {
                if !self.device_loop(&socket, &stop) {
                    // Device vanished between selection and start; the track
                    // must keep flowing or the encoder stalls on its input.
                    warn!("Audio device unavailable, switching to a silent track");
                    self.silence_loop(socket, &stop);
                }
            }
        }
    }

    fn silence_loop(&self, mut socket: TcpStream, stop: &AtomicBool) {
        let block = pcm_block_len(self.sample_rate, self.channels, SILENCE_BLOCK);
        let zeros = vec![0u8; block];
        while !stop.load(Ordering::Relaxed) {
            if let Err(e) = std::io::Write::write_all(&mut socket, &zeros) {
                debug!("Silent audio track ended: {}", e);
                return;
            }
            thread::sleep(SILENCE_BLOCK);
        }
    }

    /// Returns false when the device could not be opened at all.
    fn device_loop(&self, socket: &TcpStream, stop: &AtomicBool) -> bool {
        let host = cpal::default_host();
        let wanted = self.device_name.as_deref();
        let device = host
            .input_devices()
            .ok()
            .and_then(|mut devices| {
                devices.find(|d| d.name().ok().as_deref() == wanted)
            })
            .or_else(|| host.default_input_device());
        let Some(device) = device else {
            return false;
        };
        let Ok(config) = device.default_input_config() else {
            return false;
        };

        let (chunk_tx, chunk_rx) = mpsc::sync_channel::<Vec<u8>>(CHUNK_QUEUE_CAPACITY);
        let stream_config = config.config();
        let err_fn = |e| warn!("Audio input stream error: {}", e);

        let stream = match config.sample_format() {
            SampleFormat::F32 => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let _ = chunk_tx.try_send(f32_to_s16le(data));
                },
                err_fn,
                None,
            ),
            SampleFormat::I16 => device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let _ = chunk_tx.try_send(i16_to_s16le(data));
                },
                err_fn,
                None,
            ),
            other => {
                warn!("Unsupported audio sample format {:?}", other);
                return false;
            }
        };
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Could not open audio input stream: {}", e);
                return false;
            }
        };
        if let Err(e) = stream.play() {
            warn!("Could not start audio input stream: {}", e);
            return false;
        }

        let mut socket = socket;
        while !stop.load(Ordering::Relaxed) {
            match chunk_rx.recv_timeout(Duration::from_millis(10)) {
                Ok(chunk) => {
                    if let Err(e) = std::io::Write::write_all(&mut socket, &chunk) {
                        debug!("Audio track ended: {}", e);
                        break;
                    }
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
        drop(stream);
        true
    }
}

/// Match the device names platforms give their playback-capture sources.
fn is_loopback_name(name: &str) -> bool {
    let lowered = name.to_lowercase();
    ["loopback", "monitor of", "stereo mix", "what u hear"]
        .iter()
        .any(|needle| lowered.contains(needle))
}

fn pcm_block_len(sample_rate: u32, channels: u16, duration: Duration) -> usize {
    let frames = (sample_rate as f64 * duration.as_secs_f64()) as usize;
    frames * channels as usize * 2
}

fn f32_to_s16le(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn i16_to_s16le(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_loopback_name_matching() {
        assert!(is_loopback_name("Monitor of Built-in Audio"));
        assert!(is_loopback_name("Stereo Mix (Realtek)"));
        assert!(is_loopback_name("BlackHole Loopback"));
        assert!(!is_loopback_name("Built-in Microphone"));
    }

    #[test]
    fn test_f32_conversion_clamps_and_scales() {
        let bytes = f32_to_s16le(&[0.0, 1.0, -1.0, 2.0]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), 0);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), 32767);
        assert_eq!(i16::from_le_bytes([bytes[4], bytes[5]]), -32767);
        // Over-range input clamps instead of wrapping.
        assert_eq!(i16::from_le_bytes([bytes[6], bytes[7]]), 32767);
    }

    #[test]
    fn test_pcm_block_len() {
        // 48 kHz stereo, 100 ms: 4800 frames * 2 ch * 2 bytes.
        assert_eq!(
            pcm_block_len(48_000, 2, Duration::from_millis(100)),
            19_200
        );
    }

    #[test]
    fn test_silence_feed_streams_zeroed_pcm() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let stop = Arc::new(AtomicBool::new(false));

        let handle = AudioFeed::silence().run(listener, Arc::clone(&stop));

        let mut socket = TcpStream::connect(addr).unwrap();
        let mut buf = vec![0u8; 1024];
        socket.read_exact(&mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));

        stop.store(true, Ordering::Relaxed);
        drop(socket);
        handle.join().unwrap();
    }

    #[test]
    fn test_feed_stops_without_a_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let stop = Arc::new(AtomicBool::new(true));
        let handle = AudioFeed::silence().run(listener, stop);
        handle.join().unwrap();
    }
}
