//! Frame acquisition and the off-screen crop surface. The display is read
//! through [`FrameSource`] so the render loop can be driven by a synthetic
//! source in tests.

use tracing::debug;
use xcap::Monitor;

use crate::capture::region::CaptureRegion;
use crate::error::{CaptureDeniedReason, QuizcastError, Result};

/// One captured display frame, tightly packed RGBA.
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Produces display frames for the render loop.
pub trait FrameSource: Send {
    /// Native resolution of the captured display.
    fn dimensions(&self) -> (u32, u32);

    /// HiDPI scale factor of the captured display.
    fn scale_factor(&self) -> f32;

    /// Grab the current frame. Errors are fatal for the capture session.
    fn next_frame(&mut self) -> Result<Frame>;
}

/// xcap-backed source reading the primary monitor.
pub struct MonitorSource {
    monitor: Monitor,
    width: u32,
    height: u32,
    scale: f32,
}

impl MonitorSource {
    /// Acquire the primary monitor. Failure here is an acquisition error,
    /// classified for the caller's denial report.
    pub fn primary() -> Result<Self> {
        let monitors = Monitor::all().map_err(classify_monitor_error)?;
        let monitor = monitors
            .into_iter()
            .find(|m| m.is_primary().unwrap_or(false))
            .ok_or_else(|| {
                QuizcastError::capture_denied(CaptureDeniedReason::NoDevice, "no monitor found")
            })?;

        let width = monitor.width().map_err(classify_monitor_error)?;
        let height = monitor.height().map_err(classify_monitor_error)?;
        let scale = monitor.scale_factor().unwrap_or(1.0);
        debug!("Primary monitor acquired: {}x{} @ {}x scale", width, height, scale);

        Ok(Self {
            monitor,
            width,
            height,
            scale,
        })
    }
}

impl FrameSource for MonitorSource {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn scale_factor(&self) -> f32 {
        self.scale
    }

    fn next_frame(&mut self) -> Result<Frame> {
        let image = self
            .monitor
            .capture_image()
            .map_err(|e| QuizcastError::CaptureRuntime(format!("frame grab failed: {e}")))?;
        let width = image.width();
        let height = image.height();
        Ok(Frame {
            width,
            height,
            data: image.into_raw(),
        })
    }
}

fn classify_monitor_error(error: xcap::XCapError) -> QuizcastError {
    let message = error.to_string();
    let lowered = message.to_lowercase();
    let reason = if lowered.contains("permission") || lowered.contains("denied") {
        CaptureDeniedReason::Permission
    } else if lowered.contains("no monitor") || lowered.contains("not found") {
        CaptureDeniedReason::NoDevice
    } else {
        CaptureDeniedReason::Unknown
    };
    QuizcastError::capture_denied(reason, message)
}

/// Fixed-size RGBA surface the cropped region is drawn onto every frame. The
/// surface never resizes mid-session; the encoder's frame geometry is fixed
/// at spawn.
pub struct Surface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; (width as usize) * (height as usize) * 4],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Draw `src` from the frame onto the full surface, nearest-neighbor.
    /// `src` must lie within the frame bounds.
    pub fn blit_crop(&mut self, frame: &Frame, src: CaptureRegion) -> Result<()> {
        let expected = (frame.width as usize) * (frame.height as usize) * 4;
        if frame.data.len() < expected {
            return Err(QuizcastError::CaptureRuntime(format!(
                "frame buffer is {} bytes, expected {}",
                frame.data.len(),
                expected
            )));
        }
        if src.x < 0
            || src.y < 0
            || src.x as u32 + src.width > frame.width
            || src.y as u32 + src.height > frame.height
        {
            return Err(QuizcastError::CaptureRuntime(format!(
                "crop {src} exceeds frame bounds {}x{}",
                frame.width, frame.height
            )));
        }

        let frame_stride = frame.width as usize * 4;
        let surface_stride = self.width as usize * 4;
        for dst_y in 0..self.height as usize {
            let src_y = src.y as usize + dst_y * src.height as usize / self.height as usize;
            let src_row = &frame.data[src_y * frame_stride..(src_y + 1) * frame_stride];
            let dst_row = &mut self.pixels[dst_y * surface_stride..(dst_y + 1) * surface_stride];
            for dst_x in 0..self.width as usize {
                let src_x = src.x as usize + dst_x * src.width as usize / self.width as usize;
                dst_row[dst_x * 4..dst_x * 4 + 4]
                    .copy_from_slice(&src_row[src_x * 4..src_x * 4 + 4]);
            }
        }
        Ok(())
    }
}
