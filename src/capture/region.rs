//! Capture-region math: parsing the `X,Y,WxH` flag, scaling logical
//! coordinates to the display's native resolution, clamping to the display
//! bounds, and keeping dimensions encoder-friendly.

use std::str::FromStr;

use crate::error::QuizcastError;

/// Encoders reject odd or degenerate frame sizes.
const MIN_DIMENSION: u32 = 2;

/// A rectangular screen region in logical (unscaled) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRegion {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl CaptureRegion {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Scale to the display's native resolution (HiDPI factor).
    pub fn scaled(&self, factor: f32) -> Self {
        let factor = if factor.is_finite() && factor > 0.0 {
            factor
        } else {
            1.0
        };
        Self {
            x: (self.x as f32 * factor).round() as i32,
            y: (self.y as f32 * factor).round() as i32,
            width: (self.width as f32 * factor).round() as u32,
            height: (self.height as f32 * factor).round() as u32,
        }
    }

    /// Intersect with a display of the given size anchored at the origin.
    /// Returns `None` when nothing of the region is on screen.
    pub fn clamped(&self, display_width: u32, display_height: u32) -> Option<Self> {
        let left = self.x.max(0);
        let top = self.y.max(0);
        let right = (self.x.saturating_add(self.width as i32)).min(display_width as i32);
        let bottom = (self.y.saturating_add(self.height as i32)).min(display_height as i32);
        if right <= left || bottom <= top {
            return None;
        }
        Some(Self {
            x: left,
            y: top,
            width: (right - left) as u32,
            height: (bottom - top) as u32,
        })
    }

    /// Dimensions rounded down to even values, at least [`MIN_DIMENSION`].
    pub fn even_aligned(&self) -> Self {
        Self {
            x: self.x,
            y: self.y,
            width: normalize_dimension(self.width),
            height: normalize_dimension(self.height),
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.width < MIN_DIMENSION || self.height < MIN_DIMENSION
    }
}

impl std::fmt::Display for CaptureRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{},{}x{}", self.x, self.y, self.width, self.height)
    }
}

impl FromStr for CaptureRegion {
    type Err = QuizcastError;

    /// Parses `X,Y,WxH`, e.g. `100,80,1280x720`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            QuizcastError::Config(format!(
                "invalid capture region '{s}', expected X,Y,WxH (e.g. 100,80,1280x720)"
            ))
        };

        let mut parts = s.split(',').map(str::trim);
        let x = parts.next().and_then(|p| p.parse::<i32>().ok());
        let y = parts.next().and_then(|p| p.parse::<i32>().ok());
        let size = parts.next();
        if parts.next().is_some() {
            return Err(invalid());
        }
        let (x, y, size) = match (x, y, size) {
            (Some(x), Some(y), Some(size)) => (x, y, size),
            _ => return Err(invalid()),
        };

        let (width, height) = size.split_once('x').ok_or_else(invalid)?;
        let width = width.trim().parse::<u32>().map_err(|_| invalid())?;
        let height = height.trim().parse::<u32>().map_err(|_| invalid())?;
        if width < MIN_DIMENSION || height < MIN_DIMENSION {
            return Err(QuizcastError::Config(format!(
                "capture region '{s}' is too small, minimum is {MIN_DIMENSION}x{MIN_DIMENSION}"
            )));
        }

        Ok(Self {
            x,
            y,
            width,
            height,
        })
    }
}

fn normalize_dimension(value: u32) -> u32 {
    let mut normalized = value.max(MIN_DIMENSION);
    if normalized % 2 != 0 {
        normalized -= 1;
    }
    normalized.max(MIN_DIMENSION)
}
