//! Camera frames and frame sources.
//!
//! A [`PixelFrame`] is an RGBA snapshot backed by shared immutable bytes, so
//! handing one to the recorder, the detector and the key-frame store never
//! copies pixel data.

mod source;

pub use source::{FrameSource, ImageDirSource, VecFrameSource, load_frame};

use crate::error::{Error, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Bytes per pixel in a frame buffer (RGBA).
pub const CHANNELS: usize = 4;

/// A single RGBA camera frame.
///
/// The buffer length always matches the dimensions; deserialized frames go
/// through the same check as [`PixelFrame::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawFrame")]
pub struct PixelFrame {
    data: Bytes,
    width: u32,
    height: u32,
}

#[derive(Deserialize)]
struct RawFrame {
    data: Bytes,
    width: u32,
    height: u32,
}

impl TryFrom<RawFrame> for PixelFrame {
    type Error = Error;

    fn try_from(raw: RawFrame) -> Result<Self> {
        Self::new(raw.width, raw.height, raw.data)
    }
}

impl PixelFrame {
    /// Wrap an RGBA buffer, checking that its length matches the dimensions.
    pub fn new(width: u32, height: u32, data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        let expected = width as usize * height as usize * CHANNELS;
        if data.len() != expected {
            return Err(Error::FrameSize {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Solid-color frame.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = width as usize * height as usize;
        let data: Vec<u8> = rgba.iter().copied().cycle().take(pixels * CHANNELS).collect();
        Self {
            data: Bytes::from(data),
            width,
            height,
        }
    }

    /// Build a frame from a decoded image.
    pub fn from_image(image: image::RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: Bytes::from(image.into_raw()),
            width,
            height,
        }
    }

    /// Raw row-major RGBA bytes.
    pub const fn data(&self) -> &Bytes {
        &self.data
    }

    /// Width in pixels.
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Whether the frame has no pixels.
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// RGBA value at `(x, y)`. Coordinates must be inside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * CHANNELS;
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }

    /// Copy a sub-rectangle into a new frame. The region is clamped first.
    pub fn crop(&self, region: Region) -> Self {
        let region = region.clamp_to(self.width, self.height);
        let stride = self.width as usize * CHANNELS;
        let row_bytes = region.width as usize * CHANNELS;
        let mut data = Vec::with_capacity(row_bytes * region.height as usize);
        for y in region.y..region.y + region.height {
            let start = y as usize * stride + region.x as usize * CHANNELS;
            data.extend_from_slice(&self.data[start..start + row_bytes]);
        }
        Self {
            data: Bytes::from(data),
            width: region.width,
            height: region.height,
        }
    }

    /// Drop the alpha channel for encoders that only take RGB.
    pub fn to_rgb_image(&self) -> Result<image::RgbImage> {
        let rgb: Vec<u8> = self
            .data
            .chunks_exact(CHANNELS)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();
        image::RgbImage::from_raw(self.width, self.height, rgb).ok_or_else(|| {
            Error::ImageEncode {
                reason: format!("buffer does not fit {}x{}", self.width, self.height),
            }
        })
    }
}

/// Axis-aligned pixel rectangle inside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Region {
    /// The whole frame.
    pub const fn full(frame: &PixelFrame) -> Self {
        Self {
            x: 0,
            y: 0,
            width: frame.width(),
            height: frame.height(),
        }
    }

    /// Clip the region so it lies inside a `width` x `height` frame.
    #[must_use]
    pub fn clamp_to(self, width: u32, height: u32) -> Self {
        let x = self.x.min(width);
        let y = self.y.min(height);
        Self {
            x,
            y,
            width: self.width.min(width - x),
            height: self.height.min(height - y),
        }
    }

    /// Whether the region covers no pixels.
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}
