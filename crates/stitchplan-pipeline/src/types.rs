//! Shared types for the stitchplan pipeline.
//!
//! [`RasterImage`] is the pixel currency passed between every stage: a
//! dense row-major buffer of packed `0xAARRGGBB` words. Transforms never
//! mutate a raster in place; they build a new one.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Re-export `RgbaImage` so downstream crates can convert rasters for
/// encoding without depending on `image` directly.
pub use image::RgbaImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Total number of pixels.
    #[must_use]
    pub const fn area(self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// An immutable ARGB raster.
///
/// The pixel buffer length always equals `width * height`, and both
/// dimensions are strictly positive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RasterImage {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl RasterImage {
    /// Wrap a packed ARGB buffer.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidArgument`] if either dimension is
    /// zero or `pixels.len() != width * height`.
    pub fn new(width: u32, height: u32, pixels: Vec<u32>) -> Result<Self, PipelineError> {
        if width == 0 || height == 0 {
            return Err(PipelineError::InvalidArgument(format!(
                "raster dimensions must be positive, got {width}x{height}"
            )));
        }
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(PipelineError::InvalidArgument(format!(
                "pixel buffer holds {} values but {width}x{height} needs {expected}",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// A raster where every pixel has the same color.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidArgument`] if either dimension is zero.
    pub fn filled(width: u32, height: u32, argb: u32) -> Result<Self, PipelineError> {
        Self::new(width, height, vec![argb; width as usize * height as usize])
    }

    /// Build a raster by evaluating `f(x, y)` for every pixel in row-major order.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidArgument`] if either dimension is zero.
    pub fn from_fn(
        width: u32,
        height: u32,
        mut f: impl FnMut(u32, u32) -> u32,
    ) -> Result<Self, PipelineError> {
        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.push(f(x, y));
            }
        }
        Self::new(width, height, pixels)
    }

    /// Convert from an `image` crate RGBA buffer.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidArgument`] if the image is empty.
    pub fn from_rgba_image(image: &RgbaImage) -> Result<Self, PipelineError> {
        let pixels = image
            .pixels()
            .map(|p| {
                let [r, g, b, a] = p.0;
                pack(a, r, g, b)
            })
            .collect();
        Self::new(image.width(), image.height(), pixels)
    }

    /// Convert to an `image` crate RGBA buffer (for encoding or inspection).
    #[must_use = "returns the converted image"]
    pub fn to_rgba_image(&self) -> RgbaImage {
        RgbaImage::from_fn(self.width, self.height, |x, y| {
            let p = self.pixel(x, y);
            image::Rgba([red(p), green(p), blue(p), alpha(p)])
        })
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
        }
    }

    /// Row-major packed ARGB pixels.
    #[must_use]
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// The pixel at `(x, y)`. Coordinates must be in bounds.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> u32 {
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    #[must_use]
    pub fn into_pixels(self) -> Vec<u32> {
        self.pixels
    }

    /// Number of distinct ARGB values.
    #[must_use]
    pub fn unique_colors(&self) -> usize {
        self.pixels.iter().copied().collect::<HashSet<u32>>().len()
    }
}

/// Pack 8-bit channels into an `0xAARRGGBB` word.
#[must_use]
pub const fn pack(a: u8, r: u8, g: u8, b: u8) -> u32 {
    ((a as u32) << 24) | ((r as u32) << 16) | ((g as u32) << 8) | b as u32
}

/// Opaque color from 8-bit RGB channels.
#[must_use]
pub const fn rgb(r: u8, g: u8, b: u8) -> u32 {
    pack(0xFF, r, g, b)
}

/// Opaque gray with all channels equal to `v`.
#[must_use]
pub const fn gray(v: u8) -> u32 {
    rgb(v, v, v)
}

#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn alpha(p: u32) -> u8 {
    (p >> 24) as u8
}

#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn red(p: u32) -> u8 {
    (p >> 16) as u8
}

#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn green(p: u32) -> u8 {
    (p >> 8) as u8
}

#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn blue(p: u32) -> u8 {
    p as u8
}

/// Clamp a floating channel value into `0..=255` and round to nearest.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn to_channel(v: f64) -> u8 {
    if v.is_nan() {
        return 0;
    }
    v.clamp(0.0, 255.0).round() as u8
}

/// Errors that can occur during pipeline processing.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Dimensions or parameters are out of their valid domain.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A configuration document could not be parsed.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
}

/// Fail with [`PipelineError::InvalidArgument`] unless `cond` holds.
pub(crate) fn require(cond: bool, message: impl FnOnce() -> String) -> Result<(), PipelineError> {
    if cond {
        Ok(())
    } else {
        Err(PipelineError::InvalidArgument(message()))
    }
}
