//! Exact-size resampling of ARGB rasters.
//!
//! [`DownscaleFilter`] selects between area-box averaging (all four
//! channels averaged over the source box under each output pixel) and
//! nearest-neighbour sampling at pixel centres.

use serde::{Deserialize, Serialize};

use crate::types::{PipelineError, RasterImage, alpha, blue, green, pack, red, to_channel};

/// Resampling filter used when shrinking a raster to its stitch grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownscaleFilter {
    /// Average every source pixel under the output pixel.
    #[default]
    Box,
    /// Sample the source pixel nearest to the output pixel centre.
    Nearest,
}

impl DownscaleFilter {
    /// Resample `raster` to exactly `width x height`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidArgument`] if a target dimension is zero.
    pub fn resize(self, raster: &RasterImage, width: u32, height: u32) -> Result<RasterImage, PipelineError> {
        match self {
            Self::Box => scale_box(raster, width, height),
            Self::Nearest => scale_nearest(raster, width, height),
        }
    }
}

/// Nearest-neighbour resample to exactly `width x height`.
///
/// Source coordinates are taken at output pixel centres:
/// `src = floor((x + 0.5) * ratio)`, clamped into range.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidArgument`] if a target dimension is zero.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn scale_nearest(
    raster: &RasterImage,
    width: u32,
    height: u32,
) -> Result<RasterImage, PipelineError> {
    let (sw, sh) = (raster.width(), raster.height());
    let x_ratio = f64::from(sw) / f64::from(width.max(1));
    let y_ratio = f64::from(sh) / f64::from(height.max(1));
    let source = |dst: u32, ratio: f64, limit: u32| -> u32 {
        let s = ((f64::from(dst) + 0.5) * ratio).floor() as i64;
        s.clamp(0, i64::from(limit) - 1) as u32
    };
    RasterImage::from_fn(width, height, |x, y| {
        raster.pixel(source(x, x_ratio, sw), source(y, y_ratio, sh))
    })
}

/// Area-box resample to exactly `width x height`.
///
/// Each output pixel averages the source box
/// `[trunc(x * s), trunc((x + 1) * s))`, widened to at least one pixel.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidArgument`] if a target dimension is zero.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn scale_box(raster: &RasterImage, width: u32, height: u32) -> Result<RasterImage, PipelineError> {
    let (sw, sh) = (raster.width(), raster.height());
    let x_scale = f64::from(sw) / f64::from(width.max(1));
    let y_scale = f64::from(sh) / f64::from(height.max(1));
    let span = |dst: u32, scale: f64, limit: u32| -> (u32, u32) {
        let start = ((f64::from(dst) * scale) as u32).min(limit - 1);
        let end = ((f64::from(dst + 1) * scale) as u32).min(limit).max(start + 1);
        (start, end)
    };

    RasterImage::from_fn(width, height, |x, y| {
        let (x0, x1) = span(x, x_scale, sw);
        let (y0, y1) = span(y, y_scale, sh);
        let mut sums = [0_u64; 4];
        for sy in y0..y1 {
            for sx in x0..x1 {
                let p = raster.pixel(sx, sy);
                sums[0] += u64::from(alpha(p));
                sums[1] += u64::from(red(p));
                sums[2] += u64::from(green(p));
                sums[3] += u64::from(blue(p));
            }
        }
        let count = f64::from((x1 - x0) * (y1 - y0));
        let [a, r, g, b] = sums.map(|s| to_channel(s as f64 / count));
        pack(a, r, g, b)
    })
}
