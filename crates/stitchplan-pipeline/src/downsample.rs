//! Area-average downsampling to the analysis working resolution.
//!
//! Reduces the input so the longest axis is at most `max_side`. Every
//! output pixel averages the box of source pixels that maps onto it.
//! Alpha is ignored and output pixels are fully opaque.
//!
//! If the raster is already at or below the target it is returned
//! unchanged.

use crate::types::{PipelineError, RasterImage, blue, green, red, rgb, to_channel};

/// Downsample so `max(width, height) <= max_side`.
///
/// Returns the (possibly unchanged) raster and whether downsampling was
/// applied.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidArgument`] if `max_side` is zero.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn area_downsample(
    raster: &RasterImage,
    max_side: u32,
) -> Result<(RasterImage, bool), PipelineError> {
    if max_side == 0 {
        return Err(PipelineError::InvalidArgument(
            "preview max side must be positive".to_owned(),
        ));
    }
    let (w, h) = (raster.width(), raster.height());
    let long_axis = w.max(h);
    if long_axis <= max_side {
        return Ok((raster.clone(), false));
    }

    let scale = f64::from(long_axis) / f64::from(max_side);
    let new_w = ((f64::from(w) / scale).ceil() as u32).clamp(1, w);
    let new_h = ((f64::from(h) / scale).ceil() as u32).clamp(1, h);
    let x_ratio = f64::from(w) / f64::from(new_w);
    let y_ratio = f64::from(h) / f64::from(new_h);

    let out = RasterImage::from_fn(new_w, new_h, |x, y| {
        let x0 = (f64::from(x) * x_ratio) as u32;
        let x1 = ((f64::from(x + 1) * x_ratio) as u32).min(w).max(x0 + 1);
        let y0 = (f64::from(y) * y_ratio) as u32;
        let y1 = ((f64::from(y + 1) * y_ratio) as u32).min(h).max(y0 + 1);

        let (mut r, mut g, mut b) = (0_u64, 0_u64, 0_u64);
        for sy in y0..y1 {
            for sx in x0..x1 {
                let p = raster.pixel(sx, sy);
                r += u64::from(red(p));
                g += u64::from(green(p));
                b += u64::from(blue(p));
            }
        }
        let count = f64::from((x1 - x0) * (y1 - y0));
        rgb(
            to_channel(r as f64 / count),
            to_channel(g as f64 / count),
            to_channel(b as f64 / count),
        )
    })?;
    Ok((out, true))
}
