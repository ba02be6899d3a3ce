//! Block-boundary smoothing for compressed artwork.
//!
//! JPEG-style compression leaves luma steps on an 8-pixel grid. Pixels on
//! either side of each grid line are pulled towards the mean of the four
//! samples straddling that side of the line. Column and row passes both
//! read the original luma and their corrections add up. The luma change
//! is applied to R, G and B alike so hue is unchanged.

use crate::grayscale::luma_plane_linear;
use crate::types::{PipelineError, RasterImage, alpha, blue, green, pack, red, to_channel};

/// Spacing of the compression block grid.
pub const BLOCK_SIZE: usize = 8;

/// Smooth luma across block boundaries by `strength` (0 leaves the raster
/// unchanged, 1 replaces boundary pixels with the local mean).
///
/// # Errors
///
/// Returns [`PipelineError::InvalidArgument`] if `strength` is outside `[0, 1]`.
pub fn deblock(raster: &RasterImage, strength: f64) -> Result<RasterImage, PipelineError> {
    if !(0.0..=1.0).contains(&strength) {
        return Err(PipelineError::InvalidArgument(format!(
            "deblock strength must lie in [0, 1], got {strength}"
        )));
    }
    let (width, height) = (raster.width() as usize, raster.height() as usize);
    let luma = luma_plane_linear(raster);
    let mut delta = vec![0.0; luma.len()];

    for x in (BLOCK_SIZE..width).step_by(BLOCK_SIZE) {
        for y in 0..height {
            let sample = |c: usize| luma[y * width + c];
            let left = x - 1;
            let pull_left = mean_of(x - 2, (x + 1).min(width - 1), sample);
            let pull_right = mean_of(x - 1, (x + 2).min(width - 1), sample);
            delta[y * width + left] += (pull_left - sample(left)) * strength;
            delta[y * width + x] += (pull_right - sample(x)) * strength;
        }
    }

    for y in (BLOCK_SIZE..height).step_by(BLOCK_SIZE) {
        for x in 0..width {
            let sample = |r: usize| luma[r * width + x];
            let above = y - 1;
            let pull_above = mean_of(y - 2, (y + 1).min(height - 1), sample);
            let pull_below = mean_of(y - 1, (y + 2).min(height - 1), sample);
            delta[above * width + x] += (pull_above - sample(above)) * strength;
            delta[y * width + x] += (pull_below - sample(y)) * strength;
        }
    }

    apply_luma_offset(raster, &delta)
}

#[allow(clippy::cast_precision_loss)]
fn mean_of(from: usize, to: usize, sample: impl Fn(usize) -> f64) -> f64 {
    let sum: f64 = (from..=to).map(sample).sum();
    sum / (to - from + 1) as f64
}

/// Add `offsets[i]` to the R, G and B channels of pixel `i`, keeping alpha.
pub(crate) fn apply_luma_offset(
    raster: &RasterImage,
    offsets: &[f64],
) -> Result<RasterImage, PipelineError> {
    let pixels = raster
        .pixels()
        .iter()
        .zip(offsets)
        .map(|(&p, &d)| {
            pack(
                alpha(p),
                to_channel(f64::from(red(p)) + d),
                to_channel(f64::from(green(p)) + d),
                to_channel(f64::from(blue(p)) + d),
            )
        })
        .collect();
    RasterImage::new(raster.width(), raster.height(), pixels)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::types::{gray, rgb};

    #[test]
    fn zero_strength_is_identity() {
        let raster = fixtures::vertical_steps(32, 16, &[30, 80, 150, 220]);
        assert_eq!(deblock(&raster, 0.0).unwrap(), raster);
    }

    #[test]
    fn boundary_step_is_halved() {
        let raster = RasterImage::from_fn(16, 4, |x, _| if x < 8 { gray(100) } else { gray(140) }).unwrap();
        let out = deblock(&raster, 0.5).unwrap();
        // Both sides are pulled halfway towards the straddling mean of 120.
        assert_eq!(out.pixel(7, 2), gray(110));
        assert_eq!(out.pixel(8, 2), gray(130));
        assert_eq!(out.pixel(6, 2), gray(100));
        assert_eq!(out.pixel(9, 2), gray(140));
    }

    #[test]
    fn horizontal_boundaries_are_smoothed_too() {
        let raster = RasterImage::from_fn(4, 16, |_, y| if y < 8 { gray(0) } else { gray(200) }).unwrap();
        let out = deblock(&raster, 1.0).unwrap();
        assert_eq!(out.pixel(1, 7), gray(100));
        assert_eq!(out.pixel(1, 8), gray(100));
    }

    #[test]
    fn chroma_offset_is_shared() {
        let raster = RasterImage::from_fn(16, 1, |x, _| if x < 8 { rgb(100, 50, 20) } else { rgb(140, 90, 60) }).unwrap();
        let out = deblock(&raster, 0.5).unwrap();
        let p = out.pixel(7, 0);
        assert_eq!(i32::from(red(p)) - i32::from(green(p)), 50);
        assert_eq!(i32::from(green(p)) - i32::from(blue(p)), 30);
    }

    #[test]
    fn rejects_out_of_range_strength() {
        let raster = fixtures::solid(8, 8, gray(0));
        assert!(deblock(&raster, 1.5).is_err());
    }
}
