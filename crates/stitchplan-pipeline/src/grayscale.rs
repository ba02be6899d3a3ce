//! Luma extraction.
//!
//! Uses the Rec. 709 weights `0.2126*R + 0.7152*G + 0.0722*B`. Sums are
//! taken in `f64`, so white lands on `1.0` up to `f32` rounding.

use crate::types::{RasterImage, blue, green, red};

const WEIGHT_R: f64 = 0.2126;
const WEIGHT_G: f64 = 0.7152;
const WEIGHT_B: f64 = 0.0722;

/// Luma of an ARGB pixel on the `0..=255` scale. Alpha is ignored.
#[must_use]
pub fn luma_linear(p: u32) -> f64 {
    WEIGHT_B.mul_add(
        f64::from(blue(p)),
        WEIGHT_R.mul_add(f64::from(red(p)), WEIGHT_G * f64::from(green(p))),
    )
}

/// Per-pixel luma normalized to `[0, 1]`, in row-major order.
#[must_use = "returns the luma plane"]
#[allow(clippy::cast_possible_truncation)]
pub fn luma_plane(raster: &RasterImage) -> Vec<f32> {
    raster
        .pixels()
        .iter()
        .map(|&p| (luma_linear(p) / 255.0) as f32)
        .collect()
}

/// Per-pixel luma on the `0..=255` scale, kept in `f64` for prescale math.
#[must_use = "returns the luma plane"]
pub fn luma_plane_linear(raster: &RasterImage) -> Vec<f64> {
    raster.pixels().iter().map(|&p| luma_linear(p)).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{gray, rgb};

    #[test]
    fn white_is_exactly_one() {
        let raster = RasterImage::filled(2, 2, gray(255)).unwrap();
        assert!(luma_plane(&raster).iter().all(|&v| (v - 1.0).abs() < f32::EPSILON));
    }

    #[test]
    fn black_is_zero() {
        let raster = RasterImage::filled(2, 2, gray(0)).unwrap();
        assert!(luma_plane(&raster).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn green_dominates_weighting() {
        let r = luma_linear(rgb(255, 0, 0));
        let g = luma_linear(rgb(0, 255, 0));
        let b = luma_linear(rgb(0, 0, 255));
        assert!(g > r && r > b, "expected g > r > b, got {g} {r} {b}");
        assert!((r - 0.2126 * 255.0).abs() < 1e-9);
    }

    #[test]
    fn alpha_is_ignored() {
        let opaque = luma_linear(rgb(10, 20, 30));
        let clear = luma_linear(0x000A_141E);
        assert!((opaque - clear).abs() < f64::EPSILON);
    }

    #[test]
    fn output_length_matches_pixel_count() {
        let raster = RasterImage::filled(17, 31, gray(128)).unwrap();
        assert_eq!(luma_plane(&raster).len(), 17 * 31);
    }
}
