//! Edge-aware luma smoothing and banded sharpening for photographs.
//!
//! 1. Bilateral filter on luma (spatial and range Gaussians).
//! 2. Blend the smoothed luma back in proportion to `1 - edge`, so flat
//!    regions smooth fully while strong edges keep their structure.
//! 3. Unsharp mask with strength `amount * band(edge)`, where `band`
//!    restricts sharpening to mid-strength edges.
//! 4. Apply the luma change to R, G and B alike, preserving chroma.

use crate::blur::box_blur;
use crate::deblock::apply_luma_offset;
use crate::grayscale::luma_plane_linear;
use crate::prescale::PrescaleParams;
use crate::stats::clamp01_f64;
use crate::types::{PipelineError, RasterImage};

/// Hermite interpolation between `edge0` and `edge1`.
///
/// A degenerate interval acts as a step at `edge0`.
#[must_use]
pub fn smoothstep(edge0: f64, edge1: f64, x: f64) -> f64 {
    if edge1 <= edge0 {
        return if x < edge0 { 0.0 } else { 1.0 };
    }
    let t = clamp01_f64((x - edge0) / (edge1 - edge0));
    t * t * 2.0f64.mul_add(-t, 3.0)
}

/// Weight of unsharp masking for an edge strength `e`.
#[must_use]
pub fn sharpen_band(edge_min: f64, edge_max: f64, e: f64) -> f64 {
    smoothstep(edge_min, edge_max, e) * (1.0 - smoothstep(edge_max, 1.0, e))
}

/// Bilateral filter on a `[0, 1]` luma plane. Samples outside the plane
/// are skipped rather than clamped.
#[must_use = "returns the filtered plane"]
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn bilateral(
    luma: &[f64],
    width: usize,
    height: usize,
    radius: usize,
    sigma_spatial: f64,
    sigma_range: f64,
) -> Vec<f64> {
    let r = radius as isize;
    let side = 2 * radius + 1;
    let spatial_denominator = 2.0 * sigma_spatial * sigma_spatial;
    let range_denominator = 2.0 * sigma_range * sigma_range;
    let mut spatial = Vec::with_capacity(side * side);
    for dy in -r..=r {
        for dx in -r..=r {
            spatial.push((-((dx * dx + dy * dy) as f64) / spatial_denominator).exp());
        }
    }

    let (w, h) = (width as isize, height as isize);
    let mut out = vec![0.0; luma.len()];
    for y in 0..h {
        for x in 0..w {
            let center = luma[(y * w + x) as usize];
            let mut weighted = 0.0;
            let mut total = 0.0;
            for dy in -r..=r {
                let sy = y + dy;
                if sy < 0 || sy >= h {
                    continue;
                }
                for dx in -r..=r {
                    let sx = x + dx;
                    if sx < 0 || sx >= w {
                        continue;
                    }
                    let v = luma[(sy * w + sx) as usize];
                    let diff = v - center;
                    let weight = spatial[((dy + r) * (2 * r + 1) + dx + r) as usize]
                        * (-(diff * diff) / range_denominator).exp();
                    weighted += weight * v;
                    total += weight;
                }
            }
            out[(y * w + x) as usize] = if total > 0.0 { weighted / total } else { center };
        }
    }
    out
}

/// Run the photo enhancement on `raster`.
///
/// `edge` must hold one value per pixel when present; a missing mask is
/// treated as all zeros (no structure to protect, no band to sharpen).
///
/// # Errors
///
/// Returns [`PipelineError::InvalidArgument`] if `edge` has the wrong length.
pub fn enhance(
    raster: &RasterImage,
    edge: Option<&[f32]>,
    params: &PrescaleParams,
) -> Result<RasterImage, PipelineError> {
    let (width, height) = (raster.width() as usize, raster.height() as usize);
    if let Some(e) = edge {
        if e.len() != width * height {
            return Err(PipelineError::InvalidArgument(format!(
                "edge mask holds {} values but the raster has {}",
                e.len(),
                width * height
            )));
        }
    }
    let edge_at = |i: usize| edge.map_or(0.0, |e| f64::from(e[i]));

    let linear = luma_plane_linear(raster);
    let luma: Vec<f64> = linear.iter().map(|v| v / 255.0).collect();
    let smooth = bilateral(
        &luma,
        width,
        height,
        params.bilateral_radius as usize,
        params.bilateral_sigma_spatial,
        params.bilateral_sigma_range,
    );

    let adjusted: Vec<f64> = luma
        .iter()
        .zip(&smooth)
        .enumerate()
        .map(|(i, (&y, &s))| clamp01_f64((s - y).mul_add(1.0 - edge_at(i), y)))
        .collect();
    let blurred = box_blur(&adjusted, width, height, params.unsharp_radius as usize);

    let offsets: Vec<f64> = adjusted
        .iter()
        .zip(&blurred)
        .enumerate()
        .map(|(i, (&a, &b))| {
            let band = sharpen_band(params.unsharp_edge_min, params.unsharp_edge_max, edge_at(i));
            let sharpened = clamp01_f64((params.unsharp_amount * band).mul_add(a - b, a));
            sharpened.mul_add(255.0, -linear[i])
        })
        .collect();

    apply_luma_offset(raster, &offsets)
}
