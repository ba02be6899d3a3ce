//! Image analysis: scalar metrics and guidance masks.
//!
//! [`analyze`] downsamples the input to a preview resolution, extracts
//! luma and computes:
//!
//! - `edge_density`: share of interior pixels whose Sobel magnitude
//!   reaches the configured quantile of all interior magnitudes
//! - `unique_colors_q`: distinct colors after per-channel quantization
//! - `gradient_smoothness`: among the stronger half of gradients, the
//!   share whose normalized |Laplacian| stays below `0.2`
//! - `pixelation_score`: coverage of flat runs bounded by sharp jumps,
//!   the signature of upscaled pixel art
//! - `entropy_score`: mean local Shannon entropy over `log2(64)`
//!
//! plus the `edge`, `flat` and `texture` masks at preview resolution.
//!
//! Every step is deterministic: equal input and parameters produce
//! bit-identical results.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::blur::blur3x3;
use crate::downsample::area_downsample;
use crate::edge::{interior_values, laplacian, non_max_suppression, sobel};
use crate::grayscale::luma_plane;
use crate::mask::MaskSet;
use crate::stats::{NORMALIZE_FLOOR, clamp01, quantile, robust_normalize};
use crate::types::{PipelineError, RasterImage, blue, green, red, require};
use crate::window::{MAX_ENTROPY_BITS, local_entropy, local_variance};

/// Runs whose luma range stays within this are considered flat.
pub const PIXELATION_FLAT_EPS: f32 = 2.0 / 255.0;

/// Minimum luma jump that bounds a pixelation run.
pub const PIXELATION_JUMP: f32 = 12.0 / 255.0;

/// Normalized |Laplacian| below this counts as smooth.
pub const SMOOTH_LAPLACIAN_MAX: f32 = 0.2;

/// Tuning for [`analyze`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzeParams {
    /// Longest preview side; larger inputs are area-downsampled.
    pub preview_max: u32,
    /// Levels per channel when counting unique colors. Power of two in `2..=256`.
    pub quant_levels_per_channel: u32,
    /// Side of the local entropy window.
    pub entropy_window: u32,
    /// Side of the local variance window.
    pub variance_window: u32,
    /// Shortest flat run counted towards the pixelation score.
    pub pixelation_min_run: u32,
    /// Quantile of interior gradient magnitudes used as the edge threshold.
    pub edge_quantile: f32,
    /// Tolerance for non-maximum suppression.
    pub nms_eps: f32,
}

impl Default for AnalyzeParams {
    fn default() -> Self {
        Self {
            preview_max: 1024,
            quant_levels_per_channel: 64,
            entropy_window: 9,
            variance_window: 5,
            pixelation_min_run: 4,
            edge_quantile: 0.85,
            nms_eps: 1e-6,
        }
    }
}

impl AnalyzeParams {
    /// Check every field against its valid domain.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidArgument`] naming the first bad field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        require(self.preview_max > 0, || "preview_max must be positive".to_owned())?;
        let levels = self.quant_levels_per_channel;
        require((2..=256).contains(&levels) && levels.is_power_of_two(), || {
            format!("quant_levels_per_channel must be a power of two in 2..=256, got {levels}")
        })?;
        require(self.entropy_window > 0, || {
            "entropy_window must be positive".to_owned()
        })?;
        require(self.variance_window > 0, || {
            "variance_window must be positive".to_owned()
        })?;
        require(self.pixelation_min_run > 0, || {
            "pixelation_min_run must be positive".to_owned()
        })?;
        require((0.0..=1.0).contains(&self.edge_quantile), || {
            format!("edge_quantile must lie in [0, 1], got {}", self.edge_quantile)
        })?;
        require(self.nms_eps.is_finite() && self.nms_eps >= 0.0, || {
            format!("nms_eps must be finite and non-negative, got {}", self.nms_eps)
        })
    }
}

/// Scalar metrics describing an analyzed raster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Width of the analyzed (preview) raster.
    pub width: u32,
    /// Height of the analyzed (preview) raster.
    pub height: u32,
    pub edge_density: f32,
    pub unique_colors_q: u32,
    pub gradient_smoothness: f32,
    pub pixelation_score: f32,
    pub entropy_score: f32,
}

/// Analyze a raster.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidArgument`] if `params` fails validation.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn analyze(
    raster: &RasterImage,
    params: &AnalyzeParams,
) -> Result<(AnalysisResult, MaskSet), PipelineError> {
    params.validate()?;
    let (preview, _) = area_downsample(raster, params.preview_max)?;
    let (width, height) = (preview.width() as usize, preview.height() as usize);

    let luma = luma_plane(&preview);
    let gradients = sobel(&luma, width, height);
    let interior_mags = interior_values(&gradients.magnitude, width, height);

    let edge_density = edge_density(&interior_mags, params.edge_quantile);
    let unique_colors_q = unique_colors_quantized(&preview, params.quant_levels_per_channel);
    let gradient_smoothness = gradient_smoothness(&luma, &gradients.magnitude, width, height);
    let pixelation_score = pixelation_score(&luma, width, height, params.pixelation_min_run);

    let entropy = local_entropy(&luma, width, height, params.entropy_window as usize);
    let mean_entropy = entropy.iter().map(|&v| f64::from(v)).sum::<f64>() / entropy.len() as f64;
    let entropy_score = clamp01(mean_entropy as f32 / MAX_ENTROPY_BITS);

    let thinned = non_max_suppression(&gradients, width, height, params.nms_eps);
    let edge_norm = robust_normalize(&thinned, 99.0);
    let edge_mask = thinned.iter().map(|&v| clamp01(v / edge_norm)).collect();

    let variance = local_variance(&luma, width, height, params.variance_window as usize);
    let variance_norm = robust_normalize(&variance, 99.0);
    let flatness: Vec<f32> = variance
        .iter()
        .map(|&v| clamp01(1.0 - v / variance_norm))
        .collect();
    let flat_mask = blur3x3(&flatness, width, height)
        .into_iter()
        .map(clamp01)
        .collect();

    let entropy_norm = robust_normalize(&entropy, 99.0);
    let texture_mask = entropy.iter().map(|&v| clamp01(v / entropy_norm)).collect();

    let masks = MaskSet::new(
        preview.width(),
        preview.height(),
        edge_mask,
        flat_mask,
        texture_mask,
    )?;
    let result = AnalysisResult {
        width: preview.width(),
        height: preview.height(),
        edge_density,
        unique_colors_q,
        gradient_smoothness,
        pixelation_score,
        entropy_score,
    };
    Ok((result, masks))
}

/// Share of magnitudes at or above the `edge_quantile` threshold.
///
/// The threshold never drops below [`NORMALIZE_FLOOR`], so a raster
/// without any gradient has density zero.
#[allow(clippy::cast_precision_loss)]
fn edge_density(interior_mags: &[f32], edge_quantile: f32) -> f32 {
    if interior_mags.is_empty() {
        return 0.0;
    }
    let threshold = quantile(interior_mags, edge_quantile).max(NORMALIZE_FLOOR);
    let strong = interior_mags.iter().filter(|&&m| m >= threshold).count();
    strong as f32 / interior_mags.len() as f32
}

/// Count distinct colors after reducing each channel to `levels` values.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn unique_colors_quantized(raster: &RasterImage, levels: u32) -> u32 {
    let bits = 8 - levels.max(1).ilog2().min(8);
    let shift = (8 - bits).max(1);
    let keys: HashSet<u32> = raster
        .pixels()
        .iter()
        .map(|&p| {
            let r = u32::from(red(p)) >> bits;
            let g = u32::from(green(p)) >> bits;
            let b = u32::from(blue(p)) >> bits;
            (r << (2 * shift)) | (g << shift) | b
        })
        .collect();
    keys.len() as u32
}

#[allow(clippy::cast_precision_loss)]
fn gradient_smoothness(luma: &[f32], magnitude: &[f32], width: usize, height: usize) -> f32 {
    let mags = interior_values(magnitude, width, height);
    if mags.is_empty() {
        return 1.0;
    }
    let median = quantile(&mags, 0.5);
    let lap = interior_values(&laplacian(luma, width, height), width, height);
    let restricted: Vec<f32> = mags
        .iter()
        .zip(&lap)
        .filter(|&(&m, _)| m >= median)
        .map(|(_, &l)| l.abs())
        .collect();
    if restricted.is_empty() {
        return 1.0;
    }
    let norm = robust_normalize(&restricted, 99.0);
    let smooth = restricted
        .iter()
        .filter(|&&l| l / norm < SMOOTH_LAPLACIAN_MAX)
        .count();
    smooth as f32 / restricted.len() as f32
}

/// Average row-wise and column-wise coverage of bounded flat runs.
#[allow(clippy::cast_precision_loss)]
fn pixelation_score(luma: &[f32], width: usize, height: usize, min_run: u32) -> f32 {
    let min_run = min_run as usize;
    let total = (width * height) as f64;

    let row_pixels: usize = luma
        .chunks_exact(width)
        .map(|row| bounded_run_coverage(row, min_run))
        .sum();

    let mut column = vec![0.0; height];
    let mut col_pixels = 0;
    for x in 0..width {
        for y in 0..height {
            column[y] = luma[y * width + x];
        }
        col_pixels += bounded_run_coverage(&column, min_run);
    }

    let score = 0.5 * (row_pixels as f64 / total + col_pixels as f64 / total);
    clamp01(score as f32)
}

/// Pixels covered by maximal flat runs of at least `min_run` samples
/// that have a sharp jump on both sides.
///
/// At the ends of the line a run is compared against its own end sample,
/// so runs touching the boundary never count.
fn bounded_run_coverage(values: &[f32], min_run: usize) -> usize {
    let n = values.len();
    let mut covered = 0;
    let mut start = 0;
    while start < n {
        let (mut lo, mut hi) = (values[start], values[start]);
        let mut end = start + 1;
        while end < n {
            let v = values[end];
            if hi.max(v) - lo.min(v) > PIXELATION_FLAT_EPS {
                break;
            }
            lo = lo.min(v);
            hi = hi.max(v);
            end += 1;
        }

        if end - start >= min_run {
            let first = values[start];
            let last = values[end - 1];
            let before = if start > 0 { values[start - 1] } else { first };
            let after = if end < n { values[end] } else { last };
            if (first - before).abs() >= PIXELATION_JUMP && (after - last).abs() >= PIXELATION_JUMP {
                covered += end - start;
            }
        }
        start = end;
    }
    covered
}
