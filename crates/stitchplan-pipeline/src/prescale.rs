//! Branch-specific pixel transforms applied before stitch planning.
//!
//! The branch chosen by the decision engine selects the transform through
//! the [`PreScaler`] trait, implemented on [`PipelineBranch`] itself:
//!
//! - `PHOTO_PIPE`: edge-aware smoothing and banded sharpening
//!   ([`photo::enhance`]); the raster keeps its size.
//! - `DISCRETE_PIPE`: deblocking, then a downscale to the stitch grid when
//!   the raster is larger than it.
//! - `PIXEL_PIPE`: nearest-neighbour downscale to the stitch grid, median
//!   cut palette, optional ordered dither.

use serde::{Deserialize, Serialize};

use crate::deblock::deblock;
use crate::decision::{PipelineBranch, ProcessingPlan};
use crate::mask::MaskSet;
use crate::photo;
use crate::quantize::{BayerSize, median_cut, remap};
use crate::resample::{DownscaleFilter, scale_nearest};
use crate::types::{PipelineError, RasterImage, require};

/// Tuning for every prescale branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrescaleParams {
    /// Half-width of the bilateral window.
    pub bilateral_radius: u32,
    pub bilateral_sigma_spatial: f64,
    /// Range sigma on the `[0, 1]` luma scale.
    pub bilateral_sigma_range: f64,
    /// Radius of the box blur used for unsharp masking.
    pub unsharp_radius: u32,
    pub unsharp_amount: f64,
    /// Edge strength where sharpening starts to ramp in.
    pub unsharp_edge_min: f64,
    /// Edge strength of full sharpening; above it sharpening ramps out again.
    pub unsharp_edge_max: f64,
    /// Pull towards the boundary mean, in `[0, 1]`.
    pub deblock_strength: f64,
    pub discrete_downscale: DownscaleFilter,
    /// Palette size for pixel-art quantization.
    pub pixel_k_pre: u32,
    pub pixel_use_ordered_dither: bool,
    pub pixel_bayer_size: BayerSize,
}

impl Default for PrescaleParams {
    fn default() -> Self {
        Self {
            bilateral_radius: 2,
            bilateral_sigma_spatial: 1.6,
            bilateral_sigma_range: 0.08,
            unsharp_radius: 1,
            unsharp_amount: 0.12,
            unsharp_edge_min: 0.2,
            unsharp_edge_max: 0.85,
            deblock_strength: 0.4,
            discrete_downscale: DownscaleFilter::Box,
            pixel_k_pre: 32,
            pixel_use_ordered_dither: false,
            pixel_bayer_size: BayerSize::Eight,
        }
    }
}

impl PrescaleParams {
    /// Check every field against its valid domain.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidArgument`] naming the first bad field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        let unit = |v: f64| (0.0..=1.0).contains(&v);
        require(positive(self.bilateral_sigma_spatial), || {
            format!(
                "bilateral_sigma_spatial must be finite and positive, got {}",
                self.bilateral_sigma_spatial
            )
        })?;
        require(positive(self.bilateral_sigma_range), || {
            format!(
                "bilateral_sigma_range must be finite and positive, got {}",
                self.bilateral_sigma_range
            )
        })?;
        require(self.unsharp_amount.is_finite() && self.unsharp_amount >= 0.0, || {
            format!("unsharp_amount must be finite and non-negative, got {}", self.unsharp_amount)
        })?;
        require(
            unit(self.unsharp_edge_min)
                && unit(self.unsharp_edge_max)
                && self.unsharp_edge_min <= self.unsharp_edge_max,
            || {
                format!(
                    "unsharp edge band must satisfy 0 <= min <= max <= 1, got {}..{}",
                    self.unsharp_edge_min, self.unsharp_edge_max
                )
            },
        )?;
        require(unit(self.deblock_strength), || {
            format!("deblock_strength must lie in [0, 1], got {}", self.deblock_strength)
        })?;
        require(self.pixel_k_pre > 0, || "pixel_k_pre must be positive".to_owned())
    }
}

/// A prescale strategy.
pub trait PreScaler {
    /// Transform `raster` for `plan`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] when an intermediate raster cannot be built.
    fn prescale(
        &self,
        raster: &RasterImage,
        plan: &ProcessingPlan,
        masks: Option<&MaskSet>,
        params: &PrescaleParams,
    ) -> Result<RasterImage, PipelineError>;
}

impl PreScaler for PipelineBranch {
    fn prescale(
        &self,
        raster: &RasterImage,
        plan: &ProcessingPlan,
        masks: Option<&MaskSet>,
        params: &PrescaleParams,
    ) -> Result<RasterImage, PipelineError> {
        match *self {
            Self::PhotoPipe => prescale_photo(raster, masks, params),
            Self::DiscretePipe => prescale_discrete(raster, plan, params),
            Self::PixelPipe => prescale_pixel(raster, plan, params),
        }
    }
}

/// Validate inputs and run the branch named by `plan.pipeline`.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidArgument`] if `params` is invalid or the
/// plan has a zero target dimension.
pub fn prescale(
    raster: &RasterImage,
    plan: &ProcessingPlan,
    masks: Option<&MaskSet>,
    params: &PrescaleParams,
) -> Result<RasterImage, PipelineError> {
    params.validate()?;
    require(plan.target_width_stitches > 0 && plan.target_height_stitches > 0, || {
        format!(
            "plan target must be positive, got {}x{}",
            plan.target_width_stitches, plan.target_height_stitches
        )
    })?;
    plan.pipeline.prescale(raster, plan, masks, params)
}

fn prescale_photo(
    raster: &RasterImage,
    masks: Option<&MaskSet>,
    params: &PrescaleParams,
) -> Result<RasterImage, PipelineError> {
    let aligned = masks.map(|m| m.resized_to(raster.dimensions()));
    photo::enhance(raster, aligned.as_ref().map(MaskSet::edge), params)
}

fn prescale_discrete(
    raster: &RasterImage,
    plan: &ProcessingPlan,
    params: &PrescaleParams,
) -> Result<RasterImage, PipelineError> {
    let deblocked = deblock(raster, params.deblock_strength)?;
    let (tw, th) = (plan.target_width_stitches, plan.target_height_stitches);
    if deblocked.width() > tw || deblocked.height() > th {
        params.discrete_downscale.resize(&deblocked, tw, th)
    } else {
        Ok(deblocked)
    }
}

fn prescale_pixel(
    raster: &RasterImage,
    plan: &ProcessingPlan,
    params: &PrescaleParams,
) -> Result<RasterImage, PipelineError> {
    let scaled = scale_nearest(raster, plan.target_width_stitches, plan.target_height_stitches)?;
    let palette = median_cut(&scaled, params.pixel_k_pre as usize);
    let dither = params.pixel_use_ordered_dither.then_some(params.pixel_bayer_size);
    remap(&scaled, &palette, dither, params.pixel_k_pre)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::decision::{Complexity, GateSnapshot, SceneType, StitchRange};
    use crate::fixtures;
    use crate::resample::scale_box;
    use crate::types::{gray, red};

    fn plan(pipeline: PipelineBranch, width: u32, height: u32) -> ProcessingPlan {
        let scene_type = match pipeline {
            PipelineBranch::PhotoPipe => SceneType::Photo,
            PipelineBranch::DiscretePipe => SceneType::Discrete,
            PipelineBranch::PixelPipe => SceneType::PixelArt,
        };
        ProcessingPlan {
            target_width_stitches: width,
            target_height_stitches: height,
            scene_type,
            complexity: Complexity::Medium,
            pipeline,
            reasons: Vec::new(),
            gates: GateSnapshot {
                g0_computed_from_physical: false,
                g0_range: StitchRange::new(80, 300),
                g1: scene_type,
                g2: Complexity::Medium,
                g3_pixel_enabled: pipeline == PipelineBranch::PixelPipe,
            },
            version_tag: "test".to_owned(),
        }
    }

    fn mean_squared_error(a: &RasterImage, b: &RasterImage) -> f64 {
        let total: f64 = a
            .pixels()
            .iter()
            .zip(b.pixels())
            .map(|(&p, &q)| (f64::from(red(p)) - f64::from(red(q))).powi(2))
            .sum();
        total / a.pixels().len() as f64
    }

    #[test]
    fn defaults_are_valid() {
        PrescaleParams::default().validate().unwrap();
    }

    #[test]
    fn partial_json_fills_defaults() {
        let params: PrescaleParams =
            serde_json::from_str(r#"{"pixel_k_pre": 8, "discrete_downscale": "nearest"}"#).unwrap();
        assert_eq!(params.pixel_k_pre, 8);
        assert_eq!(params.discrete_downscale, DownscaleFilter::Nearest);
        assert_eq!(params.bilateral_radius, 2);
    }

    #[test]
    fn zero_palette_is_rejected() {
        let raster = fixtures::solid(8, 8, gray(10));
        let params = PrescaleParams { pixel_k_pre: 0, ..PrescaleParams::default() };
        let result = prescale(&raster, &plan(PipelineBranch::PixelPipe, 4, 4), None, &params);
        assert!(matches!(result, Err(PipelineError::InvalidArgument(_))));
    }

    #[test]
    fn inverted_edge_band_is_rejected() {
        let params = PrescaleParams {
            unsharp_edge_min: 0.9,
            unsharp_edge_max: 0.5,
            ..PrescaleParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn zero_target_is_rejected() {
        let raster = fixtures::solid(8, 8, gray(10));
        let result = prescale(
            &raster,
            &plan(PipelineBranch::DiscretePipe, 0, 4),
            None,
            &PrescaleParams::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn photo_keeps_size_and_flat_color() {
        let raster = fixtures::solid(20, 12, gray(90));
        let out = prescale(
            &raster,
            &plan(PipelineBranch::PhotoPipe, 10, 6),
            None,
            &PrescaleParams::default(),
        )
        .unwrap();
        assert_eq!(out, raster);
    }

    #[test]
    fn photo_accepts_masks_of_another_size() {
        let raster = fixtures::noisy_halves(32, 16, 60, 190, 10);
        let masks = MaskSet::new(8, 4, vec![0.5; 32], vec![0.5; 32], vec![0.0; 32]).unwrap();
        let out = prescale(
            &raster,
            &plan(PipelineBranch::PhotoPipe, 16, 8),
            Some(&masks),
            &PrescaleParams::default(),
        )
        .unwrap();
        assert_eq!(out.dimensions(), raster.dimensions());
    }

    #[test]
    fn photo_full_edge_mask_leaves_noise_in_place() {
        let raster = fixtures::noisy_halves(16, 16, 60, 190, 10);
        let masks = MaskSet::new(16, 16, vec![1.0; 256], vec![0.0; 256], vec![0.0; 256]).unwrap();
        let out = prescale(
            &raster,
            &plan(PipelineBranch::PhotoPipe, 16, 16),
            Some(&masks),
            &PrescaleParams::default(),
        )
        .unwrap();
        // Edge 1.0 disables smoothing and falls outside the sharpening band.
        assert_eq!(out, raster);
    }

    #[test]
    fn discrete_without_downscale_deblocks_in_place() {
        let raster = fixtures::vertical_steps(32, 16, &[30, 80, 150, 220]);
        let out = prescale(
            &raster,
            &plan(PipelineBranch::DiscretePipe, 40, 20),
            None,
            &PrescaleParams::default(),
        )
        .unwrap();
        assert_eq!(out.dimensions(), raster.dimensions());
        assert_eq!(out.pixel(0, 0), gray(30));
        // Mean of columns 6..=9 is 55; strength 0.4 moves 30 by 10 and 80 by -10.
        assert_eq!(out.pixel(7, 3), gray(40));
        assert_eq!(out.pixel(8, 3), gray(70));
    }

    #[test]
    fn discrete_downscales_to_target() {
        let raster = fixtures::vertical_steps(64, 32, &[30, 80, 150, 220]);
        for filter in [DownscaleFilter::Box, DownscaleFilter::Nearest] {
            let params = PrescaleParams { discrete_downscale: filter, ..PrescaleParams::default() };
            let out = prescale(&raster, &plan(PipelineBranch::DiscretePipe, 32, 16), None, &params)
                .unwrap();
            assert_eq!((out.width(), out.height()), (32, 16));
            assert_eq!(out.pixel(0, 0), gray(30));
            assert_eq!(out.pixel(31, 15), gray(220));
        }
    }

    #[test]
    fn pixel_output_fits_palette() {
        let raster = RasterImage::from_fn(64, 48, |x, y| {
            crate::types::rgb((x * 4) as u8, (y * 5) as u8, ((x + y) * 2) as u8)
        })
        .unwrap();
        let params = PrescaleParams { pixel_k_pre: 6, ..PrescaleParams::default() };
        let out = prescale(&raster, &plan(PipelineBranch::PixelPipe, 32, 24), None, &params).unwrap();
        assert_eq!((out.width(), out.height()), (32, 24));
        assert!(out.unique_colors() <= 6);
    }

    #[test]
    fn pixel_dither_lowers_error_against_box_average() {
        // Each 2x2 block averages to 135; nearest sampling sees only the
        // bottom-right pixel, which reads 100 on the left and 140 on the right.
        let raster = RasterImage::from_fn(64, 16, |x, y| {
            let right = x / 2 >= 24;
            match (x % 2, y % 2, right) {
                (1, 1, false) => gray(100),
                (1, 1, true) => gray(140),
                (0, 1, false) => gray(146),
                (0, 1, true) => gray(134),
                (_, _, false) => gray(147),
                (_, _, true) => gray(133),
            }
        })
        .unwrap();
        let reference = scale_box(&raster, 32, 8).unwrap();
        assert!(reference.pixels().iter().all(|&p| p == gray(135)));

        let target = plan(PipelineBranch::PixelPipe, 32, 8);
        let base = PrescaleParams { pixel_k_pre: 3, ..PrescaleParams::default() };
        let dithered_params = PrescaleParams { pixel_use_ordered_dither: true, ..base.clone() };
        let plain = prescale(&raster, &target, None, &base).unwrap();
        let dithered = prescale(&raster, &target, None, &dithered_params).unwrap();

        assert!(plain.unique_colors() <= 3 && dithered.unique_colors() <= 3);
        let plain_error = mean_squared_error(&plain, &reference);
        let dithered_error = mean_squared_error(&dithered, &reference);
        assert!((plain_error - 925.0).abs() < 1e-9, "plain error {plain_error}");
        assert!(dithered_error < plain_error, "{dithered_error} >= {plain_error}");
    }
}
