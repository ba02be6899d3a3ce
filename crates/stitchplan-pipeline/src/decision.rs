//! Decision gates: analysis metrics and user overrides in, processing plan out.
//!
//! Four gates run in a fixed order and each appends one human-readable
//! reason to the plan:
//!
//! 1. **G0 size**: target stitch grid from physical sizing or a default pick
//! 2. **G1 scene**: photo, discrete artwork or pixel art
//! 3. **G2 complexity**: simple, medium or complex
//! 4. **G3 pipeline**: which prescale branch to run
//!
//! Reasons are formatted deterministically (fixed three-decimal floats) so
//! identical inputs always yield byte-identical plans.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::analyze::AnalysisResult;
use crate::types::{PipelineError, require};

/// Broad classification of the source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SceneType {
    Photo,
    Discrete,
    PixelArt,
}

impl SceneType {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Photo => "PHOTO",
            Self::Discrete => "DISCRETE",
            Self::PixelArt => "PIXEL_ART",
        }
    }
}

impl fmt::Display for SceneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Visual complexity bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

impl Complexity {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Simple => "SIMPLE",
            Self::Medium => "MEDIUM",
            Self::Complex => "COMPLEX",
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Prescale branch selected by gate G3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineBranch {
    PhotoPipe,
    DiscretePipe,
    PixelPipe,
}

impl PipelineBranch {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::PhotoPipe => "PHOTO_PIPE",
            Self::DiscretePipe => "DISCRETE_PIPE",
            Self::PixelPipe => "PIXEL_PIPE",
        }
    }
}

impl fmt::Display for PipelineBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Inclusive range of stitch counts, displayed as `min..max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StitchRange {
    pub min: u32,
    pub max: u32,
}

impl StitchRange {
    #[must_use]
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// Clamp `value` into the range. Assumes the range was validated.
    #[must_use]
    pub fn clamp(self, value: i64) -> i64 {
        value.max(i64::from(self.min)).min(i64::from(self.max))
    }

    fn validate(self, field: &str) -> Result<(), PipelineError> {
        require(self.min > 0 && self.min <= self.max, || {
            format!("{field} must satisfy 0 < min <= max, got {self}")
        })
    }
}

impl fmt::Display for StitchRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.min, self.max)
    }
}

/// Source geometry and user overrides for one decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionInput {
    pub source_width: u32,
    pub source_height: u32,
    /// Finished width in inches. Used only together with `fabric_count`.
    #[serde(default)]
    pub physical_width_inches: Option<f64>,
    /// Stitches per inch of the fabric.
    #[serde(default)]
    pub fabric_count: Option<f64>,
    #[serde(default)]
    pub force_pixel_style: bool,
    #[serde(default = "default_recommended_long_side")]
    pub recommended_long_side: StitchRange,
    #[serde(default = "default_clamp_stitches")]
    pub clamp_stitches: StitchRange,
}

const fn default_recommended_long_side() -> StitchRange {
    StitchRange::new(120, 240)
}

const fn default_clamp_stitches() -> StitchRange {
    StitchRange::new(80, 300)
}

impl DecisionInput {
    /// Input for a source of the given size with default ranges and no overrides.
    #[must_use]
    pub const fn new(source_width: u32, source_height: u32) -> Self {
        Self {
            source_width,
            source_height,
            physical_width_inches: None,
            fabric_count: None,
            force_pixel_style: false,
            recommended_long_side: default_recommended_long_side(),
            clamp_stitches: default_clamp_stitches(),
        }
    }

    /// Size the pattern from a finished width and fabric count.
    #[must_use]
    pub const fn with_physical_size(mut self, width_inches: f64, fabric_count: f64) -> Self {
        self.physical_width_inches = Some(width_inches);
        self.fabric_count = Some(fabric_count);
        self
    }

    #[must_use]
    pub const fn with_force_pixel_style(mut self, force: bool) -> Self {
        self.force_pixel_style = force;
        self
    }

    fn validate(&self) -> Result<(), PipelineError> {
        require(self.source_width > 0 && self.source_height > 0, || {
            format!(
                "source dimensions must be positive, got {}x{}",
                self.source_width, self.source_height
            )
        })?;
        for (field, value) in [
            ("physical_width_inches", self.physical_width_inches),
            ("fabric_count", self.fabric_count),
        ] {
            if let Some(v) = value {
                require(v.is_finite() && v > 0.0, || {
                    format!("{field} must be finite and positive, got {v}")
                })?;
            }
        }
        self.recommended_long_side.validate("recommended_long_side")?;
        self.clamp_stitches.validate("clamp_stitches")
    }
}

/// Gate thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionParams {
    /// Identifies this threshold set in every plan it produces.
    pub version_tag: String,
    pub pixelation_high: f32,
    pub unique_colors_photo_min: u32,
    pub unique_colors_discrete_max: u32,
    pub edge_for_discrete_min: f32,
    pub edge_low: f32,
    pub edge_high: f32,
    pub entropy_low: f32,
    pub entropy_high: f32,
    /// Long side used when no physical sizing is given.
    pub default_pick_long_side: u32,
    pub round_to_multiple: u32,
}

impl Default for DecisionParams {
    fn default() -> Self {
        Self {
            version_tag: "GATE-V1-2025-11-19".to_owned(),
            pixelation_high: 0.55,
            unique_colors_photo_min: 4000,
            unique_colors_discrete_max: 2500,
            edge_for_discrete_min: 0.06,
            edge_low: 0.03,
            edge_high: 0.12,
            entropy_low: 0.30,
            entropy_high: 0.60,
            default_pick_long_side: 180,
            round_to_multiple: 2,
        }
    }
}

impl DecisionParams {
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidArgument`] if `round_to_multiple` or
    /// `default_pick_long_side` is zero.
    pub fn validate(&self) -> Result<(), PipelineError> {
        require(self.round_to_multiple > 0, || {
            "round_to_multiple must be positive".to_owned()
        })?;
        require(self.default_pick_long_side > 0, || {
            "default_pick_long_side must be positive".to_owned()
        })
    }
}

/// Which branch each gate took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateSnapshot {
    pub g0_computed_from_physical: bool,
    pub g0_range: StitchRange,
    pub g1: SceneType,
    pub g2: Complexity,
    pub g3_pixel_enabled: bool,
}

/// The decided plan for one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingPlan {
    pub target_width_stitches: u32,
    pub target_height_stitches: u32,
    pub scene_type: SceneType,
    pub complexity: Complexity,
    pub pipeline: PipelineBranch,
    /// One entry per gate, in gate order.
    pub reasons: Vec<String>,
    pub gates: GateSnapshot,
    pub version_tag: String,
}

/// Run all four gates.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidArgument`] if the analysis or input has a
/// non-positive dimension, if a range is empty or inverted, if physical
/// sizing is non-finite or non-positive, or if `params` fails validation.
pub fn build_plan(
    analysis: &AnalysisResult,
    input: &DecisionInput,
    params: &DecisionParams,
) -> Result<ProcessingPlan, PipelineError> {
    require(analysis.width > 0 && analysis.height > 0, || {
        format!(
            "analysis dimensions must be positive, got {}x{}",
            analysis.width, analysis.height
        )
    })?;
    input.validate()?;
    params.validate()?;

    let mut reasons = Vec::with_capacity(4);

    let size = gate_size(input, params);
    reasons.push(size.reason);

    let (scene, reason) = gate_scene(analysis, params);
    reasons.push(reason);

    let (complexity, reason) = gate_complexity(analysis, params);
    reasons.push(reason);

    let pixel_enabled = input.force_pixel_style || scene == SceneType::PixelArt;
    let pipeline = if pixel_enabled {
        PipelineBranch::PixelPipe
    } else if scene == SceneType::Photo {
        PipelineBranch::PhotoPipe
    } else {
        PipelineBranch::DiscretePipe
    };
    reasons.push(format!(
        "G3 pipeline: forcePixel={}, scene={scene}, pixel={pixel_enabled} -> {pipeline}",
        input.force_pixel_style
    ));

    Ok(ProcessingPlan {
        target_width_stitches: size.width,
        target_height_stitches: size.height,
        scene_type: scene,
        complexity,
        pipeline,
        reasons,
        gates: GateSnapshot {
            g0_computed_from_physical: size.from_physical,
            g0_range: input.clamp_stitches,
            g1: scene,
            g2: complexity,
            g3_pixel_enabled: pixel_enabled,
        },
        version_tag: params.version_tag.clone(),
    })
}

struct SizeDecision {
    width: u32,
    height: u32,
    from_physical: bool,
    reason: String,
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::cast_sign_loss)]
fn gate_size(input: &DecisionInput, params: &DecisionParams) -> SizeDecision {
    let clamp_range = input.clamp_stitches;
    let (long_side, from_physical, pick) = match (input.physical_width_inches, input.fabric_count)
    {
        (Some(inches), Some(count)) => (
            (inches * count).round() as i64,
            true,
            format!("physical {inches:.3}in * {count:.3}"),
        ),
        _ => {
            let default = i64::from(params.default_pick_long_side);
            (
                input.recommended_long_side.clamp(clamp_range.clamp(default)),
                false,
                format!(
                    "auto default={} in {}",
                    params.default_pick_long_side, input.recommended_long_side
                ),
            )
        }
    };

    let long_side = clamp_range.clamp(long_side);
    let (src_w, src_h) = (input.source_width, input.source_height);
    let aspect = f64::from(src_w.min(src_h)) / f64::from(src_w.max(src_h));
    let short_side = (long_side as f64 * aspect).round() as i64;

    let multiple = i64::from(params.round_to_multiple);
    let long_side = round_to_multiple(long_side, multiple);
    let short_side = round_to_multiple(short_side, multiple);

    let (width, height) = if src_w >= src_h {
        (long_side, short_side)
    } else {
        (short_side, long_side)
    };
    let width = clamp_range.clamp(width) as u32;
    let height = clamp_range.clamp(height) as u32;

    let via = if from_physical { "physical" } else { "auto" };
    SizeDecision {
        width,
        height,
        from_physical,
        reason: format!(
            "G0 size: {width}x{height} stitches (via {via}, clamp={clamp_range}, pick={pick}, roundTo={})",
            params.round_to_multiple
        ),
    }
}

fn gate_scene(analysis: &AnalysisResult, params: &DecisionParams) -> (SceneType, String) {
    let pixelation = analysis.pixelation_score;
    let unique = analysis.unique_colors_q;
    let edge = analysis.edge_density;
    let entropy = analysis.entropy_score;

    if pixelation >= params.pixelation_high {
        return (
            SceneType::PixelArt,
            format!(
                "G1 pixelation high (pixelation={pixelation:.3} >= {:.3})",
                params.pixelation_high
            ),
        );
    }
    if unique >= params.unique_colors_photo_min {
        return (
            SceneType::Photo,
            format!(
                "G1 many unique colors (unique={unique} >= {})",
                params.unique_colors_photo_min
            ),
        );
    }
    if unique <= params.unique_colors_discrete_max && edge >= params.edge_for_discrete_min {
        return (
            SceneType::Discrete,
            format!(
                "G1 few colors & enough edges (colors={unique} <= {}, edge={edge:.3} >= {:.3})",
                params.unique_colors_discrete_max, params.edge_for_discrete_min
            ),
        );
    }
    if entropy >= params.entropy_high && (params.edge_low..=params.edge_high).contains(&edge) {
        return (
            SceneType::Photo,
            format!("G1 fallback: entropy high & medium edges (entropy={entropy:.3}, edge={edge:.3})"),
        );
    }
    (
        SceneType::Discrete,
        format!("G1 fallback: default to discrete (entropy={entropy:.3}, edge={edge:.3})"),
    )
}

fn gate_complexity(analysis: &AnalysisResult, params: &DecisionParams) -> (Complexity, String) {
    let edge = analysis.edge_density;
    let entropy = analysis.entropy_score;
    let complexity = if edge <= params.edge_low && entropy <= params.entropy_low {
        Complexity::Simple
    } else if edge >= params.edge_high || entropy >= params.entropy_high {
        Complexity::Complex
    } else {
        Complexity::Medium
    };
    (
        complexity,
        format!("G2 complexity: edge={edge:.3}, entropy={entropy:.3} -> {complexity}"),
    )
}

/// Round to the nearest multiple of `multiple`, ties away from zero.
#[must_use]
pub const fn round_to_multiple(value: i64, multiple: i64) -> i64 {
    if multiple <= 1 {
        return value;
    }
    let remainder = value % multiple;
    let toward_zero = value - remainder;
    if remainder.abs() * 2 >= multiple {
        toward_zero + multiple * value.signum()
    } else {
        toward_zero
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn analysis() -> AnalysisResult {
        AnalysisResult {
            width: 200,
            height: 100,
            edge_density: 0.05,
            unique_colors_q: 3000,
            gradient_smoothness: 0.8,
            pixelation_score: 0.1,
            entropy_score: 0.5,
        }
    }

    fn plan(analysis: &AnalysisResult, input: &DecisionInput) -> ProcessingPlan {
        build_plan(analysis, input, &DecisionParams::default()).unwrap()
    }

    #[test]
    fn physical_sizing_on_landscape_source() {
        let input = DecisionInput::new(2000, 1000).with_physical_size(10.0, 16.0);
        let plan = plan(&analysis(), &input);
        assert_eq!(plan.target_width_stitches, 160);
        assert_eq!(plan.target_height_stitches, 80);
        assert!(plan.gates.g0_computed_from_physical);
        assert_eq!(
            plan.reasons[0],
            "G0 size: 160x80 stitches (via physical, clamp=80..300, pick=physical 10.000in * 16.000, roundTo=2)"
        );
    }

    #[test]
    fn physical_sizing_on_portrait_source() {
        let input = DecisionInput::new(1000, 2000).with_physical_size(10.0, 16.0);
        let plan = plan(&analysis(), &input);
        assert_eq!((plan.target_width_stitches, plan.target_height_stitches), (80, 160));
    }

    #[test]
    fn auto_sizing_uses_default_pick() {
        let plan = plan(&analysis(), &DecisionInput::new(2000, 1000));
        assert_eq!((plan.target_width_stitches, plan.target_height_stitches), (180, 90));
        assert!(!plan.gates.g0_computed_from_physical);
        assert_eq!(
            plan.reasons[0],
            "G0 size: 180x90 stitches (via auto, clamp=80..300, pick=auto default=180 in 120..240, roundTo=2)"
        );
    }

    #[test]
    fn oversized_physical_request_is_clamped() {
        let input = DecisionInput::new(2000, 1000).with_physical_size(100.0, 16.0);
        let plan = plan(&analysis(), &input);
        assert_eq!((plan.target_width_stitches, plan.target_height_stitches), (300, 150));
    }

    #[test]
    fn narrow_source_short_side_is_clamped_up() {
        let plan = plan(&analysis(), &DecisionInput::new(4000, 500));
        assert_eq!((plan.target_width_stitches, plan.target_height_stitches), (180, 80));
    }

    #[test]
    fn high_pixelation_forces_pixel_art() {
        let metrics = AnalysisResult {
            pixelation_score: 0.70,
            unique_colors_q: 10_000,
            edge_density: 0.5,
            entropy_score: 0.9,
            ..analysis()
        };
        let plan = plan(&metrics, &DecisionInput::new(64, 64));
        assert_eq!(plan.scene_type, SceneType::PixelArt);
        assert_eq!(plan.pipeline, PipelineBranch::PixelPipe);
        assert_eq!(plan.reasons[1], "G1 pixelation high (pixelation=0.700 >= 0.550)");
        assert!(plan.gates.g3_pixel_enabled);
    }

    #[test]
    fn many_colors_is_photo() {
        let metrics = AnalysisResult {
            unique_colors_q: 5000,
            ..analysis()
        };
        let plan = plan(&metrics, &DecisionInput::new(64, 64));
        assert_eq!(plan.scene_type, SceneType::Photo);
        assert_eq!(plan.pipeline, PipelineBranch::PhotoPipe);
    }

    #[test]
    fn few_colors_with_edges_is_discrete() {
        let metrics = AnalysisResult {
            unique_colors_q: 40,
            edge_density: 0.2,
            ..analysis()
        };
        let plan = plan(&metrics, &DecisionInput::new(64, 64));
        assert_eq!(plan.scene_type, SceneType::Discrete);
        assert_eq!(plan.pipeline, PipelineBranch::DiscretePipe);
        assert!(plan.reasons[1].starts_with("G1 few colors & enough edges"));
    }

    #[test]
    fn fallback_photo_needs_high_entropy_and_medium_edges() {
        let metrics = AnalysisResult {
            unique_colors_q: 3000,
            edge_density: 0.05,
            entropy_score: 0.7,
            ..analysis()
        };
        let plan = plan(&metrics, &DecisionInput::new(64, 64));
        assert_eq!(plan.scene_type, SceneType::Photo);
        assert_eq!(
            plan.reasons[1],
            "G1 fallback: entropy high & medium edges (entropy=0.700, edge=0.050)"
        );
    }

    #[test]
    fn fallback_defaults_to_discrete() {
        let plan = plan(&analysis(), &DecisionInput::new(64, 64));
        assert_eq!(plan.scene_type, SceneType::Discrete);
        assert!(plan.reasons[1].starts_with("G1 fallback: default to discrete"));
    }

    #[test]
    fn complexity_buckets() {
        let simple = AnalysisResult {
            edge_density: 0.01,
            entropy_score: 0.1,
            ..analysis()
        };
        let complex = AnalysisResult {
            edge_density: 0.2,
            ..analysis()
        };
        let input = DecisionInput::new(64, 64);
        assert_eq!(plan(&simple, &input).complexity, Complexity::Simple);
        assert_eq!(plan(&complex, &input).complexity, Complexity::Complex);
        let medium = plan(&analysis(), &input);
        assert_eq!(medium.complexity, Complexity::Medium);
        assert_eq!(
            medium.reasons[2],
            "G2 complexity: edge=0.050, entropy=0.500 -> MEDIUM"
        );
    }

    #[test]
    fn force_pixel_style_overrides_scene() {
        let metrics = AnalysisResult {
            unique_colors_q: 5000,
            ..analysis()
        };
        let input = DecisionInput::new(64, 64).with_force_pixel_style(true);
        let plan = plan(&metrics, &input);
        assert_eq!(plan.scene_type, SceneType::Photo);
        assert_eq!(plan.pipeline, PipelineBranch::PixelPipe);
        assert_eq!(
            plan.reasons[3],
            "G3 pipeline: forcePixel=true, scene=PHOTO, pixel=true -> PIXEL_PIPE"
        );
    }

    #[test]
    fn identical_inputs_produce_identical_plans() {
        let input = DecisionInput::new(1234, 987).with_physical_size(7.5, 14.0);
        let a = plan(&analysis(), &input);
        let b = plan(&analysis(), &input);
        assert_eq!(a, b);
        assert_eq!(a.reasons.len(), 4);
        assert_eq!(a.version_tag, "GATE-V1-2025-11-19");
    }

    #[test]
    fn invalid_dimensions_are_rejected() {
        let zero_source = DecisionInput::new(0, 10);
        assert!(matches!(
            build_plan(&analysis(), &zero_source, &DecisionParams::default()),
            Err(PipelineError::InvalidArgument(_))
        ));
        let zero_analysis = AnalysisResult {
            height: 0,
            ..analysis()
        };
        assert!(matches!(
            build_plan(&zero_analysis, &DecisionInput::new(10, 10), &DecisionParams::default()),
            Err(PipelineError::InvalidArgument(_))
        ));
    }

    #[test]
    fn inverted_range_is_rejected() {
        let mut input = DecisionInput::new(10, 10);
        input.clamp_stitches = StitchRange::new(300, 80);
        assert!(matches!(
            build_plan(&analysis(), &input, &DecisionParams::default()),
            Err(PipelineError::InvalidArgument(_))
        ));
    }

    #[test]
    fn non_positive_physical_size_is_rejected() {
        let input = DecisionInput::new(10, 10).with_physical_size(-1.0, 16.0);
        assert!(build_plan(&analysis(), &input, &DecisionParams::default()).is_err());
    }

    #[test]
    fn round_to_multiple_ties_away_from_zero() {
        assert_eq!(round_to_multiple(90, 2), 90);
        assert_eq!(round_to_multiple(91, 2), 92);
        assert_eq!(round_to_multiple(-91, 2), -92);
        assert_eq!(round_to_multiple(91, 3), 90);
        assert_eq!(round_to_multiple(92, 3), 93);
        assert_eq!(round_to_multiple(7, 1), 7);
    }

    #[test]
    fn enums_serialize_as_screaming_names() {
        assert_eq!(serde_json::to_string(&SceneType::PixelArt).unwrap(), "\"PIXEL_ART\"");
        assert_eq!(
            serde_json::to_string(&PipelineBranch::PhotoPipe).unwrap(),
            "\"PHOTO_PIPE\""
        );
    }
}
