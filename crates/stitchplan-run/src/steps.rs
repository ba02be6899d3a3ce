//! The four pipeline steps.
//!
//! Steps that consume pixels put a content digest of their input raster in
//! their parameters, so the parameter hash (and every artifact name derived
//! from it) changes whenever the pixels do.

use serde::{Deserialize, Serialize};
use stitchplan_pipeline::{
    AnalysisResult, AnalyzeParams, DecisionInput, DecisionParams, MaskKind, MaskSet,
    PrescaleParams, ProcessingPlan, RasterImage, analyze, build_plan, prescale,
};

use crate::canonical::raster_digest;
use crate::context::RunContext;
use crate::error::RunError;
use crate::step::{PipelineStep, PngArtifact, Step, StepResult};

/// Parameters of the import step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportParams {
    /// Identifies the upstream source (file name, upload id, ...).
    pub source_id: String,
}

/// Accepts a decoded raster and stores it as `import_normalized`.
#[derive(Debug, Clone, Copy)]
pub struct ImportStep<'a> {
    pub raster: &'a RasterImage,
}

impl Step for ImportStep<'_> {
    type Params = ImportParams;
    type Output = RasterImage;

    fn kind(&self) -> PipelineStep {
        PipelineStep::Import
    }

    fn run(&self, params: &ImportParams, _context: &RunContext) -> Result<StepResult<RasterImage>, RunError> {
        let (width, height) = (self.raster.width(), self.raster.height());
        let megapixels = f64::from(width) * f64::from(height) / 1_000_000.0;
        Ok(StepResult::new(self.raster.clone())
            .with_metric("width_px", width)
            .with_metric("height_px", height)
            .with_metric("megapixels", megapixels)
            .with_artifact(
                PngArtifact::new("import_normalized", self.raster.clone())
                    .with_meta("source_id", params.source_id.as_str()),
            ))
    }
}

/// Parameters of the analyze step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeStepParams {
    pub source_digest: String,
    pub params: AnalyzeParams,
}

/// Output of the analyze step.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzeOutput {
    pub analysis: AnalysisResult,
    pub masks: MaskSet,
}

/// Computes analysis metrics and stores the required masks as previews.
#[derive(Debug, Clone, Copy)]
pub struct AnalyzeStep<'a> {
    pub raster: &'a RasterImage,
}

impl AnalyzeStep<'_> {
    #[must_use]
    pub fn params(&self, params: AnalyzeParams) -> AnalyzeStepParams {
        AnalyzeStepParams {
            source_digest: raster_digest(self.raster),
            params,
        }
    }
}

impl Step for AnalyzeStep<'_> {
    type Params = AnalyzeStepParams;
    type Output = AnalyzeOutput;

    fn kind(&self) -> PipelineStep {
        PipelineStep::Analyze
    }

    fn run(
        &self,
        params: &AnalyzeStepParams,
        _context: &RunContext,
    ) -> Result<StepResult<AnalyzeOutput>, RunError> {
        let (analysis, masks) = analyze(self.raster, &params.params)?;
        let mut result = StepResult::new(AnalyzeOutput {
            analysis: analysis.clone(),
            masks: masks.clone(),
        })
        .with_metric("width", analysis.width)
        .with_metric("height", analysis.height)
        .with_metric("edge_density", analysis.edge_density)
        .with_metric("unique_colors_q", analysis.unique_colors_q)
        .with_metric("gradient_smoothness", analysis.gradient_smoothness)
        .with_metric("pixelation_score", analysis.pixelation_score)
        .with_metric("entropy_score", analysis.entropy_score);
        for kind in MaskKind::REQUIRED {
            if let Some(preview) = masks.preview(kind) {
                result = result.with_artifact(
                    PngArtifact::new(format!("mask_{}", kind.name()), preview)
                        .with_meta("mask", kind.name()),
                );
            }
        }
        Ok(result)
    }
}

/// Parameters of the decide step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecideStepParams {
    pub analysis: AnalysisResult,
    pub input: DecisionInput,
    pub params: DecisionParams,
}

/// Runs the decision gates.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecideStep;

impl Step for DecideStep {
    type Params = DecideStepParams;
    type Output = ProcessingPlan;

    fn kind(&self) -> PipelineStep {
        PipelineStep::Decide
    }

    fn run(
        &self,
        params: &DecideStepParams,
        _context: &RunContext,
    ) -> Result<StepResult<ProcessingPlan>, RunError> {
        let plan = build_plan(&params.analysis, &params.input, &params.params)?;
        Ok(StepResult::new(plan.clone())
            .with_metric("target_width_stitches", plan.target_width_stitches)
            .with_metric("target_height_stitches", plan.target_height_stitches)
            .with_metric("scene_type", plan.scene_type.name())
            .with_metric("complexity", plan.complexity.name())
            .with_metric("pipeline", plan.pipeline.name())
            .with_metric("version_tag", plan.version_tag.as_str())
            .with_metric("reasons", plan.reasons))
    }
}

/// Parameters of the prescale step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescaleStepParams {
    pub source_digest: String,
    pub plan: ProcessingPlan,
    pub params: PrescaleParams,
}

/// Applies the plan's prescale branch and stores the result as `prescaled`.
#[derive(Debug, Clone, Copy)]
pub struct PrescaleStep<'a> {
    pub raster: &'a RasterImage,
    pub masks: Option<&'a MaskSet>,
}

impl PrescaleStep<'_> {
    #[must_use]
    pub fn params(&self, plan: ProcessingPlan, params: PrescaleParams) -> PrescaleStepParams {
        PrescaleStepParams {
            source_digest: raster_digest(self.raster),
            plan,
            params,
        }
    }
}

impl Step for PrescaleStep<'_> {
    type Params = PrescaleStepParams;
    type Output = RasterImage;

    fn kind(&self) -> PipelineStep {
        PipelineStep::Prescale
    }

    fn run(
        &self,
        params: &PrescaleStepParams,
        _context: &RunContext,
    ) -> Result<StepResult<RasterImage>, RunError> {
        let out = prescale(self.raster, &params.plan, self.masks, &params.params)?;
        let unique = u64::try_from(out.unique_colors()).unwrap_or(u64::MAX);
        Ok(StepResult::new(out.clone())
            .with_metric("width_px", out.width())
            .with_metric("height_px", out.height())
            .with_metric("unique_colors", unique)
            .with_metric("pipeline", params.plan.pipeline.name())
            .with_artifact(PngArtifact::new("prescaled", out)))
    }
}
