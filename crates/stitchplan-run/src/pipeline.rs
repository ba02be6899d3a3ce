//! End-to-end run: import -> analyze -> decide -> prescale.

use stitchplan_pipeline::{
    AnalysisResult, DecisionInput, MaskSet, PipelineConfig, ProcessingPlan, RasterImage,
};

use crate::context::RunContext;
use crate::error::RunError;
use crate::step::run_step;
use crate::steps::{AnalyzeStep, DecideStep, DecideStepParams, ImportParams, ImportStep, PrescaleStep};

/// What to plan and how.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlanRequest {
    pub source_id: String,
    pub config: PipelineConfig,
    /// Finished width in inches; used together with `fabric_count`.
    pub physical_width_inches: Option<f64>,
    pub fabric_count: Option<f64>,
    pub force_pixel_style: bool,
}

impl PlanRequest {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_physical_size(mut self, width_inches: f64, fabric_count: f64) -> Self {
        self.physical_width_inches = Some(width_inches);
        self.fabric_count = Some(fabric_count);
        self
    }

    #[must_use]
    pub fn with_force_pixel_style(mut self, force: bool) -> Self {
        self.force_pixel_style = force;
        self
    }

    fn decision_input(&self, raster: &RasterImage) -> DecisionInput {
        let mut input = DecisionInput::new(raster.width(), raster.height())
            .with_force_pixel_style(self.force_pixel_style);
        input.physical_width_inches = self.physical_width_inches;
        input.fabric_count = self.fabric_count;
        input
    }
}

/// Every intermediate value of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanOutcome {
    pub imported: RasterImage,
    pub analysis: AnalysisResult,
    pub masks: MaskSet,
    pub plan: ProcessingPlan,
    pub prescaled: RasterImage,
}

/// Run all four steps against `context`.
///
/// The context is left open; the caller closes it.
///
/// # Errors
///
/// Returns [`RunError::Pipeline`] if the configuration is invalid, or the
/// first step error.
#[tracing::instrument(skip_all, fields(run_id = %context.run_id(), source = %request.source_id))]
pub fn run_pipeline(
    context: &RunContext,
    raster: &RasterImage,
    request: &PlanRequest,
) -> Result<PlanOutcome, RunError> {
    request.config.validate()?;

    let import = ImportStep { raster };
    let imported = run_step(
        &import,
        &ImportParams {
            source_id: request.source_id.clone(),
        },
        context,
    )?
    .value;

    let analyze_step = AnalyzeStep { raster: &imported };
    let analyzed = run_step(
        &analyze_step,
        &analyze_step.params(request.config.analyze.clone()),
        context,
    )?
    .value;

    let decide_params = DecideStepParams {
        analysis: analyzed.analysis.clone(),
        input: request.decision_input(&imported),
        params: request.config.decision.clone(),
    };
    let plan = run_step(&DecideStep, &decide_params, context)?.value;

    let prescale_step = PrescaleStep {
        raster: &imported,
        masks: Some(&analyzed.masks),
    };
    let prescaled = run_step(
        &prescale_step,
        &prescale_step.params(plan.clone(), request.config.prescale.clone()),
        context,
    )?
    .value;

    tracing::info!(pipeline = %plan.pipeline, "run planned");
    Ok(PlanOutcome {
        imported,
        analysis: analyzed.analysis,
        masks: analyzed.masks,
        plan,
        prescaled,
    })
}
