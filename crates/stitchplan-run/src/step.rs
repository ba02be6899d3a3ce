//! Step abstraction and the runner that wraps each step in a span.
//!
//! # Runner contract
//!
//! 1. Canonicalize the step parameters and hash them.
//! 2. Open a span (this also records the step in the manifest).
//! 3. Run the step, catching panics.
//! 4. On success, store every raster the step produced under the step's
//!    directory using the parameter hash, then close the span `ok` with
//!    the step metrics and artifact references.
//! 5. On failure, close the span `error` with the message and a stack
//!    trace. The trace is captured by the runner once the step has
//!    returned or unwound, so it shows where the failure was observed
//!    rather than where it was raised. [`RunError::Internal`] and panics
//!    become [`RunError::StepFailed`], keeping the internal error as the
//!    source; every other error is returned unchanged.

use std::any::Any;
use std::backtrace::Backtrace;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use stitchplan_pipeline::RasterImage;

use crate::artifact::{ArtifactMetadata, ArtifactRef};
use crate::canonical::canonical_hash;
use crate::context::RunContext;
use crate::error::RunError;
use crate::events::SpanStatus;

/// The fixed sequence of pipeline steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Import,
    Analyze,
    Decide,
    Prescale,
}

impl PipelineStep {
    pub const ALL: [Self; 4] = [Self::Import, Self::Analyze, Self::Decide, Self::Prescale];

    /// Name used in spans and the manifest.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::Analyze => "analyze",
            Self::Decide => "decide",
            Self::Prescale => "prescale",
        }
    }

    /// Artifact directory, prefixed with the 1-based position.
    #[must_use]
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Import => "01_import",
            Self::Analyze => "02_analyze",
            Self::Decide => "03_decide",
            Self::Prescale => "04_prescale",
        }
    }
}

/// A raster a step wants persisted.
#[derive(Debug, Clone)]
pub struct PngArtifact {
    pub name: String,
    pub raster: RasterImage,
    pub meta: Map<String, Value>,
}

impl PngArtifact {
    pub fn new(name: impl Into<String>, raster: RasterImage) -> Self {
        Self {
            name: name.into(),
            raster,
            meta: Map::new(),
        }
    }

    #[must_use]
    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.meta.insert(key.to_owned(), value.into());
        self
    }
}

/// What a step returns to the runner.
#[derive(Debug, Clone)]
pub struct StepResult<T> {
    pub value: T,
    pub metrics: Map<String, Value>,
    pub artifacts: Vec<PngArtifact>,
}

impl<T> StepResult<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            metrics: Map::new(),
            artifacts: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_metric(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metrics.insert(key.to_owned(), value.into());
        self
    }

    #[must_use]
    pub fn with_artifact(mut self, artifact: PngArtifact) -> Self {
        self.artifacts.push(artifact);
        self
    }
}

/// What the runner returns after a successful step.
#[derive(Debug, Clone)]
pub struct StepRecord<T> {
    pub value: T,
    pub metrics: Map<String, Value>,
    pub artifacts: BTreeMap<String, ArtifactRef>,
    pub params_hash: String,
}

/// One stage of a run.
pub trait Step {
    type Params: Serialize;
    type Output;

    fn kind(&self) -> PipelineStep;

    /// Execute the step.
    ///
    /// # Errors
    ///
    /// Returns [`RunError`]; use [`RunError::Internal`] for failures that
    /// fit no other variant.
    fn run(
        &self,
        params: &Self::Params,
        context: &RunContext,
    ) -> Result<StepResult<Self::Output>, RunError>;
}

/// Run `step` inside a span.
///
/// # Errors
///
/// Returns the step's error (wrapped as [`RunError::StepFailed`] when it is
/// [`RunError::Internal`] or a panic), or a logging/storage error.
#[tracing::instrument(
    level = "debug",
    skip_all,
    fields(step = step.kind().name(), run_id = %context.run_id())
)]
pub fn run_step<S: Step>(
    step: &S,
    params: &S::Params,
    context: &RunContext,
) -> Result<StepRecord<S::Output>, RunError> {
    let kind = step.kind();
    let (canonical, params_hash) = canonical_hash(params)?;
    let span = context.logger().start_span(kind.name(), canonical)?;

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| step.run(params, context)))
        .unwrap_or_else(|payload| {
            Err(RunError::StepFailed {
                step: kind.name().to_owned(),
                message: panic_message(payload.as_ref()),
                cause: None,
            })
        })
        .and_then(|result| store_artifacts(kind, &params_hash, result, context));

    match outcome {
        Ok(record) => {
            let artifacts = artifact_map(&record.artifacts)?;
            context
                .logger()
                .end_span(span, &record.metrics, &artifacts, SpanStatus::Ok)?;
            Ok(record)
        }
        Err(err) => {
            let mut metrics = Map::new();
            metrics.insert("error_message".to_owned(), Value::from(err.to_string()));
            metrics.insert(
                "stack".to_owned(),
                Value::from(Backtrace::force_capture().to_string()),
            );
            tracing::warn!(step = kind.name(), %err, "step failed");
            if let Err(log_err) =
                context
                    .logger()
                    .end_span(span, &metrics, &Map::new(), SpanStatus::Error)
            {
                tracing::warn!(step = kind.name(), %log_err, "failed to close span");
            }
            Err(match err {
                RunError::Internal(source) => RunError::StepFailed {
                    step: kind.name().to_owned(),
                    message: source.to_string(),
                    cause: Some(source),
                },
                known => known,
            })
        }
    }
}

fn store_artifacts<T>(
    kind: PipelineStep,
    params_hash: &str,
    result: StepResult<T>,
    context: &RunContext,
) -> Result<StepRecord<T>, RunError> {
    let mut artifacts = BTreeMap::new();
    for artifact in result.artifacts {
        let metadata = ArtifactMetadata {
            params_hash: params_hash.to_owned(),
            meta: artifact.meta,
        };
        let stored = context.artifact_store().save_png(
            kind.dir_name(),
            &artifact.name,
            &artifact.raster,
            &metadata,
        )?;
        artifacts.insert(artifact.name, stored);
    }
    Ok(StepRecord {
        value: result.value,
        metrics: result.metrics,
        artifacts,
        params_hash: params_hash.to_owned(),
    })
}

fn artifact_map(artifacts: &BTreeMap<String, ArtifactRef>) -> Result<Map<String, Value>, RunError> {
    artifacts
        .iter()
        .map(|(name, artifact)| -> Result<(String, Value), RunError> {
            Ok((name.clone(), serde_json::to_value(artifact)?))
        })
        .collect()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "step panicked".to_owned())
}
