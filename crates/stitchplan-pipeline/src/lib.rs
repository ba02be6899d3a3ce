//! stitchplan-pipeline: pure analyze, decide and prescale engine (sans-IO).
//!
//! Turns an in-memory ARGB raster into a stitch-ready raster through:
//! analyze (scalar metrics and guidance masks) -> decide (gated
//! [`ProcessingPlan`]) -> prescale (branch-specific pixel transform).
//!
//! This crate has **no I/O dependencies**. Every function is deterministic:
//! identical inputs and parameters yield identical outputs. Persistence,
//! logging and provenance live in `stitchplan-run`.

pub mod analyze;
pub mod blur;
pub mod config;
pub mod deblock;
pub mod decision;
pub mod downsample;
pub mod edge;
pub mod grayscale;
pub mod mask;
pub mod photo;
pub mod prescale;
pub mod quantize;
pub mod resample;
pub mod stats;
pub mod types;
pub mod window;

#[cfg(test)]
mod fixtures;

pub use analyze::{AnalysisResult, AnalyzeParams, analyze};
pub use config::PipelineConfig;
pub use decision::{
    Complexity, DecisionInput, DecisionParams, GateSnapshot, PipelineBranch, ProcessingPlan,
    SceneType, StitchRange, build_plan,
};
pub use mask::{MaskKind, MaskSet};
pub use prescale::{PreScaler, PrescaleParams, prescale};
pub use quantize::BayerSize;
pub use resample::DownscaleFilter;
pub use types::{Dimensions, PipelineError, RasterImage};
