//! stitchplan-run: deterministic run and provenance layer.
//!
//! Wraps every engine stage from `stitchplan-pipeline` in a logged span
//! and persists its outputs so a run can be audited and reproduced:
//!
//! - [`RunContextFactory`] lays out `{root}/projects/{project}/runs/{date}/{run_id}/`.
//! - [`JsonLogger`] appends `span_start`/`span_end`/`log` lines to `events.jsonl`.
//! - [`FsArtifactStore`] writes content-addressed PNGs with JSON sidecars.
//! - [`ManifestWriter`] flushes the step list to `manifest.json` on close.
//! - [`run_step`] ties them together for one [`Step`]; [`run_pipeline`]
//!   chains the import, analyze, decide and prescale steps.

pub mod artifact;
pub mod canonical;
pub mod clock;
pub mod context;
pub mod error;
pub mod events;
pub mod layout;
pub mod manifest;
pub mod pipeline;
pub mod png;
pub mod step;
pub mod steps;

pub use artifact::{ArtifactKind, ArtifactMetadata, ArtifactRef, ArtifactStore, FsArtifactStore};
pub use canonical::{canonical_hash, canonical_json, raster_digest, sha256_hex};
pub use clock::{Clock, FixedClock, SystemClock};
pub use context::{RunContext, RunContextFactory, RunIdGenerator, UuidRunIds};
pub use error::RunError;
pub use events::{JsonLogger, LogLevel, Span, SpanStatus};
pub use manifest::{Manifest, ManifestRecord, ManifestWriter};
pub use pipeline::{PlanOutcome, PlanRequest, run_pipeline};
pub use step::{PipelineStep, PngArtifact, Step, StepRecord, StepResult, run_step};
