//! Content-addressed artifact storage.
//!
//! Each artifact lands at `artifacts/{step}/{name}_{params_hash}.png` with a
//! `.meta.json` sidecar. Both are staged under the run's `tmp/` directory
//! and renamed into place, so a reader never sees a truncated file.
//! Re-running a step with the same parameters rewrites the same files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use stitchplan_pipeline::RasterImage;
use uuid::Uuid;

use crate::clock::{Clock, format_timestamp};
use crate::error::RunError;
use crate::layout::{ARTIFACTS_DIR, TMP_DIR, ensure_dir, validate_segment};
use crate::png::encode_png;

/// What an artifact is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// An image meant for human inspection.
    Preview,
}

/// Location of a stored artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub path: PathBuf,
    pub kind: ArtifactKind,
}

/// Provenance attached to one artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub params_hash: String,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

#[derive(Serialize)]
struct Sidecar<'a> {
    run_id: &'a str,
    step: &'a str,
    params_hash: &'a str,
    timestamp: String,
    meta: &'a Map<String, Value>,
}

/// Persists step outputs.
pub trait ArtifactStore: Send + Sync {
    /// Store `raster` as a PNG under `step` and write its sidecar.
    ///
    /// # Errors
    ///
    /// Returns [`RunError`] if the step name is not a single path segment,
    /// encoding fails, or a file cannot be written.
    fn save_png(
        &self,
        step: &str,
        name: &str,
        raster: &RasterImage,
        metadata: &ArtifactMetadata,
    ) -> Result<ArtifactRef, RunError>;
}

/// [`ArtifactStore`] writing into a run directory.
pub struct FsArtifactStore {
    run_id: String,
    root: PathBuf,
    staging: PathBuf,
    clock: Arc<dyn Clock>,
}

impl FsArtifactStore {
    /// Store artifacts under `{run_dir}/artifacts`, staging writes in
    /// `{run_dir}/tmp`.
    pub fn new(run_id: impl Into<String>, run_dir: &Path, clock: Arc<dyn Clock>) -> Self {
        Self {
            run_id: run_id.into(),
            root: run_dir.join(ARTIFACTS_DIR),
            staging: run_dir.join(TMP_DIR),
            clock,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `bytes` to a uniquely named file under the staging directory,
    /// then rename it over `target`.
    fn write_atomically(&self, target: &Path, bytes: &[u8]) -> Result<(), RunError> {
        ensure_dir(&self.staging)?;
        let file_name = target
            .file_name()
            .map_or_else(|| "artifact".into(), |name| name.to_string_lossy());
        let partial = self
            .staging
            .join(format!("{file_name}.{}.partial", Uuid::new_v4().simple()));
        fs::write(&partial, bytes)
            .map_err(RunError::io(format!("writing {}", partial.display())))?;
        fs::rename(&partial, target).map_err(|err| {
            let _ = fs::remove_file(&partial);
            RunError::io(format!("replacing {}", target.display()))(err)
        })
    }
}

impl ArtifactStore for FsArtifactStore {
    #[tracing::instrument(level = "debug", skip(self, raster, metadata), fields(hash = %metadata.params_hash))]
    fn save_png(
        &self,
        step: &str,
        name: &str,
        raster: &RasterImage,
        metadata: &ArtifactMetadata,
    ) -> Result<ArtifactRef, RunError> {
        validate_segment("step name", step)?;
        if !metadata.params_hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(RunError::InvalidArgument(format!(
                "params hash must be hex, got {:?}",
                metadata.params_hash
            )));
        }
        let dir = self.root.join(step);
        ensure_dir(&dir)?;

        let stem = format!("{}_{}", sanitize_name(name), metadata.params_hash);
        let png_path = dir.join(format!("{stem}.png"));
        let sidecar_path = dir.join(format!("{stem}.meta.json"));

        let bytes = encode_png(raster)?;
        self.write_atomically(&png_path, &bytes)?;

        let sidecar = Sidecar {
            run_id: &self.run_id,
            step,
            params_hash: &metadata.params_hash,
            timestamp: format_timestamp(self.clock.now()),
            meta: &metadata.meta,
        };
        let json = serde_json::to_string_pretty(&sidecar)?;
        self.write_atomically(&sidecar_path, json.as_bytes())?;

        tracing::debug!(path = %png_path.display(), "artifact written");
        Ok(ArtifactRef {
            path: png_path,
            kind: ArtifactKind::Preview,
        })
    }
}

/// Replace every character outside `[A-Za-z0-9_-]` with `_`; an empty
/// name becomes `artifact`.
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    if name.is_empty() {
        return "artifact".to_owned();
    }
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}
