//! Per-run summary of every step and its canonical parameters.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::canonical::sha256_hex;
use crate::clock::{Clock, format_timestamp};
use crate::error::RunError;
use crate::layout::{MANIFEST_FILE, TMP_DIR, ensure_dir};

/// One executed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRecord {
    pub step: String,
    pub params_canonical: String,
    pub params_hash: String,
}

/// The document written to `manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub run_id: String,
    pub timestamp: String,
    pub steps: Vec<ManifestRecord>,
}

/// Accumulates [`ManifestRecord`]s in arrival order and flushes them.
pub struct ManifestWriter {
    run_id: String,
    run_dir: PathBuf,
    clock: Arc<dyn Clock>,
    records: Mutex<Vec<ManifestRecord>>,
}

impl ManifestWriter {
    pub fn new(run_id: impl Into<String>, run_dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            run_id: run_id.into(),
            run_dir: run_dir.into(),
            clock,
            records: Mutex::new(Vec::new()),
        }
    }

    /// Append a step; the hash is derived from `params_canonical`.
    pub fn record(&self, step: &str, params_canonical: &str) {
        let record = ManifestRecord {
            step: step.to_owned(),
            params_canonical: params_canonical.to_owned(),
            params_hash: sha256_hex(params_canonical),
        };
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    #[must_use]
    pub fn records(&self) -> Vec<ManifestRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Path of the flushed manifest.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.run_dir.join(MANIFEST_FILE)
    }

    /// Serialize every record and replace `manifest.json`.
    ///
    /// The document is written in full to `tmp/manifest.json.partial` and
    /// then renamed, so readers see either the previous or the new manifest.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Json`] or [`RunError::Io`] on failure; the
    /// previous manifest, if any, is left in place.
    pub fn write(&self) -> Result<PathBuf, RunError> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let manifest = Manifest {
            run_id: self.run_id.clone(),
            timestamp: format_timestamp(self.clock.now()),
            steps: records.clone(),
        };
        let json = serde_json::to_string_pretty(&manifest)?;

        let tmp_dir = self.run_dir.join(TMP_DIR);
        ensure_dir(&tmp_dir)?;
        let partial = tmp_dir.join(format!("{MANIFEST_FILE}.partial"));
        fs::write(&partial, json).map_err(RunError::io(describe("writing", &partial)))?;
        let target = self.path();
        fs::rename(&partial, &target).map_err(RunError::io(describe("replacing", &target)))?;
        tracing::debug!(run_id = %self.run_id, steps = records.len(), "manifest written");
        Ok(target)
    }
}

fn describe(action: &str, path: &Path) -> String {
    format!("{action} {}", path.display())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::clock::FixedClock;

    fn writer(dir: &Path) -> ManifestWriter {
        let clock = FixedClock(Utc.with_ymd_and_hms(2025, 11, 19, 10, 0, 0).unwrap());
        ManifestWriter::new("run-1", dir, Arc::new(clock))
    }

    #[test]
    fn records_keep_arrival_order() {
        let tmp = tempfile::tempdir().unwrap();
        let manifest = writer(tmp.path());
        manifest.record("import", "{}");
        manifest.record("analyze", r#"{"a":1}"#);
        let steps: Vec<String> = manifest.records().into_iter().map(|r| r.step).collect();
        assert_eq!(steps, ["import", "analyze"]);
    }

    #[test]
    fn write_produces_pretty_document() {
        let tmp = tempfile::tempdir().unwrap();
        let manifest = writer(tmp.path());
        manifest.record("import", "{}");
        let path = manifest.write().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains('\n'));
        let parsed: Manifest = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.run_id, "run-1");
        assert_eq!(parsed.timestamp, "2025-11-19T10:00:00.000Z");
        assert_eq!(parsed.steps[0].params_hash, sha256_hex("{}"));
        assert!(!tmp.path().join("tmp/manifest.json.partial").exists());
    }

    #[test]
    fn rewrite_replaces_previous_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let manifest = writer(tmp.path());
        manifest.write().unwrap();
        manifest.record("decide", "{}");
        let path = manifest.write().unwrap();
        let parsed: Manifest = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(parsed.steps.len(), 1);
    }
}
