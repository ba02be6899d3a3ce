//! On-disk layout of a run directory.
//!
//! ```text
//! {root}/projects/{project_id}/runs/{YYYYMMDD}/{run_id}/
//!     events.jsonl
//!     manifest.json
//!     artifacts/{step}/{name}_{hash}.png
//!     artifacts/{step}/{name}_{hash}.meta.json
//!     tmp/
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::error::RunError;

pub const EVENTS_FILE: &str = "events.jsonl";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const ARTIFACTS_DIR: &str = "artifacts";
pub const TMP_DIR: &str = "tmp";

/// Directory for `run_id` of `project_id` started on `date`.
#[must_use]
pub fn run_dir(storage_root: &Path, project_id: &str, date: NaiveDate, run_id: &str) -> PathBuf {
    storage_root
        .join("projects")
        .join(project_id)
        .join("runs")
        .join(date.format("%Y%m%d").to_string())
        .join(run_id)
}

/// Check that `value` can be used as one path segment.
///
/// # Errors
///
/// Returns [`RunError::InvalidArgument`] if `value` is blank, is `.` or
/// `..`, or contains a path separator.
pub fn validate_segment(what: &str, value: &str) -> Result<(), RunError> {
    if value.trim().is_empty() {
        return Err(RunError::InvalidArgument(format!("{what} must not be blank")));
    }
    if value == "." || value == ".." || value.contains(['/', '\\']) {
        return Err(RunError::InvalidArgument(format!(
            "{what} must be a single path segment, got {value:?}"
        )));
    }
    Ok(())
}

/// Create `path` and any missing parents.
///
/// An existing directory is not an error, so concurrent callers may race
/// on shared parents.
///
/// # Errors
///
/// Returns [`RunError::NotADirectory`] if `path` or one of its ancestors
/// exists as something other than a directory, or [`RunError::Io`] for
/// any other failure.
pub fn ensure_dir(path: &Path) -> Result<(), RunError> {
    match fs::create_dir_all(path) {
        Ok(()) if path.is_dir() => Ok(()),
        Ok(()) => Err(RunError::NotADirectory(path.to_path_buf())),
        Err(source) => match path.ancestors().find(|p| p.exists() && !p.is_dir()) {
            Some(blocker) => Err(RunError::NotADirectory(blocker.to_path_buf())),
            None => Err(RunError::Io {
                context: format!("creating directory {}", path.display()),
                source,
            }),
        },
    }
}

/// Create a fresh run directory with its `artifacts/`, `tmp/` and an
/// empty `events.jsonl`.
///
/// # Errors
///
/// Returns [`RunError::InvalidArgument`] if the run directory already
/// exists, [`RunError::NotADirectory`] if a file blocks the path, or
/// [`RunError::Io`] on other filesystem failures.
pub fn create_run_dir(run_dir: &Path) -> Result<(), RunError> {
    if let Some(parent) = run_dir.parent() {
        ensure_dir(parent)?;
    }
    match fs::create_dir(run_dir) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Err(if run_dir.is_dir() {
                RunError::InvalidArgument(format!("run directory {} already exists", run_dir.display()))
            } else {
                RunError::NotADirectory(run_dir.to_path_buf())
            });
        }
        Err(source) => {
            return Err(RunError::Io {
                context: format!("creating run directory {}", run_dir.display()),
                source,
            });
        }
    }
    ensure_dir(&run_dir.join(ARTIFACTS_DIR))?;
    ensure_dir(&run_dir.join(TMP_DIR))?;
    let events = run_dir.join(EVENTS_FILE);
    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&events)
        .map_err(RunError::io(format!("creating {}", events.display())))?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn run_dir_follows_project_and_date() {
        let date = NaiveDate::from_ymd_opt(2025, 11, 19).unwrap();
        let dir = run_dir(Path::new("/data"), "quilt", date, "abc123");
        assert_eq!(dir, Path::new("/data/projects/quilt/runs/20251119/abc123"));
    }

    #[test]
    fn segments_reject_separators_and_blanks() {
        assert!(validate_segment("project id", "ok-name_1").is_ok());
        assert!(validate_segment("project id", "  ").is_err());
        assert!(validate_segment("project id", "a/b").is_err());
        assert!(validate_segment("project id", "a\\b").is_err());
        assert!(validate_segment("project id", "..").is_err());
    }

    #[test]
    fn ensure_dir_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a/b/c");
        ensure_dir(&path).unwrap();
        ensure_dir(&path).unwrap();
        assert!(path.is_dir());
    }

    #[test]
    fn ensure_dir_reports_blocking_file() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("a");
        fs::write(&blocker, b"not a dir").unwrap();
        let err = ensure_dir(&blocker.join("b")).unwrap_err();
        assert!(matches!(err, RunError::NotADirectory(ref p) if p == &blocker), "{err}");
    }

    #[test]
    fn run_dir_is_fully_initialized() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("projects/p/runs/20250101/r1");
        create_run_dir(&dir).unwrap();
        assert!(dir.join(ARTIFACTS_DIR).is_dir());
        assert!(dir.join(TMP_DIR).is_dir());
        assert_eq!(fs::read(dir.join(EVENTS_FILE)).unwrap().len(), 0);
    }

    #[test]
    fn existing_run_dir_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("r1");
        create_run_dir(&dir).unwrap();
        assert!(matches!(create_run_dir(&dir), Err(RunError::InvalidArgument(_))));
    }
}
