//! Errors raised by the run layer.

use std::path::PathBuf;

use stitchplan_pipeline::PipelineError;

/// Errors that can occur while creating, running or closing a run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// A caller-supplied value is malformed (blank project id, step name
    /// containing a path separator, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A filesystem operation failed.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// A non-directory entry occupies a path that must be a directory.
    #[error("expected a directory at {}, found another kind of entry", .0.display())]
    NotADirectory(PathBuf),

    /// An engine stage rejected its input.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// PNG encoding failed.
    #[error("PNG encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    /// JSON serialization failed.
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    /// An error of a kind the runner does not recognize. Steps return this
    /// for failures outside the categories above; the runner wraps it in
    /// [`RunError::StepFailed`].
    #[error("{0}")]
    Internal(Box<dyn std::error::Error + Send + Sync>),

    /// A step failed with an unrecognized error or panicked. `cause` is the
    /// step's [`RunError::Internal`] error, or `None` for a panic.
    #[error("step {step} failed: {message}")]
    StepFailed {
        step: String,
        message: String,
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl RunError {
    /// Build a closure mapping an [`std::io::Error`] to [`RunError::Io`].
    pub(crate) fn io(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> Self {
        let context = context.into();
        move |source| Self::Io { context, source }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn io_error_display_includes_context() {
        let err = RunError::io("writing events.jsonl")(std::io::Error::other("disk full"));
        assert_eq!(err.to_string(), "writing events.jsonl: disk full");
    }

    #[test]
    fn not_a_directory_mentions_directory() {
        let err = RunError::NotADirectory(PathBuf::from("/tmp/x"));
        assert!(err.to_string().contains("directory"));
    }

    #[test]
    fn pipeline_error_is_transparent() {
        let err = RunError::from(PipelineError::InvalidArgument("bad".to_owned()));
        assert_eq!(err.to_string(), PipelineError::InvalidArgument("bad".to_owned()).to_string());
    }

    #[test]
    fn step_failed_names_the_step() {
        let err = RunError::StepFailed {
            step: "analyze".to_owned(),
            message: "boom".to_owned(),
            cause: None,
        };
        assert_eq!(err.to_string(), "step analyze failed: boom");
        assert!(std::error::Error::source(&err).is_none());
    }

    #[test]
    fn step_failed_exposes_its_cause() {
        let err = RunError::StepFailed {
            step: "prescale".to_owned(),
            message: "disk quota".to_owned(),
            cause: Some(Box::new(std::io::Error::other("disk quota"))),
        };
        let source = std::error::Error::source(&err).unwrap();
        assert!(source.downcast_ref::<std::io::Error>().is_some());
        assert_eq!(source.to_string(), "disk quota");
    }
}
