//! Structured JSON-lines event log (`events.jsonl`).
//!
//! Every write is one complete line appended under a per-logger lock, so
//! concurrent callers never interleave partial lines.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::clock::{Clock, format_timestamp};
use crate::error::RunError;
use crate::manifest::ManifestWriter;

/// Outcome recorded on a `span_end` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    Ok,
    Error,
}

/// Severity of a free-form `log` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One open step execution. Consumed by [`JsonLogger::end_span`].
#[derive(Debug)]
pub struct Span {
    id: String,
    step: String,
    params_canonical: String,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl Span {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn step(&self) -> &str {
        &self.step
    }

    #[must_use]
    pub fn params_canonical(&self) -> &str {
        &self.params_canonical
    }

    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum EventLine<'a> {
    RunStart {
        run_id: &'a str,
        timestamp: String,
    },
    RunEnd {
        run_id: &'a str,
        timestamp: String,
    },
    SpanStart {
        run_id: &'a str,
        span_id: &'a str,
        step: &'a str,
        params_canonical: &'a str,
        timestamp: String,
    },
    SpanEnd {
        run_id: &'a str,
        span_id: &'a str,
        step: &'a str,
        status: SpanStatus,
        elapsed_ms: u64,
        timestamp: String,
        #[serde(skip_serializing_if = "no_entries")]
        metrics: &'a Map<String, Value>,
        #[serde(skip_serializing_if = "no_entries")]
        artifacts: &'a Map<String, Value>,
    },
    Log {
        run_id: &'a str,
        level: LogLevel,
        message: &'a str,
        timestamp: String,
        #[serde(skip_serializing_if = "no_entries")]
        fields: &'a Map<String, Value>,
    },
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn no_entries(map: &&Map<String, Value>) -> bool {
    map.is_empty()
}

/// Appends events for one run and registers spans with its manifest.
pub struct JsonLogger {
    run_id: String,
    path: PathBuf,
    clock: Arc<dyn Clock>,
    manifest: Arc<ManifestWriter>,
    write_lock: Mutex<()>,
}

impl JsonLogger {
    pub fn new(
        run_id: impl Into<String>,
        path: impl Into<PathBuf>,
        clock: Arc<dyn Clock>,
        manifest: Arc<ManifestWriter>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            path: path.into(),
            clock,
            manifest,
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn manifest(&self) -> &ManifestWriter {
        &self.manifest
    }

    /// Open a span for `step` and record it in the manifest.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Io`] if the event cannot be appended.
    pub fn start_span(&self, step: &str, params_canonical: String) -> Result<Span, RunError> {
        let span = Span {
            id: Uuid::new_v4().to_string(),
            step: step.to_owned(),
            params_canonical,
            started_at: self.clock.now(),
            started: Instant::now(),
        };
        self.append(&EventLine::SpanStart {
            run_id: &self.run_id,
            span_id: &span.id,
            step: &span.step,
            params_canonical: &span.params_canonical,
            timestamp: format_timestamp(span.started_at),
        })?;
        self.manifest.record(&span.step, &span.params_canonical);
        Ok(span)
    }

    /// Close `span`. Empty `metrics` or `artifacts` maps are omitted.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Io`] if the event cannot be appended.
    pub fn end_span(
        &self,
        span: Span,
        metrics: &Map<String, Value>,
        artifacts: &Map<String, Value>,
        status: SpanStatus,
    ) -> Result<(), RunError> {
        let elapsed_ms = u64::try_from(span.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.append(&EventLine::SpanEnd {
            run_id: &self.run_id,
            span_id: &span.id,
            step: &span.step,
            status,
            elapsed_ms,
            timestamp: format_timestamp(self.clock.now()),
            metrics,
            artifacts,
        })?;
        tracing::debug!(step = %span.step, span_id = %span.id, ?status, elapsed_ms, "span closed");
        Ok(())
    }

    /// Append a free-form `log` line.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Io`] if the event cannot be appended.
    pub fn write_event(
        &self,
        level: LogLevel,
        message: &str,
        fields: &Map<String, Value>,
    ) -> Result<(), RunError> {
        self.append(&EventLine::Log {
            run_id: &self.run_id,
            level,
            message,
            timestamp: format_timestamp(self.clock.now()),
            fields,
        })
    }

    pub(crate) fn run_start(&self) -> Result<(), RunError> {
        self.append(&EventLine::RunStart {
            run_id: &self.run_id,
            timestamp: format_timestamp(self.clock.now()),
        })
    }

    pub(crate) fn run_end(&self) -> Result<(), RunError> {
        self.append(&EventLine::RunEnd {
            run_id: &self.run_id,
            timestamp: format_timestamp(self.clock.now()),
        })
    }

    fn append(&self, event: &EventLine<'_>) -> Result<(), RunError> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(RunError::io(format!("opening {}", self.path.display())))?;
        file.write_all(line.as_bytes())
            .map_err(RunError::io(format!("appending to {}", self.path.display())))
    }
}
